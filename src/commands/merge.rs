use super::load_document;
use gpxtagger::{Settings, TrackId};
use std::error::Error;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub fn merge_command(
    settings: &Settings,
    exclude: &[TrackId],
    output: Option<&Path>,
    files: &[PathBuf],
) -> Result<(), Box<dyn Error>> {
    let mut document = load_document(settings, files)?;

    for &id in exclude {
        if !document.remove_track(id) {
            eprintln!("No track with id {id}");
        }
    }

    match output {
        Some(path) => document.save_gpx(path)?,
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            document.write_to(&mut out)?;
            out.flush()?;
        }
    }

    Ok(())
}
