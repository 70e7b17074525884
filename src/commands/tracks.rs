use super::load_document;
use gpxtagger::{Settings, format_local_timestamp};
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

pub fn tracks_command(settings: &Settings, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let document = load_document(settings, files)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for track in document.tracks() {
        let (start, end) = match track.get_timestamps() {
            Ok((start, end)) => (format_local_timestamp(start), format_local_timestamp(end)),
            Err(_) => ("-".to_string(), "-".to_string()),
        };
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{:.2} km",
            track.id(),
            track.get_name(),
            start,
            end,
            track.get_distance() / 1000.0
        )?;
    }

    Ok(())
}
