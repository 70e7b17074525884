pub mod bookmarks;
pub mod locate;
pub mod merge;
pub mod tracks;

use gpxtagger::{GpxDocument, ImportStatus, Settings};
use std::error::Error;
use std::path::PathBuf;

/// Imports `files` in order into a fresh document. Capacity limits are
/// reported on stderr; a rejected file aborts with its validation message.
pub fn load_document(settings: &Settings, files: &[PathBuf]) -> Result<GpxDocument, Box<dyn Error>> {
    let mut document = GpxDocument::new(settings)?;

    for path in files {
        let outcome = document.import_gpx(path, &settings.timezone)?;
        if let ImportStatus::CapacityExceeded { accepted, rejected } = outcome.status {
            eprintln!(
                "{}: track list is full, accepted {accepted} and rejected {rejected} track(s)",
                path.display()
            );
        }
    }

    Ok(document)
}
