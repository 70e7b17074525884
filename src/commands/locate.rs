use super::load_document;
use gpxtagger::{Settings, parse_local_timestamp};
use std::error::Error;
use std::path::PathBuf;

pub fn locate_command(settings: &Settings, at: &str, files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
    let at = parse_local_timestamp(at)
        .map_err(|e| format!("Invalid time '{at}', expected YYYY-MM-DD HH:MM:SS: {e}"))?;
    let document = load_document(settings, files)?;

    match document.find_coordinates(at) {
        Some(position) => println!("{} {} {}", position.lat, position.lon, position.ele),
        None => println!("no position available"),
    }

    Ok(())
}
