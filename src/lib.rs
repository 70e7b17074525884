use time::PrimitiveDateTime;
use time::macros::format_description;

pub mod bookmarks;
pub mod config;
pub mod document;
pub mod error;
pub mod gpxxml;
pub mod schema;
pub mod store;
pub mod timezone;
pub mod track;

pub use bookmarks::{Bookmark, Bookmarks};
pub use config::Settings;
pub use document::GpxDocument;
pub use error::{DocumentError, NoTimestampData, PointParseError, ValidationError};
pub use store::{ImportOutcome, ImportStatus, TrackStore};
pub use timezone::TimeNormalizer;
pub use track::{Position, Track, TrackId, TrackPoint};

/// Parses a GPX `<time>` value (`xs:dateTime`) into a naive timestamp.
///
/// Fractional seconds and a `Z` or `±hh:mm` suffix are accepted. Any offset
/// present in the text is dropped without conversion: track logs are treated
/// as UTC on the wire, and the wall-clock fields are taken as-is.
pub fn parse_gpx_time(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(
        s.trim(),
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]][optional [[first [Z] [[offset_hour sign:mandatory]:[offset_minute]]]]]"
        ),
    )
}

/// Parses a local wall-clock timestamp as `YYYY-MM-DD HH:MM:SS` or in the
/// EXIF form `YYYY:MM:DD HH:MM:SS`.
pub fn parse_local_timestamp(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    let s = s.trim();
    PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .or_else(|_| {
        PrimitiveDateTime::parse(
            s,
            format_description!("[year]:[month]:[day] [hour]:[minute]:[second]"),
        )
    })
}

pub fn format_local_timestamp(t: PrimitiveDateTime) -> String {
    t.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| t.to_string())
}

/// Calculates the great circle distance in meters between two GPS coordinates
/// using the haversine formula.
///
/// Coordinates are not range checked. Values outside [-90, 90] / [-180, 180]
/// give a result without failing, which is accepted as an approximation.
///
/// References:
/// - R.W. Sinnott, "Virtues of the Haversine", Sky and Telescope, vol. 68, no. 2, 1984, p. 159
/// - https://en.wikipedia.org/wiki/Haversine_formula
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS: f64 = 6371000.0; // Mean Earth radius in meters

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    // Haversine formula: a = sin²(Δφ/2) + cos φ1 ⋅ cos φ2 ⋅ sin²(Δλ/2)
    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

    // c = 2 ⋅ atan2(√a, √(1−a))
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS * c
}
