use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use time::PrimitiveDateTime;
use tracing::debug;

use crate::error::{NoTimestampData, PointParseError};
use crate::gpxxml::Element;
use crate::timezone::TimeNormalizer;
use crate::{format_local_timestamp, haversine_distance, parse_gpx_time};

/// Store-unique track identifier. Ids grow monotonically and are never reused
/// by the store that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(u64);

impl TrackId {
    pub(crate) fn new(value: u64) -> Self {
        TrackId(value)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TrackId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TrackId)
    }
}

/// A geographic position with elevation in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub ele: f64,
}

impl Position {
    /// Arithmetic mean of each coordinate. This is not a great-circle midpoint.
    pub fn midpoint(&self, other: &Position) -> Position {
        Position {
            lat: (self.lat + other.lat) / 2.0,
            lon: (self.lon + other.lon) / 2.0,
            ele: (self.ele + other.ele) / 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    /// The `<time>` value as written in the file, offset stripped.
    pub time: Option<PrimitiveDateTime>,
    pub name: Option<String>,
    pub description: Option<String>,
}

fn parse_number(field: &'static str, text: &str) -> Result<f64, PointParseError> {
    text.trim()
        .parse()
        .map_err(|_| PointParseError::InvalidNumber {
            field,
            value: text.to_string(),
        })
}

impl TrackPoint {
    pub fn from_element(trkpt: &Element) -> Result<Self, PointParseError> {
        let lat = trkpt
            .attribute("lat")
            .ok_or(PointParseError::MissingAttribute("lat"))?;
        let lon = trkpt
            .attribute("lon")
            .ok_or(PointParseError::MissingAttribute("lon"))?;

        let ele = match trkpt.child_text("ele") {
            Some(text) => Some(parse_number("ele", &text)?),
            None => None,
        };
        let time = match trkpt.child_text("time") {
            Some(text) => {
                Some(parse_gpx_time(&text).map_err(|_| PointParseError::InvalidTime(text))?)
            }
            None => None,
        };

        Ok(TrackPoint {
            lat: parse_number("lat", lat)?,
            lon: parse_number("lon", lon)?,
            ele,
            time,
            name: trkpt.child_text("name"),
            description: trkpt.child_text("desc"),
        })
    }

    /// The full position, if the point carries an elevation.
    pub fn position(&self) -> Option<Position> {
        Some(Position {
            lat: self.lat,
            lon: self.lon,
            ele: self.ele?,
        })
    }
}

/// One `<trk>` element and the values derived from it.
///
/// The element is a detached copy owned by the track; its points never change
/// after construction, so the time window and the distance are computed at
/// most once.
#[derive(Debug)]
pub struct Track {
    id: TrackId,
    element: Element,
    points: Vec<Result<TrackPoint, PointParseError>>,
    normalizer: Arc<TimeNormalizer>,
    window: OnceLock<Option<(PrimitiveDateTime, PrimitiveDateTime)>>,
    distance: OnceLock<f64>,
}

impl Track {
    pub fn new(id: TrackId, element: Element, normalizer: Arc<TimeNormalizer>) -> Self {
        let points: Vec<_> = element
            .children_named("trkseg")
            .flat_map(|seg| seg.children_named("trkpt"))
            .map(TrackPoint::from_element)
            .collect();

        for (index, point) in points.iter().enumerate() {
            if let Err(e) = point {
                debug!(track = %id, index, "unreadable track point: {e}");
            }
        }

        Track {
            id,
            element,
            points,
            normalizer,
            window: OnceLock::new(),
            distance: OnceLock::new(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    /// Readable points in document order.
    pub fn get_points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.points.iter().filter_map(|p| p.as_ref().ok())
    }

    /// Every `<trkpt>` in document order, including the ones that could not be read.
    pub fn raw_points(&self) -> &[Result<TrackPoint, PointParseError>] {
        &self.points
    }

    pub(crate) fn first_timestamp(&self) -> Option<PrimitiveDateTime> {
        self.get_points().find_map(|p| p.time)
    }

    /// The point's timestamp in local wall-clock time.
    pub fn local_time(&self, point: &TrackPoint) -> Option<PrimitiveDateTime> {
        point.time.map(|t| self.normalizer.localize(t))
    }

    /// Earliest and latest local timestamp of the track.
    pub fn get_timestamps(&self) -> Result<(PrimitiveDateTime, PrimitiveDateTime), NoTimestampData> {
        let window = self.window.get_or_init(|| {
            let mut times = self.get_points().filter_map(|p| self.local_time(p));
            let first = times.next()?;
            Some(times.fold((first, first), |(start, end), t| (start.min(t), end.max(t))))
        });
        window.ok_or(NoTimestampData)
    }

    pub fn start_time(&self) -> Result<PrimitiveDateTime, NoTimestampData> {
        self.get_timestamps().map(|(start, _)| start)
    }

    /// The track's `<name>`, or its start time when it has none.
    pub fn get_name(&self) -> String {
        if let Some(name) = self.element.child_text("name")
            && !name.trim().is_empty()
        {
            return name.trim().to_string();
        }
        match self.start_time() {
            Ok(start) => format_local_timestamp(start),
            Err(NoTimestampData) => format!("Track {}", self.id),
        }
    }

    /// Total length in meters over consecutive readable points.
    pub fn get_distance(&self) -> f64 {
        *self.distance.get_or_init(|| {
            let points: Vec<_> = self.get_points().collect();
            points
                .windows(2)
                .map(|pair| haversine_distance(pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon))
                .sum()
        })
    }

    pub(crate) fn covers(&self, at: PrimitiveDateTime) -> bool {
        self.get_timestamps()
            .is_ok_and(|(start, end)| start <= at && at <= end)
    }

    /// Position at local time `at`.
    ///
    /// A point lacking a position or time splits the track into runs; each run
    /// is scanned in temporal order and starts without a predecessor. A point
    /// at exactly `at` is returned as is. The first point after `at` is
    /// averaged with the point before it, or with itself at the start of a run.
    pub fn interpolate(&self, at: PrimitiveDateTime) -> Option<Position> {
        let entries: Vec<_> = self
            .points
            .iter()
            .map(|point| {
                let point = point.as_ref().ok()?;
                Some((point.position()?, self.local_time(point)?))
            })
            .collect();

        for run in entries.split(Option::is_none) {
            let mut run: Vec<(Position, PrimitiveDateTime)> =
                run.iter().flatten().copied().collect();
            run.sort_by_key(|&(_, time)| time);

            let mut previous: Option<Position> = None;
            for (position, time) in run {
                if time == at {
                    return Some(position);
                }
                let before = previous.unwrap_or(position);
                if time > at {
                    return Some(before.midpoint(&position));
                }
                previous = Some(position);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpxxml::parse_document;
    use time::macros::datetime;

    fn track_from(xml: &str, zone: &str) -> Track {
        let body = format!(
            r#"<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="test">{xml}</gpx>"#
        );
        let root = parse_document(body.as_bytes()).unwrap();
        let trk = root.child("trk").unwrap().clone();
        Track::new(
            TrackId::new(1),
            trk,
            Arc::new(TimeNormalizer::new(zone).unwrap()),
        )
    }

    const WALK: &str = r#"<trk><trkseg>
      <trkpt lat="52.0" lon="5.0"><ele>10</ele><time>2023-01-01T10:00:00Z</time></trkpt>
      <trkpt lat="52.2" lon="5.2"><ele>20</ele><time>2023-01-01T10:10:00Z</time></trkpt>
      <trkpt lat="52.4" lon="5.4"><ele>30</ele><time>2023-01-01T10:20:00Z</time></trkpt>
    </trkseg></trk>"#;

    #[test]
    fn test_track_point_from_element() {
        let root = parse_document(
            br#"<trkpt xmlns="http://www.topografix.com/GPX/1/1" lat=" 1.5" lon="-2.25"><ele>3</ele><time>2023-01-01T10:00:00Z</time><name>A</name><desc>B</desc></trkpt>"#,
        )
        .unwrap();
        let point = TrackPoint::from_element(&root).unwrap();
        assert_eq!(point.lat, 1.5);
        assert_eq!(point.lon, -2.25);
        assert_eq!(point.ele, Some(3.0));
        assert_eq!(point.time, Some(datetime!(2023-01-01 10:00:00)));
        assert_eq!(point.name.as_deref(), Some("A"));
        assert_eq!(point.description.as_deref(), Some("B"));
    }

    #[test]
    fn test_track_point_rejects_missing_or_bad_coordinates() {
        let parse = |xml: &str| {
            let root = parse_document(xml.as_bytes()).unwrap();
            TrackPoint::from_element(&root)
        };
        assert_eq!(
            parse(r#"<trkpt xmlns="http://www.topografix.com/GPX/1/1" lat="1"/>"#),
            Err(PointParseError::MissingAttribute("lon"))
        );
        assert_eq!(
            parse(r#"<trkpt xmlns="http://www.topografix.com/GPX/1/1" lat="north" lon="1"/>"#),
            Err(PointParseError::InvalidNumber {
                field: "lat",
                value: "north".to_string()
            })
        );
        assert!(parse(r#"<trkpt xmlns="http://www.topografix.com/GPX/1/1" lat="1" lon="1"/>"#).is_ok());
    }

    #[test]
    fn test_get_timestamps_are_localized() {
        let track = track_from(WALK, "Europe/Amsterdam");
        assert_eq!(
            track.get_timestamps().unwrap(),
            (datetime!(2023-01-01 11:00:00), datetime!(2023-01-01 11:20:00))
        );
    }

    #[test]
    fn test_get_timestamps_use_min_and_max() {
        let track = track_from(
            r#"<trk><trkseg>
              <trkpt lat="0" lon="0"><time>2023-01-01T10:05:00Z</time></trkpt>
              <trkpt lat="0" lon="0"/>
              <trkpt lat="0" lon="0"><time>2023-01-01T10:00:00Z</time></trkpt>
              <trkpt lat="0" lon="0"><time>2023-01-01T10:09:00Z</time></trkpt>
              <trkpt lat="0" lon="0"><time>2023-01-01T10:01:00Z</time></trkpt>
            </trkseg></trk>"#,
            "UTC",
        );
        assert_eq!(
            track.get_timestamps().unwrap(),
            (datetime!(2023-01-01 10:00:00), datetime!(2023-01-01 10:09:00))
        );
    }

    #[test]
    fn test_track_without_timestamps() {
        let track = track_from(
            r#"<trk><trkseg><trkpt lat="0" lon="0"/><trkpt lat="0" lon="1"/></trkseg></trk>"#,
            "UTC",
        );
        assert_eq!(track.get_timestamps(), Err(NoTimestampData));
        assert_eq!(track.get_name(), "Track 1");
        assert_eq!(track.interpolate(datetime!(2023-01-01 10:00:00)), None);

        let empty = track_from("<trk/>", "UTC");
        assert_eq!(empty.get_timestamps(), Err(NoTimestampData));
        assert_eq!(empty.get_distance(), 0.0);
    }

    #[test]
    fn test_get_name() {
        let unnamed = track_from(WALK, "UTC");
        assert_eq!(unnamed.get_name(), "2023-01-01 10:00:00");

        let named = track_from(
            r#"<trk><name> Sunday ride </name><trkseg/></trk>"#,
            "UTC",
        );
        assert_eq!(named.get_name(), "Sunday ride");
    }

    #[test]
    fn test_get_distance_one_degree_at_equator() {
        let track = track_from(
            r#"<trk><trkseg><trkpt lat="0" lon="0"/><trkpt lat="0" lon="1"/></trkseg></trk>"#,
            "UTC",
        );
        assert!((track.get_distance() - 111_195.0).abs() < 1.0);
    }

    #[test]
    fn test_get_distance_skips_unreadable_points() {
        let track = track_from(
            r#"<trk><trkseg><trkpt lat="0" lon="0"/><trkpt lat="x" lon="0.5"/></trkseg>
                <trkseg><trkpt lat="0" lon="1"/></trkseg></trk>"#,
            "UTC",
        );
        assert_eq!(track.raw_points().len(), 3);
        assert_eq!(track.get_points().count(), 2);
        assert!((track.get_distance() - 111_195.0).abs() < 1.0);
    }

    #[test]
    fn test_interpolate_midpoint_between_bracketing_points() {
        let track = track_from(WALK, "UTC");
        let p = track.interpolate(datetime!(2023-01-01 10:05:00)).unwrap();
        assert!((p.lat - 52.1).abs() < 1e-9);
        assert!((p.lon - 5.1).abs() < 1e-9);
        assert!((p.ele - 15.0).abs() < 1e-9);

        // Still the midpoint, not a time-weighted position
        let p = track.interpolate(datetime!(2023-01-01 10:19:00)).unwrap();
        assert!((p.lat - 52.3).abs() < 1e-9);
    }

    #[test]
    fn test_interpolate_exact_timestamp_returns_the_point() {
        let track = track_from(WALK, "UTC");
        for (time, lat) in [
            (datetime!(2023-01-01 10:00:00), 52.0),
            (datetime!(2023-01-01 10:10:00), 52.2),
            (datetime!(2023-01-01 10:20:00), 52.4),
        ] {
            let p = track.interpolate(time).unwrap();
            assert_eq!(p.lat, lat);
        }
    }

    #[test]
    fn test_interpolate_uses_local_time() {
        let track = track_from(WALK, "Europe/Amsterdam");
        assert!(!track.covers(datetime!(2023-01-01 10:05:00)));
        assert!(track.covers(datetime!(2023-01-01 11:05:00)));

        let p = track.interpolate(datetime!(2023-01-01 11:05:00)).unwrap();
        assert!((p.lat - 52.1).abs() < 1e-9);
        // The UTC reading falls before the first point
        let p = track.interpolate(datetime!(2023-01-01 10:05:00)).unwrap();
        assert_eq!(p.lat, 52.0);
    }

    #[test]
    fn test_interpolate_restarts_after_unusable_point() {
        let track = track_from(
            r#"<trk><trkseg>
              <trkpt lat="10" lon="10"><ele>0</ele><time>2023-01-01T10:00:00Z</time></trkpt>
              <trkpt lat="20" lon="20"><time>2023-01-01T10:01:00Z</time></trkpt>
              <trkpt lat="30" lon="30"><ele>0</ele><time>2023-01-01T10:02:00Z</time></trkpt>
            </trkseg></trk>"#,
            "UTC",
        );
        // The point without elevation clears the predecessor, so the next
        // point is averaged with itself
        let p = track.interpolate(datetime!(2023-01-01 10:01:30)).unwrap();
        assert_eq!(p.lat, 30.0);
    }

    #[test]
    fn test_interpolate_scans_points_in_time_order() {
        let track = track_from(
            r#"<trk><trkseg>
              <trkpt lat="5" lon="5"><ele>5</ele><time>2023-01-01T10:05:00Z</time></trkpt>
              <trkpt lat="0" lon="0"><ele>0</ele><time>2023-01-01T10:00:00Z</time></trkpt>
              <trkpt lat="10" lon="10"><ele>10</ele><time>2023-01-01T10:10:00Z</time></trkpt>
            </trkseg></trk>"#,
            "UTC",
        );
        let p = track.interpolate(datetime!(2023-01-01 10:07:00)).unwrap();
        assert_eq!((p.lat, p.lon, p.ele), (7.5, 7.5, 7.5));

        let p = track.interpolate(datetime!(2023-01-01 10:02:00)).unwrap();
        assert_eq!((p.lat, p.lon, p.ele), (2.5, 2.5, 2.5));
    }

    #[test]
    fn test_interpolate_sorts_within_runs_only() {
        let track = track_from(
            r#"<trk><trkseg>
              <trkpt lat="4" lon="4"><ele>4</ele><time>2023-01-01T10:04:00Z</time></trkpt>
              <trkpt lat="0" lon="0"><ele>0</ele><time>2023-01-01T10:00:00Z</time></trkpt>
              <trkpt lat="9" lon="9"><time>2023-01-01T10:05:00Z</time></trkpt>
              <trkpt lat="8" lon="8"><ele>8</ele><time>2023-01-01T10:08:00Z</time></trkpt>
              <trkpt lat="6" lon="6"><ele>6</ele><time>2023-01-01T10:06:00Z</time></trkpt>
            </trkseg></trk>"#,
            "UTC",
        );
        // Bracketed inside the first run
        let p = track.interpolate(datetime!(2023-01-01 10:01:00)).unwrap();
        assert_eq!(p.lat, 2.0);
        // Past the first run: the second run starts over at 10:06
        let p = track.interpolate(datetime!(2023-01-01 10:05:00)).unwrap();
        assert_eq!(p.lat, 6.0);
        let p = track.interpolate(datetime!(2023-01-01 10:07:00)).unwrap();
        assert_eq!(p.lat, 7.0);
    }
}
