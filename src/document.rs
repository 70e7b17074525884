use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use time::PrimitiveDateTime;
use tracing::{info, warn};

use crate::config::{CREATOR, Settings};
use crate::error::DocumentError;
use crate::gpxxml::{Element, GPX_NAMESPACE, parse_document, write_document};
use crate::schema::Schema;
use crate::store::{ImportOutcome, TrackStore};
use crate::timezone::TimeNormalizer;
use crate::track::{Position, Track, TrackId};

/// The minimal valid GPX document: a `<gpx>` root without children.
pub fn skeleton() -> Element {
    let mut root = Element::new("gpx", Some(GPX_NAMESPACE));
    root.set_attribute("xmlns", GPX_NAMESPACE);
    root.set_attribute("version", "1.1");
    root.set_attribute("creator", CREATOR);
    root
}

/// Copies `trk` out of its source document, bringing along the prefixed
/// namespace declarations of the source root so extension content stays bound.
fn detach_track(source_root: &Element, trk: &Element) -> Element {
    let mut copy = trk.clone();
    for (key, uri) in source_root.namespace_declarations() {
        if key != "xmlns" && copy.attribute(key).is_none() {
            copy.set_attribute(key, uri);
        }
    }
    copy
}

/// An open GPX document: the skeleton root plus the tracks imported into it.
///
/// The document's `<trk>` children are exactly the tracks in the store, so
/// removing a track from the store removes it from what [`save_gpx`] writes.
///
/// [`save_gpx`]: GpxDocument::save_gpx
#[derive(Debug)]
pub struct GpxDocument {
    root: Element,
    schema: Schema,
    store: TrackStore,
    timezone: Option<String>,
}

impl GpxDocument {
    /// Loads the schema from the data directory and opens an empty document.
    pub fn new(settings: &Settings) -> Result<Self, DocumentError> {
        let schema = Schema::from_file(&settings.schema_path())?;
        Ok(Self::with_schema(schema, settings.capacity))
    }

    pub fn with_schema(schema: Schema, capacity: usize) -> Self {
        GpxDocument {
            root: skeleton(),
            schema,
            store: TrackStore::new(capacity),
            timezone: None,
        }
    }

    /// Zone used by the most recent import.
    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    /// Reads and validates a GPX file, returning detached copies of its tracks.
    pub fn parse(&self, path: &Path) -> Result<Vec<Element>, DocumentError> {
        let input = fs::read(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_bytes(&input)
    }

    pub fn parse_bytes(&self, input: &[u8]) -> Result<Vec<Element>, DocumentError> {
        let root = parse_document(input)?;
        self.schema.validate(&root)?;
        Ok(root
            .children_named("trk")
            .map(|trk| detach_track(&root, trk))
            .collect())
    }

    /// Imports every track of the file at `path`, interpreting its timestamps
    /// for `timezone`. Nothing is registered when the file is rejected.
    pub fn import_gpx(
        &mut self,
        path: &Path,
        timezone: &str,
    ) -> Result<ImportOutcome, DocumentError> {
        let normalizer = Arc::new(TimeNormalizer::new(timezone)?);
        let definitions = self.parse(path).inspect_err(|e| {
            warn!(path = %path.display(), "rejected GPX file: {e}");
        })?;
        let outcome = self.register(definitions, normalizer, timezone);
        info!(
            path = %path.display(),
            tracks = outcome.ids.len(),
            "imported GPX file"
        );
        Ok(outcome)
    }

    pub fn import_bytes(
        &mut self,
        input: &[u8],
        timezone: &str,
    ) -> Result<ImportOutcome, DocumentError> {
        let normalizer = Arc::new(TimeNormalizer::new(timezone)?);
        let definitions = self.parse_bytes(input)?;
        Ok(self.register(definitions, normalizer, timezone))
    }

    fn register(
        &mut self,
        definitions: Vec<Element>,
        normalizer: Arc<TimeNormalizer>,
        timezone: &str,
    ) -> ImportOutcome {
        self.timezone = Some(timezone.to_string());
        self.store.import_tracks(definitions, normalizer)
    }

    pub fn get_tracks(&self, ids: &[TrackId]) -> BTreeMap<TrackId, &Track> {
        self.store.get_tracks(ids)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.store.tracks()
    }

    /// Returns whether a track was removed.
    pub fn remove_track(&mut self, id: TrackId) -> bool {
        self.store.remove_track(id).is_some()
    }

    pub fn find_coordinates(&self, at: PrimitiveDateTime) -> Option<Position> {
        self.store.find_coordinates(at)
    }

    /// The document tree as it would be saved.
    pub fn to_element(&self) -> Element {
        let mut root = self.root.clone();
        for track in self.store.tracks() {
            root.push_element(track.element().clone());
        }
        root
    }

    pub fn write_to<W: Write>(&self, output: W) -> Result<(), DocumentError> {
        write_document(&self.to_element(), output)?;
        Ok(())
    }

    /// Writes the document to `path` as UTF-8 with an XML declaration.
    pub fn save_gpx(&self, path: &Path) -> Result<(), DocumentError> {
        let io_error = |source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut output = BufWriter::new(file);
        self.write_to(&mut output)?;
        output.flush().map_err(io_error)?;
        info!(path = %path.display(), tracks = self.store.len(), "saved GPX file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ImportStatus;

    fn document(capacity: usize) -> GpxDocument {
        let schema = Schema::parse(include_bytes!("../data/gpx.xsd")).unwrap();
        GpxDocument::with_schema(schema, capacity)
    }

    const TWO_TRACKS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="test"
     xmlns:gpxtpx="http://www.garmin.com/xmlschemas/TrackPointExtension/v1">
  <trk>
    <name>First</name>
    <trkseg>
      <trkpt lat="1.0" lon="1.0">
        <ele>1</ele>
        <time>2023-01-01T10:00:00Z</time>
        <extensions><gpxtpx:TrackPointExtension><gpxtpx:hr>120</gpxtpx:hr></gpxtpx:TrackPointExtension></extensions>
      </trkpt>
      <trkpt lat="2.0" lon="2.0"><ele>2</ele><time>2023-01-01T10:10:00Z</time></trkpt>
    </trkseg>
  </trk>
  <trk>
    <name>Second</name>
    <trkseg>
      <trkpt lat="3.0" lon="3.0"><ele>3</ele><time>2023-01-01T11:00:00Z</time></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    #[test]
    fn test_skeleton_is_valid() {
        let doc = document(40);
        let root = doc.to_element();
        assert_eq!(root.attribute("version"), Some("1.1"));
        assert_eq!(root.attribute("creator"), Some(CREATOR));
        assert!(doc.schema.validate(&root).is_ok());
    }

    #[test]
    fn test_import_bytes_registers_tracks() {
        let mut doc = document(40);
        let outcome = doc.import_bytes(TWO_TRACKS.as_bytes(), "UTC").unwrap();
        assert_eq!(outcome.ids.len(), 2);
        assert_eq!(outcome.status, ImportStatus::Complete);
        assert_eq!(doc.timezone(), Some("UTC"));

        let names: Vec<_> = doc.tracks().map(Track::get_name).collect();
        assert_eq!(names, ["First", "Second"]);
    }

    #[test]
    fn test_invalid_file_registers_nothing() {
        let mut doc = document(40);
        let bad = TWO_TRACKS.replace(r#"lat="3.0""#, r#"lat="300.0""#);
        let err = doc.import_bytes(bad.as_bytes(), "UTC").unwrap_err();
        assert!(matches!(err, DocumentError::Validation(_)));
        assert!(err.to_string().contains("trkpt[1]"), "{err}");
        assert!(doc.store().is_empty());
    }

    #[test]
    fn test_unknown_timezone_registers_nothing() {
        let mut doc = document(40);
        let err = doc.import_bytes(TWO_TRACKS.as_bytes(), "Nowhere/Land").unwrap_err();
        assert!(matches!(err, DocumentError::Timezone(_)));
        assert!(doc.store().is_empty());
    }

    #[test]
    fn test_detached_tracks_keep_namespace_bindings() {
        let doc = document(40);
        let tracks = doc.parse_bytes(TWO_TRACKS.as_bytes()).unwrap();
        assert_eq!(
            tracks[0].attribute("xmlns:gpxtpx"),
            Some("http://www.garmin.com/xmlschemas/TrackPointExtension/v1")
        );
        assert_eq!(tracks[0].attribute("xmlns"), None);
    }

    #[test]
    fn test_removed_tracks_are_not_written() {
        let mut doc = document(40);
        let outcome = doc.import_bytes(TWO_TRACKS.as_bytes(), "UTC").unwrap();
        assert!(doc.remove_track(outcome.ids[0]));
        assert!(!doc.remove_track(outcome.ids[0]));

        let mut output = Vec::new();
        doc.write_to(&mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert!(!text.contains("First"));
        assert!(!text.contains(r#"lat="1.0""#));
        assert!(text.contains("Second"));
    }

    #[test]
    fn test_written_document_reimports() {
        let mut doc = document(40);
        doc.import_bytes(TWO_TRACKS.as_bytes(), "UTC").unwrap();

        let mut output = Vec::new();
        doc.write_to(&mut output).unwrap();

        let mut copy = document(40);
        let outcome = copy.import_bytes(&output, "UTC").unwrap();
        assert_eq!(outcome.ids.len(), 2);

        let original: Vec<_> = doc.tracks().flat_map(|t| t.get_points().cloned()).collect();
        let reread: Vec<_> = copy.tracks().flat_map(|t| t.get_points().cloned()).collect();
        assert_eq!(original, reread);
    }

    #[test]
    fn test_find_coordinates_delegates_to_store() {
        let mut doc = document(40);
        doc.import_bytes(TWO_TRACKS.as_bytes(), "Europe/Amsterdam").unwrap();

        let p = doc
            .find_coordinates(time::macros::datetime!(2023-01-01 11:05:00))
            .unwrap();
        assert_eq!((p.lat, p.lon, p.ele), (1.5, 1.5, 1.5));
        assert_eq!(
            doc.find_coordinates(time::macros::datetime!(2023-01-01 10:05:00)),
            None
        );
    }
}
