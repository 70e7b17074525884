//! Named places kept as `<wpt>` elements in a small GPX file of their own.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::document::skeleton;
use crate::error::{BookmarkError, XmlError};
use crate::gpxxml::{Element, GPX_NAMESPACE, parse_document, write_document};

const ID_PREFIX: &str = "bookmark";

#[derive(Debug, Clone, PartialEq)]
pub struct Bookmark {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Bookmark {
    pub fn new(name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Bookmark {
            name: name.into(),
            lat,
            lon,
        }
    }

    fn from_wpt(wpt: &Element) -> Option<Self> {
        let lat = wpt.attribute("lat")?.trim().parse().ok()?;
        let lon = wpt.attribute("lon")?.trim().parse().ok()?;
        let name = wpt.child_text("name").unwrap_or_default();
        Some(Bookmark { name, lat, lon })
    }

    fn to_wpt(&self) -> Element {
        let mut wpt = Element::new("wpt", Some(GPX_NAMESPACE));
        wpt.set_attribute("lat", &self.lat.to_string());
        wpt.set_attribute("lon", &self.lon.to_string());
        let mut name = Element::new("name", Some(GPX_NAMESPACE));
        name.push_text(&self.name);
        wpt.push_element(name);
        wpt
    }
}

/// The bookmark set backed by one file. Every change rewrites the file.
#[derive(Debug)]
pub struct Bookmarks {
    path: PathBuf,
    entries: BTreeMap<u64, Bookmark>,
    next_seq: u64,
}

fn format_id(seq: u64) -> String {
    format!("{ID_PREFIX}{seq}")
}

fn parse_id(id: &str) -> Option<u64> {
    id.strip_prefix(ID_PREFIX)?.parse().ok()
}

impl Bookmarks {
    /// Loads the bookmarks at `path`. A file that is missing, unreadable or
    /// not well-formed XML gives an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut bookmarks = Bookmarks {
            path,
            entries: BTreeMap::new(),
            next_seq: 1,
        };

        let input = match fs::read(&bookmarks.path) {
            Ok(input) => input,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %bookmarks.path.display(), "no bookmarks file yet");
                return bookmarks;
            }
            Err(e) => {
                warn!(path = %bookmarks.path.display(), "cannot read bookmarks: {e}");
                return bookmarks;
            }
        };
        let root = match parse_document(&input) {
            Ok(root) => root,
            Err(e) => {
                warn!(path = %bookmarks.path.display(), "ignoring unreadable bookmarks: {e}");
                return bookmarks;
            }
        };

        for wpt in root.children_named("wpt") {
            match Bookmark::from_wpt(wpt) {
                Some(bookmark) => {
                    bookmarks.insert(bookmark);
                }
                None => debug!("skipping waypoint without usable coordinates"),
            }
        }
        bookmarks
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Bookmark> {
        self.entries.get(&parse_id(id)?)
    }

    /// Bookmarks with their ids, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (String, &Bookmark)> {
        self.entries.iter().map(|(seq, b)| (format_id(*seq), b))
    }

    /// Bookmarks whose name contains `text`.
    pub fn find<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (String, &'a Bookmark)> {
        self.iter().filter(move |(_, b)| b.name.contains(text))
    }

    fn insert(&mut self, bookmark: Bookmark) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(seq, bookmark);
        seq
    }

    /// Adds a bookmark and saves the file, returning the new id. The bookmark
    /// is not kept when the file cannot be written.
    pub fn add(&mut self, bookmark: Bookmark) -> Result<String, BookmarkError> {
        let seq = self.insert(bookmark);
        if let Err(e) = self.save() {
            self.entries.remove(&seq);
            return Err(e);
        }
        Ok(format_id(seq))
    }

    /// Deletes a bookmark and saves the file. Returns whether `id` existed;
    /// the file is left alone when it did not, and the bookmark is restored
    /// when the file cannot be written.
    pub fn delete(&mut self, id: &str) -> Result<bool, BookmarkError> {
        let Some(seq) = parse_id(id) else {
            return Ok(false);
        };
        let Some(removed) = self.entries.remove(&seq) else {
            return Ok(false);
        };
        if let Err(e) = self.save() {
            self.entries.insert(seq, removed);
            return Err(e);
        }
        Ok(true)
    }

    pub fn to_element(&self) -> Element {
        let mut root = skeleton();
        for bookmark in self.entries.values() {
            root.push_element(bookmark.to_wpt());
        }
        root
    }

    pub fn save(&self) -> Result<(), BookmarkError> {
        let write_error = |source| BookmarkError::Write {
            path: self.path.clone(),
            source,
        };
        let file = File::create(&self.path).map_err(|e| write_error(XmlError::Io(e)))?;
        let mut output = BufWriter::new(file);
        write_document(&self.to_element(), &mut output).map_err(write_error)?;
        output.flush().map_err(|e| write_error(XmlError::Io(e)))?;
        debug!(path = %self.path.display(), count = self.entries.len(), "saved bookmarks");
        Ok(())
    }
}
