//! In-memory ZIP container: decode a byte buffer into an [`Archive`] and
//! encode an [`Archive`] back into a fresh ZIP.
//!
//! # Entry model
//! An archive is an ordered map of entry path → entry bytes.  Paths are kept
//! exactly as the upstream container spelled them; directory entries keep
//! their trailing `/` and carry no content.  The map is ordered by path so
//! that encoding the same entry set always yields the same bytes.
//!
//! # Determinism
//! Every entry is written with the DOS epoch timestamp and the same
//! compression settings.  Upstream timestamps, comments and extra fields
//! are not carried over.

use std::collections::btree_map::{self, BTreeMap};
use std::collections::HashSet;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::paths::is_dir_marker;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Archive is empty")]
    Empty,
    #[error("Malformed archive: {0}")]
    Malformed(#[source] ZipError),
    #[error("Failed to read entry '{path}': {reason}")]
    Entry { path: String, reason: String },
    #[error("Duplicate entry path: {0}")]
    DuplicateEntry(String),
    #[error("Failed to write archive: {0}")]
    Write(#[from] ZipError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── EncodeOptions ────────────────────────────────────────────────────────────

/// Compression method applied to every file entry on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    pub fn name(self) -> &'static str {
        match self {
            Compression::Stored   => "stored",
            Compression::Deflated => "deflated",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stored" | "none"   => Some(Compression::Stored),
            "deflated" | "deflate" => Some(Compression::Deflated),
            _                   => None,
        }
    }

    fn method(self) -> CompressionMethod {
        match self {
            Compression::Stored   => CompressionMethod::Stored,
            Compression::Deflated => CompressionMethod::Deflated,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    pub compression: Compression,
    /// Codec level; `None` uses the codec default.  Ignored for `Stored`.
    pub level:       Option<i64>,
}

impl EncodeOptions {
    fn file_options(&self) -> SimpleFileOptions {
        let level = match self.compression {
            Compression::Stored   => None,
            Compression::Deflated => self.level,
        };
        SimpleFileOptions::default()
            .compression_method(self.compression.method())
            .compression_level(level)
            .last_modified_time(DateTime::default())
    }
}

// ── Archive ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a raw ZIP buffer.  Fails on an empty buffer, an unreadable
    /// container, an unreadable entry, or a path that appears twice.
    ///
    /// The `zip` reader collapses repeated names into one entry, so
    /// duplicates are found by listing the central directory directly.
    pub fn decode(raw: &[u8]) -> Result<Self, ContainerError> {
        if raw.is_empty() {
            return Err(ContainerError::Empty);
        }
        if let Some(dup) = central_directory_names(raw).and_then(first_duplicate) {
            return Err(ContainerError::DuplicateEntry(dup));
        }
        let mut zip = ZipArchive::new(Cursor::new(raw)).map_err(ContainerError::Malformed)?;

        let mut entries = BTreeMap::new();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).map_err(ContainerError::Malformed)?;
            let path = file.name().to_owned();

            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data).map_err(|e| ContainerError::Entry {
                    path:   path.clone(),
                    reason: e.to_string(),
                })?;
            }

            match entries.entry(path) {
                btree_map::Entry::Occupied(o) => {
                    return Err(ContainerError::DuplicateEntry(o.key().clone()));
                }
                btree_map::Entry::Vacant(v) => {
                    v.insert(data);
                }
            }
        }

        Ok(Self { entries })
    }

    /// Encode into a fresh ZIP buffer.
    pub fn encode(&self, opts: &EncodeOptions) -> Result<Vec<u8>, ContainerError> {
        let options = opts.file_options();
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for (path, data) in &self.entries {
            if is_dir_marker(path) {
                zip.add_directory(path.as_str(), options)?;
            } else {
                zip.start_file(path.as_str(), options)?;
                zip.write_all(data)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }

    /// Insert an entry, returning the previous content stored at `path`.
    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) -> Option<Vec<u8>> {
        self.entries.insert(path.into(), data)
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Number of non-directory entries.
    pub fn file_count(&self) -> usize {
        self.paths().filter(|p| !is_dir_marker(p)).count()
    }

    /// Total uncompressed content size.
    pub fn content_size(&self) -> u64 {
        self.entries.values().map(|d| d.len() as u64).sum()
    }
}

// ── Central directory ────────────────────────────────────────────────────────

const EOCD_SIG:     [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const CDH_SIG:      [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
const EOCD_LEN:     usize = 22;
const MAX_COMMENT:  usize = u16::MAX as usize;

/// Locate the end-of-central-directory record: the last signature whose
/// comment fits inside the buffer.
fn find_eocd(raw: &[u8]) -> Option<usize> {
    let last  = raw.len().checked_sub(EOCD_LEN)?;
    let first = last.saturating_sub(MAX_COMMENT);
    (first..=last).rev().find(|&pos| {
        raw[pos..pos + 4] == EOCD_SIG
            && pos + EOCD_LEN + LittleEndian::read_u16(&raw[pos + 20..pos + 22]) as usize <= raw.len()
    })
}

/// Raw entry names in central-directory order.  `None` when the directory
/// cannot be walked without zip64 support; the caller then relies on the
/// `zip` reader alone.
fn central_directory_names(raw: &[u8]) -> Option<Vec<String>> {
    let eocd = find_eocd(raw)?;
    let mut r = Cursor::new(&raw[eocd + 10..]);
    let total   = r.read_u16::<LittleEndian>().ok()?;
    let cd_size = r.read_u32::<LittleEndian>().ok()?;
    if total == u16::MAX || cd_size == u32::MAX {
        return None;
    }
    // Measured back from the end record so that prepended data is tolerated.
    let start = eocd.checked_sub(cd_size as usize)?;
    let mut r = Cursor::new(&raw[start..eocd]);

    let mut names = Vec::with_capacity(total as usize);
    for _ in 0..total {
        let mut sig = [0u8; 4];
        r.read_exact(&mut sig).ok()?;
        if sig != CDH_SIG {
            return None;
        }
        r.seek(SeekFrom::Current(24)).ok()?;
        let name_len    = r.read_u16::<LittleEndian>().ok()? as usize;
        let extra_len   = r.read_u16::<LittleEndian>().ok()? as i64;
        let comment_len = r.read_u16::<LittleEndian>().ok()? as i64;
        r.seek(SeekFrom::Current(12)).ok()?;

        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name).ok()?;
        names.push(String::from_utf8_lossy(&name).into_owned());
        r.seek(SeekFrom::Current(extra_len + comment_len)).ok()?;
    }
    Some(names)
}

fn first_duplicate(names: Vec<String>) -> Option<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names.into_iter().find(|n| !seen.insert(n.clone()))
}

impl FromIterator<(String, Vec<u8>)> for Archive {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl IntoIterator for Archive {
    type Item     = (String, Vec<u8>);
    type IntoIter = btree_map::IntoIter<String, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Archive {
        [
            ("plugin/".to_string(),           Vec::new()),
            ("plugin/main.py".to_string(),    b"print('hi')".to_vec()),
            ("plugin/assets/".to_string(),    Vec::new()),
            ("plugin/assets/icon.png".to_string(), vec![0x89, b'P', b'N', b'G']),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn encode_then_decode_keeps_entries() {
        let ar = sample();
        let bytes = ar.encode(&EncodeOptions::default()).unwrap();
        let back = Archive::decode(&bytes).unwrap();
        assert_eq!(back, ar);
        assert_eq!(back.file_count(), 2);
        assert_eq!(back.get("plugin/assets/"), Some(&[][..]));
    }

    #[test]
    fn encode_is_deterministic() {
        let ar = sample();
        let a = ar.encode(&EncodeOptions::default()).unwrap();
        let b = ar.encode(&EncodeOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    /// Overwrite every occurrence of `from` with `to` (same length).
    fn rename_all(raw: &mut [u8], from: &[u8], to: &[u8]) {
        let mut i = 0;
        while i + from.len() <= raw.len() {
            if &raw[i..i + from.len()] == from {
                raw[i..i + from.len()].copy_from_slice(to);
                i += from.len();
            } else {
                i += 1;
            }
        }
    }

    #[test]
    fn repeated_entry_name_is_rejected() {
        let ar: Archive = [
            ("pkg/a".to_string(), b"1".to_vec()),
            ("pkg/b".to_string(), b"2".to_vec()),
        ]
        .into_iter()
        .collect();
        let opts = EncodeOptions { compression: Compression::Stored, level: None };
        let mut raw = ar.encode(&opts).unwrap();
        rename_all(&mut raw, b"pkg/b", b"pkg/a");

        match Archive::decode(&raw) {
            Err(ContainerError::DuplicateEntry(path)) => assert_eq!(path, "pkg/a"),
            other => panic!("expected DuplicateEntry, got {other:?}"),
        }
    }

    #[test]
    fn central_directory_lists_every_name() {
        let raw = sample().encode(&EncodeOptions::default()).unwrap();
        let names = central_directory_names(&raw).unwrap();
        assert_eq!(names, sample().paths().collect::<Vec<_>>());
        assert!(first_duplicate(names).is_none());
    }

    #[test]
    fn leading_bytes_do_not_hide_the_directory() {
        let mut raw = b"#!/bin/sh\nexit 0\n".to_vec();
        raw.extend(sample().encode(&EncodeOptions::default()).unwrap());
        assert_eq!(central_directory_names(&raw).map(|n| n.len()), Some(4));
    }

    #[test]
    fn stored_output_contains_raw_content() {
        let ar: Archive = [("a.txt".to_string(), b"plain content here".to_vec())]
            .into_iter()
            .collect();
        let opts = EncodeOptions { compression: Compression::Stored, level: None };
        let bytes = ar.encode(&opts).unwrap();
        assert!(bytes.windows(18).any(|w| w == b"plain content here"));
    }

    #[test]
    fn empty_buffer_is_rejected() {
        assert!(matches!(Archive::decode(&[]), Err(ContainerError::Empty)));
    }

    #[test]
    fn garbage_is_malformed() {
        let err = Archive::decode(b"definitely not a zip file").unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(_)));
    }

    #[test]
    fn empty_archive_roundtrips() {
        let bytes = Archive::new().encode(&EncodeOptions::default()).unwrap();
        let back = Archive::decode(&bytes).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn compression_names() {
        assert_eq!(Compression::from_name("STORED"), Some(Compression::Stored));
        assert_eq!(Compression::from_name("deflate"), Some(Compression::Deflated));
        assert_eq!(Compression::from_name("brotli"), None);
        assert_eq!(Compression::Deflated.name(), "deflated");
    }
}
