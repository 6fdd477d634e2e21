//! Single-root detection and removal.
//!
//! Source-hosting "download zip" endpoints wrap the payload in one synthetic
//! folder (`<repo>-<ref>/`).  An archive is *flattenable* when:
//!
//! 1. every non-empty cleaned path shares the same top-level component,
//! 2. no real file sits directly at the root, and
//! 3. at least one entry lives below that component.
//!
//! A bare root directory entry (`plugin/`) neither confirms nor disqualifies.
//! The top-level comparison runs before the root-file check, so an archive
//! of directory markers under two different roots is rejected as multi-root.

use log::{debug, warn};

use crate::container::Archive;
use crate::paths::{clean_path, is_dir_marker, segments};

/// Result of removing the wrapping folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattened {
    /// The top-level component that was stripped.
    pub root:    String,
    pub archive: Archive,
}

/// The single wrapping root component, or `None` when the layout must be
/// left alone.
pub fn flatten_root<'a, I>(paths: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut root: Option<&'a str> = None;
    let mut nested = false;

    for raw in paths {
        let segs = segments(raw);
        let Some(&first) = segs.first() else { continue };

        match root {
            None                  => root = Some(first),
            Some(r) if r != first => return None,
            Some(_)               => {}
        }

        if segs.len() == 1 && !is_dir_marker(raw) {
            return None;
        }
        if segs.len() > 1 {
            nested = true;
        }
    }

    if nested { root } else { None }
}

/// Whether the archive is wrapped in exactly one root folder.
pub fn should_flatten<'a, I>(paths: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    flatten_root(paths).is_some()
}

/// Build a new archive with the wrapping folder removed.
///
/// Returns `None` when [`should_flatten`] is false.  Directory entries keep
/// their trailing `/`; the root directory entry itself is dropped.  When two
/// spellings collapse onto one path (`./pkg/a` and `pkg/a`) the first one in
/// path order is kept.
pub fn flatten(archive: &Archive) -> Option<Flattened> {
    let root = flatten_root(archive.paths())?;
    let mut out = Archive::new();

    for (raw, data) in archive.iter() {
        let Some(rest) = clean_path(raw).strip_prefix(root) else { continue };
        let Some(inner) = rest.strip_prefix('/') else { continue };
        let inner = inner.trim_start_matches('/');
        if inner.is_empty() {
            continue;
        }

        let path = if is_dir_marker(raw) { format!("{inner}/") } else { inner.to_owned() };
        if out.contains(&path) {
            warn!("Entry '{raw}' collides with '{path}' after flattening; keeping the first");
            continue;
        }
        out.insert(path, data.to_vec());
    }

    debug!("Stripped root '{root}': {} → {} entries", archive.len(), out.len());
    Some(Flattened { root: root.to_owned(), archive: out })
}
