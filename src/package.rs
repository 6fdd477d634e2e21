//! Normalization pipeline, the primary embedding surface.
//!
//! ```no_run
//! use repackr::package::{normalize, NormalizeOptions, PackageFormat};
//!
//! let raw = std::fs::read("MaxPane-master.zip")?;
//! let out = normalize(&raw, "MaxPane", &NormalizeOptions::default())?;
//! assert_eq!(out.format, PackageFormat::HostPackage);
//! std::fs::write(&out.file_name, &out.bytes)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Steps
//! 1. Decode the raw buffer (fatal on failure).
//! 2. Strip the wrapping root folder if the layout has exactly one.
//! 3. Look for the root marker in the *final* entry set.
//! 4. Re-encode, or reuse the input verbatim when nothing was stripped and
//!    [`NormalizeOptions::passthrough_unchanged`] is set.
//! 5. Pick the output extension from the marker.
//!
//! The whole transform is in memory and has no side effects; identical input
//! bytes and options always produce identical output bytes.

use std::borrow::Cow;

use log::{error, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::container::{Archive, Compression, ContainerError, EncodeOptions};
use crate::flatten::flatten;
use crate::marker::{has_root_marker, ROOT_MARKER};

/// Extension the host installs as a native package.
pub const HOST_EXTENSION:    &str = "sublime-package";
/// Extension used when the root marker is present.
pub const GENERIC_EXTENSION: &str = "zip";

// ── PackageFormat ────────────────────────────────────────────────────────────

/// Which container suffix the output is served under.  The bytes are a ZIP
/// either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageFormat {
    HostPackage,
    GenericZip,
}

impl PackageFormat {
    #[inline]
    pub fn for_marker(marker_present: bool) -> Self {
        if marker_present { PackageFormat::GenericZip } else { PackageFormat::HostPackage }
    }

    /// Built-in extension, without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            PackageFormat::HostPackage => HOST_EXTENSION,
            PackageFormat::GenericZip  => GENERIC_EXTENSION,
        }
    }

    /// Human-readable name (diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            PackageFormat::HostPackage => "host-package",
            PackageFormat::GenericZip  => "generic-zip",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "host-package" | "sublime-package" => Some(PackageFormat::HostPackage),
            "generic-zip" | "zip"              => Some(PackageFormat::GenericZip),
            _                                  => None,
        }
    }
}

// ── NormalizeOptions ─────────────────────────────────────────────────────────

/// Configuration for [`normalize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Root marker file name.
    pub marker:                String,
    pub host_extension:        String,
    pub generic_extension:     String,
    pub compression:           Compression,
    /// Deflate level; `None` uses the codec default.
    pub level:                 Option<i64>,
    /// Serve the input bytes verbatim when no root folder was stripped,
    /// instead of re-encoding them.
    pub passthrough_unchanged: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            marker:                ROOT_MARKER.to_owned(),
            host_extension:        HOST_EXTENSION.to_owned(),
            generic_extension:     GENERIC_EXTENSION.to_owned(),
            compression:           Compression::default(),
            level:                 None,
            passthrough_unchanged: false,
        }
    }
}

impl NormalizeOptions {
    pub fn extension(&self, format: PackageFormat) -> &str {
        match format {
            PackageFormat::HostPackage => &self.host_extension,
            PackageFormat::GenericZip  => &self.generic_extension,
        }
    }

    /// `<base>.<ext>` for the given format.
    pub fn file_name(&self, base_name: &str, format: PackageFormat) -> String {
        format!("{base_name}.{}", self.extension(format))
    }

    pub fn encode_options(&self) -> EncodeOptions {
        EncodeOptions { compression: self.compression, level: self.level }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum NormalizeError {
    /// The input is empty or not a readable ZIP container.
    #[error("Failed to decode archive: {0}")]
    Decode(#[source] ContainerError),
    /// Re-encoding a successfully decoded entry set failed.  Never expected;
    /// indicates a defect rather than bad input.
    #[error("Failed to re-encode archive: {0}")]
    Encode(#[source] ContainerError),
}

// ── Normalized ───────────────────────────────────────────────────────────────

/// Output of one [`normalize`] call.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub bytes:       Vec<u8>,
    pub file_name:   String,
    pub format:      PackageFormat,
    /// The stripped root component, if flattening applied.
    pub root:        Option<String>,
    pub entry_count: usize,
    /// True when `bytes` is the input buffer reused verbatim.
    pub passthrough: bool,
}

impl Normalized {
    pub fn flattened(&self) -> bool { self.root.is_some() }

    /// True when served under the host-specific package extension.
    pub fn host_package(&self) -> bool { self.format == PackageFormat::HostPackage }

    /// BLAKE3 of the output bytes, hex encoded (diagnostics only).
    pub fn content_hash(&self) -> String {
        hex::encode(blake3::hash(&self.bytes).as_bytes())
    }
}

/// Run the full pipeline over `raw` and name the result `<base_name>.<ext>`.
pub fn normalize(
    raw:       &[u8],
    base_name: &str,
    opts:      &NormalizeOptions,
) -> Result<Normalized, NormalizeError> {
    let archive = Archive::decode(raw).map_err(NormalizeError::Decode)?;

    let (root, layout) = match flatten(&archive) {
        Some(f) => (Some(f.root), Cow::Owned(f.archive)),
        None    => (None, Cow::Borrowed(&archive)),
    };

    let marker = has_root_marker(layout.paths(), &opts.marker);
    let format = PackageFormat::for_marker(marker);

    let passthrough = root.is_none() && opts.passthrough_unchanged;
    let bytes = if passthrough {
        raw.to_vec()
    } else {
        layout.encode(&opts.encode_options()).map_err(|e| {
            error!("Re-encoding {} decoded entries failed: {e}", layout.len());
            NormalizeError::Encode(e)
        })?
    };

    let file_name = opts.file_name(base_name, format);
    info!(
        "Normalized {} B → {} ({} entries, root={}, format={}, {} B)",
        raw.len(),
        file_name,
        layout.len(),
        root.as_deref().unwrap_or("-"),
        format.name(),
        bytes.len(),
    );

    Ok(Normalized {
        bytes,
        file_name,
        format,
        root,
        entry_count: layout.len(),
        passthrough,
    })
}

// ── Layout report ────────────────────────────────────────────────────────────

/// Read-only analysis of an archive's layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub entries:        Vec<String>,
    pub file_count:     usize,
    pub content_size:   u64,
    /// Root component that [`normalize`] would strip.
    pub root:           Option<String>,
    pub marker_at_root: bool,
    /// Marker presence after flattening; this decides the output format.
    pub marker_final:   bool,
    pub format:         PackageFormat,
}

/// Analyse `raw` without producing output.
pub fn inspect(raw: &[u8], marker: &str) -> Result<Layout, NormalizeError> {
    let archive = Archive::decode(raw).map_err(NormalizeError::Decode)?;
    let marker_at_root = has_root_marker(archive.paths(), marker);
    let flattened = flatten(&archive);
    let marker_final = match &flattened {
        Some(f) => has_root_marker(f.archive.paths(), marker),
        None    => marker_at_root,
    };
    let root = flattened.map(|f| f.root);

    Ok(Layout {
        entries: archive.paths().map(str::to_owned).collect(),
        file_count: archive.file_count(),
        content_size: archive.content_size(),
        root,
        marker_at_root,
        marker_final,
        format: PackageFormat::for_marker(marker_final),
    })
}
