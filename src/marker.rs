//! Root marker detection.
//!
//! A plugin that must be installed unpacked ships an empty
//! `.no-sublime-package` file next to its top-level sources.  When that file
//! sits at the logical root of the final layout, the output is served as a
//! plain `.zip` instead of a host package.  The marker is never removed.

/// File name the host recognises as "do not treat as a native package".
pub const ROOT_MARKER: &str = ".no-sublime-package";

/// True if `marker` sits at the root of `paths`.  One leading `./` is
/// ignored; a marker inside any subdirectory does not count.
pub fn has_root_marker<'a, I>(paths: I, marker: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    paths
        .into_iter()
        .any(|p| p.strip_prefix("./").unwrap_or(p) == marker)
}
