//! Entry path cleaning and segment decomposition.
//!
//! Entry paths are forward-slash delimited.  A path is *cleaned* by dropping
//! one leading `./` and then every leading and trailing `/`; the cleaned form
//! is what layout analysis compares.  The raw form is kept for everything
//! else, since a trailing `/` is the only thing that marks a directory entry.

/// Strip one leading `./`, then all leading and trailing `/`.
pub fn clean_path(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_matches('/')
}

/// Non-empty segments of the cleaned path, in order.
pub fn segments(path: &str) -> Vec<&str> {
    clean_path(path).split('/').filter(|s| !s.is_empty()).collect()
}

/// Directory entries are spelled with a trailing `/`.
#[inline]
pub fn is_dir_marker(path: &str) -> bool {
    path.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_strips_dot_slash_once() {
        assert_eq!(clean_path("./a/b"), "a/b");
        assert_eq!(clean_path("././a"), "./a");
    }

    #[test]
    fn clean_strips_surrounding_slashes() {
        assert_eq!(clean_path("/plugin/"), "plugin");
        assert_eq!(clean_path("plugin//"), "plugin");
        assert_eq!(clean_path("./"), "");
        assert_eq!(clean_path("/"), "");
    }

    #[test]
    fn segments_skip_empty_parts() {
        assert_eq!(segments("plugin//assets/icon.png"), vec!["plugin", "assets", "icon.png"]);
        assert_eq!(segments("./plugin/"), vec!["plugin"]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn dir_markers() {
        assert!(is_dir_marker("plugin/"));
        assert!(!is_dir_marker("plugin"));
    }
}
