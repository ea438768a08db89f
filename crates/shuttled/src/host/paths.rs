//! Path handling for capability requests, which carry either plain paths or
//! `file://` URIs.

use std::path::{Path, PathBuf};

use url::Url;

/// Maps a request path to a local filesystem path.
///
/// `file://` URIs are decoded; anything else, including unparsable URIs, is
/// taken literally.
#[must_use]
pub fn resolve(path: &str) -> PathBuf {
    if path.starts_with("file:") {
        if let Some(local) = Url::parse(path)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
        {
            return local;
        }
    }
    PathBuf::from(path)
}

/// Renders `path` as a `file://` URI, falling back to its display form for
/// relative paths.
#[must_use]
pub fn to_uri(path: &Path) -> String {
    Url::from_file_path(path).map_or_else(|()| path.display().to_string(), String::from)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[cfg(unix)]
    #[rstest]
    #[case::plain("/w/src/main.rs", "/w/src/main.rs")]
    #[case::uri("file:///w/src/main.rs", "/w/src/main.rs")]
    #[case::escaped("file:///w/my%20file.rs", "/w/my file.rs")]
    #[case::relative("src/lib.rs", "src/lib.rs")]
    fn request_paths_resolve_locally(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(resolve(input), PathBuf::from(expected));
    }

    #[cfg(unix)]
    #[rstest]
    fn absolute_paths_render_as_file_uris() {
        assert_eq!(to_uri(Path::new("/w/a b.rs")), "file:///w/a%20b.rs");
    }

    #[rstest]
    fn non_file_schemes_are_left_alone() {
        assert_eq!(
            resolve("https://example.com/a.rs"),
            PathBuf::from("https://example.com/a.rs")
        );
    }
}
