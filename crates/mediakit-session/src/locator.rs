// Source locator normalisation: URIs pass through, filesystem paths become file:// URIs.

use std::path::{Path, PathBuf};

use tracing::warn;
use url::Url;

/// Turn a user supplied locator into something the graph accepts.
///
/// Anything that parses as a URI with a scheme longer than one character is
/// returned unchanged. Everything else is treated as a filesystem path.
pub fn normalize(locator: &str) -> String {
    if is_uri(locator) {
        return locator.to_string();
    }
    from_path(Path::new(locator))
}

/// Build a `file://` URI for a local path, resolving relative paths against
/// the current directory.
pub fn from_path(path: &Path) -> String {
    let absolute = absolutize(path);
    match Url::from_file_path(&absolute) {
        Ok(url) => url.to_string(),
        Err(()) => {
            warn!(path = %path.display(), "failed to convert path to a URI");
            format!("file://{}", absolute.display())
        }
    }
}

fn is_uri(locator: &str) -> bool {
    match Url::parse(locator) {
        // Single letter schemes are drive letters, not URIs.
        Ok(url) => url.scheme().len() > 1,
        Err(_) => false,
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_pass_through() {
        assert_eq!(normalize("https://example.com/a.mp3"), "https://example.com/a.mp3");
        assert_eq!(normalize("file:///tmp/a.ogg"), "file:///tmp/a.ogg");
        assert_eq!(normalize("null://tone"), "null://tone");
    }

    #[test]
    fn absolute_paths_become_file_uris() {
        assert_eq!(normalize("/tmp/a b.wav"), "file:///tmp/a%20b.wav");
    }

    #[test]
    fn relative_paths_are_resolved() {
        let uri = normalize("sounds/a.wav");
        assert!(uri.starts_with("file:///"));
        assert!(uri.ends_with("/sounds/a.wav"));
    }
}
