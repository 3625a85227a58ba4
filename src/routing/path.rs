//! Mapping request paths onto files of a published directory.
//!
//! Resolution happens in two steps. [`RequestPath::parse`] is purely lexical:
//! it percent-decodes the path and rejects anything that could climb out of
//! the directory. [`resolve`] then touches the filesystem and re-checks
//! containment after symlinks are resolved.

use std::path::{Path, PathBuf};

use thiserror::Error;

const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is not valid UTF-8 after decoding")]
    Encoding,

    #[error("path segment is not allowed")]
    ForbiddenSegment,
}

/// A lexically safe request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPath {
    segments: Vec<String>,
    /// The request ended in `/` and should serve the directory index.
    directory: bool,
}

impl RequestPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let decoded = percent_decode(raw)?;
        let directory = decoded.is_empty() || decoded.ends_with('/');

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::ForbiddenSegment),
                s if s.contains(['\\', '\0']) => return Err(PathError::ForbiddenSegment),
                s => segments.push(s.to_string()),
            }
        }

        Ok(RequestPath {
            segments,
            directory,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    /// The file this path names under `root`, before any filesystem checks.
    pub fn target(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(&self.segments);
        if self.directory {
            path.push(INDEX_FILE);
        }
        path
    }
}

/// Outcome of resolving a request against a published directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A regular file inside the directory (canonical path).
    File(PathBuf),
    /// The path names a directory with an index but lacks the trailing `/`.
    AddTrailingSlash,
    NotFound,
}

/// Resolves `request` to a file under `root`.
///
/// The canonical target must stay inside the canonical root, so symlinks
/// pointing elsewhere resolve to [`Resolved::NotFound`].
pub async fn resolve(root: &Path, request: &RequestPath) -> Resolved {
    let Ok(root) = tokio::fs::canonicalize(root).await else {
        return Resolved::NotFound;
    };

    let target = request.target(&root);
    match contained_metadata(&root, &target).await {
        Some((path, meta)) if meta.is_file() => Resolved::File(path),
        Some((_, meta)) if meta.is_dir() && !request.is_directory() => {
            let index = target.join(INDEX_FILE);
            match contained_metadata(&root, &index).await {
                Some((_, meta)) if meta.is_file() => Resolved::AddTrailingSlash,
                _ => Resolved::NotFound,
            }
        }
        _ => Resolved::NotFound,
    }
}

async fn contained_metadata(
    root: &Path,
    target: &Path,
) -> Option<(PathBuf, std::fs::Metadata)> {
    let canonical = tokio::fs::canonicalize(target).await.ok()?;
    if !canonical.starts_with(root) {
        return None;
    }
    let meta = tokio::fs::metadata(&canonical).await.ok()?;
    Some((canonical, meta))
}

/// Decodes `%XX` escapes. A `%` not followed by two hex digits is literal.
fn percent_decode(raw: &str) -> Result<String, PathError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PathError::Encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn segments(raw: &str) -> Vec<String> {
        RequestPath::parse(raw).unwrap().segments().to_vec()
    }

    #[test]
    fn decoding() {
        assert_eq!(percent_decode("/a%20b").unwrap(), "/a b");
        assert_eq!(percent_decode("/caf%C3%A9").unwrap(), "/café");
        assert_eq!(percent_decode("/100%").unwrap(), "/100%");
        assert_eq!(percent_decode("/%zz").unwrap(), "/%zz");
        assert_eq!(percent_decode("/%ff"), Err(PathError::Encoding));
    }

    #[test]
    fn lexical_rules() {
        assert_eq!(segments("/docs/./intro//setup"), vec!["docs", "intro", "setup"]);
        assert!(RequestPath::parse("/").unwrap().is_directory());
        assert!(RequestPath::parse("").unwrap().is_directory());
        assert!(RequestPath::parse("/docs/").unwrap().is_directory());
        assert!(!RequestPath::parse("/docs").unwrap().is_directory());

        for raw in [
            "/../etc/passwd",
            "/docs/../../x",
            "/%2e%2e/secret",
            "/a%2F..%2Fb",
            "/a\\b",
            "/a%5Cb",
            "/a%00b",
        ] {
            assert_eq!(
                RequestPath::parse(raw),
                Err(PathError::ForbiddenSegment),
                "{raw}"
            );
        }
    }

    #[test]
    fn target_appends_index_for_directories() {
        let root = Path::new("/srv/html/main");
        assert_eq!(
            RequestPath::parse("/").unwrap().target(root),
            root.join("index.html")
        );
        assert_eq!(
            RequestPath::parse("/guide/").unwrap().target(root),
            root.join("guide/index.html")
        );
        assert_eq!(
            RequestPath::parse("/app.js").unwrap().target(root),
            root.join("app.js")
        );
    }

    #[tokio::test]
    async fn resolves_files_and_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("guide")).unwrap();
        std::fs::write(root.join("index.html"), "home").unwrap();
        std::fs::write(root.join("guide/index.html"), "guide").unwrap();
        std::fs::create_dir(root.join("empty")).unwrap();
        let root_canon = root.canonicalize().unwrap();

        let check = move |raw: &'static str| async move {
            resolve(root, &RequestPath::parse(raw).unwrap()).await
        };

        assert_eq!(check("/").await, Resolved::File(root_canon.join("index.html")));
        assert_eq!(
            check("/guide/").await,
            Resolved::File(root_canon.join("guide/index.html"))
        );
        assert_eq!(check("/guide").await, Resolved::AddTrailingSlash);
        assert_eq!(check("/empty").await, Resolved::NotFound);
        assert_eq!(check("/empty/").await, Resolved::NotFound);
        assert_eq!(check("/missing.html").await, Resolved::NotFound);
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let dir = tempdir().unwrap();
        let request = RequestPath::parse("/").unwrap();
        assert_eq!(
            resolve(&dir.path().join("absent"), &request).await,
            Resolved::NotFound
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_not_found() {
        let outside = tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("leak.txt"))
            .unwrap();
        std::fs::write(dir.path().join("ok.txt"), "ok").unwrap();
        std::os::unix::fs::symlink(dir.path().join("ok.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let leak = RequestPath::parse("/leak.txt").unwrap();
        assert_eq!(resolve(dir.path(), &leak).await, Resolved::NotFound);

        let alias = RequestPath::parse("/alias.txt").unwrap();
        assert!(matches!(resolve(dir.path(), &alias).await, Resolved::File(_)));
    }

    proptest! {
        #[test]
        fn parsed_segments_never_escape(raw in "(/(\\.\\.|\\.|%2[eEfF]|[a-z%\\\\]{0,3})){0,8}/?") {
            if let Ok(path) = RequestPath::parse(&raw) {
                for segment in path.segments() {
                    prop_assert!(segment != ".." && segment != "." && !segment.is_empty());
                    prop_assert!(!segment.contains('/') && !segment.contains('\\'));
                }
            }
        }
    }
}
