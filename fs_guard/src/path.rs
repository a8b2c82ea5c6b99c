//! Path resolution logic
//!
//! Every path inside a host's namespace is normalized to an absolute,
//! slash-separated key before it touches the tree. `.` and `..` are folded
//! away here; `..` at the root stays at the root.

use host_api::OsError;

/// Path resolver
///
/// Handles joining, normalizing and splitting namespace paths.
pub struct PathResolver;

impl PathResolver {
    pub const ROOT: &'static str = "/";

    /// Joins `path` onto `cwd` (unless `path` is absolute) and normalizes it
    ///
    /// # Examples
    ///
    /// ```
    /// use fs_guard::PathResolver;
    ///
    /// assert_eq!(PathResolver::resolve("/usr/alice", "notes/todo"), "/usr/alice/notes/todo");
    /// assert_eq!(PathResolver::resolve("/usr/alice", "../bob"), "/usr/bob");
    /// assert_eq!(PathResolver::resolve("/usr", "/../../sys"), "/sys");
    /// ```
    pub fn resolve(cwd: &str, path: &str) -> String {
        let joined = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}/{}", cwd, path)
        };

        let mut parts: Vec<&str> = Vec::new();
        for component in joined.split('/') {
            match component {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                name => parts.push(name),
            }
        }

        if parts.is_empty() {
            Self::ROOT.to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    }

    /// Normalizes a path that must already be absolute
    pub fn normalize(path: &str) -> Result<String, OsError> {
        if !path.starts_with('/') {
            return Err(OsError::InvalidPath(format!(
                "'{}' is not an absolute path",
                path
            )));
        }
        if path.contains('\0') {
            return Err(OsError::InvalidPath("path contains NUL".to_string()));
        }
        Ok(Self::resolve(Self::ROOT, path))
    }

    /// Returns the parent of a normalized path, `None` for the root
    pub fn parent(path: &str) -> Option<&str> {
        if path == Self::ROOT {
            return None;
        }
        match path.rfind('/') {
            Some(0) => Some(Self::ROOT),
            Some(idx) => Some(&path[..idx]),
            None => None,
        }
    }

    /// Returns the last component of a normalized path
    pub fn file_name(path: &str) -> &str {
        path.rsplit('/').next().unwrap_or("")
    }

    /// Joins a child name onto a normalized directory path
    pub fn join(dir: &str, name: &str) -> String {
        if dir == Self::ROOT {
            format!("/{}", name)
        } else {
            format!("{}/{}", dir, name)
        }
    }

    /// True if `path` is `dir` itself or lies underneath it
    pub fn is_within(path: &str, dir: &str) -> bool {
        if dir == Self::ROOT {
            return true;
        }
        path == dir
            || (path.starts_with(dir) && path.as_bytes().get(dir.len()) == Some(&b'/'))
    }

    /// Validates a single path component name
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\0')
    }
}
