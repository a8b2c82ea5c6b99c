//! In-memory namespace tree
//!
//! The namespace is a flat ordered map from normalized absolute path to
//! node. Children of a directory are the keys one level below it, which an
//! ordered map hands back with a range scan. Permission metadata is a field
//! of the node, never a parallel file.

use crate::path::PathResolver;
use crate::permissions::{Access, Inode, SUPERUSER};
use host_api::{Instant, OsError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File contents or directory marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    File { data: String },
    Directory,
}

/// One filesystem object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    /// Permission record; a node restored without one is denied to everyone
    /// except the superuser
    #[serde(default)]
    pub inode: Option<Inode>,
    pub modified_at: Instant,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn size(&self) -> usize {
        match &self.kind {
            NodeKind::File { data } => data.len(),
            NodeKind::Directory => 0,
        }
    }
}

/// Summary of a node for listing consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub is_dir: bool,
    pub inode: Option<Inode>,
    pub size: usize,
    pub modified_at: Instant,
}

/// A host's private filesystem namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filesystem {
    nodes: BTreeMap<String, Node>,
    /// Next uid handed out by `add_user`
    pub(crate) next_uid: u32,
    /// Next gid handed out by `add_user` and `add_group`
    pub(crate) next_gid: u32,
    #[serde(skip)]
    clock: Instant,
}

impl Filesystem {
    /// Creates a namespace holding only a root directory
    pub fn empty(first_uid: u32, first_gid: u32) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            PathResolver::ROOT.to_string(),
            Node {
                kind: NodeKind::Directory,
                inode: Some(Inode::fixed("r-xr-xr-x", SUPERUSER, SUPERUSER)),
                modified_at: Instant::EPOCH,
            },
        );
        Self {
            nodes,
            next_uid: first_uid,
            next_gid: first_gid,
            clock: Instant::EPOCH,
        }
    }

    /// Creates the standard host skeleton
    ///
    /// `/sys` holds the account records, `/bin` the installed programs,
    /// `/log` and `/usr` are group-writable, and root gets a private home.
    pub fn with_skeleton(first_uid: u32, first_gid: u32) -> Self {
        let mut fs = Self::empty(first_uid, first_gid);
        for (path, mode) in [
            ("/sys", "rwxr-xr-x"),
            ("/bin", "rwxr-xr-x"),
            ("/log", "rwxrwxr-x"),
            ("/usr", "rwxrwxr-x"),
            ("/usr/root", "rwx------"),
        ] {
            fs.insert_dir(path, Inode::fixed(mode, SUPERUSER, SUPERUSER));
        }
        fs.insert_file(
            crate::accounts::PASSWD_PATH,
            "root:x:0:0:root,,,:/usr/root:/bin/shell\n".to_string(),
            Inode::fixed("rw-r--r--", SUPERUSER, SUPERUSER),
        );
        fs.insert_file(
            crate::accounts::GROUP_PATH,
            "root:x:0:\n".to_string(),
            Inode::fixed("rw-r--r--", SUPERUSER, SUPERUSER),
        );
        fs
    }

    /// Sets the time stamped onto modified nodes
    pub fn set_clock(&mut self, now: Instant) {
        self.clock = now;
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.nodes.get(path).map(Node::is_dir).unwrap_or(false)
    }

    pub fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(path)
    }

    /// Returns kind, permission record, size and modification time
    pub fn metadata(&self, path: &str) -> Result<Metadata, OsError> {
        let path = PathResolver::normalize(path)?;
        let node = self.nodes.get(&path).ok_or(OsError::NotFound)?;
        Ok(Metadata {
            is_dir: node.is_dir(),
            inode: node.inode.clone(),
            size: node.size(),
            modified_at: node.modified_at,
        })
    }

    /// Checks whether `user` may perform `access` on `path`
    ///
    /// Errors only when the path does not exist. A node without a permission
    /// record denies everyone but the superuser.
    pub fn path_priv(&self, path: &str, user: &str, access: Access) -> Result<bool, OsError> {
        let path = PathResolver::normalize(path)?;
        let node = self.nodes.get(&path).ok_or(OsError::NotFound)?;
        if user == SUPERUSER {
            return Ok(true);
        }
        let Some(inode) = &node.inode else {
            return Ok(false);
        };
        let groups = self.groups_of(user);
        Ok(inode.permits(user, &groups, access))
    }

    /// Like [`Filesystem::path_priv`] but denial is an error
    pub fn authorize(&self, path: &str, user: &str, access: Access) -> Result<(), OsError> {
        if self.path_priv(path, user, access)? {
            Ok(())
        } else {
            Err(OsError::PermissionDenied)
        }
    }

    /// Names of the direct children of `dir` that carry a permission record
    pub(crate) fn children(&self, dir: &str) -> Vec<(&str, &Node)> {
        let prefix = if dir == PathResolver::ROOT {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/') && key.len() > prefix.len())
            .map(|(key, node)| (&key[prefix.len()..], node))
            .collect()
    }

    /// Every path at or below `dir`, deepest first
    pub(crate) fn subtree(&self, dir: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .nodes
            .keys()
            .filter(|key| PathResolver::is_within(key, dir))
            .cloned()
            .collect();
        paths.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));
        paths
    }

    pub(crate) fn insert_dir(&mut self, path: &str, inode: Inode) {
        self.nodes.insert(
            path.to_string(),
            Node {
                kind: NodeKind::Directory,
                inode: Some(inode),
                modified_at: self.clock,
            },
        );
    }

    pub(crate) fn insert_file(&mut self, path: &str, data: String, inode: Inode) {
        self.nodes.insert(
            path.to_string(),
            Node {
                kind: NodeKind::File { data },
                inode: Some(inode),
                modified_at: self.clock,
            },
        );
    }

    pub(crate) fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        let now = self.clock;
        let node = self.nodes.get_mut(path)?;
        node.modified_at = now;
        Some(node)
    }

    pub(crate) fn take(&mut self, path: &str) -> Option<Node> {
        self.nodes.remove(path)
    }

    pub(crate) fn put(&mut self, path: String, node: Node) {
        self.nodes.insert(path, node);
    }

    /// Data of a file read without any permission check
    pub(crate) fn raw_contents(&self, path: &str) -> Option<&str> {
        match self.nodes.get(path).map(|n| &n.kind) {
            Some(NodeKind::File { data }) => Some(data.as_str()),
            _ => None,
        }
    }
}
