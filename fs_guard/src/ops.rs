//! Permission-checked file operations
//!
//! Every operation takes the acting user and normalizes its path arguments.
//! Creation and removal are authorized against the parent directory; reads,
//! overwrites, mode changes and execution against the object itself.

use crate::path::PathResolver;
use crate::permissions::{Access, Inode, Mode, SUPERUSER};
use crate::tree::{Filesystem, Node, NodeKind};
use host_api::{checksum, OsError, ProgramCatalog, ProgramDescriptor};
use tracing::debug;

/// How `write_file` treats existing contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Overwrite,
    Append,
}

/// Names found in a directory, split by kind and sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

impl Filesystem {
    pub fn read_file(&self, path: &str, user: &str) -> Result<String, OsError> {
        let path = PathResolver::normalize(path)?;
        let node = self.node(&path).ok_or(OsError::NotFound)?;
        let NodeKind::File { data } = &node.kind else {
            return Err(OsError::IsADirectory);
        };
        self.authorize(&path, user, Access::Read)?;
        Ok(data.clone())
    }

    /// Lines of a file with surrounding whitespace trimmed
    pub fn read_lines(&self, path: &str, user: &str) -> Result<Vec<String>, OsError> {
        Ok(self
            .read_file(path, user)?
            .lines()
            .map(|line| line.trim().to_string())
            .collect())
    }

    /// Writes or appends to a file, creating it when the parent allows
    pub fn write_file(
        &mut self,
        path: &str,
        user: &str,
        data: &str,
        mode: WriteMode,
    ) -> Result<(), OsError> {
        let path = PathResolver::normalize(path)?;
        match self.node(&path).map(Node::is_dir) {
            Some(true) => Err(OsError::IsADirectory),
            Some(false) => {
                self.authorize(&path, user, Access::Write)?;
                if let Some(node) = self.node_mut(&path) {
                    if let NodeKind::File { data: existing } = &mut node.kind {
                        match mode {
                            WriteMode::Overwrite => *existing = data.to_string(),
                            WriteMode::Append => existing.push_str(data),
                        }
                    }
                }
                Ok(())
            }
            None => {
                self.authorize_create(&path, user)?;
                let inode = self.new_inode("rw-r--r--", user);
                self.insert_file(&path, data.to_string(), inode);
                debug!(path = %path, user, "file created");
                Ok(())
            }
        }
    }

    /// Lists a directory; entries without a permission record are hidden
    pub fn list_dir(&self, path: &str, user: &str) -> Result<DirListing, OsError> {
        let path = PathResolver::normalize(path)?;
        let node = self.node(&path).ok_or(OsError::NotFound)?;
        if !node.is_dir() {
            return Err(OsError::CannotListFile);
        }
        self.authorize(&path, user, Access::Read)?;

        let mut listing = DirListing::default();
        for (name, child) in self.children(&path) {
            if child.inode.is_none() {
                continue;
            }
            if child.is_dir() {
                listing.directories.push(name.to_string());
            } else {
                listing.files.push(name.to_string());
            }
        }
        listing.directories.sort();
        listing.files.sort();
        Ok(listing)
    }

    pub fn make_dir(&mut self, path: &str, user: &str) -> Result<(), OsError> {
        let path = PathResolver::normalize(path)?;
        if self.exists(&path) {
            return Err(OsError::AlreadyExists);
        }
        self.authorize_create(&path, user)?;
        let inode = self.new_inode("rwxr-xr-x", user);
        self.insert_dir(&path, inode);
        debug!(path = %path, user, "directory created");
        Ok(())
    }

    pub fn remove_file(&mut self, path: &str, user: &str) -> Result<(), OsError> {
        let path = PathResolver::normalize(path)?;
        let node = self.node(&path).ok_or(OsError::NotFound)?;
        if node.is_dir() {
            return Err(OsError::IsADirectory);
        }
        self.authorize_parent(&path, user)?;
        self.take(&path);
        Ok(())
    }

    /// Removes a directory; `recursive` also removes everything beneath it
    ///
    /// A recursive removal needs write access on every directory it empties
    /// and removes nothing if any is denied.
    pub fn remove_dir(&mut self, path: &str, user: &str, recursive: bool) -> Result<(), OsError> {
        let path = PathResolver::normalize(path)?;
        if path == PathResolver::ROOT {
            return Err(OsError::Busy);
        }
        let node = self.node(&path).ok_or(OsError::NotFound)?;
        if !node.is_dir() {
            return Err(OsError::NotADirectory);
        }
        self.authorize_parent(&path, user)?;

        let subtree = self.subtree(&path);
        if subtree.len() > 1 {
            if !recursive {
                return Err(OsError::DirectoryNotEmpty);
            }
            for dir in subtree.iter().filter(|p| self.is_dir(p)) {
                self.authorize(dir, user, Access::Write)?;
            }
        }
        for victim in subtree {
            self.take(&victim);
        }
        debug!(path = %path, user, recursive, "directory removed");
        Ok(())
    }

    /// Copies a file; a directory destination receives the same file name
    pub fn copy_file(&mut self, src: &str, dst: &str, user: &str) -> Result<(), OsError> {
        let src = PathResolver::normalize(src)?;
        let data = self.read_file(&src, user)?;
        let dst = self.landing_path(&src, dst)?;
        if dst == src {
            return Err(OsError::AlreadyExists);
        }
        self.write_file(&dst, user, &data, WriteMode::Overwrite)
    }

    /// Moves a file or directory subtree, keeping permission records
    pub fn move_file(&mut self, src: &str, dst: &str, user: &str) -> Result<(), OsError> {
        let src = PathResolver::normalize(src)?;
        if src == PathResolver::ROOT {
            return Err(OsError::Busy);
        }
        if !self.exists(&src) {
            return Err(OsError::NotFound);
        }
        let dst = self.landing_path(&src, dst)?;
        if PathResolver::is_within(&dst, &src) {
            return Err(OsError::InvalidPath(format!(
                "cannot move '{}' into itself",
                src
            )));
        }
        if self.exists(&dst) {
            return Err(OsError::AlreadyExists);
        }
        self.authorize_parent(&src, user)?;
        self.authorize_create(&dst, user)?;

        for old in self.subtree(&src) {
            if let Some(node) = self.take(&old) {
                let new = format!("{}{}", dst, &old[src.len()..]);
                self.put(new, node);
            }
        }
        debug!(from = %src, to = %dst, user, "moved");
        Ok(())
    }

    /// Validates an executable and returns its catalog descriptor
    ///
    /// The file content must hash to the checksum the catalog holds for a
    /// program of the same name.
    pub fn exec_file(
        &self,
        path: &str,
        user: &str,
        catalog: &dyn ProgramCatalog,
    ) -> Result<ProgramDescriptor, OsError> {
        let path = PathResolver::normalize(path)?;
        let node = self.node(&path).ok_or(OsError::NotFound)?;
        let NodeKind::File { data } = &node.kind else {
            return Err(OsError::IsADirectory);
        };
        self.authorize(&path, user, Access::Execute)?;

        let name = PathResolver::file_name(&path);
        let descriptor = catalog
            .resolve_executable(name)
            .ok_or(OsError::ExecFormat)?;
        if checksum(data.as_bytes()) != descriptor.checksum {
            return Err(OsError::ExecFormat);
        }
        Ok(descriptor)
    }

    /// Replaces the mode of an object the user may write
    pub fn set_mode(&mut self, path: &str, user: &str, mode: &str) -> Result<(), OsError> {
        let path = PathResolver::normalize(path)?;
        let mode = Mode::parse(mode)?;
        self.authorize(&path, user, Access::Write)?;
        if let Some(node) = self.node_mut(&path) {
            match &mut node.inode {
                Some(inode) => inode.mode = mode,
                None => node.inode = Some(Inode::new(mode, SUPERUSER, SUPERUSER)),
            }
        }
        Ok(())
    }

    /// Reassigns ownership; superuser only
    pub fn chown(&mut self, path: &str, user: &str, owner: &str, group: &str) -> Result<(), OsError> {
        let path = PathResolver::normalize(path)?;
        if !self.exists(&path) {
            return Err(OsError::NotFound);
        }
        if user != SUPERUSER {
            return Err(OsError::PermissionDenied);
        }
        if !self.check_user(owner) {
            return Err(OsError::NoSuchUser(owner.to_string()));
        }
        if self.group_entry(group).is_none() {
            return Err(OsError::NoSuchGroup(group.to_string()));
        }
        if let Some(node) = self.node_mut(&path) {
            let mode = node
                .inode
                .as_ref()
                .map(|i| i.mode)
                .unwrap_or(Mode::from_bits([false; 9]));
            node.inode = Some(Inode::new(mode, owner, group));
        }
        Ok(())
    }

    fn new_inode(&self, mode: &str, user: &str) -> Inode {
        let group = self
            .primary_group(user)
            .unwrap_or_else(|| user.to_string());
        Inode::fixed(mode, user, &group)
    }

    /// Parent must exist, be a directory, and grant write
    fn authorize_create(&self, path: &str, user: &str) -> Result<(), OsError> {
        let name = PathResolver::file_name(path);
        if !PathResolver::is_valid_name(name) {
            return Err(OsError::InvalidPath(path.to_string()));
        }
        self.authorize_parent(path, user)
    }

    fn authorize_parent(&self, path: &str, user: &str) -> Result<(), OsError> {
        let parent = PathResolver::parent(path).ok_or(OsError::Busy)?;
        match self.node(parent) {
            None => Err(OsError::NotFound),
            Some(node) if !node.is_dir() => Err(OsError::NotADirectory),
            Some(_) => self.authorize(parent, user, Access::Write),
        }
    }

    fn landing_path(&self, src: &str, dst: &str) -> Result<String, OsError> {
        let dst = PathResolver::normalize(dst)?;
        if self.is_dir(&dst) {
            Ok(PathResolver::join(&dst, PathResolver::file_name(src)))
        } else {
            Ok(dst)
        }
    }
}
