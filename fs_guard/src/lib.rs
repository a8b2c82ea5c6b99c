//! # Filesystem Guard
//!
//! A host's private, permission-checked filesystem.
//!
//! ## Philosophy
//!
//! - **Every object carries its own permission record**: mode, owner and
//!   group live on the node, not in a side file
//! - **No record, no access**: an object without a record is denied to
//!   everyone except the superuser
//! - **Errors are values**: a denied operation returns an [`OsError`] that
//!   the caller prints verbatim
//!
//! ## Layout
//!
//! - [`path`]: normalization and joining of namespace paths
//! - [`permissions`]: modes, records and the escalating check
//! - [`tree`]: the namespace itself and the host skeleton
//! - [`ops`]: read/write/list/mkdir/remove/copy/move/exec/chmod/chown
//! - [`accounts`]: `/sys/passwd` and `/sys/group` records and administration
//!
//! [`OsError`]: host_api::OsError

pub mod accounts;
pub mod ops;
pub mod path;
pub mod permissions;
pub mod tree;

pub use accounts::{GroupEntry, PasswdEntry, GROUP_PATH, PASSWD_PATH};
pub use ops::{DirListing, WriteMode};
pub use path::PathResolver;
pub use permissions::{Access, Class, Inode, Mode, SUPERUSER};
pub use tree::{Filesystem, Metadata, Node, NodeKind};
