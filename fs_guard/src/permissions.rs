//! # Permission records
//!
//! Every filesystem object carries a companion permission record: a
//! nine-character `rwxrwxrwx` mode plus an owning user and group.
//!
//! ## The escalating check
//!
//! Authorization is not the usual Unix precedence chain. The classes that
//! apply to a user are tried together and *any* granting class suffices,
//! with the "other" bits always in play:
//!
//! | caller                  | denied only when these bits are all `-` |
//! |-------------------------|-----------------------------------------|
//! | owner and group member  | owner, group, other                     |
//! | owner only              | owner, other                            |
//! | group member only       | group, other                            |
//! | neither                 | other                                   |
//!
//! So `---r--r--` still lets the owner read. This is kept exactly as the
//! reference behaves.

use host_api::OsError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the identity that bypasses every check
pub const SUPERUSER: &str = "root";

/// Operation being authorized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    Execute,
}

impl Access {
    fn offset(self) -> usize {
        match self {
            Access::Read => 0,
            Access::Write => 1,
            Access::Execute => 2,
        }
    }
}

/// Permission class inside a mode string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Owner,
    Group,
    Other,
}

impl Class {
    fn base(self) -> usize {
        match self {
            Class::Owner => 0,
            Class::Group => 3,
            Class::Other => 6,
        }
    }
}

const TEMPLATE: &[u8; 9] = b"rwxrwxrwx";

/// Nine permission bits in fixed `rwxrwxrwx` positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mode([bool; 9]);

impl Mode {
    pub const fn from_bits(bits: [bool; 9]) -> Self {
        Self(bits)
    }

    /// Parses a mode string; every position must be `-` or its template letter
    pub fn parse(raw: &str) -> Result<Self, OsError> {
        let bytes = raw.as_bytes();
        if bytes.len() != 9 {
            return Err(OsError::InvalidMode(raw.to_string()));
        }
        let mut bits = [false; 9];
        for (i, byte) in bytes.iter().enumerate() {
            bits[i] = match *byte {
                b'-' => false,
                b if b == TEMPLATE[i] => true,
                _ => return Err(OsError::InvalidMode(raw.to_string())),
            };
        }
        Ok(Self(bits))
    }

    pub fn grants(&self, class: Class, access: Access) -> bool {
        self.0[class.base() + access.offset()]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.0.iter().enumerate() {
            let ch = if *set { TEMPLATE[i] as char } else { '-' };
            write!(f, "{}", ch)?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Mode {
    type Error = OsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Mode::parse(&value)
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.to_string()
    }
}

/// Permission record attached to one filesystem object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: Mode,
    pub owner: String,
    pub group: String,
}

impl Inode {
    pub fn new(mode: Mode, owner: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            mode,
            owner: owner.into(),
            group: group.into(),
        }
    }

    /// Builds a record from a mode literal known to be valid
    pub(crate) fn fixed(mode: &str, owner: &str, group: &str) -> Self {
        let mode = Mode::parse(mode).unwrap_or(Mode([false; 9]));
        Self::new(mode, owner, group)
    }

    /// Applies the escalating check for a caller with the given memberships
    pub fn permits(&self, user: &str, groups: &[String], access: Access) -> bool {
        if user == SUPERUSER {
            return true;
        }
        let is_owner = user == self.owner;
        let in_group = groups.iter().any(|g| *g == self.group);
        let other = self.mode.grants(Class::Other, access);

        match (is_owner, in_group) {
            (true, true) => {
                self.mode.grants(Class::Owner, access)
                    || self.mode.grants(Class::Group, access)
                    || other
            }
            (true, false) => self.mode.grants(Class::Owner, access) || other,
            (false, true) => self.mode.grants(Class::Group, access) || other,
            (false, false) => other,
        }
    }
}

impl fmt::Display for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.mode, self.owner, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_round_trip_text() {
        let mode = Mode::parse("rwxr-x---").unwrap();
        assert_eq!(mode.to_string(), "rwxr-x---");
        assert!(mode.grants(Class::Group, Access::Execute));
        assert!(!mode.grants(Class::Other, Access::Read));
    }

    #[test]
    fn test_mode_rejects_misplaced_letters() {
        assert!(Mode::parse("wrxrwxrwx").is_err());
        assert!(Mode::parse("rwx").is_err());
        assert!(Mode::parse("rwxrwxrwxr").is_err());
    }

    #[test]
    fn test_owner_and_group_member() {
        let inode = Inode::fixed("rw-r-----", "alice", "staff");
        let alice = groups(&["staff"]);
        assert!(inode.permits("alice", &alice, Access::Read));
        assert!(inode.permits("alice", &alice, Access::Write));
        assert!(!inode.permits("alice", &alice, Access::Execute));
    }

    #[test]
    fn test_group_member_only() {
        let inode = Inode::fixed("rw-r-----", "alice", "staff");
        let bob = groups(&["staff", "bob"]);
        assert!(inode.permits("bob", &bob, Access::Read));
        assert!(!inode.permits("bob", &bob, Access::Write));
    }

    #[test]
    fn test_unrelated_user() {
        let inode = Inode::fixed("rw-r-----", "alice", "staff");
        let eve = groups(&["eve"]);
        assert!(!inode.permits("eve", &eve, Access::Read));
        assert!(!inode.permits("eve", &eve, Access::Write));
    }

    #[test]
    fn test_other_bits_rescue_owner() {
        let inode = Inode::fixed("---------", "alice", "staff");
        assert!(!inode.permits("alice", &groups(&[]), Access::Read));

        let inode = Inode::fixed("------r--", "alice", "staff");
        assert!(inode.permits("alice", &groups(&[]), Access::Read));
        assert!(inode.permits("alice", &groups(&["staff"]), Access::Read));
    }

    #[test]
    fn test_superuser_bypasses() {
        let inode = Inode::fixed("---------", "alice", "staff");
        assert!(inode.permits(SUPERUSER, &[], Access::Write));
    }

    #[test]
    fn test_inode_serializes_mode_as_text() {
        let inode = Inode::fixed("rwxr-xr-x", "root", "root");
        let json = serde_json::to_string(&inode).unwrap();
        assert!(json.contains("\"rwxr-xr-x\""));
        let back: Inode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, inode);
    }
}
