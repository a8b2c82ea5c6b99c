//! User and group records
//!
//! Two flat line-oriented files under `/sys` describe who exists on a host:
//!
//! ```text
//! /sys/passwd   username:x:uid:gid:comment:home:shell
//! /sys/group    groupname:x:gid:member,member,...
//! ```
//!
//! Administration authorizes the caller against the record file first, then
//! rewrites it as the superuser so the edit never trips over the record's own
//! permission check.

use crate::path::PathResolver;
use crate::permissions::{Access, Inode, SUPERUSER};
use crate::tree::{Filesystem, NodeKind};
use host_api::{AccountDirectory, OsError};
use tracing::info;

pub const PASSWD_PATH: &str = "/sys/passwd";
pub const GROUP_PATH: &str = "/sys/group";
pub const DEFAULT_SHELL: &str = "/bin/shell";
pub const HOME_ROOT: &str = "/usr";

/// One line of `/sys/passwd`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub comment: String,
    pub home: String,
    pub shell: String,
}

impl PasswdEntry {
    /// Parses one record; malformed lines yield `None`
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != 7 || fields[0].is_empty() {
            return None;
        }
        Some(Self {
            username: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            comment: fields[4].to_string(),
            home: fields[5].to_string(),
            shell: fields[6].to_string(),
        })
    }

    pub fn format(&self) -> String {
        format!(
            "{}:x:{}:{}:{}:{}:{}",
            self.username, self.uid, self.gid, self.comment, self.home, self.shell
        )
    }
}

/// One line of `/sys/group`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

impl GroupEntry {
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != 4 || fields[0].is_empty() {
            return None;
        }
        let members = fields[3]
            .split(',')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        Some(Self {
            name: fields[0].to_string(),
            gid: fields[2].parse().ok()?,
            members,
        })
    }

    pub fn format(&self) -> String {
        format!("{}:x:{}:{}", self.name, self.gid, self.members.join(","))
    }
}

fn valid_record_name(name: &str) -> bool {
    PathResolver::is_valid_name(name)
        && !name.contains(':')
        && !name.contains(',')
        && !name.chars().any(char::is_whitespace)
}

/// Rewrites a record file around an edited entry list.
///
/// Each parsed line is replaced by the first unused entry with the same key,
/// or dropped if none is left. Lines that do not parse stay verbatim and
/// entries with no matching line are appended.
fn splice_records<T>(
    original: &str,
    entries: &[T],
    line_key: impl Fn(&str) -> Option<String>,
    key: impl Fn(&T) -> &str,
    format: impl Fn(&T) -> String,
) -> String {
    let mut used = vec![false; entries.len()];
    let mut text = String::with_capacity(original.len());
    for line in original.lines() {
        let Some(name) = line_key(line.trim()) else {
            text.push_str(line);
            text.push('\n');
            continue;
        };
        let slot = (0..entries.len()).find(|&i| !used[i] && key(&entries[i]) == name);
        if let Some(i) = slot {
            used[i] = true;
            text.push_str(&format(&entries[i]));
            text.push('\n');
        }
    }
    for (entry, _) in entries.iter().zip(&used).filter(|(_, used)| !**used) {
        text.push_str(&format(entry));
        text.push('\n');
    }
    text
}

impl Filesystem {
    /// Every well-formed passwd record
    pub fn passwd_entries(&self) -> Vec<PasswdEntry> {
        self.raw_contents(PASSWD_PATH)
            .map(|data| data.lines().map(str::trim).filter_map(PasswdEntry::parse).collect())
            .unwrap_or_default()
    }

    /// Every well-formed group record
    pub fn group_entries(&self) -> Vec<GroupEntry> {
        self.raw_contents(GROUP_PATH)
            .map(|data| data.lines().map(str::trim).filter_map(GroupEntry::parse).collect())
            .unwrap_or_default()
    }

    pub fn passwd_entry(&self, user: &str) -> Option<PasswdEntry> {
        self.passwd_entries().into_iter().find(|e| e.username == user)
    }

    pub fn group_entry(&self, group: &str) -> Option<GroupEntry> {
        self.group_entries().into_iter().find(|e| e.name == group)
    }

    /// True if `user` has a passwd record on this host
    pub fn check_user(&self, user: &str) -> bool {
        self.passwd_entry(user).is_some()
    }

    pub fn home_of(&self, user: &str) -> Option<String> {
        self.passwd_entry(user).map(|e| e.home)
    }

    pub fn shell_of(&self, user: &str) -> Option<String> {
        self.passwd_entry(user).map(|e| e.shell)
    }

    /// Name of the group matching the user's passwd gid
    pub fn primary_group(&self, user: &str) -> Option<String> {
        let gid = self.passwd_entry(user)?.gid;
        self.group_entries()
            .into_iter()
            .find(|g| g.gid == gid)
            .map(|g| g.name)
    }

    /// Primary group followed by every group listing `user` as a member
    pub fn groups_of(&self, user: &str) -> Vec<String> {
        let mut groups: Vec<String> = self.primary_group(user).into_iter().collect();
        for entry in self.group_entries() {
            if entry.members.iter().any(|m| m == user) && !groups.contains(&entry.name) {
                groups.push(entry.name);
            }
        }
        groups
    }

    /// Adds a passwd record, a personal group and a private home directory
    ///
    /// The username must belong to an account in `accounts`.
    pub fn add_user(
        &mut self,
        caller: &str,
        username: &str,
        accounts: &dyn AccountDirectory,
    ) -> Result<PasswdEntry, OsError> {
        self.authorize(PASSWD_PATH, caller, Access::Write)?;
        self.authorize(GROUP_PATH, caller, Access::Write)?;
        if !valid_record_name(username) || accounts.find_account(username).is_none() {
            return Err(OsError::NoSuchUser(username.to_string()));
        }
        if self.check_user(username) {
            return Err(OsError::UserExists(username.to_string()));
        }
        if self.group_entry(username).is_some() {
            return Err(OsError::GroupExists(username.to_string()));
        }

        let uid = self.next_uid;
        let gid = self.next_gid;
        self.next_uid += 1;
        self.next_gid += 1;

        let home = PathResolver::join(HOME_ROOT, username);
        let entry = PasswdEntry {
            username: username.to_string(),
            uid,
            gid,
            comment: format!("{},,,", username),
            home: home.clone(),
            shell: DEFAULT_SHELL.to_string(),
        };

        let mut passwd = self.passwd_entries();
        passwd.push(entry.clone());
        self.store_passwd(&passwd);

        let mut groups = self.group_entries();
        groups.push(GroupEntry {
            name: username.to_string(),
            gid,
            members: Vec::new(),
        });
        self.store_groups(&groups);

        if !self.exists(&home) {
            self.insert_dir(&home, Inode::fixed("rwx------", username, username));
        }

        info!(user = username, uid, gid, by = caller, "user added");
        Ok(entry)
    }

    /// Removes a passwd record, its personal group and its memberships
    ///
    /// The home directory is left in place.
    pub fn del_user(&mut self, caller: &str, username: &str) -> Result<(), OsError> {
        self.authorize(PASSWD_PATH, caller, Access::Write)?;
        self.authorize(GROUP_PATH, caller, Access::Write)?;
        if username == SUPERUSER {
            return Err(OsError::PermissionDenied);
        }
        let mut passwd = self.passwd_entries();
        let before = passwd.len();
        passwd.retain(|e| e.username != username);
        if passwd.len() == before {
            return Err(OsError::NoSuchUser(username.to_string()));
        }
        self.store_passwd(&passwd);

        let mut groups = self.group_entries();
        groups.retain(|g| g.name != username);
        for group in &mut groups {
            group.members.retain(|m| m != username);
        }
        self.store_groups(&groups);

        info!(user = username, by = caller, "user removed");
        Ok(())
    }

    /// Adds an empty group and returns its gid
    pub fn add_group(&mut self, caller: &str, name: &str) -> Result<u32, OsError> {
        self.authorize(GROUP_PATH, caller, Access::Write)?;
        if !valid_record_name(name) {
            return Err(OsError::NoSuchGroup(name.to_string()));
        }
        let mut groups = self.group_entries();
        if groups.iter().any(|g| g.name == name) {
            return Err(OsError::GroupExists(name.to_string()));
        }
        let gid = self.next_gid;
        self.next_gid += 1;
        groups.push(GroupEntry {
            name: name.to_string(),
            gid,
            members: Vec::new(),
        });
        self.store_groups(&groups);
        info!(group = name, gid, by = caller, "group added");
        Ok(gid)
    }

    /// Removes a group that is nobody's primary group
    pub fn del_group(&mut self, caller: &str, name: &str) -> Result<(), OsError> {
        self.authorize(GROUP_PATH, caller, Access::Write)?;
        let mut groups = self.group_entries();
        let gid = groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.gid)
            .ok_or_else(|| OsError::NoSuchGroup(name.to_string()))?;
        if self.passwd_entries().iter().any(|e| e.gid == gid) {
            return Err(OsError::Busy);
        }
        groups.retain(|g| g.name != name);
        self.store_groups(&groups);
        info!(group = name, by = caller, "group removed");
        Ok(())
    }

    /// Lists `user` as a member of `group`; joining twice is a no-op
    pub fn join_group(&mut self, caller: &str, user: &str, group: &str) -> Result<(), OsError> {
        self.authorize(GROUP_PATH, caller, Access::Write)?;
        if !self.check_user(user) {
            return Err(OsError::NoSuchUser(user.to_string()));
        }
        let mut groups = self.group_entries();
        let entry = groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| OsError::NoSuchGroup(group.to_string()))?;
        if !entry.members.iter().any(|m| m == user) {
            entry.members.push(user.to_string());
            self.store_groups(&groups);
            info!(user, group, by = caller, "group joined");
        }
        Ok(())
    }

    /// Drops `user` from the member list of `group`
    pub fn leave_group(&mut self, caller: &str, user: &str, group: &str) -> Result<(), OsError> {
        self.authorize(GROUP_PATH, caller, Access::Write)?;
        let mut groups = self.group_entries();
        let entry = groups
            .iter_mut()
            .find(|g| g.name == group)
            .ok_or_else(|| OsError::NoSuchGroup(group.to_string()))?;
        entry.members.retain(|m| m != user);
        self.store_groups(&groups);
        info!(user, group, by = caller, "group left");
        Ok(())
    }

    fn store_passwd(&mut self, entries: &[PasswdEntry]) {
        let text = splice_records(
            self.raw_contents(PASSWD_PATH).unwrap_or_default(),
            entries,
            |line| PasswdEntry::parse(line).map(|e| e.username),
            |e| &e.username,
            PasswdEntry::format,
        );
        self.store_record(PASSWD_PATH, text);
    }

    fn store_groups(&mut self, entries: &[GroupEntry]) {
        let text = splice_records(
            self.raw_contents(GROUP_PATH).unwrap_or_default(),
            entries,
            |line| GroupEntry::parse(line).map(|g| g.name),
            |g| &g.name,
            GroupEntry::format,
        );
        self.store_record(GROUP_PATH, text);
    }

    fn store_record(&mut self, path: &str, text: String) {
        match self.node_mut(path) {
            Some(node) => node.kind = NodeKind::File { data: text },
            None => self.insert_file(path, text, Inode::fixed("rw-r--r--", SUPERUSER, SUPERUSER)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::WriteMode;
    use host_api::{InMemoryAccounts, StoredAccount};

    fn accounts() -> InMemoryAccounts {
        InMemoryAccounts::new()
            .with(StoredAccount::with_rounds("alice", "pw", 16))
            .with(StoredAccount::with_rounds("bob", "pw", 16))
    }

    #[test]
    fn test_record_formats() {
        let line = "root:x:0:0:root,,,:/usr/root:/bin/shell";
        let entry = PasswdEntry::parse(line).unwrap();
        assert_eq!(entry.home, "/usr/root");
        assert_eq!(entry.format(), line);

        let group = GroupEntry::parse("staff:x:1002:alice,bob").unwrap();
        assert_eq!(group.members, vec!["alice", "bob"]);
        assert_eq!(group.format(), "staff:x:1002:alice,bob");
        assert_eq!(GroupEntry::parse("root:x:0:").unwrap().members.len(), 0);

        assert!(PasswdEntry::parse("broken:x:zero").is_none());
    }

    #[test]
    fn test_add_user_creates_home_and_group() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        let entry = fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        assert_eq!(entry.uid, 1000);
        assert_eq!(entry.gid, 1000);
        assert_eq!(fs.home_of("alice").as_deref(), Some("/usr/alice"));
        assert_eq!(fs.shell_of("alice").as_deref(), Some(DEFAULT_SHELL));
        assert_eq!(fs.groups_of("alice"), vec!["alice"]);

        let meta = fs.metadata("/usr/alice").unwrap();
        assert_eq!(meta.inode.unwrap().to_string(), "rwx------ alice alice");
    }

    #[test]
    fn test_add_user_requires_known_account() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        assert_eq!(
            fs.add_user(SUPERUSER, "mallory", &accounts()),
            Err(OsError::NoSuchUser("mallory".to_string()))
        );
        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        assert_eq!(
            fs.add_user(SUPERUSER, "alice", &accounts()),
            Err(OsError::UserExists("alice".to_string()))
        );
    }

    #[test]
    fn test_non_root_cannot_administer() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        assert_eq!(
            fs.add_user("alice", "bob", &accounts()),
            Err(OsError::PermissionDenied)
        );
        assert_eq!(fs.add_group("alice", "staff"), Err(OsError::PermissionDenied));
    }

    #[test]
    fn test_group_membership() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        fs.add_user(SUPERUSER, "bob", &accounts()).unwrap();
        let gid = fs.add_group(SUPERUSER, "staff").unwrap();
        assert_eq!(gid, 1002);

        fs.join_group(SUPERUSER, "bob", "staff").unwrap();
        fs.join_group(SUPERUSER, "bob", "staff").unwrap();
        assert_eq!(fs.groups_of("bob"), vec!["bob", "staff"]);
        assert_eq!(fs.group_entry("staff").unwrap().members, vec!["bob"]);

        fs.leave_group(SUPERUSER, "bob", "staff").unwrap();
        assert_eq!(fs.groups_of("bob"), vec!["bob"]);
    }

    #[test]
    fn test_del_group_refuses_primary() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        assert_eq!(fs.del_group(SUPERUSER, "alice"), Err(OsError::Busy));
        fs.add_group(SUPERUSER, "staff").unwrap();
        fs.del_group(SUPERUSER, "staff").unwrap();
        assert!(fs.group_entry("staff").is_none());
    }

    #[test]
    fn test_del_user_strips_memberships() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        fs.add_group(SUPERUSER, "staff").unwrap();
        fs.join_group(SUPERUSER, "alice", "staff").unwrap();

        fs.del_user(SUPERUSER, "alice").unwrap();
        assert!(!fs.check_user("alice"));
        assert!(fs.group_entry("alice").is_none());
        assert!(fs.group_entry("staff").unwrap().members.is_empty());
        assert_eq!(fs.del_user(SUPERUSER, SUPERUSER), Err(OsError::PermissionDenied));
    }

    #[test]
    fn test_root_groups() {
        let fs = Filesystem::with_skeleton(1000, 1000);
        assert_eq!(fs.groups_of(SUPERUSER), vec!["root"]);
        assert_eq!(fs.primary_group(SUPERUSER).as_deref(), Some("root"));
    }
    #[test]
    fn test_admin_edits_keep_foreign_lines() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        fs.write_file(
            PASSWD_PATH,
            SUPERUSER,
            "svc:x:50:50:daemon:/usr/svc\n# local accounts\n",
            WriteMode::Append,
        )
        .unwrap();
        fs.write_file(GROUP_PATH, SUPERUSER, "wheel:x:10\n", WriteMode::Append)
            .unwrap();

        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        fs.add_user(SUPERUSER, "bob", &accounts()).unwrap();
        fs.del_user(SUPERUSER, "bob").unwrap();
        fs.add_group(SUPERUSER, "staff").unwrap();
        fs.join_group(SUPERUSER, "alice", "staff").unwrap();

        let passwd = fs.raw_contents(PASSWD_PATH).unwrap().to_string();
        let lines: Vec<&str> = passwd.lines().collect();
        assert!(lines.contains(&"svc:x:50:50:daemon:/usr/svc"));
        assert!(lines.contains(&"# local accounts"));
        assert!(!passwd.contains("bob:"));
        assert_eq!(lines.last().map(|l| l.starts_with("alice:")), Some(true));

        let group = fs.raw_contents(GROUP_PATH).unwrap();
        assert!(group.lines().any(|l| l == "wheel:x:10"));
        assert_eq!(fs.group_entry("staff").unwrap().members, vec!["alice"]);
    }

    #[test]
    fn test_padded_records_parse() {
        let mut fs = Filesystem::with_skeleton(1000, 1000);
        fs.write_file(
            GROUP_PATH,
            SUPERUSER,
            "  ops:x:77:alice  \n",
            WriteMode::Append,
        )
        .unwrap();
        assert_eq!(fs.group_entry("ops").unwrap().members, vec!["alice"]);

        fs.add_user(SUPERUSER, "alice", &accounts()).unwrap();
        fs.leave_group(SUPERUSER, "alice", "ops").unwrap();
        let group = fs.raw_contents(GROUP_PATH).unwrap();
        assert!(group.lines().any(|l| l == "ops:x:77:"));
        assert_eq!(group.matches("ops:").count(), 1);
    }
}
