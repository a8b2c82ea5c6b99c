//! Collaborator contracts
//!
//! The simulation core consumes these; the login UI, credential store,
//! program catalog and diagnostic storage implement them. Each trait comes
//! with a small in-memory implementation for tests and single-process
//! drivers.

use crate::time::Instant;
use core_types::{HostId, IncidentId, Pid};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;

/// A player account known to the whole simulation
pub trait Account {
    fn username(&self) -> &str;
    fn check_password(&self, candidate: &str) -> bool;
    /// Simulation-wide administrator, allowed to act as any host's superuser
    fn is_superuser(&self) -> bool;
}

/// Lookup of player accounts by username
pub trait AccountDirectory: Send {
    fn find_account(&self, username: &str) -> Option<&dyn Account>;
}

/// Default PBKDF2 iteration count for stored passwords
pub const PBKDF2_ROUNDS: u32 = 100_000;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 64;

/// An account with a PBKDF2-HMAC-SHA512 password digest and a random salt
#[derive(Debug, Clone)]
pub struct StoredAccount {
    username: String,
    salt: [u8; SALT_LEN],
    rounds: u32,
    digest: [u8; DIGEST_LEN],
    superuser: bool,
}

impl StoredAccount {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        Self::with_rounds(username, password, PBKDF2_ROUNDS)
    }

    /// Like [`StoredAccount::new`] with an explicit iteration count.
    ///
    /// Test fixtures use a small count; the count is kept with the digest.
    pub fn with_rounds(username: impl Into<String>, password: &str, rounds: u32) -> Self {
        let salt: [u8; SALT_LEN] = rand::thread_rng().gen();
        let rounds = rounds.max(1);
        Self {
            username: username.into(),
            salt,
            rounds,
            digest: Self::derive(&salt, rounds, password),
            superuser: false,
        }
    }

    pub fn superuser(mut self) -> Self {
        self.superuser = true;
        self
    }

    fn derive(salt: &[u8], rounds: u32, password: &str) -> [u8; DIGEST_LEN] {
        let mut out = [0u8; DIGEST_LEN];
        pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, rounds, &mut out);
        out
    }
}

impl Account for StoredAccount {
    fn username(&self) -> &str {
        &self.username
    }

    fn check_password(&self, candidate: &str) -> bool {
        let derived = Self::derive(&self.salt, self.rounds, candidate);
        derived
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    fn is_superuser(&self) -> bool {
        self.superuser
    }
}

/// In-memory account directory
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    accounts: HashMap<String, StoredAccount>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account, returning false if the username is taken
    pub fn insert(&mut self, account: StoredAccount) -> bool {
        if self.accounts.contains_key(account.username()) {
            return false;
        }
        self.accounts.insert(account.username().to_string(), account);
        true
    }

    pub fn with(mut self, account: StoredAccount) -> Self {
        self.insert(account);
        self
    }
}

impl AccountDirectory for InMemoryAccounts {
    fn find_account(&self, username: &str) -> Option<&dyn Account> {
        self.accounts.get(username).map(|a| a as &dyn Account)
    }
}

/// What a program catalog knows about one executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDescriptor {
    pub name: String,
    /// Hex SHA-256 of the program's canonical image
    pub checksum: String,
}

/// Known-good program registry used to validate executables
pub trait ProgramCatalog {
    fn resolve_executable(&self, name: &str) -> Option<ProgramDescriptor>;
}

/// Diagnostic report for an internal fault inside a process step
#[derive(Debug, Clone)]
pub struct IncidentReport {
    pub id: IncidentId,
    pub host: HostId,
    pub pid: Pid,
    pub program: String,
    pub user: String,
    pub message: String,
    pub at: Instant,
}

/// Durable storage for incident reports, keyed by incident id
pub trait IncidentSink: Send {
    fn record(&mut self, report: IncidentReport);
}

/// Keeps incident reports in memory
#[derive(Debug, Default)]
pub struct MemoryIncidentSink {
    reports: Vec<IncidentReport>,
}

impl MemoryIncidentSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, id: IncidentId) -> Option<&IncidentReport> {
        self.reports.iter().find(|r| r.id == id)
    }

    pub fn reports(&self) -> &[IncidentReport] {
        &self.reports
    }
}

impl IncidentSink for MemoryIncidentSink {
    fn record(&mut self, report: IncidentReport) {
        self.reports.push(report);
    }
}

/// Hex SHA-256 of a byte slice
pub fn checksum(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_check() {
        let acct = StoredAccount::with_rounds("alice", "hunter2", 16);
        assert!(acct.check_password("hunter2"));
        assert!(!acct.check_password("hunter3"));
        assert!(!acct.check_password(""));
        assert!(!acct.is_superuser());
    }

    #[test]
    fn test_default_rounds_verify() {
        let acct = StoredAccount::new("carol", "s3cret");
        assert_eq!(acct.rounds, PBKDF2_ROUNDS);
        assert!(acct.check_password("s3cret"));
    }

    #[test]
    fn test_same_password_gets_distinct_salts() {
        let a = StoredAccount::with_rounds("alice", "pw", 16);
        let b = StoredAccount::with_rounds("alice", "pw", 16);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.digest, b.digest);
        assert!(a.check_password("pw") && b.check_password("pw"));
    }

    #[test]
    fn test_directory_lookup() {
        let accounts = InMemoryAccounts::new()
            .with(StoredAccount::with_rounds("alice", "pw", 16))
            .with(StoredAccount::with_rounds("root", "toor", 16).superuser());

        assert!(accounts.find_account("alice").is_some());
        assert!(accounts.find_account("mallory").is_none());
        assert!(accounts
            .find_account("root")
            .map(|a| a.check_password("toor") && a.is_superuser())
            .unwrap_or(false));
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let mut accounts = InMemoryAccounts::new();
        assert!(accounts.insert(StoredAccount::with_rounds("bob", "a", 16)));
        assert!(!accounts.insert(StoredAccount::with_rounds("bob", "b", 16)));
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let a = checksum(b"program image");
        assert_eq!(a, checksum(b"program image"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, checksum(b"tampered image"));
    }

    #[test]
    fn test_memory_incident_sink() {
        let mut sink = MemoryIncidentSink::new();
        let id = IncidentId::new();
        sink.record(IncidentReport {
            id,
            host: HostId::new(),
            pid: Pid::new(3),
            program: "shell".to_string(),
            user: "alice".to_string(),
            message: "boom".to_string(),
            at: Instant::EPOCH,
        });
        assert_eq!(sink.find(id).map(|r| r.message.as_str()), Some("boom"));
        assert!(sink.find(IncidentId::new()).is_none());
    }
}
