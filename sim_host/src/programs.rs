//! Static program registration
//!
//! Each entry maps a command name to its canonical image and a constructor.
//! The image's checksum is what `exec_file` validates installed binaries
//! against.

use crate::program::Runnable;
use host_api::{checksum, ProgramCatalog, ProgramDescriptor};
use std::collections::BTreeMap;

/// Builds a fresh program instance
pub type Constructor = fn() -> Box<dyn Runnable>;

struct Entry {
    image: String,
    checksum: String,
    construct: Constructor,
}

/// Known-good programs, keyed by lowercase name
#[derive(Default)]
pub struct ProgramTable {
    entries: BTreeMap<String, Entry>,
}

impl ProgramTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, replacing any earlier entry
    pub fn register(&mut self, name: &str, image: impl Into<String>, construct: Constructor) {
        let image = image.into();
        let entry = Entry {
            checksum: checksum(image.as_bytes()),
            image,
            construct,
        };
        self.entries.insert(name.to_lowercase(), entry);
    }

    pub fn with(mut self, name: &str, image: impl Into<String>, construct: Constructor) -> Self {
        self.register(name, image, construct);
        self
    }

    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Runnable>> {
        self.entries
            .get(&name.to_lowercase())
            .map(|entry| (entry.construct)())
    }

    /// Canonical file content for `name`
    pub fn image(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .map(|entry| entry.image.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ProgramCatalog for ProgramTable {
    fn resolve_executable(&self, name: &str) -> Option<ProgramDescriptor> {
        let key = name.to_lowercase();
        self.entries.get(&key).map(|entry| ProgramDescriptor {
            name: key.clone(),
            checksum: entry.checksum.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::EchoOnce;
    use crate::program::Driver;

    fn echo() -> Box<dyn Runnable> {
        Driver::boxed(EchoOnce::new("hi"))
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = ProgramTable::new().with("Echo", "#!echo v1", echo);
        assert_eq!(table.image("ECHO"), Some("#!echo v1"));
        assert!(table.instantiate("echo").is_some());
        assert!(table.instantiate("cat").is_none());
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["echo"]);
    }

    #[test]
    fn test_descriptor_carries_image_checksum() {
        let table = ProgramTable::new().with("echo", "#!echo v1", echo);
        let descriptor = table.resolve_executable("echo").unwrap();
        assert_eq!(descriptor.name, "echo");
        assert_eq!(descriptor.checksum, checksum(b"#!echo v1"));
    }

    #[test]
    fn test_reregistering_replaces() {
        let mut table = ProgramTable::new().with("echo", "v1", echo);
        table.register("echo", "v2", echo);
        assert_eq!(table.len(), 1);
        assert_eq!(table.image("echo"), Some("v2"));
    }
}
