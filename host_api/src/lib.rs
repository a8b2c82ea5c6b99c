//! # Host API
//!
//! This crate defines the interface between the host simulation core and the
//! world around it.
//!
//! ## Philosophy
//!
//! The core provides **mechanisms**, collaborators provide **data**:
//! - Time is explicit and virtual, never ambient
//! - Errors a user may see are typed and carry their exact message
//! - Accounts, program images and diagnostic storage come in through traits
//!
//! ## Non-Goals
//!
//! This is NOT:
//! - A terminal transport or login UI
//! - A credential store (only the lookup contract lives here)
//! - A persistence layer

pub mod collab;
pub mod error;
pub mod time;

pub use collab::{
    checksum, Account, AccountDirectory, IncidentReport, IncidentSink, InMemoryAccounts,
    MemoryIncidentSink, ProgramCatalog, ProgramDescriptor, StoredAccount, PBKDF2_ROUNDS,
};
pub use error::{OsError, ValueError};
pub use time::{Duration, Instant};
