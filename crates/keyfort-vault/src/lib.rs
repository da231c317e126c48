//! keyfort-vault: wires the cryptographic core to its collaborators.
//!
//! Persistence and mail delivery are seams — traits the surrounding
//! application implements over its document store and mail provider.
//! Everything user-facing flows through [`service::VaultService`], which
//! owns the policy decisions: re-key requires the old secret, legacy
//! credentials route to migration, high-sensitivity entries demand the
//! step-up gate per operation, and recovery is a deliberate master-secret
//! bypass that touches only escrow ciphertexts.

pub mod mailer;
pub mod service;
pub mod store;

pub use mailer::{ReminderMail, ReminderMailer};
pub use service::{NewSecret, VaultService};
pub use store::{MemoryStore, VaultStore};
