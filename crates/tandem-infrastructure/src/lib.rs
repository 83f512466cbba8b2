//! Infrastructure layer for Tandem.
//!
//! Implements the tandem-core collaborator traits: an in-memory
//! document store with conditional updates, a file-backed TOML session
//! store, a filesystem object store for evidence, a static identity
//! verifier, notification dispatchers, and a bounded retry helper.

pub mod dto;
pub mod identity;
pub mod memory;
pub mod notify;
pub mod object_store;
pub mod paths;
pub mod retry;
pub mod storage;
pub mod toml_session_repository;

pub use crate::identity::StaticTokenVerifier;
pub use crate::memory::InMemoryStore;
pub use crate::notify::{ChannelNotifier, TracingNotifier};
pub use crate::object_store::FsObjectStore;
pub use crate::retry::{RetryPolicy, with_retry};
pub use crate::toml_session_repository::TomlSessionRepository;
