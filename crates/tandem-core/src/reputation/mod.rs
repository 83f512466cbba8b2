//! Reputation domain: vouch score, ledger events, persistence traits.

pub mod model;
pub mod repository;

pub use model::{UserReputation, VouchEventKind, VouchScoreEvent};
pub use repository::{UserRepository, VouchHistoryRepository};
