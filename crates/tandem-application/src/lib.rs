//! Application services for the Tandem session coordination core.
//!
//! Each service composes the domain model with the persistence traits
//! from `tandem_core` and an injected notifier. Services hold only
//! `Arc<dyn Trait>` handles, so any storage backend or notification
//! transport plugs in.

pub mod booking;
pub mod confirmation;
pub mod dispute;
pub mod jobs;
pub mod ledger;
pub mod undo;

pub use booking::BookingService;
pub use confirmation::{CompletionOutcome, ConfirmationService, EarlyEnding};
pub use dispute::DisputeService;
pub use jobs::{JobKind, JobOutcome, JobRunner};
pub use ledger::ReputationLedger;
pub use undo::{Cancellation, UndoManager};
