//! Undo domain: reversible cancellation records and persistence trait.

pub mod model;
pub mod repository;

pub use model::{UndoAction, UndoKind};
pub use repository::UndoActionRepository;
