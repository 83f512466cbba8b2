//! Session domain: model, status state machine, persistence traits.

pub mod feedback;
pub mod model;
pub mod repository;

pub use feedback::{FeedbackRepository, SessionFeedback};
pub use model::{NoShowKind, Session, SessionSnapshot, SessionStatus};
pub use repository::SessionRepository;
