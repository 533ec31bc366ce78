//! Board sync: the coordinator, its change events and dialog state.

pub mod events;
pub mod modal;
pub mod store;

pub use events::BoardEvent;
pub use modal::ModalState;
pub use store::{BoardOptions, BoardStore, MoveOutcome};
