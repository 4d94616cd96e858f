pub mod enums;
pub mod error;
pub mod lifecycle;

// Re-export the core types to provide a clean public API.
pub use enums::State;
pub use error::{Categorized, CoreError, ErrorCategory};
pub use lifecycle::{BoxError, StateMachine, StateMachineBuilder, TransitionError};
