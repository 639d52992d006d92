/// State management module
///
/// Lifecycle of the sound manager with validated transitions.

pub mod lifecycle;

// Re-export commonly used types
pub use lifecycle::{Lifecycle, LifecycleMachine, TransitionError};
