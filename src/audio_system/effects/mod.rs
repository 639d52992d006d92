/// Audio effects module
///
/// Per-tick fades and the volume buses that scale channel output.

pub mod fade;
pub mod volume;

pub use fade::{Fade, FadeCompletion, FadeController, FadeKind, FadeOutcome};
pub use volume::{db_to_linear, linear_to_db, VolumeBus, MAX_DB, MIN_DB};
