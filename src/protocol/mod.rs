//! Agent wire vocabulary and its mapping to client events.
//!
//! - `messages`: fixed correlation ids, request builders, field accessors.
//! - `prompt`: initial prompt resolution and alert instructions.
//! - `translator`: agent message → external events.
//! - `events`: the external event vocabulary.

pub mod events;
pub mod messages;
pub mod prompt;
pub mod translator;

pub use events::{EventName, ExternalEvent};
pub use translator::translate;
