//! Pluggable `Mind` capability: the opaque language-model client every Cell
//! thinks through (§9 "Pluggable Mind"). Concrete provider HTTP clients are out
//! of scope (§1) — this crate defines only the capability boundary and the
//! message/tool-call types that cross it.

pub mod mind;
pub mod ollama;
pub mod types;

pub use mind::{Mind, MindError, MindResult};
pub use ollama::OllamaMind;
pub use types::*;
