//! Event types broadcast by the engine.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them over any transport unchanged.

pub mod events;
