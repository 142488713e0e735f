//! Data models shared by the shaping, normalization and store layers.
//!
//! Wire-facing structs use camelCase to match the API envelopes they are read from.

mod entity;
mod paginator;
mod params;
mod payload;
mod source;

pub use entity::*;
pub use paginator::*;
pub use params::*;
pub use payload::*;
pub use source::*;
