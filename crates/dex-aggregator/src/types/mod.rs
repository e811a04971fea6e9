/*
[INPUT]:  Real-time payload definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for stream adapters
[UPDATE]: When payload schema changes or new types added
*/

pub mod enums;
pub mod models;
pub(crate) mod serde_helpers;
pub(crate) mod wire;

pub use enums::*;
pub use models::*;
