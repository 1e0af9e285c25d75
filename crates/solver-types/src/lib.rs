//! # Solver Types
//!
//! Wire protocol and shared data types for the Solver relay.
//!
//! This crate sits at the bottom of the dependency graph and is consumed by
//! both halves of the system:
//!
//! - **`protocol`** - HTTP/SSE message shapes exchanged between the client
//!   SDK and the relay server
//! - **`credential`** - invalid-credential categories and key masking shared
//!   by the client-side rotator and anything that displays pool state
//!
//! All types are `Serialize`/`Deserialize`, `Clone`, and `PartialEq` so they
//! can cross the HTTP boundary and be asserted on in tests.

pub mod credential;
pub mod protocol;

pub use credential::{mask_key, InvalidMark, InvalidReason};
pub use protocol::{ErrorBody, ErrorEvent, ChunkEvent, DoneEvent, SolveResponse};
