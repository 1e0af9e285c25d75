//! # Solver Client
//!
//! Rust SDK for the Solver relay. Owns the caller side of the system: an
//! ordered pool of upstream keys with a persisted rotation cursor, failure
//! classification, and a sequential retry loop that walks the pool until
//! one attempt succeeds.
//!
//! ```no_run
//! use solver_client::{Dispatcher, FileRotationStore, SolveRequest, SolverClient};
//!
//! # async fn run() -> Result<(), solver_client::ClientError> {
//! let client = SolverClient::new(Default::default())?;
//! let store = FileRotationStore::new("rotation.json");
//! let dispatcher = Dispatcher::new(client, store);
//!
//! let request = SolveRequest::from_prompt("2+2=");
//! let outcome = dispatcher
//!     .solve_stream(&request, &mut |delta| print!("{delta}"))
//!     .await?;
//! println!("\n-- {}", outcome.model);
//! # Ok(())
//! # }
//! ```

mod classify;
mod client;
mod dispatch;
mod error;
mod rotation;
mod types;

pub use classify::{invalid_reason, is_credential_error};
pub use client::SolverClient;
pub use dispatch::Dispatcher;
pub use error::ClientError;
pub use rotation::{Attempt, FileRotationStore, MemoryRotationStore, RotationState, RotationStore};
pub use types::{ClientConfig, ImageUpload, SolveRequest};

pub use solver_types::credential::{mask_key, InvalidMark, InvalidReason};
pub use solver_types::protocol::SolveResponse;
