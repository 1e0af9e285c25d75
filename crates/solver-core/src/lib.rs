//! # Solver Core
//!
//! Server half of the Solver relay.
//!
//! ```text
//! solver-core/src/relay/
//! ├── server.rs      # Axum router, AppState, RelayServer
//! ├── security.rs    # Caller auth boundary (bearer key, privileged flag)
//! ├── credential.rs  # Effective upstream key resolution
//! ├── request.rs     # Multipart -> validated upstream request body
//! ├── upstream.rs    # Blocking + streaming calls to the model endpoint
//! ├── sse.rs         # Upstream SSE frame assembly and payload decoding
//! ├── events.rs      # Shape-tolerant text/usage extraction
//! ├── stream.rs      # Relay state machine + fallback completion guard
//! └── handlers/      # /api/solve and /api/solve-stream
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "RwLock guards in async code require careful lifetime management"
)]

pub mod error;
pub mod relay;

pub use error::{AppError, AppResult};
