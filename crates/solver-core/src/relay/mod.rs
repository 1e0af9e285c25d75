//! Inference relay: forwards solve requests to the generative endpoint and
//! re-frames the upstream stream into the outgoing three-event protocol.

pub mod config;
pub mod credential;
pub mod events;
pub mod handlers;
pub mod request;
pub mod security;
pub mod server;
pub mod sse;
pub mod stream;
pub mod upstream;

pub use config::RelayConfig;
pub use security::{CallerIdentity, RelaySecurityConfig};
pub use server::{
    build_relay_router, build_relay_router_with_shared_state, AppState, RelayServer,
};
