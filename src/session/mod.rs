//! Interactive session management.
//!
//! A [`Session`] wraps the streams of one remote shell, serializes commands
//! against it and decides, via a [`DrainConfig`], when each command's output
//! is complete. Sessions are handed to callers as [`SessionId`] tokens kept
//! in a [`SessionStore`].

mod context;
mod drain;
mod id;
mod shell;
mod state;
mod store;

pub use context::SessionContext;
pub use drain::{
    DrainConfig, DrainStrategy, DEFAULT_CHUNK_SIZE, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_FIRST_OUTPUT, DEFAULT_INITIAL_CAPACITY, DEFAULT_QUIET_PERIOD, DEFAULT_READ_TIMEOUT,
};
pub use id::SessionId;
pub use shell::Session;
pub use state::SessionState;
pub use store::SessionStore;
