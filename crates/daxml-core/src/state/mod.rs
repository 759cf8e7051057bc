//! State machine module.

pub mod handlers;
pub mod machine;

pub use handlers::{DaContext, Nested, Reply, resolve_next, send_command};
pub use machine::{FrameExpectation, SessionState};
