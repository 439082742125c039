//! Protocol module - frames and message records.
//!
//! This module defines what travels over a connection:
//! - [`Frame`] - one transport message tagged as text or binary
//! - [`Request`] - the `{function, data}` record a client sends
//! - [`ErrorResponse`] - the record sent back when a call fails

mod frame;
mod message;

pub use frame::{Frame, FrameKind};
pub use message::{ErrorResponse, Payload, Request};
