//! Handler module - function registration and dispatch.
//!
//! Provides:
//! - [`FunctionRegistry`] - maps function names to handlers
//! - [`RequestContext`] - lets handlers respond on the calling connection
//!
//! # Example
//!
//! ```ignore
//! use wsrpc::handler::{FunctionRegistry, RequestContext};
//! use wsrpc::protocol::Payload;
//!
//! let registry = FunctionRegistry::new();
//!
//! registry.register("echo", |data: Payload, ctx: RequestContext| async move {
//!     ctx.respond(&data).await
//! });
//! ```

mod context;
mod registry;

pub use context::RequestContext;
pub use registry::{
    BoxFuture, DispatchOutcome, FunctionRegistry, Handler, HandlerResult, TypedHandler,
};
