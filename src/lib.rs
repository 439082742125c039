//! # wsrpc
//!
//! Bidirectional RPC over persistent WebSocket connections.
//!
//! Clients send `{function, data}` records; the server looks the function up
//! in a registry and runs its handler as an independent task, which answers
//! on the same connection. Requests and responses are JSON in text frames or
//! MessagePack in binary frames, chosen once per server.
//!
//! ## Architecture
//!
//! - **Transport**: upgraded WebSocket (or in-memory channels in tests) as a
//!   sink and stream of [`Frame`](protocol::Frame)s
//! - **Connection**: handles with exclusive writes, recycled through a
//!   fixed-capacity pool
//! - **Dispatch**: one read loop per connection racing reads against a
//!   shared shutdown signal
//!
//! ## Example
//!
//! ```ignore
//! use wsrpc::{Payload, RequestContext, Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> wsrpc::Result<()> {
//!     let server = Server::new(ServerConfig::default())?;
//!     server.on("echo", |data: Payload, ctx: RequestContext| async move {
//!         ctx.respond(&data).await
//!     });
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::Client;
pub use codec::{Codec, Format};
pub use config::{ConfigError, ServerConfig};
pub use dispatch::{ConnectionExit, ConnectionState, Dispatcher};
pub use error::{Result, RpcError};
pub use handler::{FunctionRegistry, RequestContext};
pub use protocol::Payload;
pub use server::Server;
