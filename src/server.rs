//! WebSocket server facade.
//!
//! [`Server`] ties the pieces together: it validates a [`ServerConfig`],
//! builds the registry, pool and [`Dispatcher`], and exposes an axum
//! [`Router`] whose single route upgrades requests on the configured path.
//!
//! # Example
//!
//! ```ignore
//! let server = Server::new(ServerConfig::default())?;
//! server.on("echo", |data: Payload, ctx: RequestContext| async move {
//!     ctx.respond(&data).await
//! });
//!
//! let token = server.shutdown_token();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     token.cancel();
//! });
//!
//! server.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::codec::Codec;
use crate::config::{ConfigError, ServerConfig};
use crate::connection::ConnectionPool;
use crate::dispatch::{ConnectionState, Dispatcher};
use crate::error::Result;
use crate::handler::{FunctionRegistry, HandlerResult, RequestContext};
use crate::transport::Transport;

/// RPC server over WebSocket.
///
/// Clones share the registry, pool and shutdown signal.
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    dispatcher: Dispatcher,
}

impl Server {
    /// Build a server from a validated configuration.
    pub fn new(config: ServerConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let registry = Arc::new(FunctionRegistry::new());
        let mut dispatcher = Dispatcher::new(registry, Codec::new(config.format))
            .with_read_timeout(config.read_timeout);
        if config.pool_capacity > 0 {
            dispatcher = dispatcher.with_pool(Arc::new(ConnectionPool::new(config.pool_capacity)));
        }

        Ok(Self { config, dispatcher })
    }

    /// Register a function. May be called while serving.
    pub fn on<F, T, Fut>(&self, name: impl Into<String>, handler: F) -> &Self
    where
        F: Fn(T, RequestContext) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.dispatcher.registry().register(name, handler);
        self
    }

    /// Configuration the server was built from.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registry shared by every connection.
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        self.dispatcher.registry()
    }

    /// Dispatcher serving each upgraded connection.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Token that stops the server when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.dispatcher.shutdown_token().clone()
    }

    /// Stop accepting upgrades and drain every connection.
    pub fn stop(&self) {
        tracing::info!("shutdown requested");
        self.dispatcher.shutdown();
    }

    /// Router with the upgrade route on the configured path.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.config.path, get(upgrade))
            .with_state(self.dispatcher.clone())
    }

    /// Bind the configured address and serve until stopped.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.bind_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until stopped.
    ///
    /// Returns once every connection loop and the handlers they dispatched
    /// have finished.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            %addr,
            path = %self.config.path,
            format = %self.config.format,
            pool = self.config.pool_capacity,
            "server listening"
        );

        let token = self.shutdown_token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await?;

        let active = self.dispatcher.active();
        if active > 0 {
            tracing::info!(active, "draining connections");
        }
        self.dispatcher.wait().await;
        tracing::info!("server stopped");
        Ok(())
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(dispatcher): State<Dispatcher>) -> Response {
    if dispatcher.shutdown_token().is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    tracing::debug!(state = %ConnectionState::Connecting, "upgrade requested");

    ws.on_failed_upgrade(|e| tracing::debug!(error = %e, "upgrade failed"))
        .on_upgrade(move |socket| async move {
            let exit = dispatcher.spawn(Transport::from(socket)).await;
            if let Err(e) = exit {
                tracing::error!(error = %e, "connection task failed");
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Format;
    use crate::protocol::Payload;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert_eq!(Server::new(config).unwrap_err(), ConfigError::InvalidPort(0));

        let config = ServerConfig {
            path: "ws".into(),
            ..Default::default()
        };
        assert!(matches!(
            Server::new(config).unwrap_err(),
            ConfigError::InvalidPath(_)
        ));

        let config = ServerConfig {
            path: "/rpc/:id".into(),
            ..Default::default()
        };
        assert!(matches!(
            Server::new(config).unwrap_err(),
            ConfigError::InvalidPath(_)
        ));
    }

    #[test]
    fn test_router_builds_for_nested_path() {
        let server = Server::new(ServerConfig {
            path: "/api/v1/ws".into(),
            ..Default::default()
        })
        .unwrap();
        let _router = server.router();
    }

    #[test]
    fn test_pool_follows_capacity() {
        let server = Server::new(ServerConfig::default()).unwrap();
        assert_eq!(server.dispatcher().pool().map(|p| p.capacity()), Some(128));

        let unpooled = Server::new(ServerConfig {
            pool_capacity: 0,
            ..Default::default()
        })
        .unwrap();
        assert!(unpooled.dispatcher().pool().is_none());
    }

    #[test]
    fn test_format_reaches_dispatcher() {
        let server = Server::new(ServerConfig {
            format: Format::MsgPack,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(server.dispatcher().codec().format(), Format::MsgPack);
    }

    #[test]
    fn test_on_registers_into_shared_registry() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let clone = server.clone();

        server
            .on("a", |_: Payload, _ctx| async { Ok(()) })
            .on("b", |_: Payload, _ctx| async { Ok(()) });

        assert_eq!(clone.registry().names(), vec!["a".to_string(), "b".to_string()]);
        let _router = server.router();
    }

    #[tokio::test]
    async fn test_stop_before_serve_returns() {
        let server = Server::new(ServerConfig::default()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        server.stop();
        server.serve(listener).await.unwrap();
        assert!(server.shutdown_token().is_cancelled());
    }
}
