use std::error::Error;
use std::time::Duration;

use clap::Parser;
use wsrpc::{logging, Format, Payload, RequestContext, Server, ServerConfig};

/// Serve `echo` and `hello` over WebSocket RPC.
#[derive(Debug, Parser)]
#[command(name = "wsrpc-echo", version)]
struct Cli {
    /// Interface to bind
    #[arg(long, default_value = wsrpc::config::DEFAULT_HOST)]
    host: String,
    /// TCP port
    #[arg(short, long, default_value_t = wsrpc::config::DEFAULT_PORT)]
    port: u16,
    /// URL path accepting upgrades
    #[arg(long, default_value = wsrpc::config::DEFAULT_PATH)]
    path: String,
    /// Wire format: json, or msgpack (alias: binary)
    #[arg(short, long, default_value = "json")]
    format: Format,
    /// Pooled connection slots; 0 disables pooling
    #[arg(long, default_value_t = wsrpc::config::DEFAULT_POOL_CAPACITY)]
    pool_capacity: usize,
    /// Close connections idle for this many seconds
    #[arg(long)]
    read_timeout_secs: Option<u64>,
    /// Log per-connection activity
    #[arg(short, long)]
    verbose: bool,
}

impl From<Cli> for ServerConfig {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            path: cli.path,
            port: cli.port,
            verbose: cli.verbose,
            format: cli.format,
            pool_capacity: cli.pool_capacity,
            read_timeout: cli.read_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::from(Cli::parse());
    logging::init(&config);

    let server = Server::new(config)?;
    server
        .on("echo", |data: Payload, ctx: RequestContext| async move {
            ctx.respond(&data).await
        })
        .on("hello", |name: Option<String>, ctx: RequestContext| async move {
            let name = name.unwrap_or_else(|| "world".to_string());
            ctx.respond(&format!("Hello, {name}!")).await
        });

    let stopper = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => stopper.stop(),
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
        }
    });

    server.run().await?;
    Ok(())
}
