use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use shared::{ADMIN_PORT, DEFAULT_SERVER_PORT};
use std::sync::Arc;
use std::time::Duration;

/// Main-method of the chat server.
/// Parses command-line arguments, then runs the server until Ctrl+C or a socket failure.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
        /// Source port allowed to kick users
        #[clap(long, default_value_t = ADMIN_PORT)]
        admin_port: u16,
        /// Seconds of silence before a client is probed
        #[clap(long, default_value = "120", value_parser = clap::value_parser!(u64).range(1..))]
        inactivity_secs: u64,
        /// Seconds a probed client has to answer
        #[clap(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        probe_timeout_secs: u64,
        /// Liveness monitor interval in milliseconds
        #[clap(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
        monitor_interval_ms: u64,
        /// Number of chat lines replayed to joining clients
        #[clap(long, default_value = "15")]
        history_size: usize,
        /// Maximum number of clients tracked for liveness
        #[clap(long, default_value = "100")]
        max_clients: usize,
    }

    env_logger::init();

    // Parse command line arguments
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        admin_port: args.admin_port,
        inactivity_threshold: Duration::from_secs(args.inactivity_secs),
        probe_timeout: Duration::from_secs(args.probe_timeout_secs),
        monitor_interval: Duration::from_millis(args.monitor_interval_ms),
        history_size: args.history_size,
        max_clients: args.max_clients,
    };

    let server = Arc::new(Server::new(config).await?);
    let shutdown = server.shutdown_handle();

    // Spawn request-handling loop
    let mut server_handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run().await })
    };

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
                Ok(Ok(())) => {}
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    shutdown.shutdown();
    if let Err(e) = server_handle.await {
        error!("Server task panicked: {}", e);
    }

    Ok(())
}
