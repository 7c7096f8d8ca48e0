use clap::Parser;
use client::network::Client;
use log::info;
use shared::{ADMIN_PORT, DEFAULT_SERVER_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_SERVER_PORT))]
    server: String,

    /// Local port to bind (0 picks any free port)
    #[arg(short = 'p', long, default_value = "0")]
    port: u16,

    /// Bind the admin port so kick requests are honored
    #[arg(long, conflicts_with = "port")]
    admin: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    let args = Args::parse();

    let port = if args.admin { ADMIN_PORT } else { args.port };
    let bind_addr = format!("0.0.0.0:{}", port);

    info!("Connecting to: {}", args.server);
    if args.admin {
        info!("Running as admin on port {}", ADMIN_PORT);
    }
    info!("Type requests as command$content, e.g. conn$alice or say$hello");

    let client = Client::new(&args.server, &bind_addr).await?;
    client.run().await?;

    Ok(())
}
