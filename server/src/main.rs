use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig, ServerMessage};
use shared::{DEFAULT_PORT, MAX_CLIENTS};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Main-method of the application.
/// Parses command-line arguments, starts the server loop and the operator console.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Tick rate (updates per second)
        #[clap(short, long, default_value = "60")]
        tick_rate: u32,
        /// Number of asteroids in the field
        #[clap(short, long, default_value = "1000")]
        asteroids: usize,
        /// Seconds a silent client survives before eviction
        #[clap(long, default_value = "30")]
        client_ttl: u64,
        /// World seed (defaults to the process id)
        #[clap(short, long)]
        seed: Option<u32>,
    }

    // Parse command line arguments
    let args = Args::parse();

    let config = ServerConfig {
        addr: format!("{}:{}", args.host, args.port),
        tick_duration: Duration::from_secs_f32(1.0 / args.tick_rate as f32),
        max_clients: MAX_CLIENTS,
        client_ttl: Duration::from_secs(args.client_ttl),
        asteroid_count: args.asteroids,
        seed: args.seed.unwrap_or_else(std::process::id),
    };

    let mut server = Server::new(config).await?;

    // Operator console: 'r' reshuffles the asteroid field, 'q' quits.
    let console_handle = spawn_console(server.command_sender());

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down gracefully");
        }
    }

    console_handle.abort();
    Ok(())
}

/// Reads operator commands from stdin and forwards them to the server loop.
fn spawn_console(
    commands: mpsc::UnboundedSender<ServerMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "r" => {
                    if commands.send(ServerMessage::Regenerate).is_err() {
                        break;
                    }
                }
                "q" => {
                    let _ = commands.send(ServerMessage::Shutdown);
                    break;
                }
                "" => {}
                other => info!("unknown console command: {:?}", other),
            }
        }
    })
}
