mod handlers;
mod server;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "teamlock",
    about = "Teamlock — distributed lock manager and conflict resolver for collaborating teams",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Teamlock HTTP coordination server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3200")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "TEAMLOCK_STORAGE")]
        storage: String,

        /// Default lock TTL in minutes
        #[arg(long, default_value = "30", env = "TEAMLOCK_TTL_MINUTES")]
        ttl_minutes: u64,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            ttl_minutes,
        } => {
            server::run(&host, port, &storage, ttl_minutes).await;
        }
        Commands::Version => {
            println!("teamlock {}", env!("CARGO_PKG_VERSION"));
            println!("Lock coordination and conflict resolution for multi-member teams");
        }
    }
}
