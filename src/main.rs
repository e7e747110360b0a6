//! quill server entry point

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use quill::auth::email::{EmailSender, SmtpEmailSender};
use quill::auth::service::AuthService;
use quill::auth::user::InMemoryUserStore;
use quill::config::Config;
use quill::http_server::{self, AppState};

/// quill - blog platform REST API
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the API server
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./quill.toml")]
        config: PathBuf,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill=info,tower_http=info".into()),
        )
        .init();

    let Cli { command } = Cli::parse();
    match command {
        Command::Serve { config, port } => {
            let mut config = match Config::load(&config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("failed to load configuration: {e}");
                    std::process::exit(1);
                }
            };
            if let Some(port) = port {
                config.server.port = port;
            }

            let mailer: Option<Arc<dyn EmailSender>> = match &config.smtp {
                Some(smtp) => match SmtpEmailSender::new(smtp) {
                    Ok(sender) => Some(Arc::new(sender)),
                    Err(e) => {
                        eprintln!("failed to configure SMTP transport: {e}");
                        std::process::exit(1);
                    }
                },
                None => {
                    tracing::warn!("no [smtp] section configured; outgoing mail will be logged only");
                    None
                }
            };

            let store = Arc::new(InMemoryUserStore::new());
            let service = Arc::new(AuthService::new(store, mailer, config.auth.clone()));
            let state = AppState { service };

            if let Err(e) = http_server::serve(&config, state).await {
                eprintln!("server error: {e}");
                std::process::exit(1);
            }
        }
    }
}
