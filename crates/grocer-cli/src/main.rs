mod cli;
mod commands;
mod config;
mod session;

use std::sync::Arc;

use clap::Parser;
use tracing::debug;

use grocer_client::GrocerClient;
use grocer_db::{Database, LocalBackend};
use grocer_types::events::{Notification, Severity};

use crate::cli::Cli;
use crate::commands::App;
use crate::config::Config;
use crate::session::SessionFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so --json output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "grocer=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    debug!("Using database {}", config.db_path.display());

    let db = Arc::new(Database::open(&config.db_path)?);
    let backend = Arc::new(LocalBackend::new(db, config.jwt_secret));
    let client = GrocerClient::new(backend.clone(), Arc::new(print_notification));

    let app = App {
        backend,
        client,
        session: SessionFile::new(config.session_path),
        json: cli.json,
    };
    app.restore().await?;
    app.run(cli.command).await
}

fn print_notification(notification: Notification) {
    match notification.severity() {
        Severity::Success => eprintln!("ok: {}", notification),
        Severity::Error => eprintln!("error: {}", notification),
    }
}
