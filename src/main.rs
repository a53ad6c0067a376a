use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dentascribe::cli::args::{Cli, Commands};
use dentascribe::{cli, session, settings};

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    // Silently ignore if not found - production uses system env vars
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "dentascribe=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Cli::parse();
    let settings = settings::load_settings();

    let result = match args.command {
        None | Some(Commands::Session) => {
            session::run_session(settings).await;
            Ok(())
        }
        Some(Commands::Transcribe(args)) => cli::transcribe::run(args, &settings).await,
        Some(Commands::Note(args)) => cli::note::run(args, &settings).await,
        Some(Commands::Key(args)) => cli::key::run(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
