mod cli;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (config, vapid) = match cli::run() {
        cli::RunOutcome::Serve { config, vapid } => (config, vapid),
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    };

    if let Err(err) = webpush_scheduler::serve(config, vapid).await {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }
}
