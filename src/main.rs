//! adaptive-learner - learner modeling and learning path refinement CLI

use adaptive_learner::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Rustls 0.23 needs a process-wide crypto provider for HTTPS
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("Rustls crypto provider already installed");
    }

    // Logging is set up by the CLI once verbosity is known
    cli::run().await
}
