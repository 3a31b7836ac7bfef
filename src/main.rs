use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanwatch::config::OrchestratorConfig;
use scanwatch::orchestrator::Orchestrator;
use scanwatch::provider::{CloudProvider, Provider, ProviderRegistry};
use scanwatch::store::memory::InMemoryStore;

/// Stand-in adapter for externally managed scanner runners; real cloud
/// adapters register here in deployments.
struct ExternalProvider;

impl Provider for ExternalProvider {
    fn kind(&self) -> CloudProvider {
        CloudProvider::External
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = OrchestratorConfig::from_env();
    tracing::info!(?config, "loaded configuration");

    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(ExternalProvider)).unwrap();

    // In-memory store: dry-run mode, reconciling whatever gets seeded into
    // the process. The REST-backed store slots in behind the same trait.
    let store = Arc::new(InMemoryStore::new());

    let orchestrator = Orchestrator::new(store, Arc::new(providers), config);
    let cancel = orchestrator.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            cancel.cancel();
        }
    });

    orchestrator.run().await;
}
