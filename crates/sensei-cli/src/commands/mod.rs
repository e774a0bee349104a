pub mod preferences;
pub mod price;
pub mod purge;

use sensei_memory::AgentCoreBackend;
use std::sync::Arc;

/// Build the backend client for a region, picking up the workload token
/// from the environment when present.
pub fn backend(region: &str) -> Arc<AgentCoreBackend> {
    let mut backend = AgentCoreBackend::new(region);
    if let Ok(token) = std::env::var("SAKE_AGENT_MEMORY_TOKEN") {
        backend = backend.with_bearer_token(token);
    }
    if let Ok(endpoint) = std::env::var("SAKE_AGENT_MEMORY_ENDPOINT") {
        backend = backend.with_base_url(endpoint);
    }
    Arc::new(backend)
}
