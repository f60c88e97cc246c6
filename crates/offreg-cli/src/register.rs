use std::sync::Arc;

use offreg_core::Registry;
use offreg_utils::map_concurrent;
use tracing::{debug, error};

use crate::error::{OffregError, OffregResult};

/// Offers every command line argument to the registry.
///
/// Arguments no backend accepted are returned in their original order, to be
/// handed to the installer.
pub async fn register_sources(
    registry: Arc<Registry>,
    sources: Vec<String>,
    concurrency: usize,
) -> OffregResult<Vec<String>> {
    let total = sources.len();

    let outcomes = map_concurrent(sources, concurrency, move |source| {
        let registry = Arc::clone(&registry);
        async move {
            let result = registry.register(&source).await;
            (source, result)
        }
    })
    .await?;

    let mut passthrough = Vec::new();
    let mut failed = 0;
    for (source, result) in outcomes {
        match result {
            Ok(0) => passthrough.push(source),
            Ok(count) => debug!("{source}: registered {count} package(s)"),
            Err(err) => {
                failed += 1;
                error!("{err}");
            }
        }
    }

    if failed > 0 {
        return Err(OffregError::Registration { failed, total });
    }

    Ok(passthrough)
}
