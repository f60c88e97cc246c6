use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::UtilsError;

/// Runs `f` over every item with at most `limit` futures in flight.
///
/// Results are returned in the order of `items`, regardless of the order in
/// which the futures complete. A `limit` of zero is treated as one.
///
/// # Errors
///
/// Returns [`UtilsError::Task`] if a spawned task panics or is cancelled.
pub async fn map_concurrent<T, R, F, Fut>(
    items: Vec<T>,
    limit: usize,
    f: F,
) -> Result<Vec<R>, UtilsError>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let limit = limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit));
    let f = Arc::new(f);

    trace!(count = items.len(), limit, "starting bounded fan-out");

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| UtilsError::Task(err.to_string()))?;
        let f = f.clone();

        handles.push(tokio::spawn(async move {
            let result = f(item).await;
            drop(permit);
            result
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(
            handle
                .await
                .map_err(|err| UtilsError::Task(format!("Join handle error: {err}")))?,
        );
    }

    Ok(results)
}
