//! Concurrent fan-out over independent resources.

use media_sync_sources::SourceError;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetching {id} failed: {source}")]
    Resource {
        id: String,
        #[source]
        source: SourceError,
    },

    #[error("fetch task for {id} did not complete: {message}")]
    Task { id: String, message: String },
}

/// Successful fetches in input order, plus the ids that came back not-found
#[derive(Debug)]
pub struct FetchOutcome<T> {
    pub fetched: Vec<T>,
    pub not_found: Vec<String>,
}

/// Run `fetch` for every id concurrently.
///
/// Not-found results are collected separately and never fail the batch. The
/// first other error fails the whole batch, but only after every in-flight
/// fetch has settled.
pub async fn fetch_all<T, F, Fut>(ids: Vec<String>, fetch: F) -> Result<FetchOutcome<T>, FetchError>
where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handles = Vec::with_capacity(ids.len());

    for (index, id) in ids.into_iter().enumerate() {
        let tx = tx.clone();
        let task = fetch(id.clone());
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            let result = task.await;
            // the receiver outlives every sender
            let _ = tx.send((index, task_id, result));
        });
        handles.push((id, handle));
    }
    drop(tx);

    let mut fetched = Vec::new();
    let mut not_found = Vec::new();
    let mut first_error = None;

    while let Some((index, id, result)) = rx.recv().await {
        match result {
            Ok(value) => fetched.push((index, value)),
            Err(e) if e.is_not_found() => {
                debug!(id = %id, "Resource not found, skipping");
                not_found.push(id);
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Fetch failed");
                if first_error.is_none() {
                    first_error = Some(FetchError::Resource { id, source: e });
                }
            }
        }
    }

    for (id, handle) in handles {
        if let Err(e) = handle.await {
            warn!(id = %id, "Fetch task aborted: {}", e);
            if first_error.is_none() {
                first_error = Some(FetchError::Task {
                    id,
                    message: e.to_string(),
                });
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    fetched.sort_by_key(|(index, _)| *index);
    Ok(FetchOutcome {
        fetched: fetched.into_iter().map(|(_, value)| value).collect(),
        not_found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_not_found_is_not_fatal() {
        let outcome = fetch_all(ids(&["A", "B"]), |id| async move {
            if id == "B" {
                Err(SourceError::ResourceUnavailable(id))
            } else {
                Ok(id)
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.fetched, vec!["A".to_string()]);
        assert_eq!(outcome.not_found, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let outcome = fetch_all(ids(&["slow", "fast", "medium"]), |id| async move {
            let delay = match id.as_str() {
                "slow" => 30,
                "medium" => 15,
                _ => 0,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok::<_, SourceError>(id)
        })
        .await
        .unwrap();

        assert_eq!(outcome.fetched, ids(&["slow", "fast", "medium"]));
    }

    #[tokio::test]
    async fn test_fatal_error_waits_for_in_flight_work() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();

        let err = fetch_all(ids(&["broken", "a", "b"]), move |id| {
            let counter = counter.clone();
            async move {
                if id == "broken" {
                    return Err(SourceError::Captcha);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(id)
            }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::Resource { ref id, source: SourceError::Captcha } if id == "broken"));
        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = fetch_all(Vec::new(), |id| async move { Ok::<_, SourceError>(id) })
            .await
            .unwrap();
        assert!(outcome.fetched.is_empty());
        assert!(outcome.not_found.is_empty());
    }
}
