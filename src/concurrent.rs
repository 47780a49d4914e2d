//! Bounded concurrent map
//!
//! Runs one async unit of work per item with a fixed concurrency cap.
//! Results come back in submission order, and a panic in one unit is
//! captured as that item's failure instead of cancelling its siblings.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("worker panicked: {0}")]
  Panicked(String),
}

/// Apply `work` to every item with at most `concurrency` units in flight.
/// A zero limit is treated as one. The returned vector matches the input
/// order, with each slot carrying that item's own outcome.
pub async fn map_bounded<T, R, F, Fut>(
  concurrency: usize,
  items: Vec<T>,
  work: F,
) -> Vec<Result<R, WorkerError>>
where
  R: Send + 'static,
  F: Fn(T) -> Fut,
  Fut: Future<Output = R> + Send + 'static,
{
  let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
  let mut handles = Vec::with_capacity(items.len());

  for item in items {
    let semaphore = Arc::clone(&semaphore);
    let unit = work(item);
    handles.push(tokio::spawn(async move {
      // Never closed, so acquisition only fails if the runtime is torn down.
      let _permit = semaphore.acquire_owned().await.ok();
      unit.await
    }));
  }

  let mut results = Vec::with_capacity(handles.len());
  for handle in handles {
    results.push(
      handle
        .await
        .map_err(|join_error| WorkerError::Panicked(join_error.to_string())),
    );
  }
  results
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
