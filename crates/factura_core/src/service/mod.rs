//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store adapter calls into use-case level APIs.
//! - Enforce a deadline on every store call and log its outcome.
//!
//! # Invariants
//! - Services never bypass store adapter validation contracts.
//! - Store calls issued by one service run strictly one after another.

use crate::store::{StoreError, StoreResult};
use log::{debug, warn};
use std::future::Future;
use std::time::{Duration, Instant};

pub mod cascade;
pub mod customer_service;
pub mod invoice_service;
pub mod photo;

/// Deadline applied to each store call when none is configured.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs one store call under `deadline`, mapping expiry to
/// `StoreError::Unavailable`.
///
/// # Side effects
/// - Emits `store_call` logging events with backend, operation and duration.
pub(crate) async fn guarded<T, F>(
    backend: &'static str,
    op: &'static str,
    deadline: Duration,
    call: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let started_at = Instant::now();
    let result = match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "{op} timed out after {}ms",
            deadline.as_millis()
        ))),
    };

    match &result {
        Ok(_) => debug!(
            "event=store_call module=service status=ok backend={backend} op={op} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=store_call module=service status=error backend={backend} op={op} duration_ms={} error_code={}",
            started_at.elapsed().as_millis(),
            err.code()
        ),
    }
    result
}
