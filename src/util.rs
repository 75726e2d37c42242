//! Small async helpers shared by the network and process adapters.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::{RenewError, Result};

/// Run `fut` unless `cancel` fires first.
///
/// The future is dropped on cancellation, which aborts an in-flight
/// `reqwest` request or kills a child spawned with `kill_on_drop`.
pub async fn cancellable<F, T>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RenewError::Cancelled),
        result = fut => result,
    }
}
