pub mod auth;
pub mod connections;
pub mod credits;
pub mod error;
pub mod files;
pub mod meet;
pub mod meetings;
pub mod messages;
pub mod middleware;
pub mod threads;

#[cfg(test)]
mod testutil;

use error::ApiError;
use tracing::error;

/// Run blocking DB work off the async runtime, mapping both join and
/// query failures to the internal error.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            Err(ApiError::Internal)
        }
    }
}
