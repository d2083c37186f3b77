pub mod chat;
pub mod session;
pub mod users;

use parley_types::error::{DomainError, DomainResult};

/// All rusqlite work is blocking I/O; run it on tokio's bounded blocking pool
/// so a slow storage call cannot stall unrelated in-flight requests.
pub(crate) async fn run_blocking<T, F>(f: F) -> DomainResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> DomainResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::Internal(anyhow::anyhow!("blocking task failed: {e}")))?
}
