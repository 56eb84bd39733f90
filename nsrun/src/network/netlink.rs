//! Shared netlink plumbing: spins up a current-thread Tokio runtime to drive
//! `rtnetlink` for the duration of one call, matching spec §1 ("the raw
//! netlink wire protocol is delegated to a platform library") and §5's
//! predominantly-serial concurrency model — each CLI invocation is one-shot,
//! so there is no benefit to keeping a runtime alive across calls.

use crate::error::RuntimeError;
use futures::stream::TryStreamExt;
use rtnetlink::Handle;
use std::future::Future;

/// Run `f` against a fresh netlink connection on a dedicated current-thread
/// runtime, blocking the calling (synchronous) call site until it resolves.
pub fn with_handle<F, Fut, T>(f: F) -> Result<T, RuntimeError>
where
    F: FnOnce(Handle) -> Fut,
    Fut: Future<Output = Result<T, RuntimeError>>,
{
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RuntimeError::Netlink(format!("failed to start runtime: {e}")))?;

    rt.block_on(async move {
        let (connection, handle, _messages) = rtnetlink::new_connection()
            .map_err(|e| RuntimeError::Netlink(format!("failed to open netlink socket: {e}")))?;
        tokio::spawn(connection);
        f(handle).await
    })
}

/// Resolve a link's kernel index by name.
pub async fn link_index_by_name(handle: &Handle, name: &str) -> Result<u32, RuntimeError> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    match links
        .try_next()
        .await
        .map_err(|e| RuntimeError::Netlink(format!("link lookup for `{name}` failed: {e}")))?
    {
        Some(msg) => Ok(msg.header.index),
        None => Err(RuntimeError::NotFound(format!("no such network interface `{name}`"))),
    }
}

/// True if a link with this name already exists.
pub async fn link_exists(handle: &Handle, name: &str) -> Result<bool, RuntimeError> {
    match link_index_by_name(handle, name).await {
        Ok(_) => Ok(true),
        Err(RuntimeError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
