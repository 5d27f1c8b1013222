//! Blocking facades over asynchronous calls.
//!
//! [`run_sync`] lets code without an async runtime, or code that must not
//! await on its current thread, drive a client call to completion. The call
//! runs on a separate worker thread, and its I/O is driven by a runtime
//! owned by this module, so blocking the caller can never starve the
//! executor the call needs.

use crate::{Error, Result};
use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Runtime};

/// Drives I/O and timers for every blocking call. Connections pooled by a
/// client during one call are bound to it.
static BRIDGE_RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn bridge_runtime() -> Result<&'static Runtime> {
    if let Some(runtime) = BRIDGE_RUNTIME.get() {
        return Ok(runtime);
    }

    let runtime = Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("partner-client-sync")
        .enable_all()
        .build()
        .map_err(|e| Error::Fatal(format!("failed to start worker runtime: {}", e)))?;
    Ok(BRIDGE_RUNTIME.get_or_init(|| runtime))
}

/// Runs `operation` to completion on a worker thread and returns its result.
///
/// The error returned by `operation` reaches the caller unchanged. A panic on
/// the worker is resumed on the calling thread.
///
/// Safe to call from inside a tokio runtime: the calling thread blocks, but
/// the operation never runs on it.
///
/// # Errors
///
/// Returns whatever `operation` returns, or [`Error::Fatal`] if the worker
/// runtime cannot be started.
///
/// # Examples
///
/// ```no_run
/// use partner_client::{sync::run_sync, PartnerClient, RequestDescriptor};
/// use http::Method;
///
/// fn customer_count(client: &PartnerClient) -> Result<u64, partner_client::Error> {
///     let request = RequestDescriptor::builder(Method::GET, "customers").build()?;
///     let page: serde_json::Value = run_sync(client.execute(request))?;
///     Ok(page["totalCount"].as_u64().unwrap_or(0))
/// }
/// ```
pub fn run_sync<F, T>(operation: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
    T: Send,
{
    std::thread::scope(|scope| {
        let worker = scope.spawn(move || bridge_runtime()?.block_on(operation));

        match worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    })
}

/// [`run_sync`] for operations without a result value.
pub fn run_sync_unit<F>(operation: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send,
{
    run_sync(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_error_passes_through_unchanged() {
        let result: Result<u32> = run_sync(async { Err(Error::Argument("x".to_string())) });
        match result {
            Err(Error::Argument(message)) => assert_eq!(message, "x"),
            other => panic!("Expected Argument error, got {:?}", other),
        }
    }

    #[test]
    fn test_runs_on_another_thread() {
        let caller = std::thread::current().id();
        let worker = run_sync(async { Ok(std::thread::current().id()) }).unwrap();
        assert_ne!(caller, worker);
    }

    #[test]
    fn test_borrows_from_caller() {
        let items = vec![1, 2, 3];
        let total = run_sync(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            Ok(items.iter().sum::<i32>())
        })
        .unwrap();
        assert_eq!(total, 6);
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn test_does_not_deadlock_inside_runtime() {
        run_sync_unit(async {
            tokio::task::yield_now().await;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_worker_panic_resumes_on_caller() {
        let _ = run_sync(async {
            if std::thread::current().name().is_none() {
                panic!("boom");
            }
            Ok(())
        });
    }
}
