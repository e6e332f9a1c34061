//! Blocking entry points over the async chain.
//!
//! Handlers are free to await tokio timers and I/O, so the blocking API
//! drives the chain on a tokio runtime:
//!
//! - inside a multi-thread runtime the worker is handed over with
//!   `block_in_place` and the caller's runtime drives the future;
//! - inside a current-thread runtime the caller's thread is the only one that
//!   can drive that runtime, so the future runs on a scoped thread against the
//!   shared fallback runtime;
//! - outside any runtime the shared fallback runtime drives it directly.
//!
//! The fallback runtime is created on first use and lives for the rest of the
//! process.

use courier_core::{PipelineError, PipelineResult};
use std::future::Future;
use std::sync::OnceLock;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};

static FALLBACK: OnceLock<Runtime> = OnceLock::new();

fn fallback() -> PipelineResult<&'static Runtime> {
    if let Some(runtime) = FALLBACK.get() {
        return Ok(runtime);
    }
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("courier-blocking")
        .enable_all()
        .build()
        .map_err(|e| PipelineError::configuration(format!("cannot start blocking runtime: {e}")))?;
    tracing::debug!("blocking runtime started");
    // A runtime built by a racing thread is dropped here, outside any async context.
    Ok(FALLBACK.get_or_init(|| runtime))
}

/// Runs `future` to completion on the current thread.
pub(crate) fn block_on<F, T>(future: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>> + Send,
    T: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(future))
        }
        Ok(_) => std::thread::scope(|scope| {
            match scope.spawn(move || fallback()?.block_on(future)).join() {
                Ok(output) => output,
                Err(panic) => std::panic::resume_unwind(panic),
            }
        }),
        Err(_) => fallback()?.block_on(future),
    }
}
