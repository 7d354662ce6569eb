use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

thread_local! {
    static LOG_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// A scope guard that sets a logging context and restores the previous one when dropped.
///
/// # Examples
///
/// ```rust
/// use catalog_migrator::primitives::logger::LogContext;
///
/// {
///     let _ctx = LogContext::new("TargetClient");
///     catalog_migrator::info!("This will be prefixed with [TargetClient]");
/// } // Context automatically cleared here
/// ```
pub struct LogContext {
    previous: Option<String>,
}

impl LogContext {
    /// Creates a new logging context scope.
    ///
    /// The context will be active until this `LogContext` is dropped.
    #[must_use]
    pub fn new(module: &str) -> Self {
        let previous = LOG_CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let prev = ctx.clone();
            *ctx = Some(format!("[{module}]"));
            prev
        });

        Self { previous }
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        LOG_CONTEXT.with(|ctx| {
            (*ctx.borrow_mut()).clone_from(&self.previous);
        });
    }
}

/// A future that enters its logging context each time it is polled.
///
/// The context is only set while the inner future runs. It follows the task across
/// `.await` points and worker threads, and is gone while the task is suspended.
#[must_use = "futures do nothing unless awaited"]
pub struct WithLogContext<F> {
    module: String,
    inner: Pin<Box<F>>,
}

impl<F: Future> Future for WithLogContext<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let _ctx = LogContext::new(&self.module);
        self.inner.as_mut().poll(cx)
    }
}

/// Runs `future` with `module` as its logging context. Async exports use this instead of
/// a `LogContext` guard, which would stay on the thread while the task is suspended.
pub fn with_log_context<T, F>(module: &str, future: F) -> WithLogContext<F>
where
    F: Future<Output = T>,
{
    WithLogContext {
        module: module.to_string(),
        inner: Box::pin(future),
    }
}

/// Gets the current logging context, if any.
#[must_use]
pub fn get_context() -> Option<String> {
    LOG_CONTEXT.with(|ctx| ctx.borrow().clone())
}
