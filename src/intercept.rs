//! Suspension interceptor - brackets every poll of the request handler
//!
//! A handler future may return `Poll::Pending` many times before it produces
//! a response. Panels that install temporary, thread-bound state (a log sink,
//! for example) need that state present exactly while the handler is running
//! and absent while it is parked. [`Intercepted`] drives the wrapped future
//! and calls the registered hooks at those boundaries:
//!
//! ```text
//! poll ─► on_enter… ─► inner.poll() ─► on_exit… (reverse order) ─► result
//! ```
//!
//! - enter hooks run before the first poll and before every later poll
//! - exit hooks run after every `Pending`, and once after the final
//!   `Ready` or a panic (the panic then keeps unwinding)
//! - a dropped, unfinished future gets one last bracket: enter hooks, drop
//!   of the inner future, exit hooks
//!
//! The output is passed through untouched.

use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

/// A single enter or exit callback
pub type Hook = Box<dyn FnMut() + Send>;

/// Ordered enter/exit hook registries
#[derive(Default)]
pub struct HandlerHooks {
    on_enter: Vec<(&'static str, Hook)>,
    on_exit: Vec<(&'static str, Hook)>,
}

impl HandlerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook that runs before every poll
    pub fn on_enter(&mut self, name: &'static str, hook: impl FnMut() + Send + 'static) {
        self.on_enter.push((name, Box::new(hook)));
    }

    /// Register a hook that runs after every poll
    ///
    /// Exit hooks run in reverse registration order so that state installed
    /// by an earlier enter hook is torn down last.
    pub fn on_exit(&mut self, name: &'static str, hook: impl FnMut() + Send + 'static) {
        self.on_exit.push((name, Box::new(hook)));
    }

    pub fn is_empty(&self) -> bool {
        self.on_enter.is_empty() && self.on_exit.is_empty()
    }

    /// Wrap `future` so the hooks bracket each of its polls
    pub fn wrap<F: Future>(self, future: F) -> Intercepted<F> {
        Intercepted {
            inner: Some(Box::pin(future)),
            hooks: self,
            started: false,
        }
    }

    fn enter(&mut self) {
        for (name, hook) in self.on_enter.iter_mut() {
            run_hook(name, hook);
        }
    }

    fn exit(&mut self) {
        for (name, hook) in self.on_exit.iter_mut().rev() {
            run_hook(name, hook);
        }
    }
}

impl std::fmt::Debug for HandlerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |hooks: &[(&'static str, Hook)]| hooks.iter().map(|(n, _)| *n).collect::<Vec<_>>();
        f.debug_struct("HandlerHooks")
            .field("on_enter", &names(&self.on_enter))
            .field("on_exit", &names(&self.on_exit))
            .finish()
    }
}

/// A hook that panics is an instrumentation fault: log it and keep going
fn run_hook(name: &str, hook: &mut Hook) {
    if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
        tracing::warn!(hook = name, "Handler hook panicked; ignoring");
    }
}

/// Future returned by [`HandlerHooks::wrap`]
pub struct Intercepted<F: Future> {
    /// `None` once the inner future finished (or panicked)
    inner: Option<Pin<Box<F>>>,
    hooks: HandlerHooks,
    started: bool,
}

impl<F: Future> Future for Intercepted<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            panic!("Intercepted polled after completion");
        };

        this.started = true;
        this.hooks.enter();

        match catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Pending) => {
                this.hooks.exit();
                Poll::Pending
            }
            Ok(Poll::Ready(output)) => {
                this.inner = None;
                this.hooks.exit();
                Poll::Ready(output)
            }
            Err(payload) => {
                this.inner = None;
                this.hooks.exit();
                resume_unwind(payload)
            }
        }
    }
}

impl<F: Future> Drop for Intercepted<F> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        if !self.started {
            return;
        }

        // Cancelled mid-flight: let the handler release its resources inside
        // the same bracket it ran in.
        tracing::debug!("Instrumented handler cancelled before completion");
        self.hooks.enter();
        if catch_unwind(AssertUnwindSafe(move || drop(inner))).is_err() {
            tracing::warn!("Handler panicked while being cancelled");
        }
        self.hooks.exit();
    }
}
