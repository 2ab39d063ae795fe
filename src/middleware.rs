//! Middleware: ordered interceptors composed around the raw update.
//!
//! The chain is walked front to back, so the first middleware registered
//! on a slice sees an action first and the last one sits directly against
//! the raw update. That walk is the iterative form of composing the
//! interceptors right to left around the reducer.
//!
//! Failure semantics: an error from any middleware aborts delivery. The
//! reducer does not run, later middleware do not run, and the error is
//! returned to the dispatch caller unchanged (wrapped in
//! [`DispatchError::Middleware`](crate::DispatchError)). Nothing is caught
//! or retried; middleware correctness is the integrating application's
//! responsibility.

use std::sync::Arc;

use anyhow::Context as _;

use crate::action::Action;
use crate::error::DispatchError;
use crate::SliceValue;

/// A dispatch interceptor for one slice.
///
/// Implementations decide whether to pass the action along with
/// [`Next::run`], transform it, swallow it (by not calling `next`), or
/// fail it. The context allows peeking at current state and re-entering
/// the full chain with a new action.
pub trait Middleware: Send + Sync {
    /// Label used in logs and error chains.
    fn name(&self) -> &'static str {
        "middleware"
    }

    /// Intercept `action` on its way to the reducer.
    fn around(
        &self,
        action: Action,
        ctx: &MiddlewareCtx<'_>,
        next: Next<'_>,
    ) -> anyhow::Result<()>;
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn around(
        &self,
        action: Action,
        ctx: &MiddlewareCtx<'_>,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        (**self).around(action, ctx, next)
    }
}

/// Capabilities available to a middleware while it handles an action.
pub struct MiddlewareCtx<'a> {
    slice: &'a str,
    peek: &'a (dyn Fn() -> SliceValue + 'a),
    redispatch: &'a (dyn Fn(Action) -> Result<(), DispatchError> + 'a),
}

impl<'a> MiddlewareCtx<'a> {
    pub(crate) fn new(
        slice: &'a str,
        peek: &'a (dyn Fn() -> SliceValue + 'a),
        redispatch: &'a (dyn Fn(Action) -> Result<(), DispatchError> + 'a),
    ) -> Self {
        Self {
            slice,
            peek,
            redispatch,
        }
    }

    /// Name of the slice this chain belongs to.
    pub fn slice(&self) -> &str {
        self.slice
    }

    /// Current slice state at the time of the call.
    pub fn state(&self) -> SliceValue {
        (self.peek)()
    }

    /// Dispatch another action through the whole chain, from the top.
    ///
    /// The re-entrant action is fully delivered before the current one
    /// reaches the raw update; no lock is held across this call.
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        (self.redispatch)(action)
    }
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    rest: &'a [Arc<dyn Middleware>],
    raw: &'a (dyn Fn(Action) + 'a),
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], raw: &'a (dyn Fn(Action) + 'a)) -> Self {
        Self { rest: chain, raw }
    }

    /// Hand the action to the next middleware, or to the raw update when
    /// the chain is exhausted. Dropping `Next` without calling this
    /// swallows the action without error.
    pub fn run(self, ctx: &MiddlewareCtx<'_>, action: Action) -> anyhow::Result<()> {
        match self.rest.split_first() {
            Some((head, rest)) => head
                .around(
                    action,
                    ctx,
                    Next {
                        rest,
                        raw: self.raw,
                    },
                )
                .with_context(|| format!("in middleware '{}'", head.name())),
            None => {
                (self.raw)(action);
                Ok(())
            }
        }
    }
}

/// Middleware that logs every action at debug level before passing it on.
pub struct LogMiddleware;

impl Middleware for LogMiddleware {
    fn name(&self) -> &'static str {
        "log"
    }

    fn around(
        &self,
        action: Action,
        ctx: &MiddlewareCtx<'_>,
        next: Next<'_>,
    ) -> anyhow::Result<()> {
        tracing::debug!(slice = %ctx.slice(), kind = %action.kind, "dispatching action");
        next.run(ctx, action)
    }
}
