//! The flow context and the callable types evaluated against it.
//!
//! Guards, actions, entry/exit hooks, validations and compensation actions
//! are all opaque callables over the flow's mutable [`Context`]. They may be
//! synchronous or asynchronous; the executor treats both uniformly as boxed
//! futures. The helpers in this module wrap plain closures; an async callable
//! is built by boxing its future into the alias directly.
//!
//! ```
//! use praxis::core::{hook, Context};
//!
//! let tag = hook(|ctx: &mut Context| {
//!     ctx.insert("touched".into(), true.into());
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The per-instance mutable workspace shared by guards, actions,
/// validations and hooks. Values are arbitrary JSON.
pub type Context = HashMap<String, serde_json::Value>;

/// Future returned by a hook or action; `Err` carries the failure message.
pub type HookFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// An entry/exit hook, transition action, or compensation action.
pub type Hook = Arc<dyn for<'a> Fn(&'a mut Context) -> HookFuture<'a> + Send + Sync>;

/// Future returned by a guard predicate.
///
/// `Err` is not an execution failure: a guard that fails to evaluate is
/// interpreted as "this candidate does not apply" and resolution moves on.
pub type GuardFuture<'a> = Pin<Box<dyn Future<Output = Result<bool, String>> + Send + 'a>>;

/// A transition guard.
pub type Guard = Arc<dyn for<'a> Fn(&'a Context) -> GuardFuture<'a> + Send + Sync>;

/// Future returned by a validation predicate.
pub type ValidatorFuture<'a> = Pin<Box<dyn Future<Output = Verdict> + Send + 'a>>;

/// A state validation predicate, evaluated against the target state's
/// context before its entry hook runs.
pub type Validator = Arc<dyn for<'a> Fn(&'a Context) -> ValidatorFuture<'a> + Send + Sync>;

/// Outcome of a validation predicate.
///
/// Mirrors the `true | false | string` contract: `Pass` accepts, `Fail`
/// rejects with the configured (or default) message, `Reject` rejects with
/// its own message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    Reject(String),
}

impl From<bool> for Verdict {
    fn from(ok: bool) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

/// Wrap an infallible synchronous closure as a [`Hook`].
pub fn hook<F>(f: F) -> Hook
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        f(ctx);
        Box::pin(std::future::ready(Ok::<(), String>(())))
    })
}

/// Wrap a fallible synchronous closure as a [`Hook`].
pub fn try_hook<F>(f: F) -> Hook
where
    F: Fn(&mut Context) -> Result<(), String> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let result = f(ctx);
        Box::pin(std::future::ready(result))
    })
}

/// Wrap a plain predicate as a [`Guard`].
pub fn guard<F>(f: F) -> Guard
where
    F: Fn(&Context) -> bool + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let result = Ok::<bool, String>(f(ctx));
        Box::pin(std::future::ready(result))
    })
}

/// Wrap a fallible predicate as a [`Guard`]. An `Err` skips the candidate.
pub fn try_guard<F>(f: F) -> Guard
where
    F: Fn(&Context) -> Result<bool, String> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let result = f(ctx);
        Box::pin(std::future::ready(result))
    })
}

/// Wrap a synchronous predicate as a [`Validator`].
pub fn validator<F>(f: F) -> Validator
where
    F: Fn(&Context) -> Verdict + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let verdict = f(ctx);
        Box::pin(std::future::ready(verdict))
    })
}

/// A hook that does nothing. Stands in for compensation actions that could
/// not be restored from persisted form.
pub fn noop_hook() -> Hook {
    Arc::new(|_ctx| Box::pin(std::future::ready(Ok::<(), String>(()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sync_hook_mutates_context() {
        let h = hook(|ctx: &mut Context| {
            ctx.insert("touched".into(), true.into());
        });
        let mut ctx = Context::new();
        h(&mut ctx).await.unwrap();
        assert_eq!(ctx.get("touched"), Some(&true.into()));
    }

    #[tokio::test]
    async fn try_hook_propagates_failure() {
        let h = try_hook(|_ctx| Err("boom".to_string()));
        let mut ctx = Context::new();
        assert_eq!(h(&mut ctx).await, Err("boom".to_string()));
    }

    #[tokio::test]
    async fn guard_reads_context() {
        let g = guard(|ctx: &Context| ctx.get("amount").and_then(|v| v.as_i64()) >= Some(100));
        let mut ctx = Context::new();
        ctx.insert("amount".into(), 150.into());
        assert_eq!(g(&ctx).await, Ok(true));
        ctx.insert("amount".into(), 50.into());
        assert_eq!(g(&ctx).await, Ok(false));
    }

    #[tokio::test]
    async fn verdict_from_bool() {
        assert_eq!(Verdict::from(true), Verdict::Pass);
        assert_eq!(Verdict::from(false), Verdict::Fail);
        let v = validator(|_ctx| Verdict::Reject("too big".into()));
        assert_eq!(v(&Context::new()).await, Verdict::Reject("too big".into()));
    }
}
