//! The middleware onion wrapped around each event execution.
//!
//! Middlewares nest in registration order: the first registered is
//! outermost. Each receives the [`MiddlewareContext`] and a [`Next`] handle;
//! calling [`Next::run`] invokes the rest of the chain and, at the tail, the
//! engine's core execute step. Not calling it short-circuits the chain.
//! `Next` is consumed by the call, so the tail cannot run twice.
//!
//! ```
//! use async_trait::async_trait;
//! use praxis::engine::{ExecuteResult, Middleware, MiddlewareContext, Next, Result};
//!
//! struct Timing;
//!
//! #[async_trait]
//! impl Middleware for Timing {
//!     async fn handle(
//!         &self,
//!         ctx: &mut MiddlewareContext,
//!         next: Next<'_>,
//!     ) -> Result<ExecuteResult> {
//!         let result = next.run(ctx).await;
//!         tracing::info!(flow_id = %ctx.flow_id, elapsed = ?ctx.start_time.elapsed(), "event handled");
//!         result
//!     }
//! }
//! ```

use super::error::Result;
use super::options::{ExecuteOptions, ExecuteResult};
use crate::core::FlowInstance;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// What a middleware sees: the event under execution and a snapshot of the
/// instance taken when the chain was entered.
///
/// `flow_state` is a snapshot; context mutations made here are carried into
/// the core step, but in-flight mutations made by the core are not reflected
/// back until `next` returns its result.
#[derive(Clone, Debug)]
pub struct MiddlewareContext {
    pub flow_id: String,
    pub event: String,
    pub flow_state: FlowInstance,
    pub options: ExecuteOptions,
    pub start_time: Instant,
}

/// An around-advice wrapper over event execution.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut MiddlewareContext, next: Next<'_>) -> Result<ExecuteResult>;
}

/// The tail of the chain: the engine's core execute step.
#[async_trait]
pub(crate) trait TerminalStep: Send + Sync {
    async fn call(&self, ctx: &mut MiddlewareContext) -> Result<ExecuteResult>;
}

/// Handle to the remainder of the middleware chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn TerminalStep,
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [Arc<dyn Middleware>], terminal: &'a dyn TerminalStep) -> Self {
        Self { chain, terminal }
    }

    /// Invoke the rest of the chain, ending in the core execute step.
    pub async fn run(self, ctx: &mut MiddlewareContext) -> Result<ExecuteResult> {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                middleware.handle(ctx, next).await
            }
            None => self.terminal.call(ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Context, StateRef};
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(
            &self,
            ctx: &mut MiddlewareContext,
            next: Next<'_>,
        ) -> Result<ExecuteResult> {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            let result = next.run(ctx).await;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            result
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle(
            &self,
            ctx: &mut MiddlewareContext,
            _next: Next<'_>,
        ) -> Result<ExecuteResult> {
            Ok(ExecuteResult {
                success: true,
                state: ctx.flow_state.clone(),
                transition: None,
                error: None,
                compensated: false,
                attempts: 0,
            })
        }
    }

    struct CountingTerminal {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl TerminalStep for CountingTerminal {
        async fn call(&self, ctx: &mut MiddlewareContext) -> Result<ExecuteResult> {
            self.log.lock().unwrap().push("core".to_string());
            Ok(ExecuteResult {
                success: true,
                state: ctx.flow_state.clone(),
                transition: None,
                error: None,
                compensated: false,
                attempts: 1,
            })
        }
    }

    fn test_ctx() -> MiddlewareContext {
        MiddlewareContext {
            flow_id: "f1".into(),
            event: "GO".into(),
            flow_state: FlowInstance::new(
                "f1",
                "def",
                1,
                StateRef::from("pending"),
                Context::new(),
            ),
            options: ExecuteOptions::new("GO"),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn chain_nests_outer_to_inner_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder {
                name: "first",
                log: Arc::clone(&log),
            }),
            Arc::new(Recorder {
                name: "second",
                log: Arc::clone(&log),
            }),
        ];
        let terminal = CountingTerminal {
            log: Arc::clone(&log),
        };

        let mut ctx = test_ctx();
        let result = Next::new(&chain, &terminal).run(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            [
                "first:before",
                "second:before",
                "core",
                "second:after",
                "first:after",
            ]
            .map(String::from)
            .as_slice()
        );
    }

    #[tokio::test]
    async fn short_circuit_skips_core_and_inner_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder {
                name: "outer",
                log: Arc::clone(&log),
            }),
            Arc::new(ShortCircuit),
            Arc::new(Recorder {
                name: "inner",
                log: Arc::clone(&log),
            }),
        ];
        let terminal = CountingTerminal {
            log: Arc::clone(&log),
        };

        let mut ctx = test_ctx();
        let result = Next::new(&chain, &terminal).run(&mut ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.attempts, 0);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["outer:before", "outer:after"].map(String::from).as_slice()
        );
    }

    #[tokio::test]
    async fn empty_chain_runs_terminal_directly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = CountingTerminal {
            log: Arc::clone(&log),
        };
        let mut ctx = test_ctx();
        let result = Next::new(&[], &terminal).run(&mut ctx).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            ["core"].map(String::from).as_slice()
        );
    }
}
