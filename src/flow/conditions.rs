//! Move conditions: named strategies producing one-shot readiness futures.
//!
//! Each condition turns its specification argument into a future that
//! resolves at most once. The engine races one future per `(edge, condition)`
//! pair and advances on the first to resolve; losers are simply dropped.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::room::ReadySignal;

use super::FlowError;

/// A readiness future produced by a condition. Resolving means "move now".
pub type ReadyFuture = BoxFuture<'static, ()>;

/// A named move-condition strategy.
pub trait Condition: Send + Sync {
    /// Build the one-shot readiness future for one edge of the current step.
    fn wait(&self, arg: &Value) -> Result<ReadyFuture, FlowError>;
}

/// Conditions registered under the name used in specification `when` tables.
#[derive(Default)]
pub struct ConditionRegistry {
    conditions: RwLock<HashMap<String, Arc<dyn Condition>>>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, condition: Arc<dyn Condition>) {
        self.conditions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), condition);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Condition>> {
        self.conditions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

/// `timer`: fires after the configured number of seconds.
pub struct TimerCondition;

impl Condition for TimerCondition {
    fn wait(&self, arg: &Value) -> Result<ReadyFuture, FlowError> {
        let seconds = arg
            .as_u64()
            .map(|seconds| seconds as f64)
            .or_else(|| arg.as_f64().filter(|seconds| *seconds >= 0.0))
            .ok_or_else(|| FlowError::InvalidConditionArg {
                name: "timer".to_string(),
                arg: arg.clone(),
            })?;

        let delay = Duration::from_secs_f64(seconds);
        Ok(Box::pin(async move {
            tokio::time::sleep(delay).await;
        }))
    }
}

/// `input-based`: fires when the room raises its input-ready signal, i.e.
/// when every joined non-owner player has submitted an input for the
/// engine's current step. The argument is ignored.
pub struct InputBasedCondition {
    signal: ReadySignal,
}

impl InputBasedCondition {
    pub fn new(signal: ReadySignal) -> Self {
        Self { signal }
    }
}

impl Condition for InputBasedCondition {
    fn wait(&self, _arg: &Value) -> Result<ReadyFuture, FlowError> {
        let signal = self.signal.clone();
        Ok(Box::pin(async move {
            signal.wait().await;
        }))
    }
}
