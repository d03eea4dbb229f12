//! The party-flow engine.
//!
//! One engine drives one room through its specification graph: it visits the
//! current query, races the query's move conditions, collects winners, and
//! synthesises the transient voting and overviewer steps. The engine itself
//! never touches room state or the transport; everything it needs from the
//! outside world comes through a [`FlowObserver`].
//!
//! A run ends when the chosen edge reaches the `end` sentinel, when the
//! engine is stopped, or when a run fault (unknown condition, dead-end edge,
//! panic) is trapped at the `run` boundary. In every case `on_finished` is
//! emitted exactly once and the process keeps going.

mod checkers;
mod conditions;

pub use checkers::{CheckerRegistry, InputChecker, TextChecker};
pub use conditions::{
    Condition, ConditionRegistry, InputBasedCondition, ReadyFuture, TimerCondition,
};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::{select_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::spec::{Edge, JsonMap, PartyGraph, Query, QueryId};
use crate::UserId;

/// Per-user score record: wins so far and the latest winning message.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Standing {
    #[serde(rename = "winCount")]
    pub win_count: u32,
    #[serde(rename = "lastInput")]
    pub last_input: String,
}

/// Faults that abort a run. All of them are trapped inside [`PartyFlow::run`].
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("condition `{0}` is not registered")]
    UnknownCondition(String),
    #[error("condition `{name}`: invalid argument {arg}")]
    InvalidConditionArg { name: String, arg: Value },
    #[error("query `{0}` has no runnable move conditions")]
    NoConditions(String),
    #[error("advanced past `{0}` with no destination")]
    DeadEnd(String),
}

/// Everything the engine reports to, or asks of, its surroundings.
///
/// Implementations take the room's lock themselves; the engine never holds
/// it.
#[async_trait]
pub trait FlowObserver: Send + Sync {
    /// A query became current and was stamped with its step number.
    async fn on_query(&self, query: &Query) {
        let _ = query;
    }

    /// The engine moved on from the current step.
    async fn on_move(&self) {}

    /// The run ended; emitted exactly once per start, fault or not.
    async fn on_finished(&self) {}

    /// Which users won the step that just resolved.
    async fn pick_winners(&self, query: &Query) -> Vec<UserId> {
        let _ = query;
        Vec::new()
    }

    /// The buffered message per user, used for standings and vote candidates.
    async fn get_inputs(&self, query: &Query) -> HashMap<UserId, String> {
        let _ = query;
        HashMap::new()
    }
}

struct NoopObserver;

#[async_trait]
impl FlowObserver for NoopObserver {}

/// Engine pacing knobs.
#[derive(Debug, Clone, Copy)]
pub struct FlowTimings {
    /// Grace period between start and the first query.
    pub initial_delay: Duration,
    /// Settling delay before winner collection, absorbing late arrivals.
    pub settle_delay: Duration,
}

impl Default for FlowTimings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            settle_delay: Duration::from_millis(200),
        }
    }
}

enum RunEnd {
    Completed,
    Cancelled,
}

/// A per-room flow engine. Shared as `Arc`: registries and the observer are
/// wired up before `start`, then the run loop only reads them.
pub struct PartyFlow {
    graph: PartyGraph,
    timings: FlowTimings,
    checkers: Arc<CheckerRegistry>,
    conditions: ConditionRegistry,
    observer: RwLock<Arc<dyn FlowObserver>>,
    step: AtomicI64,
    cancel: RwLock<CancellationToken>,
}

impl PartyFlow {
    pub fn new(graph: PartyGraph) -> Self {
        Self::with_timings(graph, FlowTimings::default())
    }

    pub fn with_timings(graph: PartyGraph, timings: FlowTimings) -> Self {
        Self {
            graph,
            timings,
            checkers: Arc::new(CheckerRegistry::new()),
            conditions: ConditionRegistry::new(),
            observer: RwLock::new(Arc::new(NoopObserver)),
            step: AtomicI64::new(0),
            cancel: RwLock::new(CancellationToken::new()),
        }
    }

    pub fn register_input_checker(&self, name: &str, checker: Arc<dyn InputChecker>) {
        self.checkers.register(name, checker);
    }

    pub fn register_condition(&self, name: &str, condition: Arc<dyn Condition>) {
        self.conditions.register(name, condition);
    }

    /// The checker registry, shared with whoever judges winners.
    pub fn checkers(&self) -> Arc<CheckerRegistry> {
        Arc::clone(&self.checkers)
    }

    pub fn set_observer(&self, observer: Arc<dyn FlowObserver>) {
        *self
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    /// The step the engine is currently on; 0 before the first query.
    pub fn current_step(&self) -> i64 {
        self.step.load(Ordering::SeqCst)
    }

    /// Request a prompt, cooperative shutdown of the current run.
    pub fn stop(&self) {
        self.cancel
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn observer(&self) -> Arc<dyn FlowObserver> {
        self.observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn arm_cancellation(&self) -> CancellationToken {
        let mut guard = self.cancel.write().unwrap_or_else(PoisonError::into_inner);
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// Drive the graph to completion. Any fault inside the loop, panics
    /// included, is trapped here so a broken party never takes the process
    /// down with it.
    pub async fn run(self: Arc<Self>) {
        let spec = self.graph.name().to_string();
        let cancel = self.arm_cancellation();
        let observer = self.observer();

        let outcome = std::panic::AssertUnwindSafe(self.drive(&cancel))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(RunEnd::Completed)) => tracing::info!(%spec, "party flow finished"),
            Ok(Ok(RunEnd::Cancelled)) => tracing::info!(%spec, "party flow cancelled"),
            Ok(Err(fault)) => tracing::error!(%spec, %fault, "party flow run fault, unloading"),
            Err(_) => tracing::error!(%spec, "party flow panicked, unloading"),
        }

        observer.on_finished().await;
    }

    async fn drive(&self, cancel: &CancellationToken) -> Result<RunEnd, FlowError> {
        self.step.store(0, Ordering::SeqCst);
        let mut standings: HashMap<UserId, Standing> = HashMap::new();
        let mut current = self.graph.node(self.graph.start()).clone();
        let mut skip_winner_collection = false;
        let observer = self.observer();

        tracing::debug!(start = %current.name, "party flow starting");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(RunEnd::Cancelled),
            () = tokio::time::sleep(self.timings.initial_delay) => {}
        }

        loop {
            let step = self.step.fetch_add(1, Ordering::SeqCst) + 1;
            current.step = step;
            tracing::debug!(step, query = %current.name, "waiting on query");
            observer.on_query(&current).await;

            // A query with no outgoing moves still advances: a zero timer
            // into the dead-end fault path below.
            let edges = if current.next.is_empty() {
                vec![Edge {
                    to: None,
                    when: vec![("timer".to_string(), json!(0))],
                }]
            } else {
                current.next.clone()
            };

            let Some(taken) = self.race_conditions(&current.name, &edges, cancel).await? else {
                return Ok(RunEnd::Cancelled);
            };

            if skip_winner_collection {
                skip_winner_collection = false;
            } else {
                tokio::time::sleep(self.timings.settle_delay).await;
                let winners = observer.pick_winners(&current).await;
                let inputs = observer.get_inputs(&current).await;
                for winner in winners {
                    let last_input = inputs.get(&winner).cloned().unwrap_or_default();
                    let standing = standings.entry(winner).or_default();
                    standing.win_count += 1;
                    standing.last_input = last_input;
                }
                if !standings.is_empty() {
                    tracing::debug!(step, ?standings, "standings updated");
                }
            }

            let chosen = edges[taken].to;

            if current.wants_vote() {
                let candidates = observer.get_inputs(&current).await;
                current = synthesize_voting(&current, candidates, chosen);
            } else if current.overviewer.is_some() {
                current = synthesize_overviewer(&current, &standings, chosen);
                // The overviewer recaps the step that was just scored.
                skip_winner_collection = true;
            } else {
                let next = chosen.ok_or_else(|| FlowError::DeadEnd(current.name.clone()))?;
                if self.graph.is_end(next) {
                    return Ok(RunEnd::Completed);
                }
                let next_query = self.graph.node(next);
                tracing::debug!(from = %current.name, to = %next_query.name, "advancing");
                current = next_query.clone();
            }

            observer.on_move().await;
        }
    }

    /// Race every `(edge, condition)` waiter of the current step against the
    /// engine's cancellation token. Returns the winning edge index, or `None`
    /// on cancellation. Dropping the race drops the losing waiters with it.
    async fn race_conditions(
        &self,
        query: &str,
        edges: &[Edge],
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, FlowError> {
        let mut waiters: Vec<BoxFuture<'static, usize>> = Vec::new();
        for (index, edge) in edges.iter().enumerate() {
            for (name, arg) in &edge.when {
                let condition = self
                    .conditions
                    .get(name)
                    .ok_or_else(|| FlowError::UnknownCondition(name.clone()))?;
                let ready = condition.wait(arg)?;
                waiters.push(Box::pin(async move {
                    ready.await;
                    index
                }));
            }
        }

        if waiters.is_empty() {
            return Err(FlowError::NoConditions(query.to_string()));
        }

        // select_all polls in argument order, so a simultaneous fire resolves
        // to the lowest edge index and earliest condition key.
        tokio::select! {
            biased;
            () = cancel.cancelled() => Ok(None),
            (index, _, _) = select_all(waiters) => Ok(Some(index)),
        }
    }
}

/// Build the transient `<name> (voting)` query: the step's answers become
/// vote candidates, the `vote` table (minus `type`) becomes the advance
/// condition, and any overviewer is carried over.
fn synthesize_voting(
    query: &Query,
    candidates: HashMap<UserId, String>,
    to: Option<QueryId>,
) -> Query {
    let vote = query.vote.clone().unwrap_or_default();
    let vote_type = vote.get("type").and_then(Value::as_str).unwrap_or_default();

    let mut input = JsonMap::new();
    input.insert("type".to_string(), json!(format!("vote {vote_type}")));
    input.insert(
        "candidates".to_string(),
        Value::Object(
            candidates
                .into_iter()
                .map(|(user, message)| (user, Value::String(message)))
                .collect(),
        ),
    );

    Query {
        name: format!("{} (voting)", query.name),
        layout: None,
        input: Some(input),
        overviewer: query.overviewer.clone(),
        vote: None,
        next: vec![Edge {
            to,
            when: strip_type(&vote),
        }],
        step: query.step,
    }
}

/// Build the transient `<name> (overviewer)` recap query carrying current
/// standings in its layout.
fn synthesize_overviewer(
    query: &Query,
    standings: &HashMap<UserId, Standing>,
    to: Option<QueryId>,
) -> Query {
    let overviewer = query.overviewer.clone().unwrap_or_default();
    let overviewer_type = overviewer
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut layout = JsonMap::new();
    layout.insert(
        "type".to_string(),
        json!(format!("overviewer {overviewer_type}")),
    );
    layout.insert(
        "winners".to_string(),
        serde_json::to_value(standings).unwrap_or(Value::Null),
    );

    Query {
        name: format!("{} (overviewer)", query.name),
        layout: Some(layout),
        input: None,
        overviewer: None,
        vote: None,
        next: vec![Edge {
            to,
            when: strip_type(&overviewer),
        }],
        step: query.step,
    }
}

fn strip_type(body: &JsonMap) -> Vec<(String, Value)> {
    body.iter()
        .filter(|(key, _)| *key != "type")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
