//! Party-specification graph types.
//!
//! A party specification is a directed graph of named queries. Each query may
//! present a layout to spectators, solicit input from players, and branch to
//! the next query through named move conditions. The loader in
//! [`loader`] turns the author-facing TOML document into a validated
//! [`PartyGraph`]; the flow engine interprets it.
//!
//! Layout, input, overviewer and vote bodies are deliberately schemaless:
//! they are forwarded verbatim to the transport, so they stay as JSON maps
//! and are only inspected through typed accessors at validation time.

pub mod loader;

pub use loader::{load_from_text, SpecError};

use std::collections::HashMap;

/// Schemaless payload body carried by a query section.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Name of the sentinel query every run terminates on.
pub const END_QUERY_NAME: &str = "end";

/// Index of a query inside its owning [`PartyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub(crate) usize);

/// A conditional move out of a query.
///
/// `to` is `None` only on the edge the engine synthesises for a query that
/// has no outgoing moves; loader-built edges always resolve.
#[derive(Debug, Clone)]
pub struct Edge {
    pub to: Option<QueryId>,
    /// Named move conditions, in document order. Order is the tie-break when
    /// several conditions fire simultaneously.
    pub when: Vec<(String, serde_json::Value)>,
}

/// A single step of a party: what to show, what to collect, where to go next.
#[derive(Debug, Clone)]
pub struct Query {
    pub name: String,
    pub layout: Option<JsonMap>,
    pub input: Option<JsonMap>,
    pub overviewer: Option<JsonMap>,
    pub vote: Option<JsonMap>,
    pub next: Vec<Edge>,
    /// Assigned by the engine when the query is visited; monotonic within a
    /// run.
    pub step: i64,
}

impl Query {
    pub(crate) fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layout: None,
            input: None,
            overviewer: None,
            vote: None,
            next: Vec::new(),
            step: 0,
        }
    }

    /// The `type` of the solicited input, when the query solicits any.
    pub fn input_type(&self) -> Option<&str> {
        self.input.as_ref()?.get("type")?.as_str()
    }

    /// The configured `correct` value, when the query solicits input.
    pub fn input_correct(&self) -> Option<&serde_json::Value> {
        self.input.as_ref()?.get("correct")
    }

    /// Whether this query's answers become candidates for a follow-up vote.
    pub fn wants_vote(&self) -> bool {
        self.vote.is_some()
            && self
                .input_correct()
                .and_then(serde_json::Value::as_str)
                .is_some_and(|correct| correct == "vote")
    }
}

/// A validated specification graph: queries keyed by name, a designated
/// start query, and the `end` sentinel.
#[derive(Debug, Clone)]
pub struct PartyGraph {
    name: String,
    nodes: Vec<Query>,
    by_name: HashMap<String, QueryId>,
    start: QueryId,
    end: QueryId,
}

impl PartyGraph {
    /// Debug name of the loaded document (usually its content hash).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> QueryId {
        self.start
    }

    pub fn node(&self, id: QueryId) -> &Query {
        &self.nodes[id.0]
    }

    pub fn is_end(&self, id: QueryId) -> bool {
        id == self.end
    }

    pub fn lookup(&self, name: &str) -> Option<QueryId> {
        self.by_name.get(name).copied()
    }

    /// Number of queries, the `end` sentinel included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
