//! Parsing and validation of party-specification documents.
//!
//! Documents are TOML: a top-level `start` key plus one table per query.
//! Validation fails on the first violation and never returns a partially
//! built graph. The loader is pure; it only reads the text it is given.

use std::collections::{HashMap, HashSet, VecDeque};

use serde_json::Value;
use thiserror::Error;

use super::{Edge, JsonMap, PartyGraph, Query, QueryId, END_QUERY_NAME};

/// Reasons a party specification is rejected.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to parse party specification: {0}")]
    Parse(String),
    #[error("`start` is missing or does not name a query")]
    MissingStart,
    #[error("start query `{0}` not found")]
    UnknownStart(String),
    #[error("unknown top-level parameter `{0}`")]
    UnknownParameter(String),
    #[error("query `{0}` is empty")]
    EmptyQuery(String),
    #[error("query `{query}`: `{section}` is not a table")]
    InvalidSection { query: String, section: String },
    #[error("query `{query}`: `{section}.type` is unspecified")]
    MissingType { query: String, section: String },
    #[error("query `{0}`: input check (`correct`) is unspecified")]
    MissingCorrect(String),
    #[error("query `{0}`: input check `pick` requires a `limits` list")]
    MissingLimits(String),
    #[error("query `{0}`: input check `vote` requires a `vote` table")]
    MissingVoteTable(String),
    #[error("query `{query}`: `{section}` needs at least one move condition besides `type`")]
    MissingMoveCondition { query: String, section: String },
    #[error("query `{0}` has no destinations")]
    MissingDestinations(String),
    #[error("query `{query}`: destination `{destination}` not found")]
    UnresolvedDestination { query: String, destination: String },
    #[error("query `{query}`: edge to `{destination}` carries no conditions")]
    MissingConditions { query: String, destination: String },
    #[error("`end` is not reachable from `{0}`")]
    EndUnreachable(String),
}

/// Parse and validate a specification document into a [`PartyGraph`].
pub fn load_from_text(name: &str, text: &str) -> Result<PartyGraph, SpecError> {
    let document: toml::Table =
        toml::from_str(text).map_err(|err| SpecError::Parse(err.to_string()))?;
    let document =
        serde_json::to_value(&document).map_err(|err| SpecError::Parse(err.to_string()))?;
    let Value::Object(document) = document else {
        return Err(SpecError::Parse("document is not a table".to_string()));
    };

    tracing::debug!(spec = %name, "loading party specification");
    let graph = build_graph(name, &document)?;
    tracing::debug!(spec = %name, queries = graph.len(), "party specification ready");
    Ok(graph)
}

/// Top-level keys that do not name a query.
fn is_reserved_key(key: &str) -> bool {
    key == "start" || key == END_QUERY_NAME
}

fn build_graph(name: &str, document: &JsonMap) -> Result<PartyGraph, SpecError> {
    let start_name = document
        .get("start")
        .and_then(Value::as_str)
        .ok_or(SpecError::MissingStart)?;

    let end = QueryId(0);
    let mut nodes = vec![Query::named(END_QUERY_NAME)];
    let mut by_name = HashMap::from([(END_QUERY_NAME.to_string(), end)]);

    for (key, value) in document {
        if is_reserved_key(key) {
            continue;
        }

        let table = value
            .as_object()
            .ok_or_else(|| SpecError::UnknownParameter(key.clone()))?;
        if table.is_empty() {
            return Err(SpecError::EmptyQuery(key.clone()));
        }

        let query = parse_query(key, table)?;
        by_name.insert(key.clone(), QueryId(nodes.len()));
        nodes.push(query);
    }

    let start = by_name
        .get(start_name)
        .copied()
        .filter(|id| *id != end)
        .ok_or_else(|| SpecError::UnknownStart(start_name.to_string()))?;

    for (key, value) in document {
        if is_reserved_key(key) {
            continue;
        }

        // Both lookups were populated by the first pass.
        let id = by_name[key];
        let table = value
            .as_object()
            .ok_or_else(|| SpecError::UnknownParameter(key.clone()))?;
        nodes[id.0].next = parse_edges(key, table, &by_name)?;
    }

    ensure_end_reachable(&nodes, start, end, start_name)?;

    Ok(PartyGraph {
        name: name.to_string(),
        nodes,
        by_name,
        start,
        end,
    })
}

fn parse_query(name: &str, table: &JsonMap) -> Result<Query, SpecError> {
    let mut query = Query::named(name);
    query.layout = section(name, table, "layout")?;
    query.input = section(name, table, "input")?;
    query.overviewer = section(name, table, "overviewer")?;

    if let Some(layout) = &query.layout {
        require_type(name, "layout", layout)?;
    }

    if let Some(overviewer) = &query.overviewer {
        require_type(name, "overviewer", overviewer)?;
        require_move_condition(name, "overviewer", overviewer)?;
    }

    if let Some(input) = &query.input {
        require_type(name, "input", input)?;
        let correct = input
            .get("correct")
            .ok_or_else(|| SpecError::MissingCorrect(name.to_string()))?;

        match correct.as_str() {
            Some("pick") => {
                if !input.get("limits").is_some_and(Value::is_array) {
                    return Err(SpecError::MissingLimits(name.to_string()));
                }
            }
            Some("vote") => {
                let vote = section(name, table, "vote")?
                    .ok_or_else(|| SpecError::MissingVoteTable(name.to_string()))?;
                require_type(name, "vote", &vote)?;
                require_move_condition(name, "vote", &vote)?;
                query.vote = Some(vote);
            }
            _ => {}
        }
    }

    Ok(query)
}

fn parse_edges(
    name: &str,
    table: &JsonMap,
    by_name: &HashMap<String, QueryId>,
) -> Result<Vec<Edge>, SpecError> {
    let destinations = table
        .get("to")
        .and_then(Value::as_object)
        .filter(|destinations| !destinations.is_empty())
        .ok_or_else(|| SpecError::MissingDestinations(name.to_string()))?;

    let mut edges = Vec::with_capacity(destinations.len());
    for (destination, conditions) in destinations {
        let to = by_name.get(destination).copied().ok_or_else(|| {
            SpecError::UnresolvedDestination {
                query: name.to_string(),
                destination: destination.clone(),
            }
        })?;

        let conditions = conditions
            .as_object()
            .filter(|conditions| !conditions.is_empty())
            .ok_or_else(|| SpecError::MissingConditions {
                query: name.to_string(),
                destination: destination.clone(),
            })?;

        edges.push(Edge {
            to: Some(to),
            when: conditions
                .iter()
                .map(|(condition, arg)| (condition.clone(), arg.clone()))
                .collect(),
        });
    }

    Ok(edges)
}

fn section(query: &str, table: &JsonMap, key: &str) -> Result<Option<JsonMap>, SpecError> {
    match table.get(key) {
        None => Ok(None),
        Some(Value::Object(body)) => Ok(Some(body.clone())),
        Some(_) => Err(SpecError::InvalidSection {
            query: query.to_string(),
            section: key.to_string(),
        }),
    }
}

fn require_type(query: &str, name: &str, body: &JsonMap) -> Result<(), SpecError> {
    if body.contains_key("type") {
        Ok(())
    } else {
        Err(SpecError::MissingType {
            query: query.to_string(),
            section: name.to_string(),
        })
    }
}

/// `overviewer` and `vote` tables double as edge conditions: everything
/// besides `type` drives the synthetic step's advancement.
fn require_move_condition(query: &str, name: &str, body: &JsonMap) -> Result<(), SpecError> {
    if body.keys().any(|key| key != "type") {
        Ok(())
    } else {
        Err(SpecError::MissingMoveCondition {
            query: query.to_string(),
            section: name.to_string(),
        })
    }
}

fn ensure_end_reachable(
    nodes: &[Query],
    start: QueryId,
    end: QueryId,
    start_name: &str,
) -> Result<(), SpecError> {
    let mut visited = HashSet::from([start]);
    let mut frontier = VecDeque::from([start]);

    while let Some(id) = frontier.pop_front() {
        if id == end {
            return Ok(());
        }
        for edge in &nodes[id.0].next {
            if let Some(to) = edge.to {
                if visited.insert(to) {
                    frontier.push_back(to);
                }
            }
        }
    }

    Err(SpecError::EndUnreachable(start_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUESSING_PARTY: &str = r#"
start = "intro"

[intro]
    [intro.layout]
    type = "basic"
    title = "Guess the number"
    description = "The party is about to begin"

        [intro.to.guess]
        timer = 3

[guess]
    [guess.layout]
    type = "basic"
    title = "Guess the number"
    description = "Guess a number between 1 and 5"

    [guess.input]
    title = "Enter a number between 1 and 5"
    type = "text"
    correct = "vote"

        [guess.to.end]
        timer = 3

    [guess.overviewer]
    type = "winner"
    timer = 1

    [guess.vote]
    type = "all"
    timer = 2
"#;

    #[test]
    fn loads_a_complete_document() {
        let graph = load_from_text("guessing", GUESSING_PARTY).expect("document is valid");
        assert_eq!(graph.len(), 3);

        let start = graph.node(graph.start());
        assert_eq!(start.name, "intro");
        assert!(start.input.is_none());
        assert_eq!(start.next.len(), 1);
        assert_eq!(start.next[0].when, vec![("timer".to_string(), 3.into())]);

        let guess_id = graph.lookup("guess").expect("guess query exists");
        let guess = graph.node(guess_id);
        assert!(guess.wants_vote());
        assert_eq!(guess.input_type(), Some("text"));
        assert!(graph.is_end(guess.next[0].to.expect("edge resolves")));
    }

    #[test]
    fn edge_order_follows_the_document() {
        let graph = load_from_text(
            "branching",
            r#"
start = "fork"

[fork]
    [fork.layout]
    type = "basic"

    [fork.to.slow]
    timer = 60

    [fork.to.end]
    timer = 1

[slow]
    [slow.layout]
    type = "basic"

    [slow.to.end]
    timer = 1
"#,
        )
        .expect("document is valid");

        let fork = graph.node(graph.start());
        assert_eq!(fork.next.len(), 2);
        let slow = graph.lookup("slow").expect("slow exists");
        assert_eq!(fork.next[0].to, Some(slow));
    }

    #[test]
    fn rejects_missing_start() {
        let err = load_from_text("bad", "[a]\n[a.to.end]\ntimer = 1\n").unwrap_err();
        assert!(matches!(err, SpecError::MissingStart));
    }

    #[test]
    fn rejects_start_naming_no_query() {
        let err =
            load_from_text("bad", "start = \"missing\"\n[a]\n[a.to.end]\ntimer = 1\n").unwrap_err();
        assert!(matches!(err, SpecError::UnknownStart(name) if name == "missing"));
    }

    #[test]
    fn rejects_unknown_top_level_parameter() {
        let err = load_from_text("bad", "start = \"a\"\nrogue = 3\n[a]\n[a.to.end]\ntimer = 1\n")
            .unwrap_err();
        assert!(matches!(err, SpecError::UnknownParameter(key) if key == "rogue"));
    }

    #[test]
    fn rejects_empty_query() {
        let err = load_from_text("bad", "start = \"a\"\n[a]\n").unwrap_err();
        assert!(matches!(err, SpecError::EmptyQuery(name) if name == "a"));
    }

    #[test]
    fn rejects_layout_without_type() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.layout]\ntitle = \"x\"\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingType { section, .. } if section == "layout"));
    }

    #[test]
    fn rejects_input_without_correct() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.input]\ntype = \"text\"\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingCorrect(name) if name == "a"));
    }

    #[test]
    fn rejects_pick_without_limits() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.input]\ntype = \"text\"\ncorrect = \"pick\"\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingLimits(name) if name == "a"));
    }

    #[test]
    fn rejects_pick_with_non_sequence_limits() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.input]\ntype = \"text\"\ncorrect = \"pick\"\nlimits = 5\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingLimits(name) if name == "a"));
    }

    #[test]
    fn rejects_vote_without_vote_table() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.input]\ntype = \"text\"\ncorrect = \"vote\"\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingVoteTable(name) if name == "a"));
    }

    #[test]
    fn rejects_vote_table_without_move_condition() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.input]\ntype = \"text\"\ncorrect = \"vote\"\n[a.vote]\ntype = \"all\"\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingMoveCondition { section, .. } if section == "vote"));
    }

    #[test]
    fn rejects_overviewer_without_move_condition() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.overviewer]\ntype = \"winner\"\n[a.to.end]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(
            matches!(err, SpecError::MissingMoveCondition { section, .. } if section == "overviewer")
        );
    }

    #[test]
    fn rejects_query_without_destinations() {
        let err = load_from_text("bad", "start = \"a\"\n[a.layout]\ntype = \"basic\"\n").unwrap_err();
        assert!(matches!(err, SpecError::MissingDestinations(name) if name == "a"));
    }

    #[test]
    fn rejects_dangling_destination() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.layout]\ntype = \"basic\"\n[a.to.nowhere]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(
            matches!(err, SpecError::UnresolvedDestination { destination, .. } if destination == "nowhere")
        );
    }

    #[test]
    fn rejects_edge_without_conditions() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.layout]\ntype = \"basic\"\n[a.to]\nend = {}\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::MissingConditions { .. }));
    }

    #[test]
    fn rejects_unreachable_end() {
        let err = load_from_text(
            "bad",
            "start = \"a\"\n[a.layout]\ntype = \"basic\"\n[a.to.b]\ntimer = 1\n[b.layout]\ntype = \"basic\"\n[b.to.a]\ntimer = 1\n",
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::EndUnreachable(_)));
    }

    #[test]
    fn rejects_invalid_toml() {
        let err = load_from_text("bad", "start = ").unwrap_err();
        assert!(matches!(err, SpecError::Parse(_)));
    }
}
