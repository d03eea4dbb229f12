//! Configuration loading and environment parsing.

use std::fs;
use std::path::Path;

use serde_json::Value;

use super::Config;

/// Load configuration with the following precedence (highest first):
/// 1) `WEBPARTY_CONFIG_JSON` env var containing raw JSON
/// 2) File pointed at by `WEBPARTY_CONFIG_PATH`
/// 3) `config.json` in the current working directory
/// 4) Defaults compiled into the binary
///
/// Individual fields can additionally be overridden with `WEBPARTY__`
/// variables using `__` as the nesting separator, e.g. `WEBPARTY__PORT=8080`
/// or `WEBPARTY__FLOW__SETTLE_DELAY_MS=50`. Read/parse errors are reported
/// to stderr and the remaining sources still apply; `load()` always returns
/// a usable `Config`.
#[must_use]
pub fn load() -> Config {
    let defaults = Config::default();
    let mut merged = serde_json::to_value(&defaults)
        .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if let Ok(json) = std::env::var("WEBPARTY_CONFIG_JSON") {
        if let Some(value) = parse_json_document(&json, "WEBPARTY_CONFIG_JSON") {
            merge_values(&mut merged, value);
        }
    }

    if let Ok(path) = std::env::var("WEBPARTY_CONFIG_PATH") {
        merge_file_source(&mut merged, Path::new(&path));
    }

    merge_file_source(&mut merged, Path::new("config.json"));

    apply_env_overrides(&mut merged);

    match serde_json::from_value::<Config>(merged) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Failed to deserialize config; using defaults: {err}");
            defaults
        }
    }
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))
            {
                merge_values(target, value);
            }
        }
        Err(err) => {
            eprintln!("Failed to read config from {}: {err}", path.display());
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("WEBPARTY__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        set_nested_value(root, &segments, parse_scalar(raw_value.trim()));
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    let map = ensure_object(target);
    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }

    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_nested_value(entry, rest, value);
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    match value.as_object_mut() {
        Some(map) => map,
        // The branch above just coerced the value into an object.
        None => unreachable!("value was coerced into an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_is_deep_for_objects() {
        let mut target = json!({"flow": {"initial_delay_ms": 1000, "settle_delay_ms": 200}});
        merge_values(&mut target, json!({"flow": {"settle_delay_ms": 50}}));
        assert_eq!(target["flow"]["settle_delay_ms"], 50);
        assert_eq!(target["flow"]["initial_delay_ms"], 1000);
    }

    #[test]
    fn nested_overrides_build_intermediate_objects() {
        let mut target = json!({});
        set_nested_value(
            &mut target,
            &["logging".to_string(), "level".to_string()],
            json!("debug"),
        );
        assert_eq!(target["logging"]["level"], "debug");
    }

    #[test]
    fn scalars_keep_their_json_types() {
        assert_eq!(parse_scalar("8080"), json!(8080));
        assert_eq!(parse_scalar("true"), json!(true));
        assert_eq!(parse_scalar("debug"), json!("debug"));
        assert_eq!(parse_scalar(""), json!(""));
    }
}
