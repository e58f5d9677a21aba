// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{path}}` substitution and event filters.
//!
//! Paths address nested event data with dots and indices: `issue.labels[0].name`.

use std::sync::LazyLock;

use area_core::Params;
use area_registry::ParamSpec;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_\-\.\[\]]+)\s*\}\}").unwrap());

/// Resolve a dotted path with optional `[n]` indices.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for segment in path.split('.') {
        let (key, indices) = match segment.find('[') {
            Some(at) => segment.split_at(at),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current.get(key)?;
        }
        for index in indices.split('[').skip(1) {
            let n: usize = index.strip_suffix(']')?.parse().ok()?;
            current = current.get(n)?;
        }
    }
    Some(current)
}

/// String form used in templates: strings verbatim, null as empty, the rest as JSON.
fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn expand_str(template: &str, event: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| render(lookup(event, &caps[1])))
        .into_owned()
}

/// Expand placeholders in string values and in string items of arrays.
pub fn expand(params: &Params, event: &Value) -> Params {
    params
        .iter()
        .map(|(key, value)| {
            let expanded = match value {
                Value::String(s) => Value::String(expand_str(s, event)),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => Value::String(expand_str(s, event)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                other => other.clone(),
            };
            (key.clone(), expanded)
        })
        .collect()
}

/// Action parameters that are not declared by the schema. They act as
/// equality filters on event data.
pub fn conditions(params: &Params, declared: &[ParamSpec]) -> Params {
    params
        .iter()
        .filter(|(key, _)| !declared.iter().any(|spec| spec.name == key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Whether every condition equals the event's value at that path.
pub fn matches_conditions(conditions: &Params, event: &Value) -> bool {
    conditions
        .iter()
        .all(|(path, expected)| lookup(event, path) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use area_core::ParamType;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn event() -> Value {
        json!({
            "title": "Crash on start",
            "number": 42,
            "user": {"login": "octocat"},
            "labels": [{"name": "bug"}, {"name": "p1"}],
            "closed_at": null
        })
    }

    #[test]
    fn nested_paths_and_indices_resolve() {
        let e = event();
        assert_eq!(lookup(&e, "user.login"), Some(&json!("octocat")));
        assert_eq!(lookup(&e, "labels[1].name"), Some(&json!("p1")));
        assert_eq!(lookup(&e, "labels[9].name"), None);
        assert_eq!(lookup(&e, "labels[x]"), None);
    }

    #[test]
    fn expansion_covers_strings_and_arrays() {
        let p = params(json!({
            "title": "#{{number}}: {{ title }} by {{user.login}}",
            "body": "closed {{closed_at}}{{missing.path}}",
            "labels": ["{{labels[0].name}}", 3],
            "draft": false
        }));
        let out = expand(&p, &event());
        assert_eq!(out["title"], json!("#42: Crash on start by octocat"));
        assert_eq!(out["body"], json!("closed "));
        assert_eq!(out["labels"], json!(["bug", 3]));
        assert_eq!(out["draft"], json!(false));
    }

    #[test]
    fn undeclared_keys_filter_events() {
        const DECLARED: &[ParamSpec] = &[ParamSpec::required("repository", ParamType::String, "")];
        let p = params(json!({"repository": "a/b", "user.login": "octocat", "labels[0].name": "bug"}));
        let filters = conditions(&p, DECLARED);
        assert_eq!(filters.len(), 2);
        assert!(matches_conditions(&filters, &event()));

        let other = params(json!({"user.login": "hubot"}));
        assert!(!matches_conditions(&other, &event()));
        assert!(matches_conditions(&Params::new(), &event()));
    }
}
