//! `TransformPipeline` — declarative, priority-ordered rewrites of
//! request/response payloads. Dynamic payloads are modeled as
//! `serde_json::Value` — the tagged recursive variant the path operations
//! and nested-access checks below walk.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

#[derive(Debug, Clone)]
pub enum Operation {
    Set { path: String, value: Value },
    Remove { path: String },
    Rename { from: String, to: String },
    Template { path: String, template: String },
}

#[derive(Debug, Clone)]
pub struct TransformRule {
    pub id: String,
    /// Exact tool name, or `"*"` to match every tool.
    pub tool: String,
    pub direction: Direction,
    pub operations: Vec<Operation>,
    /// Lower runs first.
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ApplyStats {
    pub applied_operations: u64,
    pub total_errors: u64,
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Walks `segments[..last]`, creating intermediate objects as needed, and
/// returns the object map that should hold the final segment. Errors if an
/// intermediate segment exists but isn't an object.
fn navigate_create<'a>(root: &'a mut Value, segments: &[&str]) -> Result<&'a mut Map<String, Value>, String> {
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    let mut current = root;
    for seg in segments {
        let obj = current
            .as_object_mut()
            .ok_or_else(|| format!("path segment `{seg}` is not an object"))?;
        let entry = obj.entry((*seg).to_string()).or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = entry;
    }
    current
        .as_object_mut()
        .ok_or_else(|| "path does not resolve to an object".to_string())
}

fn get_parent_object<'a>(root: &'a mut Value, segments: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = root;
    for seg in segments {
        current = current.as_object_mut()?.get_mut(*seg)?;
    }
    current.as_object_mut()
}

fn get_at(root: &Value, segments: &[&str]) -> Option<Value> {
    let mut current = root;
    for seg in segments {
        current = current.as_object()?.get(*seg)?;
    }
    Some(current.clone())
}

fn apply_set(data: &mut Value, path: &str, value: &Value) -> Result<(), String> {
    let segments = split_path(path);
    let (parent_segments, last) = segments.split_at(segments.len().saturating_sub(1));
    let key = last.first().ok_or("empty path")?;
    let parent = navigate_create(data, parent_segments)?;
    parent.insert((*key).to_string(), value.clone());
    Ok(())
}

fn apply_remove(data: &mut Value, path: &str) -> Result<(), String> {
    let segments = split_path(path);
    if segments.is_empty() {
        return Err("empty path".to_string());
    }
    let (parent_segments, last) = segments.split_at(segments.len() - 1);
    if let Some(parent) = get_parent_object(data, parent_segments) {
        parent.remove(last[0]);
    }
    Ok(())
}

fn apply_rename(data: &mut Value, from: &str, to: &str) -> Result<(), String> {
    let from_segments = split_path(from);
    let value = match get_at(data, &from_segments) {
        Some(v) => v,
        None => return Ok(()), // spec: only moves "if from exists"
    };
    apply_remove(data, from)?;
    apply_set(data, to, &value)
}

fn render_template(template: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        rest = &rest[start + 2..];
        match rest.find("}}") {
            Some(end) => {
                let var = rest[..end].trim();
                out.push_str(context.get(var).map(String::as_str).unwrap_or(""));
                rest = &rest[end + 2..];
            }
            None => {
                out.push_str("{{");
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn apply_template(data: &mut Value, path: &str, template: &str, context: &HashMap<String, String>) -> Result<(), String> {
    let rendered = render_template(template, context);
    apply_set(data, path, &Value::String(rendered))
}

pub struct TransformPipeline {
    rules: RwLock<Vec<TransformRule>>,
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn add_rule(&self, rule: TransformRule) {
        self.rules.write().push(rule);
    }

    pub fn remove_rule(&self, id: &str) {
        self.rules.write().retain(|r| r.id != id);
    }

    pub fn rules(&self) -> Vec<TransformRule> {
        self.rules.read().clone()
    }

    /// Never mutates `data`: clones it, applies every operation of every
    /// matching enabled rule (ascending priority), and returns the result
    /// alongside operation/error counts.
    pub fn apply(
        &self,
        tool: &str,
        direction: Direction,
        data: &Value,
        context: &HashMap<String, String>,
    ) -> (Value, ApplyStats) {
        let mut matching: Vec<TransformRule> = self
            .rules
            .read()
            .iter()
            .filter(|r| r.enabled && r.direction == direction && (r.tool == "*" || r.tool == tool))
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.priority);

        let mut result = data.clone();
        let mut stats = ApplyStats::default();

        for rule in &matching {
            for op in &rule.operations {
                let outcome = match op {
                    Operation::Set { path, value } => apply_set(&mut result, path, value),
                    Operation::Remove { path } => apply_remove(&mut result, path),
                    Operation::Rename { from, to } => apply_rename(&mut result, from, to),
                    Operation::Template { path, template } => apply_template(&mut result, path, template, context),
                };
                match outcome {
                    Ok(()) => stats.applied_operations += 1,
                    Err(_) => stats.total_errors += 1,
                }
            }
        }

        (result, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(ops: Vec<Operation>, priority: i32) -> TransformRule {
        TransformRule {
            id: format!("r{priority}"),
            tool: "*".to_string(),
            direction: Direction::Request,
            operations: ops,
            priority,
            enabled: true,
        }
    }

    #[test]
    fn empty_ruleset_is_idempotent() {
        let pipeline = TransformPipeline::new();
        let data = json!({"a": 1});
        let (result, stats) = pipeline.apply("t", Direction::Request, &data, &HashMap::new());
        assert_eq!(result, data);
        assert_eq!(stats.applied_operations, 0);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(
            vec![Operation::Set { path: "a.b.c".into(), value: json!(42) }],
            0,
        ));
        let (result, stats) = pipeline.apply("t", Direction::Request, &json!({}), &HashMap::new());
        assert_eq!(result, json!({"a": {"b": {"c": 42}}}));
        assert_eq!(stats.applied_operations, 1);
    }

    #[test]
    fn remove_deletes_leaf() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(vec![Operation::Remove { path: "secret".into() }], 0));
        let (result, _) = pipeline.apply("t", Direction::Request, &json!({"secret": 1, "keep": 2}), &HashMap::new());
        assert_eq!(result, json!({"keep": 2}));
    }

    #[test]
    fn rename_moves_value_and_deletes_source() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(
            vec![Operation::Rename { from: "old".into(), to: "new".into() }],
            0,
        ));
        let (result, _) = pipeline.apply("t", Direction::Request, &json!({"old": "v"}), &HashMap::new());
        assert_eq!(result, json!({"new": "v"}));
    }

    #[test]
    fn rename_is_a_no_op_when_source_missing() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(
            vec![Operation::Rename { from: "missing".into(), to: "new".into() }],
            0,
        ));
        let data = json!({"keep": 1});
        let (result, _) = pipeline.apply("t", Direction::Request, &data, &HashMap::new());
        assert_eq!(result, data);
    }

    #[test]
    fn template_substitutes_context_and_defaults_missing_to_empty() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(
            vec![Operation::Template { path: "greeting".into(), template: "hi {{name}}{{missing}}".into() }],
            0,
        ));
        let mut ctx = HashMap::new();
        ctx.insert("name".to_string(), "ada".to_string());
        let (result, _) = pipeline.apply("t", Direction::Request, &json!({}), &ctx);
        assert_eq!(result, json!({"greeting": "hi ada"}));
    }

    #[test]
    fn rules_apply_in_priority_order() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(vec![Operation::Set { path: "x".into(), value: json!(2) }], 10));
        pipeline.add_rule(rule(vec![Operation::Set { path: "x".into(), value: json!(1) }], 1));
        let (result, _) = pipeline.apply("t", Direction::Request, &json!({}), &HashMap::new());
        assert_eq!(result, json!({"x": 2})); // lower priority runs first, higher wins last-write
    }

    #[test]
    fn input_is_never_mutated() {
        let pipeline = TransformPipeline::new();
        pipeline.add_rule(rule(vec![Operation::Set { path: "x".into(), value: json!(1) }], 0));
        let input = json!({});
        let _ = pipeline.apply("t", Direction::Request, &input, &HashMap::new());
        assert_eq!(input, json!({}));
    }

    #[test]
    fn wildcard_tool_and_direction_filtering() {
        let pipeline = TransformPipeline::new();
        let mut response_rule = rule(vec![Operation::Set { path: "y".into(), value: json!(1) }], 0);
        response_rule.direction = Direction::Response;
        pipeline.add_rule(response_rule);
        let (result, stats) = pipeline.apply("t", Direction::Request, &json!({}), &HashMap::new());
        assert_eq!(result, json!({}));
        assert_eq!(stats.applied_operations, 0);
    }
}
