//! Blueprint Renderer (§4.8, C11): expands a parameterised formation
//! template — an arbitrary JSON tree carrying `{{ var }}` and
//! `{% if %}…{% else %}…{% endif %}` tokens in string leaves — against a
//! variable map.
//!
//! Grounded on `agenticlaw_kg::registry::render_template`/`TemplateVars`:
//! same "walk the template, substitute placeholders" shape, generalized from
//! flat `{name}` substitution over a fixed struct to a recursive JSON-tree
//! walk over an arbitrary variable map with conditionals.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use kais_core::{Error, Result};
use regex::Regex;
use serde_json::Value;

pub type Variables = BTreeMap<String, Value>;

fn var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap())
}

fn if_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\{%\s*if\s+(.+?)\s*%\}(.*?)(?:\{%\s*else\s*%\}(.*?))?\{%\s*endif\s*%\}").unwrap()
    })
}

/// Renders `template` against `vars`. Recurses into objects and arrays;
/// string leaves are expanded per §4.8's rules. An unknown variable anywhere
/// in the tree is a rendering error (§4.8, §8).
pub fn render(template: &Value, vars: &Variables) -> Result<Value> {
    match template {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render(v, vars)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render(item, vars)?);
            }
            Ok(Value::Array(out))
        }
        Value::String(s) => render_string(s, vars),
        other => Ok(other.clone()),
    }
}

fn render_string(s: &str, vars: &Variables) -> Result<Value> {
    // A string that is exactly "{{ name }}" takes the raw variable value
    // (number/boolean preserved), not its stringified form (§4.8).
    if let Some(caps) = var_regex().captures(s.trim()) {
        if caps.get(0).unwrap().as_str() == s.trim() {
            let name = &caps[1];
            return lookup(vars, name).cloned();
        }
    }

    let with_conditionals = expand_conditionals(s, vars)?;
    let substituted = substitute_vars(&with_conditionals, vars)?;
    Ok(Value::String(substituted))
}

fn lookup<'a>(vars: &'a Variables, name: &str) -> Result<&'a Value> {
    vars.get(name).ok_or_else(|| Error::validation(format!("unknown blueprint variable '{name}'")))
}

/// Evaluates every `{% if … %}…{% else %}…{% endif %}` block in `s`,
/// replacing each with its chosen branch's (variable-substituted) text.
fn expand_conditionals(s: &str, vars: &Variables) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut last_end = 0;
    for caps in if_regex().captures_iter(s) {
        let whole = caps.get(0).unwrap();
        out.push_str(&s[last_end..whole.start()]);
        let condition = caps.get(1).unwrap().as_str();
        let then_branch = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let else_branch = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let chosen = if eval_condition(condition, vars)? { then_branch } else { else_branch };
        out.push_str(&substitute_vars(chosen, vars)?);
        last_end = whole.end();
    }
    out.push_str(&s[last_end..]);
    Ok(out)
}

/// Simple equality/boolean expressions over variables (§4.8): `var == "x"`,
/// `var != "x"`, bare `var` (truthy), or `!var` (negated truthy).
fn eval_condition(condition: &str, vars: &Variables) -> Result<bool> {
    let condition = condition.trim();
    if let Some((lhs, rhs)) = condition.split_once("==") {
        return Ok(resolve_operand(lhs.trim(), vars)? == resolve_operand(rhs.trim(), vars)?);
    }
    if let Some((lhs, rhs)) = condition.split_once("!=") {
        return Ok(resolve_operand(lhs.trim(), vars)? != resolve_operand(rhs.trim(), vars)?);
    }
    if let Some(name) = condition.strip_prefix('!') {
        return Ok(!is_truthy(lookup(vars, name.trim())?));
    }
    Ok(is_truthy(lookup(vars, condition)?))
}

/// An operand is either a quoted literal or a variable name.
fn resolve_operand(token: &str, vars: &Variables) -> Result<String> {
    if (token.starts_with('"') && token.ends_with('"')) || (token.starts_with('\'') && token.ends_with('\'')) {
        return Ok(token[1..token.len() - 1].to_string());
    }
    Ok(coerce_to_string(lookup(vars, token)?))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Textual `{{ var }}` substitution with standard coercion, for mixed
/// strings that aren't an exact single-placeholder match (§4.8).
fn substitute_vars(s: &str, vars: &Variables) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut last_end = 0;
    for caps in var_regex().captures_iter(s) {
        let whole = caps.get(0).unwrap();
        out.push_str(&s[last_end..whole.start()]);
        let value = lookup(vars, &caps[1])?;
        out.push_str(&coerce_to_string(value));
        last_end = whole.end();
    }
    out.push_str(&s[last_end..]);
    Ok(out)
}
