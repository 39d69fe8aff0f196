//! Evaluation of binding expressions against an event.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use super::{Extensions, Headers, ResolutionError};
use crate::resource::{Param, ParamSpec};

static RE_EXPRESSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((body|header|extensions)(?:\.([^)]+))?\)").unwrap());

/// The event a binding is evaluated against.
pub struct Event<'a> {
    pub body: &'a Value,
    pub headers: &'a Headers,
    pub extensions: &'a Extensions,
}

impl Event<'_> {
    fn lookup(&self, root: &str, path: Option<&str>) -> Result<String, String> {
        match root {
            "body" => lookup_json(self.body, path),
            "extensions" => match path {
                Some(path) => {
                    let (first, rest) = match path.split_once('.') {
                        Some((first, rest)) => (first, Some(rest)),
                        None => (path, None),
                    };
                    let value = self
                        .extensions
                        .get(first)
                        .ok_or_else(|| format!("extension '{}' not found", first))?;
                    lookup_json(value, rest)
                }
                None => Ok(Value::Object(self.extensions.clone()).to_string()),
            },
            "header" => {
                let name = path.ok_or_else(|| "header name required".to_string())?;
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, values)| values.join(","))
                    .ok_or_else(|| format!("header '{}' not present", name))
            }
            other => Err(format!("unknown root '{}'", other)),
        }
    }
}

fn lookup_json(root: &Value, path: Option<&str>) -> Result<String, String> {
    let mut current = root;
    if let Some(path) = path {
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| format!("field '{}' not found", segment))?;
        }
    }
    Ok(match current {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Evaluates one binding value, replacing every expression it contains.
pub fn evaluate(param: &str, raw: &str, event: &Event<'_>) -> Result<String, ResolutionError> {
    let mut failure = None;
    let resolved = RE_EXPRESSION.replace_all(raw, |caps: &Captures| {
        let root = &caps[1];
        let path = caps.get(2).map(|m| m.as_str());
        match event.lookup(root, path) {
            Ok(value) => value,
            Err(reason) => {
                failure.get_or_insert(ResolutionError::UnresolvedExpression {
                    param: param.to_string(),
                    expression: caps[0].to_string(),
                    reason,
                });
                String::new()
            }
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(resolved.into_owned()),
    }
}

/// Resolves binding params and fills in template defaults.
///
/// Binding values win over defaults. Params the binding supplies but the
/// template does not declare are kept so templates can still reference them.
pub fn resolve(
    binding_params: &[Param],
    event: &Event<'_>,
    template_params: &[ParamSpec],
) -> Result<Vec<Param>, ResolutionError> {
    let mut resolved: Vec<Param> = Vec::with_capacity(binding_params.len());
    for param in binding_params {
        let value = evaluate(&param.name, &param.value, event)?;
        match resolved.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => existing.value = value,
            None => resolved.push(Param::new(&param.name, value)),
        }
    }

    for spec in template_params {
        if resolved.iter().any(|p| p.name == spec.name) {
            continue;
        }
        match &spec.default {
            Some(default) => resolved.push(Param::new(&spec.name, default)),
            None => return Err(ResolutionError::MissingParam(spec.name.clone())),
        }
    }

    Ok(resolved)
}
