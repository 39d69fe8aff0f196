use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::binding::{self, Event};
use super::{Extensions, Headers, ResolutionError, ResolutionPipeline};
use crate::resource::{Param, ParamSpec, TriggerTemplate};

static RE_TEMPLATE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((?:tt\.)?params\.([A-Za-z0-9_.-]+)\)").unwrap());

/// Built-in resolution pipeline.
///
/// Binding values use `$(body.*)`, `$(header.*)` and `$(extensions.*)`;
/// templates reference resolved params as `$(tt.params.<name>)`.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver;

impl TemplateResolver {
    pub fn new() -> Self {
        Self
    }

    /// Substitutes params into one serialized resource template.
    ///
    /// Values are JSON-escaped so the result stays valid JSON. Placeholders
    /// naming unknown params are left untouched.
    pub fn substitute(&self, template: &str, params: &HashMap<&str, &str>) -> String {
        RE_TEMPLATE_PARAM
            .replace_all(template, |caps: &Captures| match params.get(&caps[1]) {
                Some(value) => escape_json_fragment(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn escape_json_fragment(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

impl ResolutionPipeline for TemplateResolver {
    fn resolve_params(
        &self,
        binding_params: &[Param],
        body: &[u8],
        headers: &Headers,
        extensions: &Extensions,
        template_params: &[ParamSpec],
    ) -> Result<Vec<Param>, ResolutionError> {
        let body: serde_json::Value = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(body).map_err(|e| ResolutionError::InvalidBody(e.to_string()))?
        };
        let event = Event {
            body: &body,
            headers,
            extensions,
        };
        binding::resolve(binding_params, &event, template_params)
    }

    fn render(
        &self,
        template: &TriggerTemplate,
        params: &[Param],
    ) -> Result<Vec<Vec<u8>>, ResolutionError> {
        let lookup: HashMap<&str, &str> = params
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();

        template
            .spec
            .resourcetemplates
            .iter()
            .enumerate()
            .map(|(index, resource)| {
                let raw = serde_json::to_string(resource).map_err(|e| ResolutionError::Render {
                    index,
                    reason: e.to_string(),
                })?;
                Ok(self.substitute(&raw, &lookup).into_bytes())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::TriggerTemplateSpec;
    use serde_json::json;

    fn template(resources: Vec<serde_json::Value>) -> TriggerTemplate {
        TriggerTemplate::new(
            "widget-template",
            TriggerTemplateSpec {
                params: vec![ParamSpec::new("revision")],
                resourcetemplates: resources,
            },
        )
    }

    #[test]
    fn test_render_substitutes_params() {
        let resolver = TemplateResolver::new();
        let tt = template(vec![json!({
            "apiVersion": "tekton.dev/v1beta1",
            "kind": "PipelineRun",
            "metadata": {"generateName": "widget-run-"},
            "spec": {"params": [{"name": "revision", "value": "$(tt.params.revision)"}]}
        })]);

        let rendered = resolver
            .render(&tt, &[Param::new("revision", "abc123")])
            .unwrap();
        assert_eq!(rendered.len(), 1);
        let value: serde_json::Value = serde_json::from_slice(&rendered[0]).unwrap();
        assert_eq!(value["spec"]["params"][0]["value"], "abc123");
    }

    #[test]
    fn test_render_escapes_values() {
        let resolver = TemplateResolver::new();
        let tt = template(vec![json!({"kind": "ConfigMap", "data": {"msg": "$(params.message)"}})]);

        let rendered = resolver
            .render(&tt, &[Param::new("message", "say \"hi\"\nbye")])
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&rendered[0]).unwrap();
        assert_eq!(value["data"]["msg"], "say \"hi\"\nbye");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let resolver = TemplateResolver::new();
        let mut params = HashMap::new();
        params.insert("a", "1");
        assert_eq!(
            resolver.substitute("$(tt.params.a)-$(tt.params.b)", &params),
            "1-$(tt.params.b)"
        );
    }

    #[test]
    fn test_render_empty_template() {
        let resolver = TemplateResolver::new();
        assert!(resolver.render(&template(vec![]), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_params_from_commit_payload() {
        let resolver = TemplateResolver::new();
        let params = resolver
            .resolve_params(
                &[Param::new("revision", "$(body.sha)")],
                br#"{"sha":"abc123"}"#,
                &Headers::new(),
                &Extensions::new(),
                &[ParamSpec::new("revision")],
            )
            .unwrap();
        assert_eq!(params, vec![Param::new("revision", "abc123")]);
    }

    #[test]
    fn test_resolve_params_rejects_invalid_body() {
        let resolver = TemplateResolver::new();
        let result = resolver.resolve_params(
            &[Param::new("revision", "$(body.sha)")],
            b"<html>",
            &Headers::new(),
            &Extensions::new(),
            &[],
        );
        assert!(matches!(result, Err(ResolutionError::InvalidBody(_))));
    }
}
