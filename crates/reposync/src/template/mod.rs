//! Parameter binding and template rendering.
//!
//! A binding pulls named values out of an event payload; a template turns
//! those values into concrete resource manifests. The reconciler only depends
//! on the [`ResolutionPipeline`] trait, [`TemplateResolver`] is the built-in
//! implementation.

pub mod binding;
pub mod render;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::resource::{Param, ParamSpec, TriggerTemplate};

pub use render::TemplateResolver;

/// Request headers accompanying an event, keyed by header name.
pub type Headers = BTreeMap<String, Vec<String>>;

/// Extra event data that is not part of the body.
pub type Extensions = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur while resolving parameters or rendering templates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Event body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("Param '{param}': expression '{expression}' did not resolve: {reason}")]
    UnresolvedExpression {
        param: String,
        expression: String,
        reason: String,
    },

    #[error("Template param '{0}' has no value and no default")]
    MissingParam(String),

    #[error("Failed to render resource template #{index}: {reason}")]
    Render { index: usize, reason: String },
}

/// Turns an event into rendered manifests.
pub trait ResolutionPipeline: Send + Sync {
    /// Resolves binding params against the event and merges template defaults.
    fn resolve_params(
        &self,
        binding_params: &[Param],
        body: &[u8],
        headers: &Headers,
        extensions: &Extensions,
        template_params: &[ParamSpec],
    ) -> Result<Vec<Param>, ResolutionError>;

    /// Renders every resource template of `template` with `params`.
    fn render(
        &self,
        template: &TriggerTemplate,
        params: &[Param],
    ) -> Result<Vec<Vec<u8>>, ResolutionError>;
}
