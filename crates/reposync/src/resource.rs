//! Custom resources for repository sync.
//!
//! `SyncRepo` is served by this controller and carries the status it owns.
//! `TriggerBinding` and `TriggerTemplate` are the Tekton Triggers kinds it
//! reads; their CRDs are installed by Tekton, so no schema is derived here.

use chrono::{DateTime, Utc};
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespace assumed for objects that do not name one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a namespaced object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncKey {
    pub namespace: String,
    pub name: String,
}

impl SyncKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of any namespaced object.
    pub fn of<K: Resource>(object: &K) -> Self {
        Self {
            namespace: object
                .namespace()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            name: object.name_any(),
        }
    }
}

impl std::fmt::Display for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ============================================================================
// SyncRepo Resource
// ============================================================================

/// Desired sync configuration.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "triggers.tekton.dev",
    version = "v1alpha1",
    kind = "SyncRepo",
    namespaced,
    status = "SyncRepoStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Branch","type":"string","jsonPath":".spec.branch"}"#,
    printcolumn = r#"{"name":"Commit","type":"string","jsonPath":".status.lastCommit"}"#
)]
pub struct SyncRepoSpec {
    /// Repository URL, e.g. `https://github.com/acme/widget`.
    #[serde(default)]
    pub repo: String,

    /// Branch to track.
    #[serde(default)]
    pub branch: String,

    /// Poll interval as a duration string, e.g. `5m`.
    #[serde(default)]
    pub frequency: String,

    /// Name of the TriggerBinding in the same namespace.
    #[serde(default, rename = "binding")]
    pub trigger_binding: String,

    /// Name of the TriggerTemplate in the same namespace.
    #[serde(default, rename = "template")]
    pub trigger_template: String,
}

/// Observed sync state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncRepoStatus {
    /// Last commit whose derived resources were all created.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_commit: String,

    /// When `last_commit` last advanced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl SyncRepoStatus {
    /// Returns the condition with the given type, if present.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    /// Returns true when `Ready` is recorded as `True`.
    pub fn is_ready(&self) -> bool {
        self.condition(CONDITION_READY)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }

    /// Inserts or replaces a condition. Returns false if nothing changed.
    ///
    /// The transition time is preserved unless the status flips.
    pub fn set_condition(&mut self, mut condition: Condition) -> bool {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) => {
                if existing.same_state(&condition) {
                    return false;
                }
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
                true
            }
            None => {
                self.conditions.push(condition);
                true
            }
        }
    }
}

impl SyncRepo {
    /// Creates a sync resource in `namespace`.
    pub fn namespaced(namespace: &str, name: &str, spec: SyncRepoSpec) -> Self {
        let mut repo = SyncRepo::new(name, spec);
        repo.metadata.namespace = Some(namespace.to_string());
        repo
    }

    pub fn key(&self) -> SyncKey {
        SyncKey::of(self)
    }

    /// Recorded status, empty before the first write.
    pub fn observed(&self) -> SyncRepoStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Last commit whose derived resources were all created.
    pub fn last_commit(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.last_commit.as_str())
            .unwrap_or("")
    }

    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()
            .and_then(|s| s.condition(CONDITION_READY))
    }
}

/// Condition type maintained by the controller.
pub const CONDITION_READY: &str = "Ready";

/// Status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Latest observation of an aspect of the resource's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Creates a `Ready` condition stamped with the current time.
    pub fn ready(status: ConditionStatus, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            condition_type: CONDITION_READY.to_string(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

// ============================================================================
// TriggerBinding Resource
// ============================================================================

/// A named value extracted from the event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Binding specification - how to pull parameters out of an event.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "triggers.tekton.dev",
    version = "v1beta1",
    kind = "TriggerBinding",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
pub struct TriggerBindingSpec {
    #[serde(default)]
    pub params: Vec<Param>,
}

// ============================================================================
// TriggerTemplate Resource
// ============================================================================

/// Declaration of a template parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Template specification - parameterized resources to create.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "triggers.tekton.dev",
    version = "v1beta1",
    kind = "TriggerTemplate",
    namespaced,
    schema = "disabled",
    derive = "PartialEq"
)]
pub struct TriggerTemplateSpec {
    #[serde(default)]
    pub params: Vec<ParamSpec>,

    /// Raw resource objects containing `$(tt.params.<name>)` placeholders.
    #[serde(default)]
    pub resourcetemplates: Vec<serde_json::Value>,
}

/// Places a binding or template in `namespace`.
pub fn in_namespace<K: Resource>(mut object: K, namespace: &str) -> K {
    object.meta_mut().namespace = Some(namespace.to_string());
    object
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_deserialize_sync_repo() {
        let yaml = r#"
apiVersion: triggers.tekton.dev/v1alpha1
kind: SyncRepo
metadata:
  name: widget
  namespace: ci
spec:
  repo: https://github.com/acme/widget
  branch: main
  frequency: 5m
  binding: widget-binding
  template: widget-template
"#;
        let repo: SyncRepo = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(repo.key(), SyncKey::new("ci", "widget"));
        assert_eq!(repo.spec.trigger_binding, "widget-binding");
        assert_eq!(repo.spec.trigger_template, "widget-template");
        assert!(repo.last_commit().is_empty());
    }

    #[test]
    fn test_serialize_carries_type_meta() {
        let repo = SyncRepo::namespaced("ci", "widget", SyncRepoSpec::default());
        let json = serde_json::to_value(&repo).unwrap();
        assert_eq!(json["apiVersion"], "triggers.tekton.dev/v1alpha1");
        assert_eq!(json["kind"], "SyncRepo");
        assert_eq!(json["metadata"]["namespace"], "ci");
    }

    #[test]
    fn test_key_defaults_namespace() {
        let yaml = r#"
apiVersion: triggers.tekton.dev/v1beta1
kind: TriggerBinding
metadata:
  name: b
spec:
  params:
    - name: revision
      value: $(body.sha)
"#;
        let binding: TriggerBinding = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(SyncKey::of(&binding), SyncKey::new("default", "b"));
        assert_eq!(binding.spec.params[0], Param::new("revision", "$(body.sha)"));
    }

    #[test]
    fn test_status_serializes_last_commit_camel_case() {
        let status = SyncRepoStatus {
            last_commit: "abc123".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["lastCommit"], "abc123");
        assert!(json.get("conditions").is_none());
    }

    #[test]
    fn test_unknown_condition_is_not_ready() {
        let status: SyncRepoStatus = serde_json::from_value(serde_json::json!({
            "lastCommit": "abc123",
            "conditions": [{
                "type": "Ready",
                "status": "Unknown",
                "reason": "Pending",
                "lastTransitionTime": "2024-01-01T00:00:00Z"
            }]
        }))
        .unwrap();
        assert_eq!(
            status.condition(CONDITION_READY).map(|c| c.status),
            Some(ConditionStatus::Unknown)
        );
        assert!(!status.is_ready());
    }

    #[test]
    fn test_set_condition_reports_changes() {
        let mut status = SyncRepoStatus::default();
        assert!(status.set_condition(Condition::ready(ConditionStatus::False, "RateLimited", "x")));
        assert!(!status.set_condition(Condition::ready(ConditionStatus::False, "RateLimited", "x")));
        assert!(status.set_condition(Condition::ready(ConditionStatus::True, "Synced", "ok")));
        assert_eq!(status.conditions.len(), 1);
        assert!(status.is_ready());
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut status = SyncRepoStatus::default();
        let mut first = Condition::ready(ConditionStatus::False, "A", "a");
        first.last_transition_time = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        status.set_condition(first);

        status.set_condition(Condition::ready(ConditionStatus::False, "B", "b"));
        let cond = status.condition(CONDITION_READY).unwrap();
        assert_eq!(cond.reason, "B");
        assert_eq!(cond.last_transition_time.timestamp(), 0);
    }

    #[test]
    fn test_crd_has_status_subresource() {
        let crd = SyncRepo::crd();
        assert_eq!(crd.spec.group, "triggers.tekton.dev");
        assert_eq!(crd.spec.names.kind, "SyncRepo");
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }
}
