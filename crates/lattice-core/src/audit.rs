//! Security audit event infrastructure.
//!
//! Audit events capture security-relevant registry decisions (allow/deny)
//! for authentication and for schema publish/delete outcomes.
//!
//! ## Design Principles
//!
//! 1. **Never include secrets**: tokens and SDL contents are never recorded
//! 2. **Append-only semantics**: events are immutable once written
//! 3. **Fail-open**: audit failures don't block registry operations
//!
//! ## Usage
//!
//! ```rust
//! use lattice_core::audit::{AuditAction, AuditEvent};
//!
//! let event = AuditEvent::builder()
//!     .action(AuditAction::SchemaPublish)
//!     .actor("token:3fa85f64")
//!     .target("01HV2N9Q4WXYZ0123456789ABC")
//!     .decision_reason("composable")
//!     .try_build()
//!     .unwrap();
//!
//! let json = serde_json::to_string(&event).unwrap();
//! assert!(!json.contains("Bearer"));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the audit event schema.
///
/// Increment when making breaking changes to the schema.
pub const AUDIT_EVENT_VERSION: u32 = 1;

/// Security decision actions that are audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum AuditAction {
    /// Authentication or scope check succeeded.
    AuthAllow,
    /// Authentication or scope check failed.
    AuthDeny,
    /// A schema version was published.
    SchemaPublish,
    /// A schema publish was rejected.
    SchemaPublishDeny,
    /// A subgraph was deleted.
    SchemaDelete,
    /// A subgraph delete was rejected.
    SchemaDeleteDeny,
}

impl AuditAction {
    /// Returns true if this is a denial action.
    #[must_use]
    pub const fn is_deny(&self) -> bool {
        matches!(
            self,
            Self::AuthDeny | Self::SchemaPublishDeny | Self::SchemaDeleteDeny
        )
    }

    /// Returns the category of this action for grouping.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::AuthAllow | Self::AuthDeny => "auth",
            Self::SchemaPublish | Self::SchemaPublishDeny => "schema_publish",
            Self::SchemaDelete | Self::SchemaDeleteDeny => "schema_delete",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AuthAllow => "AUTH_ALLOW",
            Self::AuthDeny => "AUTH_DENY",
            Self::SchemaPublish => "SCHEMA_PUBLISH",
            Self::SchemaPublishDeny => "SCHEMA_PUBLISH_DENY",
            Self::SchemaDelete => "SCHEMA_DELETE",
            Self::SchemaDeleteDeny => "SCHEMA_DELETE_DENY",
        };
        write!(f, "{s}")
    }
}

/// A security audit event.
///
/// Designed to be safe for serialization and logging: no tokens, no SDL
/// bodies, no metadata payloads. `actor`, `target` and `decision_reason`
/// carry only identifiers and stable reason codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Audit schema version.
    pub version: u32,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// The decision point.
    pub action: AuditAction,
    /// Who triggered the decision (a token fingerprint, never the token).
    pub actor: String,
    /// The target the decision applies to.
    pub target: String,
    /// Affected service name, when the decision concerns one subgraph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Stable reason code for the decision.
    pub decision_reason: String,
}

impl AuditEvent {
    /// Starts building an audit event.
    #[must_use]
    pub fn builder() -> AuditEventBuilder {
        AuditEventBuilder::default()
    }

    /// Emits the event to the structured log.
    ///
    /// This is the fail-open path: recording is a log write and cannot
    /// block or fail the guarded operation.
    pub fn emit(&self) {
        if self.action.is_deny() {
            tracing::warn!(
                audit = true,
                action = %self.action,
                actor = %self.actor,
                target = %self.target,
                service = ?self.service,
                reason = %self.decision_reason,
                "audit deny"
            );
        } else {
            tracing::info!(
                audit = true,
                action = %self.action,
                actor = %self.actor,
                target = %self.target,
                service = ?self.service,
                reason = %self.decision_reason,
                "audit allow"
            );
        }
    }
}

/// Builder for [`AuditEvent`].
#[derive(Debug, Default)]
pub struct AuditEventBuilder {
    action: Option<AuditAction>,
    actor: Option<String>,
    target: Option<String>,
    service: Option<String>,
    decision_reason: Option<String>,
}

impl AuditEventBuilder {
    /// Sets the decision point.
    #[must_use]
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Sets the actor (token fingerprint or principal id, never a secret).
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Sets the target identifier.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the affected service name.
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the stable decision reason code.
    #[must_use]
    pub fn decision_reason(mut self, reason: impl Into<String>) -> Self {
        self.decision_reason = Some(reason.into());
        self
    }

    /// Builds the event.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first missing required field.
    pub fn try_build(self) -> Result<AuditEvent, &'static str> {
        Ok(AuditEvent {
            version: AUDIT_EVENT_VERSION,
            timestamp: Utc::now(),
            action: self.action.ok_or("action is required")?,
            actor: self.actor.ok_or("actor is required")?,
            target: self.target.ok_or("target is required")?,
            service: self.service,
            decision_reason: self.decision_reason.ok_or("decision_reason is required")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_action() {
        let err = AuditEvent::builder()
            .actor("token:abc")
            .target("t")
            .decision_reason("r")
            .try_build()
            .unwrap_err();
        assert_eq!(err, "action is required");
    }

    #[test]
    fn deny_actions_are_classified() {
        assert!(AuditAction::SchemaPublishDeny.is_deny());
        assert!(!AuditAction::SchemaPublish.is_deny());
        assert_eq!(AuditAction::SchemaDelete.category(), "schema_delete");
    }

    #[test]
    fn serialized_event_is_stable() {
        let event = AuditEvent::builder()
            .action(AuditAction::AuthDeny)
            .actor("token:abc")
            .target("01HV2N9Q4WXYZ0123456789ABC")
            .decision_reason("missing_scope:target:registry:write")
            .try_build()
            .unwrap();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"AUTH_DENY\""));
        assert!(json.contains("missing_scope"));
    }
}
