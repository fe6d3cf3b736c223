//! Deferred remote mutations.

use crate::identity::generate_mutation_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// What a queued mutation does to the remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationKind {
    /// Record creation.
    Create,
    /// Partial update.
    Update,
    /// Deletion.
    Delete,
}

/// Lifecycle of a queued mutation.
///
/// `Synced` and `Failed` are terminal: a mutation reaching either is
/// removed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    /// Waiting for the next sync pass.
    #[default]
    Pending,
    /// Being replayed by a sync pass.
    Syncing,
    /// Accepted by the server.
    Synced,
    /// Gave up after the retry ceiling.
    Failed,
}

impl MutationStatus {
    /// Returns true for `Synced` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationStatus::Synced | MutationStatus::Failed)
    }
}

/// HTTP method of a deferred call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Returns true if requests with this method carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// The remote call to defer, as handed to the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationDescriptor {
    /// Mutation kind.
    pub kind: MutationKind,
    /// Endpoint path, e.g. `/meals/65f0c1`.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Request payload; for creates it includes `localId`.
    pub payload: Value,
}

impl MutationDescriptor {
    /// Describes a deferred `POST` creating a record.
    pub fn create(endpoint: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: MutationKind::Create,
            endpoint: endpoint.into(),
            method: HttpMethod::Post,
            payload,
        }
    }

    /// Describes a deferred `PUT` updating a record.
    pub fn update(endpoint: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: MutationKind::Update,
            endpoint: endpoint.into(),
            method: HttpMethod::Put,
            payload,
        }
    }

    /// Describes a deferred `DELETE`.
    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Delete,
            endpoint: endpoint.into(),
            method: HttpMethod::Delete,
            payload: Value::Null,
        }
    }
}

/// A mutation waiting in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Queue-internal id, unrelated to any record id.
    pub id: String,
    /// Mutation kind.
    pub kind: MutationKind,
    /// Endpoint path.
    pub endpoint: String,
    /// HTTP method.
    pub method: HttpMethod,
    /// Request payload.
    #[serde(default)]
    pub payload: Value,
    /// When the mutation was queued.
    pub enqueued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Lifecycle status.
    #[serde(default)]
    pub status: MutationStatus,
}

impl QueuedMutation {
    /// Creates a fresh pending mutation with a newly generated id.
    pub fn from_descriptor(descriptor: MutationDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_mutation_id(),
            kind: descriptor.kind,
            endpoint: descriptor.endpoint,
            method: descriptor.method,
            payload: descriptor.payload,
            enqueued_at: now,
            retry_count: 0,
            status: MutationStatus::Pending,
        }
    }

    /// Returns the placeholder id carried by a create payload.
    pub fn local_id(&self) -> Option<&str> {
        self.payload.get("localId").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_constructors() {
        let create = MutationDescriptor::create("/meals", json!({"title": "Rice"}));
        assert_eq!(create.kind, MutationKind::Create);
        assert_eq!(create.method, HttpMethod::Post);

        let delete = MutationDescriptor::delete("/meals/abc");
        assert_eq!(delete.method, HttpMethod::Delete);
        assert!(delete.payload.is_null());
    }

    #[test]
    fn queued_mutation_starts_pending() {
        let descriptor = MutationDescriptor::create("/meals", json!({"localId": "local_1_a"}));
        let mutation = QueuedMutation::from_descriptor(descriptor, Utc::now());

        assert_eq!(mutation.retry_count, 0);
        assert_eq!(mutation.status, MutationStatus::Pending);
        assert_eq!(mutation.local_id(), Some("local_1_a"));
    }

    #[test]
    fn wire_names() {
        let descriptor = MutationDescriptor::update("/meals/x", json!({}));
        let mutation = QueuedMutation::from_descriptor(descriptor, Utc::now());
        let json = serde_json::to_value(&mutation).unwrap();

        assert_eq!(json["kind"], "UPDATE");
        assert_eq!(json["method"], "PUT");
        assert_eq!(json["status"], "pending");
        assert!(json.get("retryCount").is_some());
        assert!(json.get("enqueuedAt").is_some());
    }

    #[test]
    fn terminal_statuses() {
        assert!(MutationStatus::Synced.is_terminal());
        assert!(MutationStatus::Failed.is_terminal());
        assert!(!MutationStatus::Pending.is_terminal());
        assert!(!MutationStatus::Syncing.is_terminal());
    }

    #[test]
    fn method_body_rules() {
        assert!(HttpMethod::Post.has_body());
        assert!(!HttpMethod::Get.has_body());
        assert!(!HttpMethod::Delete.has_body());
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    }
}
