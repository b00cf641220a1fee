// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across the Docket crates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the user issuing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

/// Identity of the guild an operation is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Identity of one logical transaction and its compensation plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    /// Generate a fresh random transaction id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

macro_rules! string_id {
    ($($ty:ident),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $ty {
                fn from(value: &str) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<String> for $ty {
                fn from(value: String) -> Self {
                    Self(value)
                }
            }

            impl $ty {
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }
        )+
    };
}

string_id!(ActorId, TenantId, TransactionId);

/// Health status reported by datastore health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational but experiencing issues.
    Degraded(String),
    /// Not operational.
    Unhealthy(String),
}

/// Who is running an operation and where, carried into logs and rollback contexts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub tenant_id: Option<TenantId>,
    pub actor_id: Option<ActorId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl OperationContext {
    pub fn new(tenant_id: impl Into<TenantId>, actor_id: impl Into<ActorId>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            actor_id: Some(actor_id.into()),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_transaction_ids_are_unique() {
        let a = TransactionId::generate();
        let b = TransactionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn context_serializes_metadata() {
        let ctx = OperationContext::new("guild-1", "user-1")
            .with_metadata("command", serde_json::json!("case assign"));
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["tenant_id"], "guild-1");
        assert_eq!(json["metadata"]["command"], "case assign");
    }
}
