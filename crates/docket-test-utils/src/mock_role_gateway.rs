// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock chat-platform role gateway with captured calls.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use docket_core::traits::RoleGateway;
use docket_core::types::{ActorId, TenantId};
use docket_core::DocketError;

/// A role change observed by [`MockRoleGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCall {
    pub tenant: String,
    pub member: String,
    pub role_id: String,
}

/// Captures grants and revocations; revocations can be made to fail.
#[derive(Clone, Default)]
pub struct MockRoleGateway {
    granted: Arc<Mutex<Vec<RoleCall>>>,
    revoked: Arc<Mutex<Vec<RoleCall>>>,
    revoke_failures: Arc<Mutex<u32>>,
}

impl MockRoleGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` revoke calls fail with a platform error.
    pub async fn fail_revokes(&self, count: u32) {
        *self.revoke_failures.lock().await = count;
    }

    pub async fn granted(&self) -> Vec<RoleCall> {
        self.granted.lock().await.clone()
    }

    pub async fn revoked(&self) -> Vec<RoleCall> {
        self.revoked.lock().await.clone()
    }
}

fn call(tenant: &TenantId, member: &ActorId, role_id: &str) -> RoleCall {
    RoleCall {
        tenant: tenant.to_string(),
        member: member.to_string(),
        role_id: role_id.to_string(),
    }
}

#[async_trait]
impl RoleGateway for MockRoleGateway {
    async fn grant_role(
        &self,
        tenant: &TenantId,
        member: &ActorId,
        role_id: &str,
    ) -> Result<(), DocketError> {
        self.granted.lock().await.push(call(tenant, member, role_id));
        Ok(())
    }

    async fn revoke_role(
        &self,
        tenant: &TenantId,
        member: &ActorId,
        role_id: &str,
    ) -> Result<(), DocketError> {
        {
            let mut failures = self.revoke_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(DocketError::Platform {
                    message: format!("revoke of role {role_id} rejected"),
                    source: None,
                });
            }
        }
        self.revoked.lock().await.push(call(tenant, member, role_id));
        Ok(())
    }
}
