// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External chat-platform role API, the side-effect target of compensations.

use async_trait::async_trait;

use crate::error::DocketError;
use crate::types::{ActorId, TenantId};

/// Grants and revokes guild roles on the chat platform.
///
/// Calls here happen outside any datastore transaction, which is why role
/// grants are paired with revocation compensations.
#[async_trait]
pub trait RoleGateway: Send + Sync + 'static {
    async fn grant_role(
        &self,
        tenant: &TenantId,
        member: &ActorId,
        role_id: &str,
    ) -> Result<(), DocketError>;

    async fn revoke_role(
        &self,
        tenant: &TenantId,
        member: &ActorId,
        role_id: &str,
    ) -> Result<(), DocketError>;
}
