// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ready-made compensations for chat-platform side effects.

use std::sync::Arc;

use docket_core::traits::RoleGateway;
use docket_core::types::{ActorId, TenantId};

use crate::rollback::CompensationAction;

/// Undo a role grant by revoking it.
///
/// The action id is derived from its target, so registering the same
/// revocation twice for one transaction keeps a single plan entry.
pub fn revoke_role_action(
    gateway: Arc<dyn RoleGateway>,
    tenant: TenantId,
    member: ActorId,
    role_id: impl Into<String>,
) -> CompensationAction {
    let role_id = role_id.into();
    let id = format!("revoke-role:{tenant}:{member}:{role_id}");
    let description = format!("revoke role {role_id} from {member} in {tenant}");
    CompensationAction::new(id, move || {
        let gateway = Arc::clone(&gateway);
        let tenant = tenant.clone();
        let member = member.clone();
        let role_id = role_id.clone();
        async move { gateway.revoke_role(&tenant, &member, &role_id).await }
    })
    .with_description(description)
    .with_priority(10)
}
