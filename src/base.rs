// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Identifier types, actor roles and the per-request caller context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::WorkflowError;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a caller, as supplied by the identity provider.
    ActorId
);
numeric_id!(
    /// Identifier of a listed property.
    PropertyId
);
numeric_id!(
    /// Identifier of a rentable unit inside a property.
    UnitId
);
numeric_id!(
    /// Identifier of a content flag raised against a listing.
    FlagId
);
numeric_id!(
    /// Identifier of a support or dispute ticket.
    TicketId
);

/// Identifier of a booking. Generated by the allocator, never by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LedgerId(pub Uuid);

impl LedgerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LedgerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The fixed set of marketplace roles.
///
/// The identity provider hands the role over together with the actor id and
/// it is trusted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Student / guest looking for a place to rent.
    Tenant,
    /// Landlord owning listings.
    Owner,
    /// Intermediary listing on behalf of landlords.
    Agent,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Tenant, Role::Owner, Role::Agent, Role::Administrator];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tenant => "tenant",
            Self::Owner => "owner",
            Self::Agent => "agent",
            Self::Administrator => "administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tenant" | "student" | "guest" => Ok(Self::Tenant),
            "owner" | "landlord" => Ok(Self::Owner),
            "agent" => Ok(Self::Agent),
            "admin" | "administrator" => Ok(Self::Administrator),
            other => Err(WorkflowError::InvalidRequest(format!("unknown role '{other}'"))),
        }
    }
}

/// Who is calling, in which role, and at what time.
///
/// Every workflow and allocator call takes this explicitly; nothing in the
/// crate looks up a "current user".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: ActorId,
    pub role: Role,
    pub now: DateTime<Utc>,
}

impl RequestContext {
    pub fn new(actor: ActorId, role: Role, now: DateTime<Utc>) -> Self {
        Self { actor, role, now }
    }
}

/// Last-change bookkeeping carried by every lifecycle entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub actor_id: Option<ActorId>,
    pub updated_at: DateTime<Utc>,
}

impl Stamp {
    pub fn new(actor_id: ActorId, at: DateTime<Utc>) -> Self {
        Self {
            actor_id: Some(actor_id),
            updated_at: at,
        }
    }

    /// Records a change. `updated_at` never moves backwards.
    pub fn touch(&mut self, ctx: &RequestContext) {
        self.actor_id = Some(ctx.actor);
        self.updated_at = self.updated_at.max(ctx.now);
    }
}
