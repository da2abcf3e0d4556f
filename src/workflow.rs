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

//! The five workflow instances bound to the lifecycle engine.
//!
//! | Machine | Edges | Role |
//! |---------|-------|------|
//! | [`PROPERTY_APPROVAL`] | Draft → Active, Draft → Rejected | Administrator |
//! | [`PROPERTY_VERIFICATION`] | Unverified ⇄ Verified | Administrator |
//! | [`CONTENT_FLAG`] | Pending → Reviewed → Resolved, Pending → Resolved | Administrator |
//! | [`SUPPORT_TICKET`] | Open → InProgress, Open/InProgress → Resolved/Closed | Administrator |
//! | [`UNIT_BOOKING`] | Available → Reserved → Occupied, Reserved/Occupied → Available | Tenant reserves, Owner/Administrator the rest |

use crate::base::Role;
use crate::lifecycle::{Edge, Hook, StateMachine, Status};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::WorkflowError;

const ADMIN: &[Role] = &[Role::Administrator];
const LANDLORD: &[Role] = &[Role::Owner, Role::Administrator];
const TENANT: &[Role] = &[Role::Tenant];

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl Status for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = WorkflowError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($label => Ok(Self::$variant),)+
                    other => Err(WorkflowError::InvalidRequest(format!(
                        "unknown {} status '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

status_enum!(
    /// Listing approval state.
    ApprovalStatus {
        Draft => "draft",
        Active => "active",
        Rejected => "rejected",
    }
);

status_enum!(
    /// Verification badge of an approved listing.
    VerificationStatus {
        Unverified => "unverified",
        Verified => "verified",
    }
);

status_enum!(
    /// Moderation state of a flag raised against a listing.
    FlagStatus {
        Pending => "pending",
        Reviewed => "reviewed",
        Resolved => "resolved",
    }
);

status_enum!(
    /// Support or dispute ticket state.
    TicketStatus {
        Open => "open",
        InProgress => "in_progress",
        Resolved => "resolved",
        Closed => "closed",
    }
);

status_enum!(
    /// Occupancy of a rentable unit.
    UnitStatus {
        Available => "available",
        Reserved => "reserved",
        Occupied => "occupied",
    }
);

pub static PROPERTY_APPROVAL: StateMachine<ApprovalStatus> = StateMachine::new(
    "property approval",
    &[
        Edge::new(ApprovalStatus::Draft, ApprovalStatus::Active, ADMIN, &[], true),
        Edge::new(ApprovalStatus::Draft, ApprovalStatus::Rejected, ADMIN, &[], true),
    ],
);

// Reversible toggle.
pub static PROPERTY_VERIFICATION: StateMachine<VerificationStatus> = StateMachine::new(
    "property verification",
    &[
        Edge::new(
            VerificationStatus::Unverified,
            VerificationStatus::Verified,
            ADMIN,
            &[],
            true,
        ),
        Edge::new(
            VerificationStatus::Verified,
            VerificationStatus::Unverified,
            ADMIN,
            &[],
            false,
        ),
    ],
);

pub static CONTENT_FLAG: StateMachine<FlagStatus> = StateMachine::new(
    "content flag",
    &[
        Edge::new(
            FlagStatus::Pending,
            FlagStatus::Reviewed,
            ADMIN,
            &[Hook::RecordReview],
            false,
        ),
        Edge::new(
            FlagStatus::Pending,
            FlagStatus::Resolved,
            ADMIN,
            &[Hook::RecordResolution],
            true,
        ),
        Edge::new(
            FlagStatus::Reviewed,
            FlagStatus::Resolved,
            ADMIN,
            &[Hook::RecordResolution],
            true,
        ),
    ],
);

pub static SUPPORT_TICKET: StateMachine<TicketStatus> = StateMachine::new(
    "support ticket",
    &[
        Edge::new(TicketStatus::Open, TicketStatus::InProgress, ADMIN, &[], false),
        Edge::new(
            TicketStatus::Open,
            TicketStatus::Resolved,
            ADMIN,
            &[Hook::IssueRefund],
            true,
        ),
        Edge::new(TicketStatus::Open, TicketStatus::Closed, ADMIN, &[], true),
        Edge::new(
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            ADMIN,
            &[Hook::IssueRefund],
            true,
        ),
        Edge::new(TicketStatus::InProgress, TicketStatus::Closed, ADMIN, &[], true),
    ],
);

pub static UNIT_BOOKING: StateMachine<UnitStatus> = StateMachine::new(
    "unit booking",
    &[
        Edge::new(
            UnitStatus::Available,
            UnitStatus::Reserved,
            TENANT,
            &[Hook::AllocateBooking],
            true,
        ),
        Edge::new(UnitStatus::Reserved, UnitStatus::Occupied, LANDLORD, &[], true),
        // Cancellation.
        Edge::new(
            UnitStatus::Reserved,
            UnitStatus::Available,
            LANDLORD,
            &[Hook::ReleaseBooking],
            true,
        ),
        // Tenancy ended.
        Edge::new(
            UnitStatus::Occupied,
            UnitStatus::Available,
            LANDLORD,
            &[Hook::ReleaseBooking],
            false,
        ),
    ],
);
