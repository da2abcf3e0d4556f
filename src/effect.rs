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

//! Side-effect descriptors reported back to callers.

use crate::base::{ActorId, BookingId, LedgerId, UnitId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A secondary action performed as part of a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SideEffect {
    UnitReserved {
        unit_id: UnitId,
        booking_id: BookingId,
    },
    UnitReleased {
        unit_id: UnitId,
        booking_id: BookingId,
    },
    LedgerRecordCreated {
        id: LedgerId,
    },
    ReviewRecorded {
        by: ActorId,
        at: DateTime<Utc>,
    },
    ResolutionRecorded {
        by: ActorId,
        at: DateTime<Utc>,
    },
}

/// The status an entity ended in, plus what happened along the way.
///
/// Re-requesting the current status yields the same status and no effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<S> {
    pub status: S,
    pub effects: Vec<SideEffect>,
}

impl<S> Outcome<S> {
    pub fn new(status: S, effects: Vec<SideEffect>) -> Self {
        Self { status, effects }
    }

    pub fn unchanged(status: S) -> Self {
        Self::new(status, Vec::new())
    }
}
