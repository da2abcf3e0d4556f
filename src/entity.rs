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

//! Lifecycle entities persisted by the marketplace.

use crate::base::{ActorId, BookingId, FlagId, LedgerId, PropertyId, Stamp, TicketId, UnitId};
use crate::workflow::{ApprovalStatus, FlagStatus, TicketStatus, UnitStatus, VerificationStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::WorkflowError;

/// A rental listing.
///
/// A listing goes through approval first; only an approved (`Active`)
/// listing can carry a verification badge or have its units reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: PropertyId,
    pub owner: ActorId,
    pub title: String,
    pub status: ApprovalStatus,
    pub verification: VerificationStatus,
    pub featured: bool,
    pub stamp: Stamp,
}

impl Property {
    pub fn new(id: PropertyId, owner: ActorId, title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            title: title.into(),
            status: ApprovalStatus::Draft,
            verification: VerificationStatus::Unverified,
            featured: false,
            stamp: Stamp::new(owner, at),
        }
    }

    pub fn is_listed(&self) -> bool {
        self.status == ApprovalStatus::Active
    }
}

/// A rentable unit inside a property.
///
/// `current_booking` is set while the unit is `Reserved` or `Occupied`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub property_id: PropertyId,
    pub status: UnitStatus,
    /// Monthly rent.
    pub price: Decimal,
    pub current_booking: Option<BookingId>,
    pub stamp: Stamp,
}

impl Unit {
    pub fn new(id: UnitId, property_id: PropertyId, price: Decimal, stamp: Stamp) -> Self {
        Self {
            id,
            property_id,
            status: UnitStatus::Available,
            price,
            current_booking: None,
            stamp,
        }
    }
}

/// Who closed out a moderation step, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub by: ActorId,
    pub at: DateTime<Utc>,
}

/// A report against a listing's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub id: FlagId,
    pub property_id: PropertyId,
    pub reporter: ActorId,
    pub reason: String,
    pub status: FlagStatus,
    pub reviewed: Option<Review>,
    pub resolved: Option<Review>,
    pub resolution_notes: Option<String>,
    pub stamp: Stamp,
}

impl Flag {
    pub fn new(
        id: FlagId,
        property_id: PropertyId,
        reporter: ActorId,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            property_id,
            reporter,
            reason: reason.into(),
            status: FlagStatus::Pending,
            reviewed: None,
            resolved: None,
            resolution_notes: None,
            stamp: Stamp::new(reporter, at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl FromStr for Priority {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(WorkflowError::InvalidRequest(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// A support request, or a dispute when tied to a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub opened_by: ActorId,
    pub subject: String,
    pub booking: Option<BookingId>,
    pub priority: Priority,
    pub status: TicketStatus,
    pub resolved: Option<Review>,
    pub resolution_notes: Option<String>,
    pub refund: Option<LedgerId>,
    pub stamp: Stamp,
}

impl Ticket {
    pub fn new(
        id: TicketId,
        opened_by: ActorId,
        subject: impl Into<String>,
        booking: Option<BookingId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            opened_by,
            subject: subject.into(),
            booking,
            priority: Priority::Medium,
            status: TicketStatus::Open,
            resolved: None,
            resolution_notes: None,
            refund: None,
            stamp: Stamp::new(opened_by, at),
        }
    }

    pub fn is_dispute(&self) -> bool {
        self.booking.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn new_property_is_an_unlisted_draft() {
        let property = Property::new(PropertyId(1), ActorId(10), "Loft", at());
        assert_eq!(property.status, ApprovalStatus::Draft);
        assert_eq!(property.verification, VerificationStatus::Unverified);
        assert!(!property.is_listed());
        assert_eq!(property.stamp.actor_id, Some(ActorId(10)));
    }

    #[test]
    fn ticket_is_a_dispute_only_with_a_booking() {
        let support = Ticket::new(TicketId(1), ActorId(20), "Wifi", None, at());
        let dispute = Ticket::new(TicketId(2), ActorId(20), "Deposit", Some(BookingId::new()), at());
        assert!(!support.is_dispute());
        assert!(dispute.is_dispute());
        assert_eq!(support.priority, Priority::Medium);
    }

    #[test]
    fn priority_parses_and_serializes_lowercase() {
        assert_eq!(" Urgent ".parse::<Priority>(), Ok(Priority::Urgent));
        assert!(matches!(
            "asap".parse::<Priority>(),
            Err(WorkflowError::InvalidRequest(_))
        ));
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }
}
