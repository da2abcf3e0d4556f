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

//! Unit inventory and the booking allocator.
//!
//! Reservation is a compare-and-swap on the unit row: under the row's write
//! guard the allocator re-reads the status, and only if it is still
//! `Available` inserts the [`Booking`] and flips the unit to `Reserved`.
//! Concurrent attempts on the same unit serialize on that guard, so at most
//! one of them can succeed; the rest see `Reserved` and get
//! [`WorkflowError::UnitUnavailable`].
//!
//! Lock order is always unit row, then booking table. Nothing takes a unit
//! row while holding a booking entry.

use crate::WorkflowError;
use crate::base::{ActorId, BookingId, PropertyId, RequestContext, UnitId};
use crate::effect::{Outcome, SideEffect};
use crate::entity::Unit;
use crate::lifecycle::Hook;
use crate::table::Table;
use crate::workflow::{UNIT_BOOKING, UnitStatus};
use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lease lengths on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum LeaseTerm {
    Six,
    Twelve,
    Eighteen,
    TwentyFour,
}

impl LeaseTerm {
    pub fn months(&self) -> u32 {
        match self {
            Self::Six => 6,
            Self::Twelve => 12,
            Self::Eighteen => 18,
            Self::TwentyFour => 24,
        }
    }
}

impl TryFrom<u32> for LeaseTerm {
    type Error = WorkflowError;

    fn try_from(months: u32) -> Result<Self, Self::Error> {
        match months {
            6 => Ok(Self::Six),
            12 => Ok(Self::Twelve),
            18 => Ok(Self::Eighteen),
            24 => Ok(Self::TwentyFour),
            other => Err(WorkflowError::InvalidRequest(format!(
                "lease term of {other} months is not offered"
            ))),
        }
    }
}

impl From<LeaseTerm> for u32 {
    fn from(term: LeaseTerm) -> Self {
        term.months()
    }
}

/// What a tenant asks for when reserving a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingRequest {
    pub unit_id: UnitId,
    pub start_date: NaiveDate,
    pub term: LeaseTerm,
}

impl BookingRequest {
    pub fn new(unit_id: UnitId, start_date: NaiveDate, term: LeaseTerm) -> Self {
        Self {
            unit_id,
            start_date,
            term,
        }
    }

    /// Boundary check run before the allocator is involved.
    pub fn validate(&self, today: NaiveDate) -> Result<(), WorkflowError> {
        if self.start_date < today {
            return Err(WorkflowError::InvalidRequest(format!(
                "start date {} is in the past",
                self.start_date
            )));
        }
        Ok(())
    }
}

/// A successful reservation. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub unit_id: UnitId,
    pub property_id: PropertyId,
    pub start_date: NaiveDate,
    pub term: LeaseTerm,
    /// Unit price at reservation time.
    pub monthly_rent: Decimal,
    pub requested_by: ActorId,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn end_date(&self) -> Option<NaiveDate> {
        self.start_date
            .checked_add_months(Months::new(self.term.months()))
    }

    /// Rent over the whole lease. `None` if it does not fit a `Decimal`.
    pub fn lease_value(&self) -> Option<Decimal> {
        self.monthly_rent
            .checked_mul(Decimal::from(self.term.months()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub booking: Booking,
    pub effects: Vec<SideEffect>,
    pub(crate) notify: bool,
}

/// Result of a non-reserving unit transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitChange {
    pub outcome: Outcome<UnitStatus>,
    /// Booking attached to the unit before the change.
    pub booking: Option<BookingId>,
    pub(crate) changed: bool,
    pub(crate) notify: bool,
}

/// Unit inventory plus booking history.
#[derive(Debug, Default)]
pub struct BookingAllocator {
    units: Table<UnitId, Unit>,
    bookings: Table<BookingId, Booking>,
}

impl BookingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unit(&self, unit: Unit) -> Result<(), WorkflowError> {
        self.units.insert(unit.id, unit)
    }

    pub fn unit(&self, id: UnitId) -> Option<Unit> {
        self.units.get(&id)
    }

    pub fn units_of(&self, property_id: PropertyId) -> Vec<Unit> {
        let mut units = self.units.filter(|unit| unit.property_id == property_id);
        units.sort_by_key(|unit| unit.id);
        units
    }

    pub fn units(&self) -> Vec<Unit> {
        let mut units = self.units.filter(|_| true);
        units.sort_by_key(|unit| unit.id);
        units
    }

    pub(crate) fn remove_units_of(&self, property_id: PropertyId) -> Vec<Unit> {
        self.units.remove_where(|unit| unit.property_id == property_id)
    }

    pub fn booking(&self, id: BookingId) -> Option<Booking> {
        self.bookings.get(&id)
    }

    /// Every booking for `unit_id`, oldest first.
    pub fn bookings_for(&self, unit_id: UnitId) -> Vec<Booking> {
        let mut bookings = self.bookings.filter(|booking| booking.unit_id == unit_id);
        bookings.sort_by_key(|booking| booking.created_at);
        bookings
    }

    pub fn bookings(&self) -> Vec<Booking> {
        let mut bookings = self.bookings.filter(|_| true);
        bookings.sort_by_key(|booking| booking.created_at);
        bookings
    }

    /// Reserves a unit for the calling tenant.
    ///
    /// The request must already have passed [`BookingRequest::validate`].
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::Forbidden`] - the caller's role cannot reserve.
    /// - [`WorkflowError::NotFound`] - unknown unit.
    /// - [`WorkflowError::UnitUnavailable`] - the unit is not `Available`.
    pub fn reserve(
        &self,
        ctx: &RequestContext,
        request: &BookingRequest,
    ) -> Result<Reservation, WorkflowError> {
        let step = UNIT_BOOKING.transition(UnitStatus::Available, UnitStatus::Reserved, ctx.role)?;

        self.units.update(&request.unit_id, |unit| {
            if unit.status != UnitStatus::Available {
                return Err(WorkflowError::UnitUnavailable);
            }

            let booking = Booking {
                id: BookingId::new(),
                unit_id: unit.id,
                property_id: unit.property_id,
                start_date: request.start_date,
                term: request.term,
                monthly_rent: unit.price,
                requested_by: ctx.actor,
                created_at: ctx.now,
            };
            self.bookings.insert(booking.id, booking.clone())?;

            unit.status = step.status;
            unit.current_booking = Some(booking.id);
            unit.stamp.touch(ctx);

            Ok(Reservation {
                effects: vec![SideEffect::UnitReserved {
                    unit_id: unit.id,
                    booking_id: booking.id,
                }],
                booking,
                notify: step.notify,
            })
        })
    }

    /// Applies any unit transition other than reserving.
    ///
    /// Entering `Occupied` keeps the booking attached; cancelling or vacating
    /// detaches it. Neither re-runs the allocator.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidRequest`] - `Reserved` was requested; use [`Self::reserve`].
    /// - [`WorkflowError::InvalidTransition`] / [`WorkflowError::Forbidden`] from the engine.
    pub fn transition(
        &self,
        ctx: &RequestContext,
        unit_id: UnitId,
        requested: UnitStatus,
    ) -> Result<UnitChange, WorkflowError> {
        self.units.update(&unit_id, |unit| {
            let step = UNIT_BOOKING.transition(unit.status, requested, ctx.role)?;
            if !step.changed() {
                return Ok(UnitChange {
                    outcome: Outcome::unchanged(unit.status),
                    booking: unit.current_booking,
                    changed: false,
                    notify: false,
                });
            }
            if step.hooks.contains(&Hook::AllocateBooking) {
                return Err(WorkflowError::InvalidRequest(
                    "reservations carry booking details; use reserve".into(),
                ));
            }

            let booking = unit.current_booking;
            let mut effects = Vec::new();
            if step.hooks.contains(&Hook::ReleaseBooking) {
                if let Some(booking_id) = unit.current_booking.take() {
                    effects.push(SideEffect::UnitReleased { unit_id, booking_id });
                }
            }
            unit.status = step.status;
            unit.stamp.touch(ctx);

            Ok(UnitChange {
                outcome: Outcome::new(step.status, effects),
                booking,
                changed: true,
                notify: step.notify,
            })
        })
    }
}
