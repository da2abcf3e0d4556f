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

//! Marketplace service.
//!
//! The [`Marketplace`] owns the entity tables and binds each of them to its
//! workflow instance. Every operation follows the same shape:
//!
//! 1. Validate the payload at the boundary ([`WorkflowError::InvalidRequest`]).
//! 2. Under the entity's row guard, ask the lifecycle engine for a [`Step`](crate::lifecycle::Step).
//! 3. Run the step's hooks, then write the new status. A failing hook leaves
//!    the row untouched.
//! 4. After the row is released, hand any notification to the sink.
//!
//! # Thread Safety
//!
//! All tables are [`DashMap`](dashmap::DashMap)-backed. Writes to one row are
//! linearized; different rows proceed in parallel. Rows other than units are
//! last-write-wins.

use crate::base::{BookingId, FlagId, PropertyId, RequestContext, Role, Stamp, TicketId, UnitId};
use crate::booking::{Booking, BookingAllocator, BookingRequest, Reservation};
use crate::effect::{Outcome, SideEffect};
use crate::entity::{Flag, Priority, Property, Review, Ticket, Unit};
use crate::ledger::{Ledger, LedgerRecord, PaymentStatus, SourceRef};
use crate::lifecycle::{Hook, Status};
use crate::notify::{EntityKind, LogSink, Notification, NotificationSink};
use crate::table::Table;
use crate::workflow::{
    ApprovalStatus, CONTENT_FLAG, FlagStatus, PROPERTY_APPROVAL, PROPERTY_VERIFICATION,
    SUPPORT_TICKET, TicketStatus, UnitStatus, VerificationStatus,
};
use crate::WorkflowError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extra fields a transition's hooks may need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Refund {
        amount: Decimal,
        notes: Option<String>,
    },
    Notes(String),
}

impl Payload {
    fn refund_amount(&self) -> Option<Decimal> {
        match self {
            Self::Refund { amount, .. } => Some(*amount),
            Self::Notes(_) => None,
        }
    }

    fn notes(&self) -> Option<&str> {
        match self {
            Self::Refund { notes, .. } => notes.as_deref(),
            Self::Notes(notes) => Some(notes),
        }
    }
}

/// A requested status change for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest<I, S> {
    pub entity_id: I,
    pub requested: S,
    pub payload: Option<Payload>,
}

impl<I, S> TransitionRequest<I, S> {
    pub fn new(entity_id: I, requested: S) -> Self {
        Self {
            entity_id,
            requested,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    fn notes(&self) -> Option<String> {
        self.payload
            .as_ref()
            .and_then(Payload::notes)
            .map(str::to_owned)
    }
}

/// Per-status entity counts for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub properties: BTreeMap<&'static str, usize>,
    pub units: BTreeMap<&'static str, usize>,
    pub flags: BTreeMap<&'static str, usize>,
    pub tickets: BTreeMap<&'static str, usize>,
    pub payments: BTreeMap<&'static str, usize>,
}

fn count<S: Status>(statuses: impl IntoIterator<Item = S>) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<_, _> = S::ALL.iter().map(|status| (status.name(), 0)).collect();
    for status in statuses {
        *counts.entry(status.name()).or_default() += 1;
    }
    counts
}

fn require_role(ctx: &RequestContext, allowed: &[Role], action: &str) -> Result<(), WorkflowError> {
    if allowed.contains(&ctx.role) {
        Ok(())
    } else {
        Err(WorkflowError::Forbidden {
            role: ctx.role,
            action: action.to_owned(),
        })
    }
}

const LISTERS: &[Role] = &[Role::Owner, Role::Agent, Role::Administrator];
const ADMIN: &[Role] = &[Role::Administrator];

/// Rental marketplace: listings, moderation, tickets, bookings and ledger.
pub struct Marketplace {
    properties: Table<PropertyId, Property>,
    flags: Table<FlagId, Flag>,
    tickets: Table<TicketId, Ticket>,
    allocator: BookingAllocator,
    ledger: Ledger,
    notifier: Arc<dyn NotificationSink>,
}

impl Marketplace {
    /// Creates an empty marketplace whose notifications are only logged.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(LogSink))
    }

    pub fn with_sink(notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            properties: Table::new(),
            flags: Table::new(),
            tickets: Table::new(),
            allocator: BookingAllocator::new(),
            ledger: Ledger::new(),
            notifier,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn allocator(&self) -> &BookingAllocator {
        &self.allocator
    }

    fn dispatch(&self, notice: Option<Notification>) {
        let Some(notification) = notice else {
            return;
        };
        if let Err(error) = self.notifier.deliver(&notification) {
            warn!(
                entity = %notification.entity,
                entity_id = %notification.entity_id,
                recipient = %notification.recipient,
                %error,
                "notification dropped"
            );
        }
    }

    // === Listings ===

    /// Creates a draft listing owned by the caller.
    pub fn create_property(
        &self,
        ctx: &RequestContext,
        id: PropertyId,
        title: &str,
    ) -> Result<Property, WorkflowError> {
        require_role(ctx, LISTERS, "create listings")?;
        if title.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("listing title is empty".into()));
        }
        let property = Property::new(id, ctx.actor, title.trim(), ctx.now);
        self.properties.insert(id, property.clone())?;
        info!(property = %id, owner = %ctx.actor, "listing created");
        Ok(property)
    }

    pub fn add_unit(
        &self,
        ctx: &RequestContext,
        id: UnitId,
        property_id: PropertyId,
        price: Decimal,
    ) -> Result<Unit, WorkflowError> {
        require_role(ctx, LISTERS, "add units")?;
        if price <= Decimal::ZERO {
            return Err(WorkflowError::InvalidRequest(format!(
                "unit price {price} must be positive"
            )));
        }
        let unit = Unit::new(id, property_id, price, Stamp::new(ctx.actor, ctx.now));
        // Under the property row guard; delete_property takes the same row.
        self.properties.update(&property_id, |_| self.allocator.add_unit(unit.clone()))?;
        info!(unit = %id, property = %property_id, %price, "unit added");
        Ok(unit)
    }

    pub fn property(&self, id: PropertyId) -> Option<Property> {
        self.properties.get(&id)
    }

    pub fn unit(&self, id: UnitId) -> Option<Unit> {
        self.allocator.unit(id)
    }

    pub fn booking(&self, id: BookingId) -> Option<Booking> {
        self.allocator.booking(id)
    }

    pub fn flag(&self, id: FlagId) -> Option<Flag> {
        self.flags.get(&id)
    }

    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.tickets.get(&id)
    }

    /// Every property, ordered by id.
    pub fn properties(&self) -> Vec<Property> {
        let mut properties = self.properties.filter(|_| true);
        properties.sort_by_key(|property| property.id);
        properties
    }

    /// Approved listings, featured first.
    pub fn public_listings(&self) -> Vec<Property> {
        let mut listings = self.properties.filter(Property::is_listed);
        listings.sort_by_key(|property| (!property.featured, property.id));
        listings
    }

    /// Units of an approved listing that can be reserved right now.
    pub fn available_units(&self, property_id: PropertyId) -> Vec<Unit> {
        match self.properties.get(&property_id) {
            Some(property) if property.is_listed() => self
                .allocator
                .units_of(property_id)
                .into_iter()
                .filter(|unit| unit.status == UnitStatus::Available)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Deletes a listing that never went live, together with its units.
    pub fn delete_property(
        &self,
        ctx: &RequestContext,
        id: PropertyId,
    ) -> Result<Property, WorkflowError> {
        require_role(ctx, LISTERS, "delete listings")?;
        let removed = self
            .properties
            .remove_if(&id, |property| property.status != ApprovalStatus::Active);
        match removed {
            Some(property) => {
                let units = self.allocator.remove_units_of(id);
                info!(property = %id, units = units.len(), actor = %ctx.actor, "listing deleted");
                Ok(property)
            }
            None if self.properties.contains(&id) => Err(WorkflowError::InvalidRequest(
                "approved listings cannot be deleted".into(),
            )),
            None => Err(WorkflowError::NotFound),
        }
    }

    /// Moves a listing through approval.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::NotFound`] - unknown listing.
    /// - [`WorkflowError::InvalidTransition`] / [`WorkflowError::Forbidden`] from the engine.
    pub fn transition_property(
        &self,
        ctx: &RequestContext,
        request: TransitionRequest<PropertyId, ApprovalStatus>,
    ) -> Result<Outcome<ApprovalStatus>, WorkflowError> {
        let applied = self.properties.update(&request.entity_id, |property| {
            let step = PROPERTY_APPROVAL.transition(property.status, request.requested, ctx.role)?;
            if !step.changed() {
                return Ok(None);
            }
            property.status = step.status;
            property.stamp.touch(ctx);

            let notice = step.notify.then(|| {
                Notification::new(EntityKind::Property, property.id, step.status.name(), property.owner)
            });
            Ok(Some((Outcome::new(step.status, Vec::new()), notice)))
        })?;

        Ok(self.finish(EntityKind::Property, request.entity_id, ctx, request.requested, applied))
    }

    /// Toggles the verification badge of an approved listing.
    pub fn transition_verification(
        &self,
        ctx: &RequestContext,
        request: TransitionRequest<PropertyId, VerificationStatus>,
    ) -> Result<Outcome<VerificationStatus>, WorkflowError> {
        let applied = self.properties.update(&request.entity_id, |property| {
            let step =
                PROPERTY_VERIFICATION.transition(property.verification, request.requested, ctx.role)?;
            if !step.changed() {
                return Ok(None);
            }
            if !property.is_listed() {
                return Err(WorkflowError::InvalidTransition {
                    from: property.status.name(),
                    to: step.status.name(),
                });
            }
            property.verification = step.status;
            property.stamp.touch(ctx);

            let notice = step.notify.then(|| {
                Notification::new(EntityKind::Property, property.id, step.status.name(), property.owner)
            });
            Ok(Some((Outcome::new(step.status, Vec::new()), notice)))
        })?;

        Ok(self.finish(EntityKind::Property, request.entity_id, ctx, request.requested, applied))
    }

    /// Features or un-features a listing. Last write wins.
    pub fn set_featured(
        &self,
        ctx: &RequestContext,
        id: PropertyId,
        featured: bool,
    ) -> Result<Property, WorkflowError> {
        require_role(ctx, ADMIN, "feature listings")?;
        self.properties.update(&id, |property| {
            property.featured = featured;
            property.stamp.touch(ctx);
            Ok(property.clone())
        })
    }

    // === Moderation ===

    pub fn flag_property(
        &self,
        ctx: &RequestContext,
        id: FlagId,
        property_id: PropertyId,
        reason: &str,
    ) -> Result<Flag, WorkflowError> {
        if reason.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("flag reason is empty".into()));
        }
        if !self.properties.contains(&property_id) {
            return Err(WorkflowError::NotFound);
        }
        let flag = Flag::new(id, property_id, ctx.actor, reason.trim(), ctx.now);
        self.flags.insert(id, flag.clone())?;
        info!(flag = %id, property = %property_id, reporter = %ctx.actor, "listing flagged");
        Ok(flag)
    }

    /// Moves a flag through moderation, stamping reviewer and resolver.
    pub fn transition_flag(
        &self,
        ctx: &RequestContext,
        request: TransitionRequest<FlagId, FlagStatus>,
    ) -> Result<Outcome<FlagStatus>, WorkflowError> {
        let notes = request.notes();
        let applied = self.flags.update(&request.entity_id, |flag| {
            let step = CONTENT_FLAG.transition(flag.status, request.requested, ctx.role)?;
            if !step.changed() {
                return Ok(None);
            }

            let review = Review {
                by: ctx.actor,
                at: ctx.now,
            };
            let mut effects = Vec::new();
            for hook in step.hooks {
                match hook {
                    Hook::RecordReview => {
                        flag.reviewed = Some(review);
                        effects.push(SideEffect::ReviewRecorded {
                            by: review.by,
                            at: review.at,
                        });
                    }
                    Hook::RecordResolution => {
                        flag.resolved = Some(review);
                        flag.resolution_notes = notes.clone();
                        effects.push(SideEffect::ResolutionRecorded {
                            by: review.by,
                            at: review.at,
                        });
                    }
                    Hook::IssueRefund | Hook::AllocateBooking | Hook::ReleaseBooking => {}
                }
            }
            flag.status = step.status;
            flag.stamp.touch(ctx);

            let notice = step.notify.then(|| {
                Notification::new(EntityKind::Flag, flag.id, step.status.name(), flag.reporter)
            });
            Ok(Some((Outcome::new(step.status, effects), notice)))
        })?;

        Ok(self.finish(EntityKind::Flag, request.entity_id, ctx, request.requested, applied))
    }

    // === Support and disputes ===

    /// Opens a ticket. Passing a booking turns it into a dispute.
    pub fn open_ticket(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        subject: &str,
        booking: Option<BookingId>,
    ) -> Result<Ticket, WorkflowError> {
        if subject.trim().is_empty() {
            return Err(WorkflowError::InvalidRequest("ticket subject is empty".into()));
        }
        if let Some(booking_id) = booking {
            if self.allocator.booking(booking_id).is_none() {
                return Err(WorkflowError::NotFound);
            }
        }
        let ticket = Ticket::new(id, ctx.actor, subject.trim(), booking, ctx.now);
        self.tickets.insert(id, ticket.clone())?;
        info!(ticket = %id, opened_by = %ctx.actor, dispute = ticket.is_dispute(), "ticket opened");
        Ok(ticket)
    }

    /// Moves a ticket forward. Resolving with a non-zero refund records a
    /// refunded ledger entry in the same step.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidRequest`] - negative refund, or a refund on a
    ///   non-resolving transition.
    /// - [`WorkflowError::InvalidTransition`] / [`WorkflowError::Forbidden`] from the engine.
    pub fn transition_ticket(
        &self,
        ctx: &RequestContext,
        request: TransitionRequest<TicketId, TicketStatus>,
    ) -> Result<Outcome<TicketStatus>, WorkflowError> {
        let refund = request.payload.as_ref().and_then(Payload::refund_amount);
        if let Some(amount) = refund {
            if amount < Decimal::ZERO {
                return Err(WorkflowError::InvalidRequest(format!(
                    "refund {amount} is negative"
                )));
            }
            if amount > Decimal::ZERO && request.requested != TicketStatus::Resolved {
                return Err(WorkflowError::InvalidRequest(
                    "refunds are only issued when resolving".into(),
                ));
            }
        }
        let notes = request.notes();

        let applied = self.tickets.update(&request.entity_id, |ticket| {
            let step = SUPPORT_TICKET.transition(ticket.status, request.requested, ctx.role)?;
            if !step.changed() {
                return Ok(None);
            }

            let mut effects = Vec::new();
            if step.hooks.contains(&Hook::IssueRefund) {
                if let Some(amount) = refund.filter(|amount| *amount > Decimal::ZERO) {
                    let record =
                        self.ledger
                            .record_refund(SourceRef::Ticket(ticket.id), amount, ctx.now)?;
                    ticket.refund = Some(record.id());
                    effects.push(SideEffect::LedgerRecordCreated { id: record.id() });
                }
                ticket.resolved = Some(Review {
                    by: ctx.actor,
                    at: ctx.now,
                });
            }
            if notes.is_some() {
                ticket.resolution_notes = notes.clone();
            }
            ticket.status = step.status;
            ticket.stamp.touch(ctx);

            let notice = step.notify.then(|| {
                Notification::new(EntityKind::Ticket, ticket.id, step.status.name(), ticket.opened_by)
            });
            Ok(Some((Outcome::new(step.status, effects), notice)))
        })?;

        Ok(self.finish(EntityKind::Ticket, request.entity_id, ctx, request.requested, applied))
    }

    /// Re-prioritises a ticket. Last write wins.
    pub fn set_ticket_priority(
        &self,
        ctx: &RequestContext,
        id: TicketId,
        priority: Priority,
    ) -> Result<Ticket, WorkflowError> {
        require_role(ctx, ADMIN, "prioritise tickets")?;
        self.tickets.update(&id, |ticket| {
            ticket.priority = priority;
            ticket.stamp.touch(ctx);
            Ok(ticket.clone())
        })
    }

    // === Booking ===

    /// Reserves a unit of an approved listing for the calling tenant.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidRequest`] - start date in the past.
    /// - [`WorkflowError::NotFound`] - unknown unit.
    /// - [`WorkflowError::Forbidden`] - caller is not a tenant.
    /// - [`WorkflowError::UnitUnavailable`] - unit taken, or its listing is not live.
    pub fn reserve(
        &self,
        ctx: &RequestContext,
        request: BookingRequest,
    ) -> Result<Reservation, WorkflowError> {
        request.validate(ctx.now.date_naive())?;

        let unit = self.allocator.unit(request.unit_id).ok_or(WorkflowError::NotFound)?;
        let property = self
            .properties
            .get(&unit.property_id)
            .ok_or(WorkflowError::NotFound)?;
        if !property.is_listed() {
            return Err(WorkflowError::UnitUnavailable);
        }

        let reservation = self.allocator.reserve(ctx, &request)?;
        info!(
            unit = %request.unit_id,
            booking = %reservation.booking.id,
            tenant = %ctx.actor,
            start = %request.start_date,
            months = request.term.months(),
            "unit reserved"
        );
        let notice = reservation.notify.then(|| {
            Notification::new(
                EntityKind::Unit,
                request.unit_id,
                UnitStatus::Reserved.name(),
                property.owner,
            )
        });
        self.dispatch(notice);
        Ok(reservation)
    }

    /// Confirms occupancy, cancels a reservation, or ends a tenancy.
    pub fn transition_unit(
        &self,
        ctx: &RequestContext,
        request: TransitionRequest<UnitId, UnitStatus>,
    ) -> Result<Outcome<UnitStatus>, WorkflowError> {
        let change = self
            .allocator
            .transition(ctx, request.entity_id, request.requested)?;

        if !change.changed {
            return Ok(self.finish(EntityKind::Unit, request.entity_id, ctx, request.requested, None));
        }

        let notice = if change.notify {
            change
                .booking
                .and_then(|booking_id| self.allocator.booking(booking_id))
                .map(|booking| {
                    Notification::new(
                        EntityKind::Unit,
                        request.entity_id,
                        change.outcome.status.name(),
                        booking.requested_by,
                    )
                })
        } else {
            None
        };
        let applied = Some((change.outcome, notice));
        Ok(self.finish(EntityKind::Unit, request.entity_id, ctx, request.requested, applied))
    }

    // === Ledger ===

    /// Records the commission charge for a booking's full lease value.
    pub fn record_booking_charge(
        &self,
        ctx: &RequestContext,
        booking_id: BookingId,
        payer: Role,
    ) -> Result<LedgerRecord, WorkflowError> {
        require_role(ctx, ADMIN, "record charges")?;
        let booking = self
            .allocator
            .booking(booking_id)
            .ok_or(WorkflowError::NotFound)?;
        let amount = booking.lease_value().ok_or_else(|| {
            WorkflowError::InvalidRequest(format!(
                "lease value of booking {booking_id} overflows"
            ))
        })?;
        let record = self.ledger.record_charge(
            SourceRef::Booking(booking_id),
            amount,
            payer,
            ctx.now,
        )?;
        info!(
            ledger = %record.id(),
            booking = %booking_id,
            amount = %record.amount(),
            commission = %record.commission_amount(),
            "charge recorded"
        );
        Ok(record)
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts {
            properties: count(self.properties.filter(|_| true).iter().map(|p| p.status)),
            units: count(self.allocator.units().iter().map(|u| u.status)),
            flags: count(self.flags.filter(|_| true).iter().map(|f| f.status)),
            tickets: count(self.tickets.filter(|_| true).iter().map(|t| t.status)),
            payments: count::<PaymentStatus>(
                self.ledger.records().iter().map(LedgerRecord::payment_status),
            ),
        }
    }

    /// Logs the result of a transition and hands its notification to the
    /// sink. `None` means the requested status was already current.
    fn finish<S: Status>(
        &self,
        entity: EntityKind,
        id: impl std::fmt::Display,
        ctx: &RequestContext,
        requested: S,
        applied: Option<(Outcome<S>, Option<Notification>)>,
    ) -> Outcome<S> {
        let Some((outcome, notice)) = applied else {
            debug!(%entity, id = %id, status = requested.name(), actor = %ctx.actor, "status unchanged");
            return Outcome::unchanged(requested);
        };
        info!(
            %entity,
            id = %id,
            status = outcome.status.name(),
            actor = %ctx.actor,
            role = %ctx.role,
            effects = outcome.effects.len(),
            notify = notice.is_some(),
            "transition applied"
        );
        self.dispatch(notice);
        outcome
    }
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}
