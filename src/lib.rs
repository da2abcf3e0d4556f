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

//! # Rental Workflow
//!
//! Status lifecycles for a rental marketplace: listing approval and
//! verification, content-flag moderation, support and dispute tickets, unit
//! booking, and the commission ledger behind them.
//!
//! ## Core Components
//!
//! - [`StateMachine`]: pure lifecycle engine driven by static transition tables
//! - [`workflow`]: the five transition tables and their status enums
//! - [`BookingAllocator`]: compare-and-swap unit reservation
//! - [`Ledger`]: commission and refund records with their payment lifecycle
//! - [`Marketplace`]: binds entity tables to their workflows
//! - [`WorkflowError`]: every failure a caller can see
//!
//! ## Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use rental_workflow_rs::{
//!     ActorId, ApprovalStatus, BookingRequest, LeaseTerm, Marketplace, PropertyId,
//!     RequestContext, Role, TransitionRequest, UnitId, UnitStatus, WorkflowError,
//! };
//! use rust_decimal_macros::dec;
//!
//! let market = Marketplace::new();
//! let now = Utc::now();
//! let landlord = RequestContext::new(ActorId(10), Role::Owner, now);
//! let admin = RequestContext::new(ActorId(1), Role::Administrator, now);
//! let tenant = RequestContext::new(ActorId(20), Role::Tenant, now);
//!
//! market.create_property(&landlord, PropertyId(1), "Garden flat").unwrap();
//! market.add_unit(&landlord, UnitId(1), PropertyId(1), dec!(700)).unwrap();
//! market
//!     .transition_property(&admin, TransitionRequest::new(PropertyId(1), ApprovalStatus::Active))
//!     .unwrap();
//!
//! let start = (now + Duration::days(30)).date_naive();
//! let request = BookingRequest::new(UnitId(1), start, LeaseTerm::Twelve);
//! market.reserve(&tenant, request).unwrap();
//! assert_eq!(market.unit(UnitId(1)).unwrap().status, UnitStatus::Reserved);
//!
//! // The unit is gone for everybody else.
//! let other = RequestContext::new(ActorId(21), Role::Tenant, now);
//! assert_eq!(market.reserve(&other, request), Err(WorkflowError::UnitUnavailable));
//! ```
//!
//! ## Thread Safety
//!
//! Entity tables are [`DashMap`](dashmap::DashMap)-backed. Writes to one row
//! are linearized by its shard lock, which is also what makes reservation a
//! compare-and-swap; different rows are updated in parallel.

mod base;
pub mod booking;
pub mod effect;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod lifecycle;
mod marketplace;
pub mod notify;
mod table;
pub mod workflow;

pub use base::{
    ActorId, BookingId, FlagId, LedgerId, PropertyId, RequestContext, Role, Stamp, TicketId,
    UnitId,
};
pub use booking::{Booking, BookingAllocator, BookingRequest, LeaseTerm, Reservation, UnitChange};
pub use effect::{Outcome, SideEffect};
pub use entity::{Flag, Priority, Property, Review, Ticket, Unit};
pub use error::WorkflowError;
pub use ledger::{CommissionRate, Ledger, LedgerRecord, PaymentStatus, RateTable, SourceRef};
pub use lifecycle::{Edge, Hook, StateMachine, Status, Step};
pub use marketplace::{Marketplace, Payload, StatusCounts, TransitionRequest};
pub use notify::{DeliveryError, EntityKind, LogSink, Notification, NotificationSink, Outbox};
pub use table::Table;
pub use workflow::{
    ApprovalStatus, CONTENT_FLAG, FlagStatus, PROPERTY_APPROVAL, PROPERTY_VERIFICATION,
    SUPPORT_TICKET, TicketStatus, UNIT_BOOKING, UnitStatus, VerificationStatus,
};
