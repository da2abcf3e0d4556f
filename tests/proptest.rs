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

//! Property-based tests for the lifecycle engine, the unit allocator and the
//! ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! requested transitions.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rental_workflow_rs::{
    ActorId, ApprovalStatus, BookingRequest, LeaseTerm, Ledger, Marketplace, PaymentStatus,
    PropertyId, RequestContext, Role, SourceRef, StateMachine, Status, TicketStatus,
    TransitionRequest, UNIT_BOOKING, UnitId, UnitStatus, WorkflowError, SUPPORT_TICKET,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.0001 to 1000 with 4 decimal places).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000_000i64).prop_map(|units| Decimal::new(units, 4))
}

/// Generate a commission rate between 0 and 1 with 4 decimal places.
fn arb_rate() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000i64).prop_map(|bp| Decimal::new(bp, 4))
}

fn arb_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

fn arb_status<S: Status>() -> impl Strategy<Value = S> {
    prop::sample::select(S::ALL.to_vec())
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
}

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// Applies each request in turn. Rejected requests leave the status as is.
fn walk<S: Status>(machine: &StateMachine<S>, start: S, steps: &[(S, Role)]) -> S {
    steps.iter().fold(start, |current, (requested, role)| {
        machine
            .transition(current, *requested, *role)
            .map_or(current, |step| step.status)
    })
}

// =============================================================================
// Engine Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Any walk stays inside the declared state set.
    #[test]
    fn walks_stay_in_declared_states(
        steps in prop::collection::vec((arb_status::<TicketStatus>(), arb_role()), 0..20),
    ) {
        let end = walk(&SUPPORT_TICKET, TicketStatus::Open, &steps);
        prop_assert!(SUPPORT_TICKET.declares(end));
    }

    /// Re-requesting the current status never fails and never changes anything.
    #[test]
    fn same_status_is_always_a_noop(
        status in arb_status::<UnitStatus>(),
        role in arb_role(),
    ) {
        let step = UNIT_BOOKING.transition(status, status, role).unwrap();
        prop_assert_eq!(step.status, status);
        prop_assert!(!step.changed());
        prop_assert!(step.hooks.is_empty());
    }

    /// A successful step always follows an edge that lists the caller's role.
    #[test]
    fn successful_steps_follow_a_permitted_edge(
        from in arb_status::<TicketStatus>(),
        to in arb_status::<TicketStatus>(),
        role in arb_role(),
    ) {
        if let Ok(step) = SUPPORT_TICKET.transition(from, to, role) {
            if step.changed() {
                prop_assert!(SUPPORT_TICKET
                    .edges_from(from)
                    .any(|edge| edge.to == to && edge.roles.contains(&role)));
            }
        }
    }

    /// Once a terminal status is reached no later request leaves it.
    #[test]
    fn terminal_statuses_absorb(
        steps in prop::collection::vec((arb_status::<TicketStatus>(), arb_role()), 0..20),
    ) {
        let mut current = TicketStatus::Open;
        let mut terminal_seen = false;
        for (requested, role) in steps {
            let next = SUPPORT_TICKET
                .transition(current, requested, role)
                .map_or(current, |step| step.status);
            if terminal_seen {
                prop_assert_eq!(next, current);
            }
            current = next;
            terminal_seen |= SUPPORT_TICKET.is_terminal(current);
        }
    }
}

// =============================================================================
// Allocator Invariant Tests
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum UnitAction {
    Reserve(u32),
    Move(UnitStatus, Role),
}

fn arb_unit_action() -> impl Strategy<Value = UnitAction> {
    prop_oneof![
        (1u32..5).prop_map(UnitAction::Reserve),
        (arb_status::<UnitStatus>(), arb_role()).prop_map(|(s, r)| UnitAction::Move(s, r)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// A unit holds a booking exactly while it is Reserved or Occupied, and
    /// every successful reservation creates exactly one booking.
    #[test]
    fn unit_booking_matches_status(
        actions in prop::collection::vec(arb_unit_action(), 1..30),
    ) {
        let market = Marketplace::new();
        let landlord = RequestContext::new(ActorId(10), Role::Owner, now());
        let admin = RequestContext::new(ActorId(1), Role::Administrator, now());
        market.create_property(&landlord, PropertyId(1), "Flat").unwrap();
        market.add_unit(&landlord, UnitId(1), PropertyId(1), dec!(500)).unwrap();
        market
            .transition_property(&admin, TransitionRequest::new(PropertyId(1), ApprovalStatus::Active))
            .unwrap();

        let mut reservations = 0;
        for action in actions {
            let before = market.unit(UnitId(1)).unwrap();
            match action {
                UnitAction::Reserve(tenant) => {
                    let ctx = RequestContext::new(ActorId(100 + tenant), Role::Tenant, now());
                    match market.reserve(&ctx, BookingRequest::new(UnitId(1), start(), LeaseTerm::Six)) {
                        Ok(_) => {
                            prop_assert_eq!(before.status, UnitStatus::Available);
                            reservations += 1;
                        }
                        Err(error) => {
                            prop_assert_eq!(error, WorkflowError::UnitUnavailable);
                        }
                    }
                }
                UnitAction::Move(status, role) => {
                    let ctx = RequestContext::new(ActorId(10), role, now());
                    let _ = market.transition_unit(&ctx, TransitionRequest::new(UnitId(1), status));
                }
            }

            let unit = market.unit(UnitId(1)).unwrap();
            prop_assert_eq!(
                unit.current_booking.is_some(),
                unit.status != UnitStatus::Available
            );
        }
        prop_assert_eq!(market.allocator().bookings().len(), reservations);
    }
}

// =============================================================================
// Ledger Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Commission is amount times the rate in force at creation, and later
    /// rate changes never touch an existing record.
    #[test]
    fn commission_fixed_at_creation(
        amount in arb_amount(),
        rate in arb_rate(),
        new_rate in arb_rate(),
    ) {
        let ledger = Ledger::new();
        ledger.rates().add(Role::Tenant, rate, true, now()).unwrap();
        let record = ledger
            .record_charge(SourceRef::Transaction(1), amount, Role::Tenant, now())
            .unwrap();
        prop_assert_eq!(record.commission_amount(), amount * rate);

        ledger.rates().add(Role::Tenant, new_rate, true, now() + Duration::days(1)).unwrap();
        let reread = ledger.get(record.id()).unwrap();
        prop_assert_eq!(reread.commission_amount(), amount * rate);
        prop_assert_eq!(reread.commission_rate(), rate);
    }

    /// Refunds never exceed the charged amount, and a settled record stays settled.
    #[test]
    fn settled_records_stay_settled(
        amount in arb_amount(),
        refund in arb_amount(),
        pay_first in any::<bool>(),
    ) {
        let ledger = Ledger::new();
        ledger.rates().add(Role::Owner, dec!(0.1), true, now()).unwrap();
        let record = ledger
            .record_charge(SourceRef::Transaction(7), amount, Role::Owner, now())
            .unwrap();

        if pay_first {
            ledger.mark_paid(record.id(), now()).unwrap();
            prop_assert_eq!(
                ledger.mark_refunded(record.id(), refund, now()),
                Err(WorkflowError::AlreadyPaidOrRefunded)
            );
            prop_assert_eq!(ledger.get(record.id()).unwrap().payment_status(), PaymentStatus::Paid);
        } else {
            match ledger.mark_refunded(record.id(), refund, now()) {
                Ok(refunded) => {
                    prop_assert!(refund <= amount);
                    prop_assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);
                    prop_assert_eq!(refunded.refunded_amount(), Some(refund));
                    prop_assert_eq!(
                        ledger.mark_paid(record.id(), now()),
                        Err(WorkflowError::AlreadyPaidOrRefunded)
                    );
                }
                Err(error) => {
                    prop_assert!(refund > amount);
                    prop_assert!(matches!(error, WorkflowError::InvalidRequest(_)));
                }
            }
        }
    }
}
