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

//! Benchmarks for the lifecycle engine and the unit allocator.
//!
//! Run with: cargo bench
//!
//! Benchmarks include:
//! - Raw engine transitions against the static tables
//! - Reserve and cancel round-trips on one unit
//! - Parallel reservations, contended and uncontended

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rayon::prelude::*;
use rental_workflow_rs::{
    ActorId, ApprovalStatus, BookingRequest, LeaseTerm, Marketplace, PropertyId, RequestContext,
    Role, SUPPORT_TICKET, TicketStatus, TransitionRequest, UNIT_BOOKING, UnitId, UnitStatus,
};
use rust_decimal_macros::dec;

// =============================================================================
// Helper Functions
// =============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, 9, 0, 0).unwrap()
}

fn request(unit: u32) -> BookingRequest {
    BookingRequest::new(
        UnitId(unit),
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        LeaseTerm::Twelve,
    )
}

fn tenant(id: u32) -> RequestContext {
    RequestContext::new(ActorId(id), Role::Tenant, now())
}

fn market_with_units(units: u32) -> Marketplace {
    let market = Marketplace::new();
    let landlord = RequestContext::new(ActorId(10), Role::Owner, now());
    let admin = RequestContext::new(ActorId(1), Role::Administrator, now());
    market
        .create_property(&landlord, PropertyId(1), "Bench tower")
        .unwrap();
    for id in 1..=units {
        market
            .add_unit(&landlord, UnitId(id), PropertyId(1), dec!(500))
            .unwrap();
    }
    market
        .transition_property(
            &admin,
            TransitionRequest::new(PropertyId(1), ApprovalStatus::Active),
        )
        .unwrap();
    market
}

// =============================================================================
// Engine Benchmarks
// =============================================================================

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");

    group.bench_function("allowed", |b| {
        b.iter(|| {
            SUPPORT_TICKET
                .transition(
                    black_box(TicketStatus::InProgress),
                    black_box(TicketStatus::Resolved),
                    black_box(Role::Administrator),
                )
                .unwrap()
        })
    });

    group.bench_function("forbidden", |b| {
        b.iter(|| {
            UNIT_BOOKING
                .transition(
                    black_box(UnitStatus::Reserved),
                    black_box(UnitStatus::Occupied),
                    black_box(Role::Tenant),
                )
                .unwrap_err()
        })
    });

    group.bench_function("noop", |b| {
        b.iter(|| {
            UNIT_BOOKING
                .transition(
                    black_box(UnitStatus::Occupied),
                    black_box(UnitStatus::Occupied),
                    black_box(Role::Agent),
                )
                .unwrap()
        })
    });

    group.finish();
}

// =============================================================================
// Allocator Benchmarks
// =============================================================================

fn bench_reserve_cancel(c: &mut Criterion) {
    let market = market_with_units(1);
    let landlord = RequestContext::new(ActorId(10), Role::Owner, now());

    c.bench_function("reserve_cancel", |b| {
        b.iter(|| {
            market.reserve(&tenant(20), black_box(request(1))).unwrap();
            market
                .transition_unit(
                    &landlord,
                    TransitionRequest::new(UnitId(1), UnitStatus::Available),
                )
                .unwrap();
        })
    });
}

fn bench_parallel_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel_reserve");

    for count in [100u32, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));

        group.bench_with_input(BenchmarkId::new("distinct_units", count), count, |b, &count| {
            b.iter(|| {
                let market = market_with_units(count);
                (1..=count).into_par_iter().for_each(|id| {
                    market.reserve(&tenant(100 + id), request(id)).unwrap();
                });
                black_box(&market);
            })
        });

        group.bench_with_input(BenchmarkId::new("one_unit", count), count, |b, &count| {
            b.iter(|| {
                let market = market_with_units(1);
                let winners = (1..=count)
                    .into_par_iter()
                    .filter(|id| market.reserve(&tenant(100 + id), request(1)).is_ok())
                    .count();
                assert_eq!(winners, 1);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_engine, bench_reserve_cancel, bench_parallel_reserve);
criterion_main!(benches);
