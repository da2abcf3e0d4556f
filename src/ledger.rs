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

//! Commission and refund ledger.
//!
//! A [`LedgerRecord`] is created once per source entity. Its payment status
//! has its own lifecycle, independent of the source:
//!
//! ```text
//! Pending ──mark_paid──────► Paid
//!    │
//!    └──────mark_refunded──► Refunded
//! ```
//!
//! Both exits are terminal. Unlike entity workflows, repeating either call
//! fails with [`WorkflowError::AlreadyPaidOrRefunded`]: a financial record
//! must never be ambiguous about whether money already moved.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use rust_decimal_macros::dec;
//! use rental_workflow_rs::{Ledger, PaymentStatus, Role, SourceRef};
//!
//! let ledger = Ledger::new();
//! ledger.rates().add(Role::Owner, dec!(0.10), true, Utc::now()).unwrap();
//!
//! let record = ledger
//!     .record_charge(SourceRef::Transaction(1), dec!(1200), Role::Owner, Utc::now())
//!     .unwrap();
//! assert_eq!(record.commission_amount(), dec!(120.00));
//! assert_eq!(record.payment_status(), PaymentStatus::Pending);
//! ```

use crate::WorkflowError;
use crate::base::{BookingId, LedgerId, Role, TicketId};
use crate::lifecycle::Status;
use crate::table::Table;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
}

impl Status for PaymentStatus {
    const ALL: &'static [Self] = &[Self::Pending, Self::Paid, Self::Refunded];

    fn name(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Refunded => "Refunded",
        }
    }
}

/// What a ledger record was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceRef {
    Booking(BookingId),
    Ticket(TicketId),
    /// Generic marketplace transaction identified by the caller.
    Transaction(u32),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Booking(id) => write!(f, "booking:{id}"),
            Self::Ticket(id) => write!(f, "ticket:{id}"),
            Self::Transaction(id) => write!(f, "transaction:{id}"),
        }
    }
}

/// A configured commission rate for one paying role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
pub struct CommissionRate {
    pub role: Role,
    pub rate: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Commission rates keyed by the role of the paying party.
#[derive(Debug, Default)]
pub struct RateTable {
    rates: RwLock<Vec<CommissionRate>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self {
            rates: RwLock::new(Vec::new()),
        }
    }

    /// Adds a rate.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::InvalidRequest`] unless `0 <= rate <= 1`.
    pub fn add(
        &self,
        role: Role,
        rate: Decimal,
        active: bool,
        created_at: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if rate < Decimal::ZERO || rate > Decimal::ONE {
            return Err(WorkflowError::InvalidRequest(format!(
                "commission rate {rate} outside 0..=1"
            )));
        }
        self.rates.write().push(CommissionRate {
            role,
            rate,
            active,
            created_at,
        });
        Ok(())
    }

    /// The rate in force for `role`.
    ///
    /// Several active rates for one role is a configuration error; the most
    /// recently created one wins, and among equal timestamps the last added.
    pub fn active_rate(&self, role: Role) -> Result<Decimal, WorkflowError> {
        self.rates
            .read()
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.role == role && entry.active)
            .max_by_key(|(position, entry)| (entry.created_at, *position))
            .map(|(_, entry)| entry.rate)
            .ok_or(WorkflowError::NoActiveRate(role))
    }

    pub fn rates(&self) -> Vec<CommissionRate> {
        self.rates.read().clone()
    }
}

/// A monetary record attached to a booking, ticket or transaction.
///
/// `commission_amount` is fixed at creation; later rate changes never
/// touch existing records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    id: LedgerId,
    source: SourceRef,
    amount: Decimal,
    commission_rate: Decimal,
    commission_amount: Decimal,
    payment_status: PaymentStatus,
    refunded_amount: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl LedgerRecord {
    const DECIMAL_PRECISION: u32 = 4;

    fn new(source: SourceRef, amount: Decimal, commission_rate: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            id: LedgerId::new(),
            source,
            amount,
            commission_rate,
            commission_amount: amount * commission_rate,
            payment_status: PaymentStatus::Pending,
            refunded_amount: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn id(&self) -> LedgerId {
        self.id
    }

    pub fn source(&self) -> SourceRef {
        self.source
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn commission_rate(&self) -> Decimal {
        self.commission_rate
    }

    pub fn commission_amount(&self) -> Decimal {
        self.commission_amount
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn refunded_amount(&self) -> Option<Decimal> {
        self.refunded_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn settle(&mut self, status: PaymentStatus, at: DateTime<Utc>) -> Result<(), WorkflowError> {
        if self.payment_status != PaymentStatus::Pending {
            return Err(WorkflowError::AlreadyPaidOrRefunded);
        }
        self.payment_status = status;
        self.updated_at = self.updated_at.max(at);
        Ok(())
    }
}

impl Serialize for LedgerRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let round = |value: Decimal| value.round_dp(Self::DECIMAL_PRECISION);
        let mut state = serializer.serialize_struct("LedgerRecord", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("source", &self.source.to_string())?;
        state.serialize_field("amount", &round(self.amount))?;
        state.serialize_field("commission_rate", &self.commission_rate)?;
        state.serialize_field("commission_amount", &round(self.commission_amount))?;
        state.serialize_field("payment_status", &self.payment_status)?;
        state.serialize_field("refunded_amount", &self.refunded_amount.map(round))?;
        state.serialize_field("updated_at", &self.updated_at)?;
        state.end()
    }
}

/// The ledger: records, a per-source uniqueness index and the rate table.
#[derive(Debug, Default)]
pub struct Ledger {
    records: Table<LedgerId, LedgerRecord>,
    by_source: DashMap<SourceRef, LedgerId>,
    rates: RateTable,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Records a charge with the commission rate active for `role_for_rate`.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidRequest`] - `amount` is not positive.
    /// - [`WorkflowError::NoActiveRate`] - no rate configured for the role.
    /// - [`WorkflowError::DuplicateRecord`] - `source` already has a record.
    pub fn record_charge(
        &self,
        source: SourceRef,
        amount: Decimal,
        role_for_rate: Role,
        at: DateTime<Utc>,
    ) -> Result<LedgerRecord, WorkflowError> {
        ensure_positive(amount)?;
        let rate = self.rates.active_rate(role_for_rate)?;
        self.insert_once(LedgerRecord::new(source, amount, rate, at))
    }

    /// Records a refund that is already settled: no commission, status
    /// `Refunded` from the start.
    pub fn record_refund(
        &self,
        source: SourceRef,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<LedgerRecord, WorkflowError> {
        ensure_positive(amount)?;
        let mut record = LedgerRecord::new(source, amount, Decimal::ZERO, at);
        record.payment_status = PaymentStatus::Refunded;
        record.refunded_amount = Some(amount);
        self.insert_once(record)
    }

    fn insert_once(&self, record: LedgerRecord) -> Result<LedgerRecord, WorkflowError> {
        match self.by_source.entry(record.source) {
            Entry::Occupied(_) => Err(WorkflowError::DuplicateRecord),
            Entry::Vacant(entry) => {
                self.records.insert(record.id, record.clone())?;
                entry.insert(record.id);
                Ok(record)
            }
        }
    }

    /// # Errors
    ///
    /// [`WorkflowError::AlreadyPaidOrRefunded`] unless the record is `Pending`.
    pub fn mark_paid(&self, id: LedgerId, at: DateTime<Utc>) -> Result<LedgerRecord, WorkflowError> {
        self.records.update(&id, |record| {
            record.settle(PaymentStatus::Paid, at)?;
            Ok(record.clone())
        })
    }

    /// # Errors
    ///
    /// - [`WorkflowError::AlreadyPaidOrRefunded`] - the record is not `Pending`.
    /// - [`WorkflowError::InvalidRequest`] - `amount` is not in `(0, record amount]`.
    pub fn mark_refunded(
        &self,
        id: LedgerId,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<LedgerRecord, WorkflowError> {
        self.records.update(&id, |record| {
            if record.payment_status != PaymentStatus::Pending {
                return Err(WorkflowError::AlreadyPaidOrRefunded);
            }
            ensure_positive(amount)?;
            if amount > record.amount {
                return Err(WorkflowError::InvalidRequest(format!(
                    "refund {amount} exceeds charged {}",
                    record.amount
                )));
            }
            record.settle(PaymentStatus::Refunded, at)?;
            record.refunded_amount = Some(amount);
            Ok(record.clone())
        })
    }

    pub fn get(&self, id: LedgerId) -> Option<LedgerRecord> {
        self.records.get(&id)
    }

    pub fn find_by_source(&self, source: SourceRef) -> Option<LedgerRecord> {
        let id = *self.by_source.get(&source)?;
        self.records.get(&id)
    }

    /// Every record, oldest first.
    pub fn records(&self) -> Vec<LedgerRecord> {
        let mut records = self.records.filter(|_| true);
        records.sort_by_key(|record| record.created_at);
        records
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), WorkflowError> {
    if amount <= Decimal::ZERO {
        return Err(WorkflowError::InvalidRequest(format!(
            "amount {amount} must be positive"
        )));
    }
    Ok(())
}
