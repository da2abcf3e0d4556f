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

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use rental_workflow_rs::{
    ActorId, ApprovalStatus, BookingId, BookingRequest, FlagId, FlagStatus, LeaseTerm, Marketplace,
    Payload, Priority, PropertyId, RequestContext, Role, SourceRef, TicketId, TicketStatus,
    TransitionRequest, UnitId, UnitStatus, VerificationStatus, WorkflowError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Rental Workflow - Replay marketplace command CSV files
///
/// Reads commands from a CSV file, applies them to an in-memory marketplace
/// and writes the selected report to stdout.
#[derive(Parser, Debug)]
#[command(name = "rental-workflow-rs")]
#[command(about = "Replays rental marketplace commands and reports the resulting state", long_about = None)]
struct Args {
    /// Path to CSV file with commands
    ///
    /// Expected format: action,actor,role,id,target,amount,date,term,note
    /// Example: cargo run -- commands.csv --report units > units.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Commission rates CSV with columns role,rate,active,created_at
    #[arg(long, value_name = "FILE")]
    rates: Option<PathBuf>,

    /// Commission rate for every role when no rates file is given
    #[arg(long, default_value = "0.05")]
    default_rate: Decimal,

    /// Which table to write to stdout
    #[arg(long, value_enum, default_value_t = Report::Ledger)]
    report: Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Ledger,
    Properties,
    Units,
    Bookings,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let now = Utc::now();
    let market = Marketplace::new();

    let configured = match &args.rates {
        Some(path) => File::open(path)
            .map_err(csv::Error::from)
            .and_then(|file| load_rates(&market, BufReader::new(file))),
        None => default_rates(&market, args.default_rate, now).map_err(|e| {
            csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        }),
    };
    if let Err(e) = configured {
        eprintln!("Error loading commission rates: {}", e);
        process::exit(1);
    }

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_commands(&market, BufReader::new(file), now) {
        eprintln!("Error processing commands: {}", e);
        process::exit(1);
    }

    if let Err(e) = write_report(&market, args.report, std::io::stdout()) {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

/// One configured commission rate.
#[derive(Debug, Deserialize)]
struct CsvRate {
    role: String,
    rate: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
}

/// Loads commission rates. Any bad row aborts: a wrong rate table would
/// silently misprice every charge.
fn load_rates<R: Read>(market: &Marketplace, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    for result in rdr.deserialize::<CsvRate>() {
        let record = result?;
        record
            .role
            .parse::<Role>()
            .and_then(|role| {
                market
                    .ledger()
                    .rates()
                    .add(role, record.rate, record.active, record.created_at)
            })
            .map_err(|e| {
                csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
    }
    Ok(())
}

fn default_rates(
    market: &Marketplace,
    rate: Decimal,
    now: DateTime<Utc>,
) -> Result<(), WorkflowError> {
    for role in Role::ALL {
        market.ledger().rates().add(role, rate, true, now)?;
    }
    Ok(())
}

/// Raw CSV command.
///
/// Fields: `action, actor, role, id, target, amount, date, term, note`
#[derive(Debug, Deserialize)]
struct CsvCommand {
    action: String,
    actor: u32,
    role: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    id: Option<u32>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    term: Option<u32>,
    #[serde(default)]
    note: Option<String>,
}

fn missing(field: &str) -> WorkflowError {
    WorkflowError::InvalidRequest(format!("missing {field}"))
}

impl CsvCommand {
    fn id(&self) -> Result<u32, WorkflowError> {
        self.id.ok_or_else(|| missing("id"))
    }

    fn amount(&self) -> Result<Decimal, WorkflowError> {
        self.amount.ok_or_else(|| missing("amount"))
    }

    fn note(&self) -> &str {
        self.note.as_deref().unwrap_or_default()
    }

    fn target<T>(&self) -> Result<T, WorkflowError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.target.as_deref().ok_or_else(|| missing("target"))?;
        raw.parse::<T>()
            .map_err(|e| WorkflowError::InvalidRequest(format!("bad target '{raw}': {e}")))
    }

    fn notes_payload(&self) -> Option<Payload> {
        self.note.clone().map(Payload::Notes)
    }

    /// Applies the command to the marketplace.
    fn execute(&self, market: &Marketplace, now: DateTime<Utc>) -> Result<(), WorkflowError> {
        let role: Role = self.role.parse()?;
        let ctx = RequestContext::new(ActorId(self.actor), role, now);

        match self.action.to_lowercase().as_str() {
            "create_property" => {
                market.create_property(&ctx, PropertyId(self.id()?), self.note())?;
            }
            "add_unit" => {
                let property = PropertyId(self.target()?);
                market.add_unit(&ctx, UnitId(self.id()?), property, self.amount()?)?;
            }
            "approve" => {
                let status: ApprovalStatus = self.target()?;
                market.transition_property(&ctx, TransitionRequest::new(PropertyId(self.id()?), status))?;
            }
            "verify" => {
                let status: VerificationStatus = self.target()?;
                market.transition_verification(
                    &ctx,
                    TransitionRequest::new(PropertyId(self.id()?), status),
                )?;
            }
            "feature" => {
                market.set_featured(&ctx, PropertyId(self.id()?), self.target()?)?;
            }
            "delete_property" => {
                market.delete_property(&ctx, PropertyId(self.id()?))?;
            }
            "reserve" => {
                let date = self.date.ok_or_else(|| missing("date"))?;
                let term = LeaseTerm::try_from(self.term.ok_or_else(|| missing("term"))?)?;
                market.reserve(&ctx, BookingRequest::new(UnitId(self.id()?), date, term))?;
            }
            "unit" => {
                let status: UnitStatus = self.target()?;
                market.transition_unit(&ctx, TransitionRequest::new(UnitId(self.id()?), status))?;
            }
            "flag" => {
                let property = PropertyId(self.target()?);
                market.flag_property(&ctx, FlagId(self.id()?), property, self.note())?;
            }
            "moderate" => {
                let status: FlagStatus = self.target()?;
                let mut request = TransitionRequest::new(FlagId(self.id()?), status);
                request.payload = self.notes_payload();
                market.transition_flag(&ctx, request)?;
            }
            "open_ticket" => {
                // Optional target names the unit whose current booking is disputed.
                let booking = match self.target {
                    Some(_) => Some(self.current_booking(market, UnitId(self.target()?))?),
                    None => None,
                };
                market.open_ticket(&ctx, TicketId(self.id()?), self.note(), booking)?;
            }
            "ticket" => {
                let status: TicketStatus = self.target()?;
                let mut request = TransitionRequest::new(TicketId(self.id()?), status);
                request.payload = match self.amount {
                    Some(amount) => Some(Payload::Refund {
                        amount,
                        notes: self.note.clone(),
                    }),
                    None => self.notes_payload(),
                };
                market.transition_ticket(&ctx, request)?;
            }
            "priority" => {
                let priority: Priority = self.target()?;
                market.set_ticket_priority(&ctx, TicketId(self.id()?), priority)?;
            }
            "charge" => {
                let booking = self.current_booking(market, UnitId(self.id()?))?;
                let payer = match self.target {
                    Some(_) => self.target()?,
                    None => Role::Tenant,
                };
                market.record_booking_charge(&ctx, booking, payer)?;
            }
            "pay" => {
                let booking = self.current_booking(market, UnitId(self.id()?))?;
                let record = market
                    .ledger()
                    .find_by_source(SourceRef::Booking(booking))
                    .ok_or(WorkflowError::NotFound)?;
                market.ledger().mark_paid(record.id(), now)?;
            }
            "refund" => {
                let booking = self.current_booking(market, UnitId(self.id()?))?;
                let record = market
                    .ledger()
                    .find_by_source(SourceRef::Booking(booking))
                    .ok_or(WorkflowError::NotFound)?;
                market
                    .ledger()
                    .mark_refunded(record.id(), self.amount()?, now)?;
            }
            other => {
                return Err(WorkflowError::InvalidRequest(format!(
                    "unknown action '{other}'"
                )));
            }
        }
        Ok(())
    }

    fn current_booking(&self, market: &Marketplace, unit: UnitId) -> Result<BookingId, WorkflowError> {
        market
            .unit(unit)
            .and_then(|unit| unit.current_booking)
            .ok_or(WorkflowError::NotFound)
    }
}

/// Process commands from a CSV reader.
///
/// Rows are applied in file order. Malformed rows and rejected commands are
/// skipped and logged; they never stop processing.
///
/// # CSV Format
///
/// ```csv
/// action,actor,role,id,target,amount,date,term,note
/// create_property,10,landlord,1,,,,,Garden flat
/// add_unit,10,landlord,1,1,650,,,
/// approve,1,admin,1,active,,,,
/// reserve,20,student,1,,,2099-06-01,12,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
fn process_commands<R: Read>(
    market: &Marketplace,
    reader: R,
    now: DateTime<Utc>,
) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    let mut applied = 0usize;
    let mut rejected = 0usize;
    for (line, result) in rdr.deserialize::<CsvCommand>().enumerate() {
        match result {
            Ok(command) => match command.execute(market, now) {
                Ok(()) => applied += 1,
                Err(e) => {
                    rejected += 1;
                    warn!(line = line + 2, action = %command.action, error = %e, "command rejected");
                }
            },
            Err(e) => {
                rejected += 1;
                debug!(line = line + 2, error = %e, "skipping malformed row");
            }
        }
    }

    info!(applied, rejected, counts = ?market.status_counts(), "replay finished");
    Ok(())
}

#[derive(Debug, Serialize)]
struct PropertyRow<'a> {
    id: PropertyId,
    owner: ActorId,
    title: &'a str,
    status: ApprovalStatus,
    verification: VerificationStatus,
    featured: bool,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct UnitRow {
    id: UnitId,
    property: PropertyId,
    status: UnitStatus,
    price: Decimal,
    booking: Option<BookingId>,
    updated_at: DateTime<Utc>,
}

/// Write the selected report to a CSV writer.
///
/// # Errors
///
/// Returns a CSV error if writing fails.
fn write_report<W: Write>(market: &Marketplace, report: Report, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    match report {
        Report::Ledger => {
            for record in market.ledger().records() {
                wtr.serialize(&record)?;
            }
        }
        Report::Properties => {
            for property in market.properties() {
                wtr.serialize(PropertyRow {
                    id: property.id,
                    owner: property.owner,
                    title: &property.title,
                    status: property.status,
                    verification: property.verification,
                    featured: property.featured,
                    updated_at: property.stamp.updated_at,
                })?;
            }
        }
        Report::Units => {
            for unit in market.allocator().units() {
                wtr.serialize(UnitRow {
                    id: unit.id,
                    property: unit.property_id,
                    status: unit.status,
                    price: unit.price,
                    booking: unit.current_booking,
                    updated_at: unit.stamp.updated_at,
                })?;
            }
        }
        Report::Bookings => {
            for booking in market.allocator().bookings() {
                wtr.serialize(&booking)?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
