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

//! Error types for workflow, booking and ledger operations.

use crate::base::Role;
use thiserror::Error;

/// Workflow processing errors.
///
/// Every failure is returned to the caller; nothing is retried or swallowed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Requested status is not reachable from the current one for any role
    #[error("cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    /// The action exists but the caller's role may not perform it
    #[error("role {role} may not {action}")]
    Forbidden { role: Role, action: String },

    /// Another reservation won the unit
    #[error("unit is not available")]
    UnitUnavailable,

    /// Ledger record already left Pending
    #[error("ledger record already paid or refunded")]
    AlreadyPaidOrRefunded,

    /// Malformed request rejected before reaching the engine
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Referenced entity does not exist
    #[error("entity not found")]
    NotFound,

    /// An entity with the same key already exists
    #[error("duplicate record")]
    DuplicateRecord,

    /// No active commission rate is configured for the paying role
    #[error("no active commission rate for role {0}")]
    NoActiveRate(Role),
}

#[cfg(test)]
mod tests {
    use super::WorkflowError;
    use crate::base::Role;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            WorkflowError::InvalidTransition {
                from: "Resolved",
                to: "Pending"
            }
            .to_string(),
            "cannot move from Resolved to Pending"
        );
        assert_eq!(
            WorkflowError::Forbidden {
                role: Role::Tenant,
                action: "move to Active".into()
            }
            .to_string(),
            "role tenant may not move to Active"
        );
        assert_eq!(WorkflowError::UnitUnavailable.to_string(), "unit is not available");
        assert_eq!(
            WorkflowError::AlreadyPaidOrRefunded.to_string(),
            "ledger record already paid or refunded"
        );
        assert_eq!(
            WorkflowError::InvalidRequest("start date is in the past".into()).to_string(),
            "invalid request: start date is in the past"
        );
        assert_eq!(WorkflowError::NotFound.to_string(), "entity not found");
        assert_eq!(WorkflowError::DuplicateRecord.to_string(), "duplicate record");
        assert_eq!(
            WorkflowError::NoActiveRate(Role::Agent).to_string(),
            "no active commission rate for role agent"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = WorkflowError::UnitUnavailable;
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
