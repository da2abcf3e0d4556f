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

//! Generic status lifecycle engine.
//!
//! A [`StateMachine`] is a static table of [`Edge`]s. Each edge names the
//! roles allowed to take it, the hooks the calling workflow must run when the
//! target status is entered, and whether the change is worth a notification.
//!
//! The engine owns no data. [`StateMachine::transition`] is a pure function
//! of `(current, requested, role)`:
//!
//! - `requested == current` always succeeds as a no-op, for every role.
//! - An edge exists but not for `role`: [`WorkflowError::Forbidden`].
//! - No edge exists for any role: [`WorkflowError::InvalidTransition`].
//!
//! A status without outgoing edges is terminal.

use crate::WorkflowError;
use crate::base::Role;
use std::fmt;

/// A status value of some lifecycle entity.
///
/// `ALL` is the declared state set; an entity is never stored in a value
/// outside it.
pub trait Status: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn name(&self) -> &'static str;
}

/// Work the owning workflow performs when an edge is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Stamp reviewer identity and review time.
    RecordReview,
    /// Stamp resolver identity and resolution time.
    RecordResolution,
    /// Create a refunded ledger record when the payload carries a refund.
    IssueRefund,
    /// Run the booking allocator.
    AllocateBooking,
    /// Detach the unit's current booking.
    ReleaseBooking,
}

/// One allowed move in a state machine.
#[derive(Debug, Clone, Copy)]
pub struct Edge<S: 'static> {
    pub from: S,
    pub to: S,
    pub roles: &'static [Role],
    pub hooks: &'static [Hook],
    pub notify: bool,
}

impl<S: Status> Edge<S> {
    pub const fn new(
        from: S,
        to: S,
        roles: &'static [Role],
        hooks: &'static [Hook],
        notify: bool,
    ) -> Self {
        Self {
            from,
            to,
            roles,
            hooks,
            notify,
        }
    }
}

/// Result of a validated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step<S: 'static> {
    pub from: S,
    pub status: S,
    pub hooks: &'static [Hook],
    pub notify: bool,
}

impl<S: Status> Step<S> {
    fn unchanged(status: S) -> Self {
        Self {
            from: status,
            status,
            hooks: &[],
            notify: false,
        }
    }

    /// `false` for the idempotent re-application of the current status.
    pub fn changed(&self) -> bool {
        self.from != self.status
    }
}

/// Declarative transition table for one entity type.
#[derive(Debug)]
pub struct StateMachine<S: 'static> {
    name: &'static str,
    edges: &'static [Edge<S>],
}

impl<S: Status> StateMachine<S> {
    pub const fn new(name: &'static str, edges: &'static [Edge<S>]) -> Self {
        Self { name, edges }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn edges(&self) -> &'static [Edge<S>] {
        self.edges
    }

    pub fn edges_from(&self, status: S) -> impl Iterator<Item = &'static Edge<S>> + use<S> {
        self.edges.iter().filter(move |edge| edge.from == status)
    }

    /// Whether `status` belongs to this machine's state set.
    pub fn declares(&self, status: S) -> bool {
        S::ALL.contains(&status)
    }

    pub fn is_terminal(&self, status: S) -> bool {
        self.edges_from(status).next().is_none()
    }

    /// Validates a requested status change.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidTransition`] - `requested` is unreachable from `current`.
    /// - [`WorkflowError::Forbidden`] - reachable, but not for `role`.
    pub fn transition(&self, current: S, requested: S, role: Role) -> Result<Step<S>, WorkflowError> {
        if current == requested {
            return Ok(Step::unchanged(current));
        }

        let mut reachable = false;
        for edge in self.edges_from(current).filter(|edge| edge.to == requested) {
            if edge.roles.contains(&role) {
                return Ok(Step {
                    from: current,
                    status: requested,
                    hooks: edge.hooks,
                    notify: edge.notify,
                });
            }
            reachable = true;
        }

        if reachable {
            Err(WorkflowError::Forbidden {
                role,
                action: format!(
                    "move {} from {} to {}",
                    self.name,
                    current.name(),
                    requested.name()
                ),
            })
        } else {
            Err(WorkflowError::InvalidTransition {
                from: current.name(),
                to: requested.name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Off,
        On,
        Broken,
    }

    impl Status for Light {
        const ALL: &'static [Self] = &[Light::Off, Light::On, Light::Broken];

        fn name(&self) -> &'static str {
            match self {
                Self::Off => "Off",
                Self::On => "On",
                Self::Broken => "Broken",
            }
        }
    }

    static LIGHT: StateMachine<Light> = StateMachine::new(
        "light",
        &[
            Edge::new(Light::Off, Light::On, &[Role::Tenant, Role::Owner], &[], false),
            Edge::new(Light::On, Light::Off, &[Role::Tenant], &[], false),
            Edge::new(
                Light::On,
                Light::Broken,
                &[Role::Administrator],
                &[Hook::RecordResolution],
                true,
            ),
        ],
    );

    #[test]
    fn allowed_edge_returns_hooks_and_notify_flag() {
        let step = LIGHT
            .transition(Light::On, Light::Broken, Role::Administrator)
            .unwrap();
        assert_eq!(step.status, Light::Broken);
        assert_eq!(step.hooks, &[Hook::RecordResolution]);
        assert!(step.notify);
        assert!(step.changed());
    }

    #[test]
    fn same_status_is_a_noop_for_every_role() {
        for status in Light::ALL {
            for role in Role::ALL {
                let step = LIGHT.transition(*status, *status, role).unwrap();
                assert!(!step.changed());
                assert!(step.hooks.is_empty());
                assert!(!step.notify);
            }
        }
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let result = LIGHT.transition(Light::On, Light::Off, Role::Owner);
        assert!(matches!(
            result,
            Err(WorkflowError::Forbidden {
                role: Role::Owner,
                ..
            })
        ));
    }

    #[test]
    fn unreachable_status_is_invalid_for_every_role() {
        for role in Role::ALL {
            assert_eq!(
                LIGHT.transition(Light::Off, Light::Broken, role),
                Err(WorkflowError::InvalidTransition {
                    from: "Off",
                    to: "Broken"
                })
            );
        }
    }

    #[test]
    fn terminal_status_has_no_outgoing_edges() {
        assert!(LIGHT.is_terminal(Light::Broken));
        assert!(!LIGHT.is_terminal(Light::On));
        assert!(matches!(
            LIGHT.transition(Light::Broken, Light::On, Role::Administrator),
            Err(WorkflowError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn every_declared_status_is_known() {
        assert!(Light::ALL.iter().all(|status| LIGHT.declares(*status)));
    }
}
