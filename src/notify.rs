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

//! Outbound notifications.
//!
//! The workflows only decide that a notification should go out and what it
//! says. Delivery belongs to a [`NotificationSink`]; a failed delivery is
//! logged and never rolls back the transition that caused it.

use crate::base::ActorId;
use crossbeam::queue::SegQueue;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::info;

/// Entity type named in a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Property,
    Unit,
    Flag,
    Ticket,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Property => "property",
            Self::Unit => "unit",
            Self::Flag => "flag",
            Self::Ticket => "ticket",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub entity: EntityKind,
    pub entity_id: String,
    pub status: &'static str,
    pub recipient: ActorId,
}

impl Notification {
    pub fn new(
        entity: EntityKind,
        entity_id: impl fmt::Display,
        status: &'static str,
        recipient: ActorId,
    ) -> Self {
        Self {
            entity,
            entity_id: entity_id.to_string(),
            status,
            recipient,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Fire-and-forget delivery channel.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// In-memory sink queueing notifications for a later dispatcher.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: SegQueue<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Takes every queued notification, oldest first.
    pub fn drain(&self) -> Vec<Notification> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl NotificationSink for Outbox {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.queue.push(notification.clone());
        Ok(())
    }
}

/// Sink that only emits a structured log event per notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        info!(
            entity = %notification.entity,
            entity_id = %notification.entity_id,
            status = notification.status,
            recipient = %notification.recipient,
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_drains_in_fifo_order() {
        let outbox = Outbox::new();
        outbox
            .deliver(&Notification::new(EntityKind::Property, 1, "Active", ActorId(9)))
            .unwrap();
        outbox
            .deliver(&Notification::new(EntityKind::Ticket, 2, "Closed", ActorId(8)))
            .unwrap();

        let drained = outbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].entity_id, "1");
        assert_eq!(drained[1].status, "Closed");
        assert!(outbox.is_empty());
    }

    #[test]
    fn notification_serializes_entity_kind() {
        let json = serde_json::to_value(Notification::new(
            EntityKind::Unit,
            4,
            "Reserved",
            ActorId(2),
        ))
        .unwrap();
        assert_eq!(json["entity"], "unit");
        assert_eq!(json["entity_id"], "4");
        assert_eq!(json["recipient"], 2);
    }
}
