// This file is part of Gear.
//
// Copyright (C) 2025 Gear Technologies Inc.
// SPDX-License-Identifier: GPL-3.0-or-later WITH Classpath-exception-2.0
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Persisted record of decided actions.
//!
//! The outbox is written with the rest of the keyper state before any action
//! is executed. After a restart, actions that were decided but never
//! confirmed are decided again instead of being lost, and actions already
//! sent are not repeated until their resend window passes.

use crate::{Action, ActionId};
use parity_scale_codec::{Decode, Encode};
use std::collections::BTreeMap;

/// Observed heights of both chains at decision time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct ChainHeights {
    pub shutter: u64,
    pub main_chain: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum OutboxStatus {
    /// Decided, not executed yet.
    Pending,
    /// Handed to the transport at the given heights.
    Sent { at: ChainHeights },
    /// Last execution attempt failed.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct OutboxEntry {
    pub status: OutboxStatus,
    /// Consecutive failed attempts.
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Outbox {
    entries: BTreeMap<ActionId, OutboxEntry>,
}

impl Outbox {
    pub fn get(&self, id: &ActionId) -> Option<&OutboxEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActionId, &OutboxEntry)> {
        self.entries.iter()
    }

    /// Filter the currently needed actions down to the ones to execute now.
    ///
    /// Entries for actions no longer needed are dropped. A sent action is
    /// repeated once `resend_after` blocks of its target chain passed
    /// without the chain reflecting it.
    pub fn schedule(
        &mut self,
        needed: Vec<Action>,
        heights: ChainHeights,
        resend_after: u64,
    ) -> Vec<Action> {
        let needed: BTreeMap<ActionId, Action> =
            needed.into_iter().map(|action| (action.id(), action)).collect();

        self.entries.retain(|id, _| needed.contains_key(id));

        let mut actions = Vec::new();
        for (id, action) in needed {
            let entry = self.entries.entry(id).or_insert(OutboxEntry {
                status: OutboxStatus::Pending,
                attempts: 0,
            });

            if let OutboxStatus::Sent { at } = entry.status {
                let (now, sent) = if id.kind.is_main_chain() {
                    (heights.main_chain, at.main_chain)
                } else {
                    (heights.shutter, at.shutter)
                };

                if now < sent.saturating_add(resend_after) {
                    tracing::trace!(%id, sent, now, "waiting for sent action to be included");
                    continue;
                }

                tracing::info!(%id, sent, now, "sent action not included, resending");
                entry.status = OutboxStatus::Pending;
            }

            actions.push(action);
        }

        actions
    }

    pub fn mark_sent(&mut self, id: ActionId, at: ChainHeights) {
        self.entries.insert(
            id,
            OutboxEntry {
                status: OutboxStatus::Sent { at },
                attempts: 0,
            },
        );
    }

    /// Record a failed attempt. Returns the number of consecutive failures.
    pub fn mark_failed(&mut self, id: ActionId, error: String) -> u32 {
        let entry = self.entries.entry(id).or_insert(OutboxEntry {
            status: OutboxStatus::Pending,
            attempts: 0,
        });
        entry.status = OutboxStatus::Failed { error };
        entry.attempts += 1;
        entry.attempts
    }
}
