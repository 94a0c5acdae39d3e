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

//! Consensus chain observer.

use crate::{Chain, ShutterClient, SyncError, next_range};
use keyper_common::{BatchConfig, EpochIndex, RawEvent, ShutterEvent, active_config};
use parity_scale_codec::{Decode, Encode};

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ObservedEvent {
    pub height: u64,
    pub event: ShutterEvent,
}

/// Append-only view of the consensus chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ShutterObserver {
    height: Option<u64>,
    events: Vec<ObservedEvent>,
    batch_configs: Vec<BatchConfig>,
    /// Log position of the event that adopted each batch config.
    config_positions: Vec<u64>,
}

/// Blocks fetched but not yet applied.
#[derive(Debug, Clone)]
pub struct ShutterUpdate {
    pub head: u64,
    pub events: Vec<(u64, RawEvent)>,
}

impl ShutterObserver {
    pub fn current_height(&self) -> Option<u64> {
        self.height
    }

    pub fn events(&self) -> &[ObservedEvent] {
        &self.events
    }

    /// Events from position `cursor` of the log on.
    pub fn events_since(&self, cursor: usize) -> &[ObservedEvent] {
        self.events.get(cursor..).unwrap_or_default()
    }

    /// Adopted batch configs, ordered by start batch index.
    pub fn batch_configs(&self) -> &[BatchConfig] {
        &self.batch_configs
    }

    pub fn active_config(&self, batch_index: EpochIndex) -> Option<&BatchConfig> {
        active_config(&self.batch_configs, batch_index)
    }

    /// Config active at `batch_index` as seen by the event at log position
    /// `position`: only configs adopted earlier in the log count.
    pub fn active_config_at(
        &self,
        position: usize,
        batch_index: EpochIndex,
    ) -> Option<&BatchConfig> {
        let adopted = self
            .config_positions
            .partition_point(|&adopted_at| adopted_at < position as u64);
        active_config(&self.batch_configs[..adopted], batch_index)
    }

    /// Whether the event at log position `position` adopted a batch config.
    pub fn adopts_config(&self, position: usize) -> bool {
        self.config_positions
            .binary_search(&(position as u64))
            .is_ok()
    }

    /// Fetch everything past the observed height. Does not modify `self`.
    pub async fn fetch<C: ShutterClient + ?Sized>(
        &self,
        client: &C,
    ) -> Result<ShutterUpdate, SyncError> {
        let head = client.latest_height().await.map_err(|err| SyncError::Head {
            chain: Chain::Shutter,
            reason: format!("{err:#}"),
        })?;

        let Some(from) = next_range(Chain::Shutter, self.height, head)? else {
            return Ok(ShutterUpdate {
                head,
                events: Vec::new(),
            });
        };

        let events = client
            .events(from, head)
            .await
            .map_err(|err| SyncError::Fetch {
                chain: Chain::Shutter,
                from,
                to: head,
                reason: format!("{err:#}"),
            })?;

        if let Some((height, _)) = events
            .iter()
            .find(|(height, _)| *height < from || *height > head)
        {
            return Err(SyncError::OutOfRange {
                chain: Chain::Shutter,
                height: *height,
                from,
                to: head,
            });
        }

        tracing::trace!(from, to = head, count = events.len(), "fetched consensus chain events");

        Ok(ShutterUpdate { head, events })
    }

    /// Append a fetched update. Undecodable events are dropped here and never
    /// reach the log.
    pub fn apply(&mut self, update: ShutterUpdate) {
        for (height, raw) in update.events {
            match ShutterEvent::try_from(&raw) {
                Ok(event) => self.push(height, event),
                Err(err) => {
                    tracing::warn!(height, kind = %raw.kind, "skipping undecodable event: {err}")
                }
            }
        }

        self.height = Some(self.height.map_or(update.head, |h| h.max(update.head)));
    }

    pub async fn sync_to_head<C: ShutterClient + ?Sized>(
        &mut self,
        client: &C,
    ) -> Result<(), SyncError> {
        let update = self.fetch(client).await?;
        self.apply(update);
        Ok(())
    }

    fn push(&mut self, height: u64, event: ShutterEvent) {
        if let ShutterEvent::BatchConfig(config) = &event {
            let newer = self
                .batch_configs
                .last()
                .is_none_or(|last| config.start_batch_index > last.start_batch_index);

            match config.validate() {
                Ok(()) if newer => {
                    self.batch_configs.push(config.clone());
                    self.config_positions.push(self.events.len() as u64);
                }
                Ok(()) => tracing::warn!(
                    start_batch_index = config.start_batch_index,
                    "ignoring batch config that does not start after the previous one"
                ),
                Err(err) => tracing::warn!(
                    start_batch_index = config.start_batch_index,
                    "ignoring invalid batch config: {err}"
                ),
            }
        }

        self.events.push(ObservedEvent { height, event });
    }
}
