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

//! Main chain observer.

use crate::{Chain, MainChainClient, SyncError, next_range};
use keyper_common::{
    Address, BatchConfig, Eon, EpochIndex, MainChainEvent, MainChainLog,
    crypto::EonPublicKey,
};
use parity_scale_codec::{Decode, Encode};
use std::collections::BTreeMap;

/// Decoded state of the config, key broadcast, batcher and executor
/// contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct MainChainObserver {
    block: Option<u64>,
    scheduled_configs: Vec<BatchConfig>,
    eon_key_votes: BTreeMap<Eon, BTreeMap<Address, EonPublicKey>>,
    batch_transactions: BTreeMap<EpochIndex, u64>,
    num_executed_batches: u64,
}

#[derive(Debug, Clone)]
pub struct MainChainUpdate {
    pub head: u64,
    pub logs: Vec<MainChainLog>,
}

impl MainChainObserver {
    pub fn current_height(&self) -> Option<u64> {
        self.block
    }

    /// Configs scheduled on the config contract, ordered by start index.
    pub fn scheduled_configs(&self) -> &[BatchConfig] {
        &self.scheduled_configs
    }

    pub fn eon_key_votes(&self, eon: Eon) -> Option<&BTreeMap<Address, EonPublicKey>> {
        self.eon_key_votes.get(&eon)
    }

    pub fn has_broadcast_eon_key(&self, eon: Eon, keyper: &Address) -> bool {
        self.eon_key_votes
            .get(&eon)
            .is_some_and(|votes| votes.contains_key(keyper))
    }

    pub fn batch_transactions(&self, batch_index: EpochIndex) -> u64 {
        self.batch_transactions
            .get(&batch_index)
            .copied()
            .unwrap_or_default()
    }

    /// Index of the next batch the executor contract expects.
    pub fn num_executed_batches(&self) -> u64 {
        self.num_executed_batches
    }

    /// Fetch logs past the observed block in chunks of `batch_size` blocks.
    /// Does not modify `self`.
    pub async fn fetch<C: MainChainClient + ?Sized>(
        &self,
        client: &C,
        batch_size: u64,
    ) -> Result<MainChainUpdate, SyncError> {
        let head = client.latest_block().await.map_err(|err| SyncError::Head {
            chain: Chain::MainChain,
            reason: format!("{err:#}"),
        })?;

        let mut logs = Vec::new();
        let Some(mut from) = next_range(Chain::MainChain, self.block, head)? else {
            return Ok(MainChainUpdate { head, logs });
        };

        let batch_size = batch_size.max(1);
        while from <= head {
            let to = from.saturating_add(batch_size - 1).min(head);
            let chunk = client
                .logs(from, to)
                .await
                .map_err(|err| SyncError::Fetch {
                    chain: Chain::MainChain,
                    from,
                    to,
                    reason: format!("{err:#}"),
                })?;

            if let Some(log) = chunk.iter().find(|log| log.block < from || log.block > to) {
                return Err(SyncError::OutOfRange {
                    chain: Chain::MainChain,
                    height: log.block,
                    from,
                    to,
                });
            }

            tracing::trace!(from, to, count = chunk.len(), "fetched main chain logs");
            logs.extend(chunk);
            from = to + 1;
        }

        Ok(MainChainUpdate { head, logs })
    }

    pub fn apply(&mut self, update: MainChainUpdate) {
        for log in update.logs {
            self.apply_event(log.event);
        }

        self.block = Some(self.block.map_or(update.head, |b| b.max(update.head)));
    }

    pub async fn sync_to_head<C: MainChainClient + ?Sized>(
        &mut self,
        client: &C,
        batch_size: u64,
    ) -> Result<(), SyncError> {
        let update = self.fetch(client, batch_size).await?;
        self.apply(update);
        Ok(())
    }

    fn apply_event(&mut self, event: MainChainEvent) {
        match event {
            MainChainEvent::ConfigScheduled(config) => {
                let newer = self
                    .scheduled_configs
                    .last()
                    .is_none_or(|last| config.start_batch_index > last.start_batch_index);
                if newer {
                    self.scheduled_configs.push(config);
                } else {
                    tracing::warn!(
                        start_batch_index = config.start_batch_index,
                        "ignoring scheduled config that does not start after the previous one"
                    );
                }
            }
            MainChainEvent::EonKeyBroadcast { eon, sender, key } => {
                self.eon_key_votes
                    .entry(eon)
                    .or_default()
                    .entry(sender)
                    .or_insert(key);
            }
            MainChainEvent::TransactionAdded { batch_index } => {
                *self.batch_transactions.entry(batch_index).or_default() += 1;
            }
            MainChainEvent::CipherBatchExecuted { batch_index } => {
                self.num_executed_batches = self
                    .num_executed_batches
                    .max(batch_index.saturating_add(1));
            }
        }
    }
}
