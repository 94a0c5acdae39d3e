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

use crate::{MainChainClient, ShutterClient};
use anyhow::{Result, anyhow, ensure};
use async_trait::async_trait;
use keyper_common::{MainChainEvent, MainChainLog, RawEvent, ShutterEvent};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct ShutterChainState {
    pub height: u64,
    pub events: Vec<(u64, RawEvent)>,
    pub fail: bool,
}

/// In-memory consensus chain.
#[derive(Default, Clone)]
pub struct MockShutterChain {
    pub state: Arc<RwLock<ShutterChainState>>,
}

impl MockShutterChain {
    /// Mine a block holding `events`.
    pub async fn push_block(&self, events: impl IntoIterator<Item = ShutterEvent>) -> u64 {
        let mut state = self.state.write().await;
        state.height += 1;
        let height = state.height;
        state
            .events
            .extend(events.into_iter().map(|event| (height, event.to_raw())));
        height
    }

    pub async fn push_raw(&self, event: RawEvent) -> u64 {
        let mut state = self.state.write().await;
        state.height += 1;
        let height = state.height;
        state.events.push((height, event));
        height
    }

    pub async fn set_failing(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }
}

#[async_trait]
impl ShutterClient for MockShutterChain {
    async fn latest_height(&self) -> Result<u64> {
        let state = self.state.read().await;
        ensure!(!state.fail, "consensus chain unavailable");
        Ok(state.height)
    }

    async fn events(&self, from: u64, to: u64) -> Result<Vec<(u64, RawEvent)>> {
        let state = self.state.read().await;
        ensure!(!state.fail, "consensus chain unavailable");
        Ok(state
            .events
            .iter()
            .filter(|(height, _)| (from..=to).contains(height))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MainChainState {
    pub block: u64,
    pub logs: Vec<MainChainLog>,
    pub fail_logs_from: Option<u64>,
    pub requested_ranges: Vec<(u64, u64)>,
}

/// In-memory main chain.
#[derive(Default, Clone)]
pub struct MockMainChain {
    pub state: Arc<RwLock<MainChainState>>,
}

impl MockMainChain {
    pub async fn push_block(&self, events: impl IntoIterator<Item = MainChainEvent>) -> u64 {
        let mut state = self.state.write().await;
        state.block += 1;
        let block = state.block;
        state
            .logs
            .extend(events.into_iter().map(|event| MainChainLog { block, event }));
        block
    }

    pub async fn skip_blocks(&self, count: u64) {
        self.state.write().await.block += count;
    }
}

#[async_trait]
impl MainChainClient for MockMainChain {
    async fn latest_block(&self) -> Result<u64> {
        Ok(self.state.read().await.block)
    }

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<MainChainLog>> {
        let mut state = self.state.write().await;
        state.requested_ranges.push((from, to));

        if let Some(fail_from) = state.fail_logs_from {
            if to >= fail_from {
                return Err(anyhow!("logs for blocks from {fail_from} are unavailable"));
            }
        }

        Ok(state
            .logs
            .iter()
            .filter(|log| (from..=to).contains(&log.block))
            .cloned()
            .collect())
    }
}
