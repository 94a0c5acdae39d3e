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

use crate::transport::{ContractCaller, MessageSender, TxHash};
use anyhow::{Result, ensure};
use async_trait::async_trait;
use keyper_common::{Address, ContractCall, KeyperMessage};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MessageSenderState {
    pub submitted: Vec<KeyperMessage>,
    /// Number of upcoming submissions that fail.
    pub failures: u32,
}

#[derive(Default, Clone)]
pub struct MockMessageSender {
    pub state: Arc<RwLock<MessageSenderState>>,
}

impl MockMessageSender {
    pub async fn take_submitted(&self) -> Vec<KeyperMessage> {
        std::mem::take(&mut self.state.write().await.submitted)
    }

    pub async fn fail_next(&self, count: u32) {
        self.state.write().await.failures = count;
    }
}

#[async_trait]
impl MessageSender for MockMessageSender {
    async fn submit(&self, message: KeyperMessage) -> Result<()> {
        let mut state = self.state.write().await;
        if state.failures > 0 {
            state.failures -= 1;
            anyhow::bail!("consensus chain rejected {}", message.name());
        }
        state.submitted.push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct ContractCallerState {
    pub nonce: u64,
    pub nonce_queries: u32,
    pub sent: Vec<(Address, ContractCall, u64)>,
    pub mined: Vec<TxHash>,
    pub fail_send: bool,
}

#[derive(Default, Clone)]
pub struct MockContractCaller {
    pub state: Arc<RwLock<ContractCallerState>>,
}

impl MockContractCaller {
    pub async fn take_sent(&self) -> Vec<(Address, ContractCall, u64)> {
        std::mem::take(&mut self.state.write().await.sent)
    }
}

#[async_trait]
impl ContractCaller for MockContractCaller {
    async fn nonce(&self) -> Result<u64> {
        let mut state = self.state.write().await;
        state.nonce_queries += 1;
        Ok(state.nonce)
    }

    async fn send(&self, contract: Address, call: ContractCall, nonce: u64) -> Result<TxHash> {
        let mut state = self.state.write().await;
        ensure!(!state.fail_send, "main chain node unavailable");
        ensure!(nonce == state.nonce, "nonce {nonce} expected {}", state.nonce);

        state.nonce += 1;
        state.sent.push((contract, call, nonce));

        let mut hash = [0; 32];
        hash[24..].copy_from_slice(&nonce.to_be_bytes());
        Ok(TxHash(hash))
    }

    async fn wait_mined(&self, tx: TxHash) -> Result<()> {
        self.state.write().await.mined.push(tx);
        Ok(())
    }
}
