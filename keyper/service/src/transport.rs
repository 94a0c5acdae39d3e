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

//! Outgoing side of the keyper: consensus chain messages and main chain
//! transactions.

use anyhow::{Context, Result};
use async_trait::async_trait;
use keyper_common::{Address, ContractAddresses, ContractCall, KeyperMessage};

/// Hash of a submitted main chain transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Signs messages with the keyper key and submits them to the consensus
/// chain.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn submit(&self, message: KeyperMessage) -> Result<()>;
}

/// Signs and sends transactions to the main chain contracts.
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Next nonce of the keyper account.
    async fn nonce(&self) -> Result<u64>;

    async fn send(&self, contract: Address, call: ContractCall, nonce: u64) -> Result<TxHash>;

    async fn wait_mined(&self, tx: TxHash) -> Result<()>;
}

/// Transactions of one cycle. The account nonce is read once and then
/// assigned sequentially.
pub struct TxBatch<'a> {
    caller: &'a dyn ContractCaller,
    contracts: &'a ContractAddresses,
    next_nonce: Option<u64>,
    sent: Vec<TxHash>,
}

impl<'a> TxBatch<'a> {
    pub fn new(caller: &'a dyn ContractCaller, contracts: &'a ContractAddresses) -> Self {
        Self {
            caller,
            contracts,
            next_nonce: None,
            sent: Vec::new(),
        }
    }

    pub async fn send(&mut self, call: ContractCall) -> Result<TxHash> {
        let nonce = match self.next_nonce {
            Some(nonce) => nonce,
            None => self
                .caller
                .nonce()
                .await
                .context("failed to query account nonce")?,
        };

        let contract = call.contract();
        let tx = self
            .caller
            .send(self.contracts.address(contract), call, nonce)
            .await
            .with_context(|| format!("failed to send transaction to {contract} contract"))?;

        tracing::debug!(%tx, nonce, %contract, "transaction sent");
        self.next_nonce = Some(nonce + 1);
        self.sent.push(tx);

        Ok(tx)
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// Wait for every sent transaction, in sending order.
    pub async fn wait_mined(self) -> Result<()> {
        for tx in self.sent {
            self.caller
                .wait_mined(tx)
                .await
                .with_context(|| format!("transaction {tx} was not mined"))?;
        }
        Ok(())
    }
}
