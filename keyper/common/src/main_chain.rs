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

//! Main chain contracts: their events and the calls a keyper makes.

use crate::{Address, BatchConfig, Eon, EpochIndex};
use keyper_crypto::{EonPublicKey, EpochSecretKey};
use parity_scale_codec::{Decode, Encode};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Encode, Decode, derive_more::Display)]
pub enum Contract {
    #[display("config")]
    Config,
    #[display("key-broadcast")]
    KeyBroadcast,
    #[display("batcher")]
    Batcher,
    #[display("executor")]
    Executor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ContractAddresses {
    pub config: Address,
    pub key_broadcast: Address,
    pub batcher: Address,
    pub executor: Address,
}

impl ContractAddresses {
    pub fn address(&self, contract: Contract) -> Address {
        match contract {
            Contract::Config => self.config,
            Contract::KeyBroadcast => self.key_broadcast,
            Contract::Batcher => self.batcher,
            Contract::Executor => self.executor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum MainChainEvent {
    ConfigScheduled(BatchConfig),
    EonKeyBroadcast {
        eon: Eon,
        sender: Address,
        key: EonPublicKey,
    },
    TransactionAdded {
        batch_index: EpochIndex,
    },
    CipherBatchExecuted {
        batch_index: EpochIndex,
    },
}

impl MainChainEvent {
    pub fn contract(&self) -> Contract {
        match self {
            Self::ConfigScheduled(_) => Contract::Config,
            Self::EonKeyBroadcast { .. } => Contract::KeyBroadcast,
            Self::TransactionAdded { .. } => Contract::Batcher,
            Self::CipherBatchExecuted { .. } => Contract::Executor,
        }
    }
}

/// Main chain event together with the block it was included in.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct MainChainLog {
    pub block: u64,
    pub event: MainChainEvent,
}

/// Transaction a keyper sends to a main chain contract.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum ContractCall {
    BroadcastEonKey {
        eon: Eon,
        key: EonPublicKey,
    },
    ExecuteCipherBatch {
        batch_index: EpochIndex,
        decryption_key: EpochSecretKey,
    },
}

impl ContractCall {
    pub fn contract(&self) -> Contract {
        match self {
            Self::BroadcastEonKey { .. } => Contract::KeyBroadcast,
            Self::ExecuteCipherBatch { .. } => Contract::Executor,
        }
    }
}
