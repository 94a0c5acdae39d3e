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

//! Batch configurations.
//!
//! A batch config becomes active at its start batch index and stays active
//! until the next one starts. Each config starts a new eon, identified by
//! that start index.

use crate::Address;
use keyper_crypto::KeyperIndex;
use parity_scale_codec::{Decode, Encode};
use std::collections::BTreeSet;
use thiserror::Error;

/// Eon identifier, the start batch index of its config.
pub type Eon = u64;

/// Batch (epoch) index.
pub type EpochIndex = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BatchConfig {
    pub start_batch_index: EpochIndex,
    pub threshold: u64,
    pub keypers: Vec<Address>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("threshold {threshold} out of range for {num_keypers} keypers")]
    InvalidThreshold { threshold: u64, num_keypers: u64 },
    #[error("keyper {0} listed twice")]
    DuplicateKeyper(Address),
}

impl BatchConfig {
    pub fn eon(&self) -> Eon {
        self.start_batch_index
    }

    pub fn num_keypers(&self) -> u64 {
        self.keypers.len() as u64
    }

    pub fn keyper_index(&self, address: &Address) -> Option<KeyperIndex> {
        self.keypers
            .iter()
            .position(|keyper| keyper == address)
            .map(|index| index as KeyperIndex)
    }

    pub fn is_keyper(&self, address: &Address) -> bool {
        self.keyper_index(address).is_some()
    }

    pub fn keyper(&self, index: KeyperIndex) -> Option<&Address> {
        self.keypers.get(index as usize)
    }

    /// Keyper in charge of executing the given batch.
    pub fn leader(&self, batch_index: EpochIndex) -> Option<&Address> {
        if self.keypers.is_empty() {
            return None;
        }
        self.keyper(batch_index % self.num_keypers())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold == 0 || self.threshold > self.num_keypers() {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.threshold,
                num_keypers: self.num_keypers(),
            });
        }

        let mut seen = BTreeSet::new();
        for keyper in &self.keypers {
            if !seen.insert(keyper) {
                return Err(ConfigError::DuplicateKeyper(*keyper));
            }
        }

        Ok(())
    }
}

/// Config active at `batch_index` out of configs sorted by start index.
pub fn active_config(configs: &[BatchConfig], batch_index: EpochIndex) -> Option<&BatchConfig> {
    configs
        .iter()
        .rev()
        .find(|config| config.start_batch_index <= batch_index)
}
