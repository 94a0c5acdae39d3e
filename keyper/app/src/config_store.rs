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

use keyper_common::{BatchConfig, ConfigError, EpochIndex, active_config};
use parity_scale_codec::{Decode, Encode};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigStoreError {
    #[error("config starting at {start} does not start after the last one at {last}")]
    NotAfterLast { start: EpochIndex, last: EpochIndex },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Batch configs ordered by start batch index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ConfigStore {
    configs: Vec<BatchConfig>,
}

impl ConfigStore {
    pub fn add(&mut self, config: BatchConfig) -> Result<(), ConfigStoreError> {
        config.validate()?;

        if let Some(last) = self.configs.last() {
            if config.start_batch_index <= last.start_batch_index {
                return Err(ConfigStoreError::NotAfterLast {
                    start: config.start_batch_index,
                    last: last.start_batch_index,
                });
            }
        }

        tracing::debug!(start_batch_index = config.start_batch_index, "config added");
        self.configs.push(config);
        Ok(())
    }

    /// Config active at `batch_index`, the empty config before the first.
    pub fn get(&self, batch_index: EpochIndex) -> BatchConfig {
        active_config(&self.configs, batch_index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<&BatchConfig> {
        self.configs.last()
    }

    pub fn configs(&self) -> &[BatchConfig] {
        &self.configs
    }
}
