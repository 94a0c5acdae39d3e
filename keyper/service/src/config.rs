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

//! Keyper configuration file.

use anyhow::{Context, Result, ensure};
use keyper_common::{Address, ContractAddresses};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

/// Name of the snapshot file inside the database directory.
pub const STATE_FILE: &str = "keyper-state.bin";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct KeyperConfig {
    /// Address this keyper signs consensus chain messages and main chain
    /// transactions with.
    pub address: Address,
    pub shutter_rpc: Url,
    pub main_chain_rpc: Url,
    pub contracts: ContractAddresses,
    pub database_dir: PathBuf,
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Delay before retrying a cycle that failed to sync.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_main_chain_batch_size")]
    pub main_chain_batch_size: u64,
    /// Blocks a sent action may take to appear on chain before it is resent.
    #[serde(default = "default_resend_after")]
    pub resend_after: u64,
    #[serde(default)]
    pub action_retry: ActionRetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ActionRetryConfig {
    /// Failed attempts of a single action after which the service halts.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ActionRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl ActionRetryConfig {
    /// Delay after the `attempts`-th consecutive failure.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1u64 << attempts.saturating_sub(1).min(32);
        Duration::from_millis(
            self.base_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

fn default_cycle_interval_secs() -> u64 {
    10
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_main_chain_batch_size() -> u64 {
    1_000
}

fn default_resend_after() -> u64 {
    20
}

impl KeyperConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        Self::from_toml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.database_dir.as_os_str().is_empty(),
            "database directory must not be empty"
        );
        ensure!(
            self.main_chain_batch_size > 0,
            "main chain batch size must be positive"
        );
        ensure!(
            self.action_retry.max_attempts > 0,
            "max action attempts must be positive"
        );
        Ok(())
    }

    pub fn state_file(&self) -> PathBuf {
        self.database_dir.join(STATE_FILE)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
