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

//! Keyper service.
//!
//! Each cycle syncs both chain observers concurrently, decides on a
//! consistent copy of them, persists the outcome and only then executes the
//! decided actions one by one.

use crate::{
    config::KeyperConfig,
    executor::{ActionExecutionError, Executor},
    snapshot::{Snapshot, SnapshotStore},
    transport::{ContractCaller, MessageSender},
};
use anyhow::Result;
use keyper_common::EvalEnvelope;
use keyper_decider::{ChainHeights, DecideError, Decider};
use keyper_observer::{MainChainClient, ShutterClient, SyncError};
use rand::{SeedableRng, rngs::StdRng};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod executor;
pub mod snapshot;
pub mod transport;

#[cfg(any(feature = "mock", test))]
pub mod mock;

#[cfg(test)]
mod tests;

/// Collaborators the keyper talks to.
pub struct Clients {
    pub shutter: Box<dyn ShutterClient>,
    pub main_chain: Box<dyn MainChainClient>,
    pub messages: Box<dyn MessageSender>,
    pub caller: Box<dyn ContractCaller>,
    pub envelope: Box<dyn EvalEnvelope>,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Decide(#[from] DecideError),
    #[error("failed to persist state: {0:#}")]
    Snapshot(anyhow::Error),
    #[error(transparent)]
    Action(#[from] ActionExecutionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed { executed: usize },
    /// An action failed; the next cycle waits for `backoff`.
    ActionFailed { backoff: Duration },
    Cancelled,
}

pub struct KeyperService {
    config: KeyperConfig,
    clients: Clients,
    store: SnapshotStore,
    snapshot: Snapshot,
    rng: StdRng,
}

impl KeyperService {
    /// Create the service, resuming from the snapshot in the database
    /// directory if there is one.
    pub fn new(config: KeyperConfig, clients: Clients) -> Result<Self> {
        let store = SnapshotStore::new(config.state_file());
        let snapshot = match store.load()? {
            Some(snapshot) => {
                tracing::info!(
                    path = %store.path().display(),
                    shutter = ?snapshot.shutter.current_height(),
                    main_chain = ?snapshot.main_chain.current_height(),
                    "resuming from snapshot"
                );
                snapshot
            }
            None => {
                tracing::info!(path = %store.path().display(), "no snapshot, starting fresh");
                Snapshot::default()
            }
        };

        Ok(Self {
            config,
            clients,
            store,
            snapshot,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &KeyperConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        tracing::info!("⚙️ Keyper service starting, address {}", self.config.address);

        loop {
            let delay = match self.run_cycle(&cancel).await {
                Ok(CycleOutcome::Cancelled) => break,
                Ok(CycleOutcome::Completed { .. }) => self.config.cycle_interval(),
                Ok(CycleOutcome::ActionFailed { backoff }) => backoff,
                Err(CycleError::Sync(err)) => {
                    tracing::warn!("Cycle aborted: {err}");
                    self.config.retry_delay()
                }
                Err(err) => {
                    tracing::error!("Keyper service finished work with error: {err}");
                    return Err(err.into());
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Keyper service stopped");
        Ok(())
    }

    /// Run one sync, decide and execute cycle.
    ///
    /// Nothing is changed unless both chains synced. Decided actions are
    /// persisted before the first of them executes.
    pub async fn run_cycle(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, CycleError> {
        let sync = async {
            tokio::try_join!(
                self.snapshot.shutter.fetch(self.clients.shutter.as_ref()),
                self.snapshot.main_chain.fetch(
                    self.clients.main_chain.as_ref(),
                    self.config.main_chain_batch_size
                ),
            )
        };

        let (shutter_update, main_chain_update) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("cycle cancelled during sync");
                return Ok(CycleOutcome::Cancelled);
            }
            updates = sync => updates?,
        };

        let mut next = self.snapshot.clone();
        next.shutter.apply(shutter_update);
        next.main_chain.apply(main_chain_update);

        let decider = Decider::new(
            self.config.address,
            self.clients.envelope.as_ref(),
            self.config.resend_after,
        );
        let actions = decider.decide(
            &mut next.state,
            &next.shutter,
            &next.main_chain,
            &mut self.rng,
        )?;

        self.store.save(&next).map_err(CycleError::Snapshot)?;
        self.snapshot = next;
        self.log_status(actions.len());

        if actions.is_empty() {
            return Ok(CycleOutcome::Completed { executed: 0 });
        }

        let heights = ChainHeights {
            shutter: self.snapshot.shutter.current_height().unwrap_or_default(),
            main_chain: self.snapshot.main_chain.current_height().unwrap_or_default(),
        };
        let executor = Executor::new(
            self.clients.envelope.as_ref(),
            self.clients.messages.as_ref(),
            self.clients.caller.as_ref(),
            &self.config.contracts,
        );

        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            report = executor.execute(actions, self.snapshot.state.outbox_mut(), heights) => Some(report),
        };

        self.store.save(&self.snapshot).map_err(CycleError::Snapshot)?;

        let Some(report) = report else {
            tracing::debug!("cycle cancelled during execution");
            return Ok(CycleOutcome::Cancelled);
        };

        match report.failure {
            None => Ok(CycleOutcome::Completed {
                executed: report.executed,
            }),
            Some(failure) if failure.attempts >= self.config.action_retry.max_attempts => {
                Err(ActionExecutionError {
                    id: failure.id,
                    attempts: failure.attempts,
                    error: failure.error,
                }
                .into())
            }
            Some(failure) => Ok(CycleOutcome::ActionFailed {
                backoff: self.config.action_retry.backoff(failure.attempts),
            }),
        }
    }

    fn log_status(&self, actions: usize) {
        let Snapshot {
            state,
            shutter,
            main_chain,
        } = &self.snapshot;

        tracing::info!(
            shutter = ?shutter.current_height(),
            main_chain = ?main_chain.current_height(),
            last_eon = ?shutter.batch_configs().last().map(|config| config.eon()),
            actions,
            "{}",
            state.short_info()
        );
    }
}
