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

use crate::{
    Action, DecideError,
    dkg::{DkgPhase, EonDkg},
    outbox::{ChainHeights, Outbox},
};
use keyper_common::{Address, Eon, EpochIndex, EvalEnvelope, ShutterEvent};
use keyper_observer::{MainChainObserver, ShutterObserver};
use parity_scale_codec::{Decode, Encode};
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet};

/// Everything the keyper decided so far, persisted between cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct KeyperState {
    /// Number of consensus chain events already recorded.
    cursor: u64,
    eons: BTreeMap<Eon, EonDkg>,
    /// Configs we voted for, by start batch index.
    config_votes: BTreeSet<EpochIndex>,
    outbox: Outbox,
}

impl KeyperState {
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn eon(&self, eon: Eon) -> Option<&EonDkg> {
        self.eons.get(&eon)
    }

    pub fn eons(&self) -> impl Iterator<Item = &EonDkg> {
        self.eons.values()
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn outbox_mut(&mut self) -> &mut Outbox {
        &mut self.outbox
    }

    /// One line summary for status logs.
    pub fn short_info(&self) -> String {
        let eons = self
            .eons
            .values()
            .map(EonDkg::short_info)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "events {}, outbox {}, [{}]",
            self.cursor,
            self.outbox.len(),
            eons
        )
    }
}

/// Turns observed chain state into the actions this keyper has to take.
pub struct Decider<'a> {
    address: Address,
    envelope: &'a dyn EvalEnvelope,
    resend_after: u64,
}

impl<'a> Decider<'a> {
    /// `resend_after` is the number of blocks a sent action may take to show
    /// up on its chain before it is sent again.
    pub fn new(address: Address, envelope: &'a dyn EvalEnvelope, resend_after: u64) -> Self {
        Self {
            address,
            envelope,
            resend_after,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Run one decision cycle.
    ///
    /// New consensus chain events are recorded, every state machine advances
    /// by at most one step and the actions still missing on chain are
    /// returned in `(eon, epoch, kind)` order. Given the same state, observers
    /// and rng output the result is always the same.
    pub fn decide<R: RngCore + ?Sized>(
        &self,
        state: &mut KeyperState,
        shutter: &ShutterObserver,
        main_chain: &MainChainObserver,
        rng: &mut R,
    ) -> Result<Vec<Action>, DecideError> {
        let start = state.cursor as usize;
        let new_events = shutter.events_since(start);
        for (offset, observed) in new_events.iter().enumerate() {
            self.record(state, shutter, start + offset, &observed.event);
        }
        state.cursor += new_events.len() as u64;

        for dkg in state.eons.values_mut() {
            // epochs only move once the eon key existed before this cycle
            if dkg.phase() == DkgPhase::EonKeyReady {
                dkg.step_epochs()?;
            } else {
                dkg.step(rng)?;
            }
        }

        let mut needed = self.config_votes(state, shutter, main_chain);
        for dkg in state.eons.values() {
            needed.extend(dkg.needed_actions(&self.address, main_chain)?);
        }

        let heights = ChainHeights {
            shutter: shutter.current_height().unwrap_or_default(),
            main_chain: main_chain.current_height().unwrap_or_default(),
        };

        Ok(state.outbox.schedule(needed, heights, self.resend_after))
    }

    /// Record the event at log position `position`. Epoch events belong to
    /// the config that was active when they were emitted.
    fn record(
        &self,
        state: &mut KeyperState,
        shutter: &ShutterObserver,
        position: usize,
        event: &ShutterEvent,
    ) {
        let eon = match event {
            ShutterEvent::BatchConfig(config) => {
                // rejected by the observer
                if !shutter.adopts_config(position) {
                    return;
                }
                if let Some(index) = config.keyper_index(&self.address) {
                    state.eons.entry(config.eon()).or_insert_with(|| {
                        tracing::info!(eon = config.eon(), index, "joining key generation");
                        EonDkg::new(config.clone(), index)
                    });
                }
                return;
            }
            ShutterEvent::BatchConfigVote {
                start_batch_index,
                sender,
            } => {
                if *sender == self.address {
                    state.config_votes.insert(*start_batch_index);
                }
                return;
            }
            ShutterEvent::PolyCommitment { eon, .. }
            | ShutterEvent::EonPublicKeyVote { eon, .. }
            | ShutterEvent::PubkeyGenerated { eon, .. } => *eon,
            ShutterEvent::PolyEval(event) => event.eon,
            ShutterEvent::BatchClosed { batch_index: epoch }
            | ShutterEvent::EpochSecretKeyShare { epoch, .. }
            | ShutterEvent::PrivkeyGenerated { epoch, .. } => {
                let Some(config) = shutter.active_config_at(position, *epoch) else {
                    tracing::debug!(epoch, "no config active for epoch");
                    return;
                };
                config.eon()
            }
        };

        if let Some(dkg) = state.eons.get_mut(&eon) {
            dkg.on_event(&self.address, event, self.envelope);
        }
    }

    /// Votes for configs scheduled on the main chain but not adopted yet.
    fn config_votes(
        &self,
        state: &KeyperState,
        shutter: &ShutterObserver,
        main_chain: &MainChainObserver,
    ) -> Vec<Action> {
        let adopted = shutter.batch_configs().last();

        main_chain
            .scheduled_configs()
            .iter()
            .filter(|config| {
                adopted.is_none_or(|adopted| config.start_batch_index > adopted.start_batch_index)
            })
            .filter(|config| !state.config_votes.contains(&config.start_batch_index))
            .filter(|config| {
                config.is_keyper(&self.address)
                    || adopted.is_some_and(|adopted| adopted.is_keyper(&self.address))
            })
            .map(|config| Action::VoteBatchConfig(config.clone()))
            .collect()
    }
}
