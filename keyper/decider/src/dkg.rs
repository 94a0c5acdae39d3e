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

//! Per-eon key generation.
//!
//! An [`EonDkg`] walks through the phases of [`DkgPhase`] for one eon this
//! keyper is part of. Once the eon key is ready, every closed batch of the
//! eon gets its own epoch phase. Chain events are recorded first and
//! phases advance afterwards, at most one step per cycle.

use crate::{
    Action,
    error::{CryptoResultExt, DecideError},
};
use keyper_common::{
    Address, BatchConfig, Eon, EpochIndex, EvalEnvelope, PolyEvalEvent, ShutterEvent,
    crypto::{
        EonPublicKey, EonPublicKeyShare, EonSecretKeyShare, EpochId, EpochSecretKey,
        EpochSecretKeyShare, Gammas, KeyperIndex, PolyEval, Polynomial,
    },
};
use keyper_observer::MainChainObserver;
use parity_scale_codec::{Decode, Encode};
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet};

/// Eon key generation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, derive_more::Display)]
pub enum DkgPhase {
    /// Config naming this keyper seen, nothing generated yet.
    Empty,
    /// Own polynomial generated, waiting for its commitment on chain.
    AwaitingGammas,
    /// Waiting for commitments and evaluations of every keyper.
    AwaitingShares,
    /// Eon secret key share and eon public key computed.
    EonKeyReady,
}

/// Epoch key phase of a closed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum EpochPhase {
    EpochKeyRequested,
    EpochKeyReady(EpochSecretKey),
}

/// Phase change made by a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Eon { from: DkgPhase, to: DkgPhase },
    EpochRequested(EpochIndex),
    EpochReady(EpochIndex),
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct EonDkg {
    config: BatchConfig,
    keyper_index: KeyperIndex,
    phase: DkgPhase,
    polynomial: Option<Polynomial>,
    /// Commitments observed on chain, ours included.
    gammas: BTreeMap<KeyperIndex, Gammas>,
    /// Evaluations for us, checked against commitments when completing.
    evals: BTreeMap<KeyperIndex, PolyEval>,
    published_evals: bool,
    voted_public_key: bool,
    eon_secret_key_share: Option<EonSecretKeyShare>,
    eon_public_key: Option<EonPublicKey>,
    confirmed_public_key: Option<EonPublicKey>,
    closed_batches: BTreeSet<EpochIndex>,
    epoch_shares: BTreeMap<EpochIndex, BTreeMap<KeyperIndex, EpochSecretKeyShare>>,
    published_keys: BTreeMap<EpochIndex, EpochSecretKey>,
    epochs: BTreeMap<EpochIndex, EpochPhase>,
}

impl EonDkg {
    /// Create new key generation for `config`, in which we are keyper
    /// `keyper_index`.
    pub fn new(config: BatchConfig, keyper_index: KeyperIndex) -> Self {
        Self {
            config,
            keyper_index,
            phase: DkgPhase::Empty,
            polynomial: None,
            gammas: BTreeMap::new(),
            evals: BTreeMap::new(),
            published_evals: false,
            voted_public_key: false,
            eon_secret_key_share: None,
            eon_public_key: None,
            confirmed_public_key: None,
            closed_batches: BTreeSet::new(),
            epoch_shares: BTreeMap::new(),
            published_keys: BTreeMap::new(),
            epochs: BTreeMap::new(),
        }
    }

    pub fn eon(&self) -> Eon {
        self.config.eon()
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn phase(&self) -> DkgPhase {
        self.phase
    }

    pub fn epoch_phase(&self, epoch: EpochIndex) -> Option<&EpochPhase> {
        self.epochs.get(&epoch)
    }

    pub fn eon_public_key(&self) -> Option<&EonPublicKey> {
        self.eon_public_key.as_ref()
    }

    pub fn eon_secret_key_share(&self) -> Option<&EonSecretKeyShare> {
        self.eon_secret_key_share.as_ref()
    }

    pub fn epoch_key(&self, epoch: EpochIndex) -> Option<&EpochSecretKey> {
        match self.epochs.get(&epoch)? {
            EpochPhase::EpochKeyReady(key) => Some(key),
            EpochPhase::EpochKeyRequested => None,
        }
    }

    /// Record a consensus chain event of this eon. Replaying an event has
    /// no effect.
    pub fn on_event(&mut self, me: &Address, event: &ShutterEvent, envelope: &dyn EvalEnvelope) {
        let eon = self.eon();

        match event {
            ShutterEvent::PolyCommitment { sender, gammas, .. } => {
                let Some(index) = self.sender_index(sender, "poly commitment") else {
                    return;
                };
                if gammas.threshold() != self.config.threshold {
                    tracing::warn!(
                        eon,
                        %sender,
                        threshold = gammas.threshold(),
                        "ignoring poly commitment with wrong threshold"
                    );
                    return;
                }
                if self.gammas.contains_key(&index) {
                    tracing::debug!(eon, %sender, "ignoring repeated poly commitment");
                    return;
                }
                self.gammas.insert(index, gammas.clone());
            }
            ShutterEvent::PolyEval(event) => self.on_poly_eval(me, event, envelope),
            ShutterEvent::EonPublicKeyVote { sender, .. } => {
                if sender == me {
                    self.voted_public_key = true;
                }
            }
            ShutterEvent::PubkeyGenerated { pubkey, .. } => {
                if self.confirmed_public_key.is_none() {
                    tracing::info!(eon, "eon public key confirmed");
                    self.confirmed_public_key = Some(*pubkey);
                }
            }
            ShutterEvent::BatchClosed { batch_index } => {
                self.closed_batches.insert(*batch_index);
            }
            ShutterEvent::EpochSecretKeyShare {
                epoch,
                sender,
                share,
            } => {
                let Some(index) = self.sender_index(sender, "epoch secret key share") else {
                    return;
                };
                self.epoch_shares
                    .entry(*epoch)
                    .or_default()
                    .entry(index)
                    .or_insert(*share);
            }
            ShutterEvent::PrivkeyGenerated { epoch, privkey } => {
                self.published_keys.entry(*epoch).or_insert(*privkey);
            }
            ShutterEvent::BatchConfig(_) | ShutterEvent::BatchConfigVote { .. } => {}
        }
    }

    fn on_poly_eval(&mut self, me: &Address, event: &PolyEvalEvent, envelope: &dyn EvalEnvelope) {
        let eon = self.eon();
        let Some(index) = self.sender_index(&event.sender, "poly eval") else {
            return;
        };

        if event.sender == *me {
            self.published_evals = true;
            return;
        }

        let Some(position) = event.receivers.iter().position(|receiver| receiver == me) else {
            return;
        };
        if self.evals.contains_key(&index) {
            tracing::debug!(eon, sender = %event.sender, "ignoring repeated poly eval");
            return;
        }

        let Some(sealed) = event.encrypted_evals.get(position) else {
            return;
        };
        match envelope.open(&event.sender, sealed) {
            Ok(eval) => {
                self.evals.insert(index, eval);
            }
            Err(err) => tracing::warn!(
                eon,
                sender = %event.sender,
                "ignoring poly eval that cannot be opened: {err:#}"
            ),
        }
    }

    fn sender_index(&self, sender: &Address, what: &str) -> Option<KeyperIndex> {
        let index = self.config.keyper_index(sender);
        if index.is_none() {
            tracing::warn!(eon = self.eon(), %sender, "ignoring {what} from non-keyper");
        }
        index
    }

    /// Advance the eon phase by at most one step.
    pub fn step<R: RngCore + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Option<Transition>, DecideError> {
        let from = self.phase;
        let advanced = match from {
            DkgPhase::Empty => {
                self.generate_polynomial(rng)?;
                true
            }
            DkgPhase::AwaitingGammas => self.gammas.contains_key(&self.keyper_index),
            DkgPhase::AwaitingShares => self.try_compute_eon_key(),
            DkgPhase::EonKeyReady => false,
        };

        if !advanced {
            return Ok(None);
        }

        let to = match from {
            DkgPhase::Empty => DkgPhase::AwaitingGammas,
            DkgPhase::AwaitingGammas => DkgPhase::AwaitingShares,
            DkgPhase::AwaitingShares | DkgPhase::EonKeyReady => DkgPhase::EonKeyReady,
        };
        self.phase = to;
        tracing::info!(eon = self.eon(), %from, %to, "eon phase changed");

        Ok(Some(Transition::Eon { from, to }))
    }

    fn generate_polynomial<R: RngCore + ?Sized>(&mut self, rng: &mut R) -> Result<(), DecideError> {
        if self.polynomial.is_some() {
            return Ok(());
        }

        let polynomial = Polynomial::random(self.config.threshold, rng).in_eon(self.eon())?;
        self.evals.insert(
            self.keyper_index,
            PolyEval(polynomial.eval_for_keyper(self.keyper_index)),
        );
        self.polynomial = Some(polynomial);

        Ok(())
    }

    fn try_compute_eon_key(&mut self) -> bool {
        let eon = self.eon();
        let num_keypers = self.config.num_keypers();

        if (self.gammas.len() as u64) < num_keypers {
            return false;
        }

        let invalid: Vec<_> = self
            .evals
            .iter()
            .filter(|(sender, eval)| {
                self.gammas
                    .get(sender)
                    .is_some_and(|gammas| !gammas.verify_eval(self.keyper_index, &eval.0))
            })
            .map(|(sender, _)| *sender)
            .collect();
        for sender in invalid {
            tracing::warn!(eon, sender, "dropping poly eval not matching commitment");
            self.evals.remove(&sender);
        }

        if (self.evals.len() as u64) < num_keypers {
            return false;
        }

        let share = EonSecretKeyShare::compute(self.evals.values().map(|eval| &eval.0));
        let pubkey = EonPublicKey::compute(self.gammas.values());

        if self
            .confirmed_public_key
            .is_some_and(|confirmed| confirmed != pubkey)
        {
            tracing::error!(eon, "computed eon public key differs from the confirmed one");
        }

        self.eon_secret_key_share = Some(share);
        self.eon_public_key = Some(pubkey);

        true
    }

    /// Advance every epoch of a ready eon by at most one step.
    pub fn step_epochs(&mut self) -> Result<Vec<Transition>, DecideError> {
        let (Some(share), Some(pubkey)) = (self.eon_secret_key_share, self.eon_public_key) else {
            return Ok(Vec::new());
        };

        let eon = self.eon();
        let mut transitions = Vec::new();

        let requested: Vec<_> = self
            .epochs
            .iter()
            .filter(|(_, phase)| matches!(phase, EpochPhase::EpochKeyRequested))
            .map(|(epoch, _)| *epoch)
            .collect();

        for epoch in requested {
            let epoch_id = EpochId::new(epoch).in_eon(eon)?;
            if let Some(key) = self.try_epoch_key(epoch, &share, &pubkey, &epoch_id) {
                tracing::info!(eon, epoch, "epoch secret key ready");
                self.epochs.insert(epoch, EpochPhase::EpochKeyReady(key));
                transitions.push(Transition::EpochReady(epoch));
            }
        }

        let closed: Vec<_> = self
            .closed_batches
            .iter()
            .filter(|epoch| !self.epochs.contains_key(epoch))
            .copied()
            .collect();

        for epoch in closed {
            tracing::debug!(eon, epoch, "epoch secret key requested");
            self.epochs.insert(epoch, EpochPhase::EpochKeyRequested);
            transitions.push(Transition::EpochRequested(epoch));
        }

        Ok(transitions)
    }

    fn try_epoch_key(
        &mut self,
        epoch: EpochIndex,
        eon_share: &EonSecretKeyShare,
        pubkey: &EonPublicKey,
        epoch_id: &EpochId,
    ) -> Option<EpochSecretKey> {
        let eon = self.eon();

        if let Some(key) = self.published_keys.get(&epoch) {
            if key.verify(pubkey, epoch_id) {
                return Some(*key);
            }
            tracing::warn!(eon, epoch, "ignoring published epoch key that does not verify");
            self.published_keys.remove(&epoch);
        }

        let shares = self.epoch_shares.get_mut(&epoch)?;
        if !shares.contains_key(&self.keyper_index) {
            return None;
        }

        let own_index = self.keyper_index;
        let own_share = EpochSecretKeyShare::compute(eon_share, epoch_id);
        shares.retain(|&index, share| {
            let valid = if index == own_index {
                *share == own_share
            } else {
                share.verify(
                    &EonPublicKeyShare::compute(index, self.gammas.values()),
                    epoch_id,
                )
            };
            if !valid {
                tracing::warn!(eon, epoch, sender = index, "dropping invalid epoch secret key share");
            }
            valid
        });

        let threshold = self.config.threshold;
        if (shares.len() as u64) < threshold {
            return None;
        }

        let (indices, shares): (Vec<_>, Vec<_>) =
            shares.iter().take(threshold as usize).map(|(i, s)| (*i, *s)).unzip();

        match EpochSecretKey::reconstruct(&indices, &shares, threshold, self.config.num_keypers()) {
            Ok(key) if key.verify(pubkey, epoch_id) => Some(key),
            Ok(_) => {
                tracing::error!(eon, epoch, "reconstructed epoch key does not verify");
                None
            }
            Err(err) => {
                tracing::error!(eon, epoch, "failed to reconstruct epoch key: {err}");
                None
            }
        }
    }

    /// Actions this eon needs given what the chains already reflect.
    pub fn needed_actions(
        &self,
        me: &Address,
        main_chain: &MainChainObserver,
    ) -> Result<Vec<Action>, DecideError> {
        let eon = self.eon();
        let mut actions = Vec::new();

        match self.phase {
            DkgPhase::Empty => {}
            DkgPhase::AwaitingGammas => {
                if let Some(polynomial) = &self.polynomial {
                    actions.push(Action::PublishGammas {
                        eon,
                        gammas: polynomial.gammas(),
                    });
                }
            }
            DkgPhase::AwaitingShares | DkgPhase::EonKeyReady => {
                if let Some(action) = self.poly_evals_action() {
                    actions.push(action);
                }
            }
        }

        if self.phase != DkgPhase::EonKeyReady {
            return Ok(actions);
        }

        let (Some(share), Some(pubkey)) = (self.eon_secret_key_share, self.eon_public_key) else {
            return Ok(actions);
        };

        if !self.voted_public_key {
            actions.push(Action::PublishEonPublicKey { eon, pubkey });
        }

        if self.confirmed_public_key == Some(pubkey) && !main_chain.has_broadcast_eon_key(eon, me) {
            actions.push(Action::BroadcastEonKey { eon, pubkey });
        }

        for (&epoch, phase) in &self.epochs {
            match phase {
                EpochPhase::EpochKeyRequested => {
                    let published = self
                        .epoch_shares
                        .get(&epoch)
                        .is_some_and(|shares| shares.contains_key(&self.keyper_index));
                    if !published {
                        let epoch_id = EpochId::new(epoch).in_eon(eon)?;
                        actions.push(Action::PublishEpochSecretKeyShare {
                            eon,
                            epoch,
                            share: EpochSecretKeyShare::compute(&share, &epoch_id),
                        });
                    }
                }
                EpochPhase::EpochKeyReady(key) => {
                    let leader = self.config.leader(epoch) == Some(me);
                    if leader && main_chain.num_executed_batches() == epoch {
                        actions.push(Action::ExecuteCipherBatch {
                            eon,
                            epoch,
                            key: *key,
                        });
                    }
                }
            }
        }

        Ok(actions)
    }

    fn poly_evals_action(&self) -> Option<Action> {
        if self.published_evals || self.config.num_keypers() < 2 {
            return None;
        }
        let polynomial = self.polynomial.as_ref()?;

        let evals = self
            .config
            .keypers
            .iter()
            .enumerate()
            .filter(|(index, _)| *index as KeyperIndex != self.keyper_index)
            .map(|(index, keyper)| {
                (
                    *keyper,
                    PolyEval(polynomial.eval_for_keyper(index as KeyperIndex)),
                )
            })
            .collect();

        Some(Action::SendPolyEvals {
            eon: self.eon(),
            evals,
        })
    }

    /// One line summary for status logs.
    pub fn short_info(&self) -> String {
        let ready = self
            .epochs
            .values()
            .filter(|phase| matches!(phase, EpochPhase::EpochKeyReady(_)))
            .count();

        format!(
            "eon {} {} (gammas {}/{n}, evals {}/{n}, epochs {ready}/{})",
            self.eon(),
            self.phase,
            self.gammas.len(),
            self.evals.len(),
            self.epochs.len(),
            n = self.config.num_keypers(),
        )
    }
}
