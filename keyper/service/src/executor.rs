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

//! Sequential execution of decided actions.

use crate::transport::{ContractCaller, MessageSender, TxBatch};
use anyhow::{Context, Result};
use keyper_common::{ContractAddresses, ContractCall, EvalEnvelope, KeyperMessage};
use keyper_decider::{Action, ActionId, ChainHeights, Outbox};
use thiserror::Error;

/// An action kept failing and the keyper cannot make progress.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("action {id} failed {attempts} times, last error: {error}")]
pub struct ActionExecutionError {
    pub id: ActionId,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub id: ActionId,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: usize,
    /// First failing action. Actions after it were not attempted.
    pub failure: Option<ActionFailure>,
}

enum Effect {
    Message(KeyperMessage),
    Call(ContractCall),
}

pub struct Executor<'a> {
    envelope: &'a dyn EvalEnvelope,
    messages: &'a dyn MessageSender,
    caller: &'a dyn ContractCaller,
    contracts: &'a ContractAddresses,
}

impl<'a> Executor<'a> {
    pub fn new(
        envelope: &'a dyn EvalEnvelope,
        messages: &'a dyn MessageSender,
        caller: &'a dyn ContractCaller,
        contracts: &'a ContractAddresses,
    ) -> Self {
        Self {
            envelope,
            messages,
            caller,
            contracts,
        }
    }

    /// Execute `actions` in order, recording each outcome in `outbox`.
    /// Stops at the first failure.
    pub async fn execute(
        &self,
        actions: Vec<Action>,
        outbox: &mut Outbox,
        heights: ChainHeights,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let mut batch = TxBatch::new(self.caller, self.contracts);

        for action in actions {
            let id = action.id();
            match self.execute_one(action, &mut batch).await {
                Ok(()) => {
                    tracing::info!(%id, "action executed");
                    outbox.mark_sent(id, heights);
                    report.executed += 1;
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    let attempts = outbox.mark_failed(id, error.clone());
                    tracing::warn!(%id, attempts, "action failed: {error}");
                    report.failure = Some(ActionFailure {
                        id,
                        attempts,
                        error,
                    });
                    break;
                }
            }
        }

        if !batch.is_empty() {
            // unmined transactions are resent once their window passes
            if let Err(err) = batch.wait_mined().await {
                tracing::warn!("{err:#}");
            }
        }

        report
    }

    async fn execute_one(&self, action: Action, batch: &mut TxBatch<'_>) -> Result<()> {
        match self.effect(action)? {
            Effect::Message(message) => {
                let name = message.name();
                self.messages
                    .submit(message)
                    .await
                    .with_context(|| format!("failed to submit {name} message"))
            }
            Effect::Call(call) => batch.send(call).await.map(|_| ()),
        }
    }

    fn effect(&self, action: Action) -> Result<Effect> {
        let effect = match action {
            Action::VoteBatchConfig(config) => {
                Effect::Message(KeyperMessage::BatchConfigVote(config))
            }
            Action::PublishGammas { eon, gammas } => {
                Effect::Message(KeyperMessage::PolyCommitment { eon, gammas })
            }
            Action::SendPolyEvals { eon, evals } => {
                let (receivers, encrypted_evals) = evals
                    .iter()
                    .map(|(receiver, eval)| {
                        let sealed = self
                            .envelope
                            .seal(receiver, eval)
                            .with_context(|| format!("failed to seal evaluation for {receiver}"))?;
                        Ok::<_, anyhow::Error>((*receiver, sealed))
                    })
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .unzip();

                Effect::Message(KeyperMessage::PolyEval {
                    eon,
                    receivers,
                    encrypted_evals,
                })
            }
            Action::PublishEonPublicKey { eon, pubkey } => {
                Effect::Message(KeyperMessage::EonPublicKeyVote { eon, pubkey })
            }
            Action::PublishEpochSecretKeyShare { epoch, share, .. } => {
                Effect::Message(KeyperMessage::EpochSecretKeyShare { epoch, share })
            }
            Action::BroadcastEonKey { eon, pubkey } => {
                Effect::Call(ContractCall::BroadcastEonKey { eon, key: pubkey })
            }
            Action::ExecuteCipherBatch { epoch, key, .. } => {
                Effect::Call(ContractCall::ExecuteCipherBatch {
                    batch_index: epoch,
                    decryption_key: key,
                })
            }
        };

        Ok(effect)
    }
}
