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

//! Side effects decided by the keyper.

use keyper_common::{
    Address, BatchConfig, Eon, EpochIndex,
    crypto::{EonPublicKey, EpochSecretKey, EpochSecretKeyShare, Gammas, PolyEval},
};
use parity_scale_codec::{Decode, Encode};

/// Kind of an action. Declaration order is the execution order of actions
/// sharing an eon and epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, derive_more::Display,
)]
pub enum ActionKind {
    #[display("vote-batch-config")]
    VoteBatchConfig,
    #[display("publish-gammas")]
    PublishGammas,
    #[display("send-poly-evals")]
    SendPolyEvals,
    #[display("publish-eon-public-key")]
    PublishEonPublicKey,
    #[display("broadcast-eon-key")]
    BroadcastEonKey,
    #[display("publish-epoch-secret-key-share")]
    PublishEpochSecretKeyShare,
    #[display("execute-cipher-batch")]
    ExecuteCipherBatch,
}

impl ActionKind {
    /// Whether the action is a main chain transaction rather than a
    /// consensus chain message.
    pub fn is_main_chain(&self) -> bool {
        matches!(self, Self::BroadcastEonKey | Self::ExecuteCipherBatch)
    }
}

/// Identity of an action across decision cycles.
///
/// Field order gives the `(eon, epoch, kind)` ordering of decided actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct ActionId {
    pub eon: Eon,
    pub epoch: Option<EpochIndex>,
    pub kind: ActionKind,
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.epoch {
            Some(epoch) => write!(f, "{} (eon {}, epoch {epoch})", self.kind, self.eon),
            None => write!(f, "{} (eon {})", self.kind, self.eon),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Vote on the consensus chain for a config scheduled on the main chain.
    VoteBatchConfig(BatchConfig),
    /// Publish the commitment to our eon polynomial.
    PublishGammas { eon: Eon, gammas: Gammas },
    /// Send our polynomial evaluations to the other keypers, unsealed.
    SendPolyEvals {
        eon: Eon,
        evals: Vec<(Address, PolyEval)>,
    },
    /// Vote for the eon public key we computed.
    PublishEonPublicKey { eon: Eon, pubkey: EonPublicKey },
    /// Broadcast the agreed eon public key to the key broadcast contract.
    BroadcastEonKey { eon: Eon, pubkey: EonPublicKey },
    PublishEpochSecretKeyShare {
        eon: Eon,
        epoch: EpochIndex,
        share: EpochSecretKeyShare,
    },
    /// Hand the decryption key of a closed batch to the executor contract.
    ExecuteCipherBatch {
        eon: Eon,
        epoch: EpochIndex,
        key: EpochSecretKey,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::VoteBatchConfig(_) => ActionKind::VoteBatchConfig,
            Self::PublishGammas { .. } => ActionKind::PublishGammas,
            Self::SendPolyEvals { .. } => ActionKind::SendPolyEvals,
            Self::PublishEonPublicKey { .. } => ActionKind::PublishEonPublicKey,
            Self::BroadcastEonKey { .. } => ActionKind::BroadcastEonKey,
            Self::PublishEpochSecretKeyShare { .. } => ActionKind::PublishEpochSecretKeyShare,
            Self::ExecuteCipherBatch { .. } => ActionKind::ExecuteCipherBatch,
        }
    }

    pub fn id(&self) -> ActionId {
        let (eon, epoch) = match self {
            Self::VoteBatchConfig(config) => (config.eon(), None),
            Self::PublishGammas { eon, .. }
            | Self::SendPolyEvals { eon, .. }
            | Self::PublishEonPublicKey { eon, .. }
            | Self::BroadcastEonKey { eon, .. } => (*eon, None),
            Self::PublishEpochSecretKeyShare { eon, epoch, .. }
            | Self::ExecuteCipherBatch { eon, epoch, .. } => (*eon, Some(*epoch)),
        };

        ActionId {
            eon,
            epoch,
            kind: self.kind(),
        }
    }
}
