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

//! Messages a keyper submits to the consensus chain.
//!
//! The sender is not part of the message: the transport signs it and the
//! chain attributes the resulting event to the signer.

use crate::{Address, BatchConfig, Eon, EpochIndex};
use keyper_crypto::{EonPublicKey, EpochSecretKeyShare, Gammas};
use parity_scale_codec::{Decode, Encode};

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum KeyperMessage {
    /// Vote for adopting a config scheduled on the main chain.
    BatchConfigVote(BatchConfig),
    PolyCommitment {
        eon: Eon,
        gammas: Gammas,
    },
    /// Sealed evaluations, one per receiver.
    PolyEval {
        eon: Eon,
        receivers: Vec<Address>,
        encrypted_evals: Vec<Vec<u8>>,
    },
    EonPublicKeyVote {
        eon: Eon,
        pubkey: EonPublicKey,
    },
    EpochSecretKeyShare {
        epoch: EpochIndex,
        share: EpochSecretKeyShare,
    },
}

impl KeyperMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchConfigVote(_) => "batch-config-vote",
            Self::PolyCommitment { .. } => "poly-commitment",
            Self::PolyEval { .. } => "poly-eval",
            Self::EonPublicKeyVote { .. } => "eon-public-key-vote",
            Self::EpochSecretKeyShare { .. } => "epoch-secret-key-share",
        }
    }
}
