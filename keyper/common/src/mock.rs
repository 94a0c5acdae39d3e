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

use crate::{Address, BatchConfig, EvalEnvelope};
use anyhow::{Result, anyhow, ensure};
use keyper_crypto::PolyEval;
use parity_scale_codec::{Decode, Encode};

/// Envelope that tags evaluations with sender and receiver without
/// encrypting them.
#[derive(Debug, Clone, Copy)]
pub struct PlainEnvelope {
    pub owner: Address,
}

impl PlainEnvelope {
    pub fn new(owner: Address) -> Self {
        Self { owner }
    }
}

impl EvalEnvelope for PlainEnvelope {
    fn seal(&self, receiver: &Address, eval: &PolyEval) -> Result<Vec<u8>> {
        Ok((self.owner, *receiver, *eval).encode())
    }

    fn open(&self, sender: &Address, sealed: &[u8]) -> Result<PolyEval> {
        let (from, to, eval) = <(Address, Address, PolyEval)>::decode(&mut &sealed[..])
            .map_err(|err| anyhow!("malformed sealed evaluation: {err}"))?;
        ensure!(from == *sender, "evaluation sealed by {from}, expected {sender}");
        ensure!(to == self.owner, "evaluation sealed for {to}");
        Ok(eval)
    }
}

pub fn batch_config(start_batch_index: u64, threshold: u64, keypers: &[u64]) -> BatchConfig {
    BatchConfig {
        start_batch_index,
        threshold,
        keypers: keypers.iter().copied().map(Address::from).collect(),
    }
}
