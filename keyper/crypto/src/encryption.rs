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

//! Threshold encryption of messages under an eon public key.
//!
//! A message is padded to whole blocks and masked with a keystream derived
//! from a fresh random sigma. Sigma itself is hidden behind
//! `e(epoch_id, eon_public_key) * r`, which only the epoch secret key can
//! recompute. `r` is derived from sigma and the message, so decryption can
//! check that the commitment was built honestly.

use crate::{
    error::{CryptoError, Result},
    keys::{EonPublicKey, EpochId, EpochSecretKey},
    primitives::{G2, g2_generator, hash_gt, hash_to_block, hash_to_scalar, impl_wire_codec, pairing},
};
use parity_scale_codec::{Decode, Encode};
use rand::RngCore;

pub const BLOCK_SIZE: usize = 32;

pub type Block = [u8; BLOCK_SIZE];

const SIGMA_DOMAIN: &[u8] = b"keyper/sigma";
const R_DOMAIN: &[u8] = b"keyper/r";
const BLOCK_DOMAIN: &[u8] = b"keyper/block";

/// Random blinding value of one encryption.
///
/// Not `Clone`: [`encrypt`] consumes it, so a sigma cannot be used twice.
#[derive(derive_more::Debug)]
#[debug("Sigma(..)")]
pub struct Sigma(Block);

impl Sigma {
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Result<Self> {
        let mut block = [0u8; BLOCK_SIZE];
        rng.try_fill_bytes(&mut block)?;
        Ok(Self(block))
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(block: Block) -> Self {
        Self(block)
    }
}

/// Commitment `G2 * r` carried by every ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlindingCommitment(G2);

impl_wire_codec!(BlindingCommitment, G2);

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct EncryptedMessage {
    pub epoch_id: EpochId,
    pub commitment: BlindingCommitment,
    pub masked_sigma: Block,
    pub blocks: Vec<Block>,
}

/// Pad `message` to a positive number of blocks.
///
/// The pad value is the number of padding bytes, so a message that already
/// fills its last block gets one extra block of `32`s.
pub fn pad_message(message: &[u8]) -> Vec<Block> {
    let pad = BLOCK_SIZE - message.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(message.len() + pad);
    padded.extend_from_slice(message);
    padded.resize(message.len() + pad, pad as u8);

    padded
        .chunks_exact(BLOCK_SIZE)
        .map(|chunk| {
            let mut block = [0u8; BLOCK_SIZE];
            block.copy_from_slice(chunk);
            block
        })
        .collect()
}

pub fn unpad_message(blocks: &[Block]) -> Result<Vec<u8>> {
    let last = blocks.last().ok_or(CryptoError::InvalidPadding)?;
    let pad = last[BLOCK_SIZE - 1] as usize;

    if pad == 0 || pad > BLOCK_SIZE {
        return Err(CryptoError::InvalidPadding);
    }
    if last[BLOCK_SIZE - pad..].iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::InvalidPadding);
    }

    let mut message = blocks.concat();
    message.truncate(message.len() - pad);
    Ok(message)
}

fn compute_r(sigma: &Block, blocks: &[Block]) -> crate::primitives::Scalar {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(blocks.len() + 1);
    parts.push(&sigma[..]);
    parts.extend(blocks.iter().map(|block| &block[..]));
    hash_to_scalar(R_DOMAIN, &parts)
}

fn block_key(sigma: &Block, index: usize) -> Block {
    hash_to_block(BLOCK_DOMAIN, &[&sigma[..], &(index as u64).to_be_bytes()[..]])
}

fn xor(lhs: &Block, rhs: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    for (o, (l, r)) in out.iter_mut().zip(lhs.iter().zip(rhs)) {
        *o = l ^ r;
    }
    out
}

/// Encrypt `message` for the epoch identified by `epoch_id`.
pub fn encrypt(
    message: &[u8],
    eon_public_key: &EonPublicKey,
    epoch_id: &EpochId,
    sigma: Sigma,
) -> Result<EncryptedMessage> {
    let Sigma(sigma) = sigma;
    let padded = pad_message(message);
    let r = compute_r(&sigma, &padded);

    let shared = pairing(epoch_id.point(), eon_public_key.point()) * r;
    let masked_sigma = xor(&sigma, &hash_gt(SIGMA_DOMAIN, &shared)?);

    let blocks = padded
        .iter()
        .enumerate()
        .map(|(i, block)| xor(block, &block_key(&sigma, i)))
        .collect();

    Ok(EncryptedMessage {
        epoch_id: *epoch_id,
        commitment: BlindingCommitment(g2_generator() * r),
        masked_sigma,
        blocks,
    })
}

/// Encrypt with a sigma drawn from `rng`.
pub fn encrypt_with_rng<R: RngCore + ?Sized>(
    message: &[u8],
    eon_public_key: &EonPublicKey,
    epoch_id: &EpochId,
    rng: &mut R,
) -> Result<EncryptedMessage> {
    encrypt(message, eon_public_key, epoch_id, Sigma::random(rng)?)
}

impl EncryptedMessage {
    pub fn decrypt(&self, key: &EpochSecretKey) -> Result<Vec<u8>> {
        let shared = pairing(&key.0, &self.commitment.0);
        let sigma = xor(&self.masked_sigma, &hash_gt(SIGMA_DOMAIN, &shared)?);

        let padded: Vec<Block> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, block)| xor(block, &block_key(&sigma, i)))
            .collect();

        let r = compute_r(&sigma, &padded);
        if g2_generator() * r != self.commitment.0 {
            return Err(CryptoError::DecryptionFailed);
        }

        unpad_message(&padded)
    }
}
