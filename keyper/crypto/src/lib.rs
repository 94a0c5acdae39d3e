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

//! Keyper threshold cryptography.
//!
//! Shamir style sharing over the BLS12-381 scalar field, distributed eon key
//! generation with Feldman commitments, per-epoch keys and the threshold
//! encryption scheme used for batched transactions.

pub mod encryption;
pub mod error;
pub mod keys;
pub mod polynomial;
pub mod primitives;

pub use encryption::{
    BLOCK_SIZE, Block, EncryptedMessage, Sigma, encrypt, encrypt_with_rng, pad_message,
    unpad_message,
};
pub use error::{CryptoError, Result, ShareRejection};
pub use keys::{
    EonPublicKey, EonPublicKeyShare, EonSecretKeyShare, EpochId, EpochSecretKey,
    EpochSecretKeyShare, lagrange_coefficient,
};
pub use polynomial::{Gammas, PolyEval, Polynomial};
pub use primitives::{KeyperIndex, Scalar, keyper_x, random_scalar};
