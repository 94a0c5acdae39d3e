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

//! Eon and epoch keys and threshold reconstruction.

use crate::{
    error::{CryptoError, Result, ShareRejection},
    polynomial::Gammas,
    primitives::{
        G1, G2, KeyperIndex, Scalar, g2_generator, impl_wire_codec, keyper_x, pairing,
    },
};
use ark_bls12_381::g1;
use ark_ec::hashing::{HashToCurve, curve_maps::wb, map_to_curve_hasher::MapToCurveBasedHasher};
use ark_ff::{Field, One, Zero, fields::field_hashers::DefaultFieldHasher};
use std::collections::BTreeSet;

type WBMap = wb::WBMap<g1::Config>;

/// Domain separation tag for epoch identifiers.
pub const EPOCH_ID_DST: &[u8] = b"KEYPER-EPOCH-ID-BLS12381G1_XMD:SHA-256_SSWU_RO_";

/// Public key of an eon, in G2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EonPublicKey(pub(crate) G2);

impl_wire_codec!(EonPublicKey, G2);

impl EonPublicKey {
    /// Sum of the constant term commitments of every contributing keyper.
    pub fn compute<'a>(gammas: impl IntoIterator<Item = &'a Gammas>) -> Self {
        Self(gammas.into_iter().map(Gammas::constant).sum())
    }

    pub fn point(&self) -> &G2 {
        &self.0
    }
}

/// Public counterpart of one keyper's eon secret key share.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EonPublicKeyShare(G2);

impl_wire_codec!(EonPublicKeyShare, G2);

impl EonPublicKeyShare {
    pub fn compute<'a>(index: KeyperIndex, gammas: impl IntoIterator<Item = &'a Gammas>) -> Self {
        let x = keyper_x(index);
        Self(gammas.into_iter().map(|g| g.evaluate(&x)).sum())
    }
}

/// A keyper's share of the eon secret. Never leaves the keyper except
/// inside its own snapshot.
#[derive(Clone, Copy, PartialEq, Eq, derive_more::Debug)]
#[debug("EonSecretKeyShare(..)")]
pub struct EonSecretKeyShare(Scalar);

impl_wire_codec!(EonSecretKeyShare, Scalar);

impl EonSecretKeyShare {
    /// Sum of the evaluations received from every keyper at our index.
    pub fn compute<'a>(evals: impl IntoIterator<Item = &'a Scalar>) -> Self {
        Self(evals.into_iter().sum())
    }

    pub fn public_share(&self) -> EonPublicKeyShare {
        EonPublicKeyShare(g2_generator() * self.0)
    }
}

/// Deterministic group element identifying an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochId(G1);

impl_wire_codec!(EpochId, G1);

impl EpochId {
    pub fn new(epoch_index: u64) -> Result<Self> {
        let hasher =
            MapToCurveBasedHasher::<G1, DefaultFieldHasher<sha2::Sha256>, WBMap>::new(EPOCH_ID_DST)
                .map_err(|err| CryptoError::HashToCurve(format!("{err:?}")))?;
        let point = hasher
            .hash(&epoch_index.to_be_bytes())
            .map_err(|err| CryptoError::HashToCurve(format!("{err:?}")))?;

        Ok(Self(point.into()))
    }

    pub fn point(&self) -> &G1 {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochSecretKeyShare(G1);

impl_wire_codec!(EpochSecretKeyShare, G1);

impl EpochSecretKeyShare {
    pub fn compute(eon_share: &EonSecretKeyShare, epoch_id: &EpochId) -> Self {
        Self(epoch_id.0 * eon_share.0)
    }

    /// `e(share, G2) == e(epoch_id, eon_public_key_share)`
    pub fn verify(&self, public_share: &EonPublicKeyShare, epoch_id: &EpochId) -> bool {
        pairing(&self.0, &g2_generator()) == pairing(&epoch_id.0, &public_share.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EpochSecretKey(pub(crate) G1);

impl_wire_codec!(EpochSecretKey, G1);

impl EpochSecretKey {
    /// Lagrange interpolation at zero over the shares of `indices`.
    ///
    /// Index checks come first, so a single malformed entry is reported as
    /// [`CryptoError::InvalidShare`] even when too few shares are given.
    pub fn reconstruct(
        indices: &[KeyperIndex],
        shares: &[EpochSecretKeyShare],
        threshold: u64,
        num_keypers: u64,
    ) -> Result<Self> {
        if threshold == 0 || threshold > num_keypers {
            return Err(CryptoError::InvalidThreshold {
                threshold,
                num_keypers,
            });
        }

        if indices.len() != shares.len() {
            return Err(CryptoError::InvalidShare {
                index: indices.len().min(shares.len()) as u64,
                reason: ShareRejection::LengthMismatch,
            });
        }

        let mut seen = BTreeSet::new();
        for &index in indices {
            if index >= num_keypers {
                return Err(CryptoError::InvalidShare {
                    index,
                    reason: ShareRejection::OutOfRange,
                });
            }
            if !seen.insert(index) {
                return Err(CryptoError::InvalidShare {
                    index,
                    reason: ShareRejection::Duplicate,
                });
            }
        }

        if (indices.len() as u64) < threshold {
            return Err(CryptoError::InsufficientShares {
                got: indices.len(),
                threshold,
            });
        }

        let mut key = G1::zero();
        for (&index, share) in indices.iter().zip(shares) {
            key += share.0 * lagrange_coefficient(index, indices)?;
        }

        Ok(Self(key))
    }

    /// `e(key, G2) == e(epoch_id, eon_public_key)`
    pub fn verify(&self, eon_public_key: &EonPublicKey, epoch_id: &EpochId) -> bool {
        pairing(&self.0, &g2_generator()) == pairing(&epoch_id.0, &eon_public_key.0)
    }
}

/// Lagrange basis polynomial of `index` over `indices`, evaluated at zero.
pub fn lagrange_coefficient(index: KeyperIndex, indices: &[KeyperIndex]) -> Result<Scalar> {
    let xi = keyper_x(index);
    let mut numerator = Scalar::one();
    let mut denominator = Scalar::one();

    for &other in indices.iter().filter(|&&other| other != index) {
        let xj = keyper_x(other);
        numerator *= xj;
        denominator *= xj - xi;
    }

    let inverse = denominator.inverse().ok_or(CryptoError::InvalidShare {
        index,
        reason: ShareRejection::Duplicate,
    })?;

    Ok(numerator * inverse)
}
