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

//! Field and group primitives over BLS12-381.

use crate::error::Result;
use ark_bls12_381::{Bls12_381, G1Projective, G2Projective};
use ark_ec::{
    CurveGroup, Group,
    pairing::{Pairing, PairingOutput},
};
use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use rand::RngCore;
use sha2::{Digest, Sha256};

pub type Scalar = ark_bls12_381::Fr;
pub type G1 = G1Projective;
pub type G2 = G2Projective;
pub type Gt = PairingOutput<Bls12_381>;

/// Index of a keyper inside the keyper set of an eon.
pub type KeyperIndex = u64;

/// SCALE wrapper that writes compressed points and validates on read.
pub(crate) type WireScale<T> = ark_scale::ArkScale<T, { ark_scale::WIRE }>;

macro_rules! impl_wire_codec {
    ($name:ident, $inner:ty) => {
        impl parity_scale_codec::Encode for $name {
            fn encode_to<O: parity_scale_codec::Output + ?Sized>(&self, dest: &mut O) {
                let wire = $crate::primitives::WireScale::<$inner>::from(self.0.clone());
                parity_scale_codec::Encode::encode_to(&wire, dest)
            }
        }

        impl parity_scale_codec::Decode for $name {
            fn decode<I: parity_scale_codec::Input>(
                input: &mut I,
            ) -> core::result::Result<Self, parity_scale_codec::Error> {
                <$crate::primitives::WireScale<$inner> as parity_scale_codec::Decode>::decode(input)
                    .map(|value| Self(value.0))
            }
        }
    };
}

pub(crate) use impl_wire_codec;

/// Evaluation point of a keyper. Index 0 maps to 1 so that no keyper ever
/// sits at the secret.
pub fn keyper_x(index: KeyperIndex) -> Scalar {
    Scalar::from(index) + Scalar::from(1u64)
}

pub fn g1_generator() -> G1 {
    G1::generator()
}

pub fn g2_generator() -> G2 {
    G2::generator()
}

pub fn pairing(p: &G1, q: &G2) -> Gt {
    Bls12_381::pairing(p.into_affine(), q.into_affine())
}

/// Draws a uniformly distributed scalar, failing only if the source does.
pub fn random_scalar<R: RngCore + ?Sized>(rng: &mut R) -> Result<Scalar> {
    let mut bytes = [0u8; 64];
    rng.try_fill_bytes(&mut bytes)?;
    Ok(Scalar::from_le_bytes_mod_order(&bytes))
}

pub(crate) fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    Scalar::from_be_bytes_mod_order(&hasher.finalize())
}

pub(crate) fn hash_to_block(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

pub(crate) fn hash_gt(domain: &[u8], value: &Gt) -> Result<[u8; 32]> {
    let mut bytes = Vec::with_capacity(value.compressed_size());
    value.serialize_compressed(&mut bytes)?;
    Ok(hash_to_block(domain, &[&bytes]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::Zero;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn keyper_x_skips_zero() {
        assert_eq!(keyper_x(0), Scalar::from(1u64));
        assert_eq!(keyper_x(4), Scalar::from(5u64));
        assert!(!keyper_x(0).is_zero());
    }

    #[test]
    fn pairing_is_bilinear() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_scalar(&mut rng).expect("rng works");
        let b = random_scalar(&mut rng).expect("rng works");

        let lhs = pairing(&(g1_generator() * a), &(g2_generator() * b));
        let rhs = pairing(&g1_generator(), &g2_generator()) * (a * b);
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn hash_to_scalar_separates_domains() {
        let first = hash_to_scalar(b"one", &[&b"data"[..]]);
        let second = hash_to_scalar(b"two", &[&b"data"[..]]);
        assert_ne!(first, second);
        assert_eq!(first, hash_to_scalar(b"one", &[&b"da"[..], &b"ta"[..]]));
    }
}
