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

//! Secret polynomials and their public commitments.

use crate::{
    error::{CryptoError, Result},
    primitives::{G2, KeyperIndex, Scalar, g2_generator, impl_wire_codec, keyper_x, random_scalar},
};
use ark_ff::{One, Zero};
use rand::RngCore;

/// Polynomial of degree `threshold - 1` held by exactly one keyper.
///
/// Only evaluations and [`Gammas`] ever leave the keyper.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
#[debug("Polynomial(degree {})", _0.len().saturating_sub(1))]
pub struct Polynomial(Vec<Scalar>);

impl_wire_codec!(Polynomial, Vec<Scalar>);

impl Polynomial {
    /// Generate a polynomial with `threshold` uniformly random coefficients.
    pub fn random<R: RngCore + ?Sized>(threshold: u64, rng: &mut R) -> Result<Self> {
        if threshold == 0 {
            return Err(CryptoError::InvalidThreshold {
                threshold,
                num_keypers: 0,
            });
        }

        let coefficients = (0..threshold)
            .map(|_| random_scalar(rng))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self(coefficients))
    }

    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Result<Self> {
        if coefficients.is_empty() {
            return Err(CryptoError::InvalidThreshold {
                threshold: 0,
                num_keypers: 0,
            });
        }
        Ok(Self(coefficients))
    }

    pub fn degree(&self) -> u64 {
        self.threshold().saturating_sub(1)
    }

    pub fn threshold(&self) -> u64 {
        self.0.len() as u64
    }

    /// Constant term, the contribution of this polynomial to the eon secret.
    pub fn secret(&self) -> Scalar {
        self.0.first().copied().unwrap_or_default()
    }

    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        self.0
            .iter()
            .rev()
            .fold(Scalar::zero(), |acc, coefficient| acc * x + coefficient)
    }

    /// Evaluation sent to the keyper at `index`.
    pub fn eval_for_keyper(&self, index: KeyperIndex) -> Scalar {
        self.evaluate(&keyper_x(index))
    }

    pub fn gammas(&self) -> Gammas {
        Gammas(self.0.iter().map(|a| g2_generator() * a).collect())
    }
}

/// Evaluation of a polynomial at a receiver's point, as sent over the wire.
#[derive(Clone, Copy, PartialEq, Eq, derive_more::Debug, derive_more::From)]
#[debug("PolyEval(..)")]
pub struct PolyEval(pub Scalar);

impl_wire_codec!(PolyEval, Scalar);

/// Public commitments `[G2 * a_0, .., G2 * a_{t-1}]` of one keyper's polynomial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gammas(Vec<G2>);

impl_wire_codec!(Gammas, Vec<G2>);

impl Gammas {
    pub fn new(points: Vec<G2>) -> Self {
        Self(points)
    }

    pub fn threshold(&self) -> u64 {
        self.0.len() as u64
    }

    pub fn points(&self) -> &[G2] {
        &self.0
    }

    /// Commitment to the constant term.
    pub fn constant(&self) -> G2 {
        self.0.first().copied().unwrap_or_else(G2::zero)
    }

    /// `G2 * p(x)` computed from the commitments alone.
    pub fn evaluate(&self, x: &Scalar) -> G2 {
        let mut power = Scalar::one();
        let mut acc = G2::zero();
        for gamma in &self.0 {
            acc += *gamma * power;
            power *= x;
        }
        acc
    }

    /// Check a received evaluation against the sender's commitments.
    pub fn verify_eval(&self, index: KeyperIndex, eval: &Scalar) -> bool {
        g2_generator() * eval == self.evaluate(&keyper_x(index))
    }
}
