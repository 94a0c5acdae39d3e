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

use thiserror::Error;

pub type Result<T, E = CryptoError> = std::result::Result<T, E>;

/// Reason a single share was rejected during reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareRejection {
    Duplicate,
    OutOfRange,
    LengthMismatch,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("insufficient shares: got {got}, need {threshold}")]
    InsufficientShares { got: usize, threshold: u64 },
    #[error("invalid share at keyper index {index}: {reason:?}")]
    InvalidShare { index: u64, reason: ShareRejection },
    #[error("invalid padding")]
    InvalidPadding,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid threshold {threshold} for {num_keypers} keypers")]
    InvalidThreshold { threshold: u64, num_keypers: u64 },
    #[error("randomness source failed: {0}")]
    Randomness(String),
    #[error("hash to curve failed: {0}")]
    HashToCurve(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl From<rand::Error> for CryptoError {
    fn from(err: rand::Error) -> Self {
        Self::Randomness(err.to_string())
    }
}

impl From<ark_serialize::SerializationError> for CryptoError {
    fn from(err: ark_serialize::SerializationError) -> Self {
        Self::Serialization(err.to_string())
    }
}
