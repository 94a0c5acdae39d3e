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

use keyper_common::crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecideError {
    #[error("eon {eon}: {source}")]
    Crypto { eon: u64, source: CryptoError },
}

pub(crate) trait CryptoResultExt<T> {
    fn in_eon(self, eon: u64) -> Result<T, DecideError>;
}

impl<T> CryptoResultExt<T> for Result<T, CryptoError> {
    fn in_eon(self, eon: u64) -> Result<T, DecideError> {
        self.map_err(|source| DecideError::Crypto { eon, source })
    }
}
