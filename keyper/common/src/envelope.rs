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

//! Point to point protection of polynomial evaluations.

use crate::Address;
use anyhow::Result;
use keyper_crypto::PolyEval;

/// Seals an evaluation so that only its receiver can open it.
///
/// Implementations must authenticate the sender: `open` fails for
/// evaluations not sealed by `sender` for us.
pub trait EvalEnvelope: Send + Sync {
    fn seal(&self, receiver: &Address, eval: &PolyEval) -> Result<Vec<u8>>;

    fn open(&self, sender: &Address, sealed: &[u8]) -> Result<PolyEval>;
}
