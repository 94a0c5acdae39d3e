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

//! Keyper decision engine.
//!
//! [`Decider::decide`] is a pure step from the observed chain state and the
//! persisted [`KeyperState`] to the list of [`Action`]s still to be taken.
//! It performs no I/O: the caller executes the actions, records the outcome
//! in the [`Outbox`] and persists the state.

mod action;
mod decider;
pub mod dkg;
mod error;
pub mod outbox;

#[cfg(test)]
mod tests;

pub use action::{Action, ActionId, ActionKind};
pub use decider::{Decider, KeyperState};
pub use dkg::{DkgPhase, EonDkg, EpochPhase, Transition};
pub use error::DecideError;
pub use outbox::{ChainHeights, Outbox, OutboxEntry, OutboxStatus};
