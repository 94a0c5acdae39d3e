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

//! Keyper chain observers.
//!
//! Each observer is a plain value holding everything the keyper learned from
//! one chain up to its observed height. Synchronization is split into a
//! fallible fetch that only reads from the chain and an infallible apply, so
//! a failed or cancelled sync leaves the observer untouched.

use anyhow::Result;
use async_trait::async_trait;
use keyper_common::{MainChainLog, RawEvent};
use thiserror::Error;

mod main_chain;
mod shutter;

#[cfg(any(feature = "mock", test))]
pub mod mock;


pub use main_chain::{MainChainObserver, MainChainUpdate};
pub use shutter::{ObservedEvent, ShutterObserver, ShutterUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Chain {
    #[display("consensus chain")]
    Shutter,
    #[display("main chain")]
    MainChain,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("{chain}: failed to query head: {reason}")]
    Head { chain: Chain, reason: String },
    #[error("{chain}: failed to fetch blocks {from}..={to}: {reason}")]
    Fetch {
        chain: Chain,
        from: u64,
        to: u64,
        reason: String,
    },
    #[error("{chain}: head {reported} is behind observed height {observed}")]
    HeightRegressed {
        chain: Chain,
        observed: u64,
        reported: u64,
    },
    #[error("{chain}: event at height {height} outside of requested blocks {from}..={to}")]
    OutOfRange {
        chain: Chain,
        height: u64,
        from: u64,
        to: u64,
    },
}

/// Read access to the consensus chain.
#[async_trait]
pub trait ShutterClient: Send + Sync {
    async fn latest_height(&self) -> Result<u64>;

    /// Events of blocks `from..=to` with their block heights, in block order.
    async fn events(&self, from: u64, to: u64) -> Result<Vec<(u64, RawEvent)>>;
}

/// Read access to the main chain contracts.
#[async_trait]
pub trait MainChainClient: Send + Sync {
    async fn latest_block(&self) -> Result<u64>;

    /// Decoded logs of the keyper contracts in blocks `from..=to`.
    async fn logs(&self, from: u64, to: u64) -> Result<Vec<MainChainLog>>;
}

/// First block to fetch after `observed` and whether there is anything new
/// up to `head`.
fn next_range(chain: Chain, observed: Option<u64>, head: u64) -> Result<Option<u64>, SyncError> {
    match observed {
        Some(observed) if head < observed => Err(SyncError::HeightRegressed {
            chain,
            observed,
            reported: head,
        }),
        Some(observed) if head == observed => Ok(None),
        Some(observed) => Ok(Some(observed + 1)),
        None => Ok(Some(0)),
    }
}
