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

//! Query interface of the consensus app.
//!
//! Requests are relative URLs. `/configs/?batchIndex=N` answers with the
//! SCALE encoded batch config active at batch `N`.

use crate::ConfigStore;
use parity_scale_codec::Encode;
use thiserror::Error;
use url::{ParseError, Url};

const BASE: &str = "http://keyper.invalid/";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid request url")]
    InvalidUrl,
    #[error("unknown method")]
    UnknownMethod,
    #[error("missing batch index parameter")]
    MissingBatchIndex,
    #[error("batch index not valid integer")]
    InvalidBatchIndex,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResponse {
    /// Zero on success.
    pub code: u32,
    pub log: String,
    pub value: Vec<u8>,
}

impl QueryResponse {
    fn ok(value: Vec<u8>) -> Self {
        Self {
            code: 0,
            log: String::new(),
            value,
        }
    }
}

impl From<QueryError> for QueryResponse {
    fn from(err: QueryError) -> Self {
        Self {
            code: 1,
            log: err.to_string(),
            value: Vec::new(),
        }
    }
}

/// Answer a query. Malformed requests get an error response, never a panic.
pub fn handle_query(store: &ConfigStore, path: &str) -> QueryResponse {
    match query(store, path) {
        Ok(value) => QueryResponse::ok(value),
        Err(err) => {
            tracing::debug!(path, "query rejected: {err}");
            err.into()
        }
    }
}

fn query(store: &ConfigStore, path: &str) -> Result<Vec<u8>, QueryError> {
    let url = parse_relative(path)?;

    match url.path() {
        "/configs/" if path.starts_with('/') => query_batch_config(store, &url),
        _ => Err(QueryError::UnknownMethod),
    }
}

/// Parse a URL made of path and query only.
fn parse_relative(path: &str) -> Result<Url, QueryError> {
    match Url::parse(path) {
        Err(ParseError::RelativeUrlWithoutBase) => {}
        // has a scheme or is unparsable
        _ => return Err(QueryError::InvalidUrl),
    }

    // `\` acts as `/` in http urls, control characters are dropped silently
    if path.starts_with("//")
        || path.contains(['#', '\\'])
        || path.chars().any(|c| c.is_ascii_control())
    {
        return Err(QueryError::InvalidUrl);
    }

    let base = Url::parse(BASE).map_err(|_| QueryError::InvalidUrl)?;
    let url = base.join(path).map_err(|_| QueryError::InvalidUrl)?;

    if url.host_str() != base.host_str() || !url.username().is_empty() || url.password().is_some()
    {
        return Err(QueryError::InvalidUrl);
    }

    Ok(url)
}

fn query_batch_config(store: &ConfigStore, url: &Url) -> Result<Vec<u8>, QueryError> {
    let batch_index = url
        .query_pairs()
        .find(|(key, _)| key == "batchIndex")
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
        .ok_or(QueryError::MissingBatchIndex)?;

    let batch_index = batch_index
        .parse::<i64>()
        .ok()
        .and_then(|index| u64::try_from(index).ok())
        .ok_or(QueryError::InvalidBatchIndex)?;

    Ok(store.get(batch_index).encode())
}
