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

//! Consensus chain events.
//!
//! The chain reports events as a kind tag plus an ordered list of string
//! attributes. Every known kind has a fixed attribute layout; decoding checks
//! key names position by position and fails closed on anything else.

use crate::{Address, BatchConfig, Eon, EpochIndex};
use keyper_crypto::{EonPublicKey, EpochSecretKey, EpochSecretKeyShare, Gammas};
use parity_scale_codec::{Decode, DecodeAll, Encode};
use thiserror::Error;

pub const BATCH_CONFIG: &str = "shutter.batch-config";
pub const BATCH_CONFIG_VOTE: &str = "shutter.batch-config-vote";
pub const PUBKEY_GENERATED: &str = "shutter.pubkey-generated";
pub const PRIVKEY_GENERATED: &str = "shutter.privkey-generated";
pub const POLY_COMMITMENT: &str = "shutter.poly-commitment-registered";
pub const POLY_EVAL: &str = "shutter.poly-eval-registered";
pub const BATCH_CLOSED: &str = "shutter.batch-closed";
pub const EPOCH_SECRET_KEY_SHARE: &str = "shutter.epoch-secret-key-share";
pub const EON_PUBLIC_KEY_VOTE: &str = "shutter.eon-public-key-vote";

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Undecoded event as reported by the consensus chain.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RawEvent {
    pub kind: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("unknown event kind {0:?}")]
    UnknownKind(String),
    #[error("event contains not enough attributes: {kind} needs {expected}, got {got}")]
    NotEnoughAttributes {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("bad event attributes: expected {expected} at position {position}, found {found:?}")]
    UnexpectedKey {
        position: usize,
        expected: &'static str,
        found: String,
    },
    #[error("bad value for attribute {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct PolyEvalEvent {
    pub eon: Eon,
    pub sender: Address,
    pub receivers: Vec<Address>,
    pub encrypted_evals: Vec<Vec<u8>>,
}

/// Decoded consensus chain event.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum ShutterEvent {
    BatchConfig(BatchConfig),
    BatchConfigVote {
        start_batch_index: EpochIndex,
        sender: Address,
    },
    PubkeyGenerated {
        eon: Eon,
        pubkey: EonPublicKey,
    },
    PrivkeyGenerated {
        epoch: EpochIndex,
        privkey: EpochSecretKey,
    },
    PolyCommitment {
        eon: Eon,
        sender: Address,
        gammas: Gammas,
    },
    PolyEval(PolyEvalEvent),
    BatchClosed {
        batch_index: EpochIndex,
    },
    EpochSecretKeyShare {
        epoch: EpochIndex,
        sender: Address,
        share: EpochSecretKeyShare,
    },
    EonPublicKeyVote {
        eon: Eon,
        sender: Address,
        pubkey: EonPublicKey,
    },
}

/// Positional view over a raw event's attributes.
struct Attributes<'a> {
    values: Vec<&'a str>,
}

impl<'a> Attributes<'a> {
    fn expect(
        event: &'a RawEvent,
        kind: &'static str,
        keys: &[&'static str],
    ) -> Result<Self, EventDecodeError> {
        if event.attributes.len() < keys.len() {
            return Err(EventDecodeError::NotEnoughAttributes {
                kind,
                expected: keys.len(),
                got: event.attributes.len(),
            });
        }

        let values = keys
            .iter()
            .zip(&event.attributes)
            .enumerate()
            .map(|(position, (&expected, attribute))| {
                if attribute.key == expected {
                    Ok(attribute.value.as_str())
                } else {
                    Err(EventDecodeError::UnexpectedKey {
                        position,
                        expected,
                        found: attribute.key.clone(),
                    })
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { values })
    }

    fn value(&self, position: usize) -> &'a str {
        self.values[position]
    }
}

fn invalid(key: &'static str, reason: impl ToString) -> EventDecodeError {
    EventDecodeError::InvalidValue {
        key,
        reason: reason.to_string(),
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64, EventDecodeError> {
    value.parse().map_err(|err| invalid(key, err))
}

fn parse_address(key: &'static str, value: &str) -> Result<Address, EventDecodeError> {
    value.parse().map_err(|err| invalid(key, err))
}

fn parse_list<T>(
    key: &'static str,
    value: &str,
    parse: impl Fn(&'static str, &str) -> Result<T, EventDecodeError>,
) -> Result<Vec<T>, EventDecodeError> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    value.split(',').map(|item| parse(key, item)).collect()
}

fn parse_bytes(key: &'static str, value: &str) -> Result<Vec<u8>, EventDecodeError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value)).map_err(|err| invalid(key, err))
}

fn parse_scale<T: Decode>(key: &'static str, value: &str) -> Result<T, EventDecodeError> {
    let bytes = parse_bytes(key, value)?;
    T::decode_all(&mut bytes.as_slice()).map_err(|err| invalid(key, err))
}

fn encode_list<T>(items: &[T], encode: impl Fn(&T) -> String) -> String {
    items.iter().map(encode).collect::<Vec<_>>().join(",")
}

fn encode_scale<T: Encode>(value: &T) -> String {
    hex::encode(value.encode())
}

impl TryFrom<&RawEvent> for ShutterEvent {
    type Error = EventDecodeError;

    fn try_from(event: &RawEvent) -> Result<Self, Self::Error> {
        let decoded = match event.kind.as_str() {
            BATCH_CONFIG => {
                let attrs =
                    Attributes::expect(event, BATCH_CONFIG, &["StartBatchIndex", "Threshold", "Keypers"])?;
                Self::BatchConfig(BatchConfig {
                    start_batch_index: parse_u64("StartBatchIndex", attrs.value(0))?,
                    threshold: parse_u64("Threshold", attrs.value(1))?,
                    keypers: parse_list("Keypers", attrs.value(2), parse_address)?,
                })
            }
            BATCH_CONFIG_VOTE => {
                let attrs = Attributes::expect(event, BATCH_CONFIG_VOTE, &["StartBatchIndex", "Sender"])?;
                Self::BatchConfigVote {
                    start_batch_index: parse_u64("StartBatchIndex", attrs.value(0))?,
                    sender: parse_address("Sender", attrs.value(1))?,
                }
            }
            PUBKEY_GENERATED => {
                let attrs = Attributes::expect(event, PUBKEY_GENERATED, &["BatchIndex", "Pubkey"])?;
                Self::PubkeyGenerated {
                    eon: parse_u64("BatchIndex", attrs.value(0))?,
                    pubkey: parse_scale("Pubkey", attrs.value(1))?,
                }
            }
            PRIVKEY_GENERATED => {
                let attrs = Attributes::expect(event, PRIVKEY_GENERATED, &["BatchIndex", "Privkey"])?;
                Self::PrivkeyGenerated {
                    epoch: parse_u64("BatchIndex", attrs.value(0))?,
                    privkey: parse_scale("Privkey", attrs.value(1))?,
                }
            }
            POLY_COMMITMENT => {
                let attrs = Attributes::expect(event, POLY_COMMITMENT, &["Eon", "Sender", "Gammas"])?;
                Self::PolyCommitment {
                    eon: parse_u64("Eon", attrs.value(0))?,
                    sender: parse_address("Sender", attrs.value(1))?,
                    gammas: parse_scale("Gammas", attrs.value(2))?,
                }
            }
            POLY_EVAL => {
                let attrs = Attributes::expect(
                    event,
                    POLY_EVAL,
                    &["Eon", "Sender", "Receivers", "EncryptedEvals"],
                )?;
                let receivers = parse_list("Receivers", attrs.value(2), parse_address)?;
                let encrypted_evals = parse_list("EncryptedEvals", attrs.value(3), parse_bytes)?;
                if receivers.len() != encrypted_evals.len() {
                    return Err(invalid(
                        "EncryptedEvals",
                        format!(
                            "{} evaluations for {} receivers",
                            encrypted_evals.len(),
                            receivers.len()
                        ),
                    ));
                }
                Self::PolyEval(PolyEvalEvent {
                    eon: parse_u64("Eon", attrs.value(0))?,
                    sender: parse_address("Sender", attrs.value(1))?,
                    receivers,
                    encrypted_evals,
                })
            }
            BATCH_CLOSED => {
                let attrs = Attributes::expect(event, BATCH_CLOSED, &["BatchIndex"])?;
                Self::BatchClosed {
                    batch_index: parse_u64("BatchIndex", attrs.value(0))?,
                }
            }
            EPOCH_SECRET_KEY_SHARE => {
                let attrs = Attributes::expect(
                    event,
                    EPOCH_SECRET_KEY_SHARE,
                    &["BatchIndex", "Sender", "Share"],
                )?;
                Self::EpochSecretKeyShare {
                    epoch: parse_u64("BatchIndex", attrs.value(0))?,
                    sender: parse_address("Sender", attrs.value(1))?,
                    share: parse_scale("Share", attrs.value(2))?,
                }
            }
            EON_PUBLIC_KEY_VOTE => {
                let attrs = Attributes::expect(event, EON_PUBLIC_KEY_VOTE, &["Eon", "Sender", "Pubkey"])?;
                Self::EonPublicKeyVote {
                    eon: parse_u64("Eon", attrs.value(0))?,
                    sender: parse_address("Sender", attrs.value(1))?,
                    pubkey: parse_scale("Pubkey", attrs.value(2))?,
                }
            }
            other => return Err(EventDecodeError::UnknownKind(other.to_string())),
        };

        Ok(decoded)
    }
}

impl ShutterEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BatchConfig(_) => BATCH_CONFIG,
            Self::BatchConfigVote { .. } => BATCH_CONFIG_VOTE,
            Self::PubkeyGenerated { .. } => PUBKEY_GENERATED,
            Self::PrivkeyGenerated { .. } => PRIVKEY_GENERATED,
            Self::PolyCommitment { .. } => POLY_COMMITMENT,
            Self::PolyEval(_) => POLY_EVAL,
            Self::BatchClosed { .. } => BATCH_CLOSED,
            Self::EpochSecretKeyShare { .. } => EPOCH_SECRET_KEY_SHARE,
            Self::EonPublicKeyVote { .. } => EON_PUBLIC_KEY_VOTE,
        }
    }

    /// Attribute form of the event, as the consensus chain emits it.
    pub fn to_raw(&self) -> RawEvent {
        let attributes = match self {
            Self::BatchConfig(config) => vec![
                Attribute::new("StartBatchIndex", config.start_batch_index.to_string()),
                Attribute::new("Threshold", config.threshold.to_string()),
                Attribute::new("Keypers", encode_list(&config.keypers, Address::to_string)),
            ],
            Self::BatchConfigVote {
                start_batch_index,
                sender,
            } => vec![
                Attribute::new("StartBatchIndex", start_batch_index.to_string()),
                Attribute::new("Sender", sender.to_string()),
            ],
            Self::PubkeyGenerated { eon, pubkey } => vec![
                Attribute::new("BatchIndex", eon.to_string()),
                Attribute::new("Pubkey", encode_scale(pubkey)),
            ],
            Self::PrivkeyGenerated { epoch, privkey } => vec![
                Attribute::new("BatchIndex", epoch.to_string()),
                Attribute::new("Privkey", encode_scale(privkey)),
            ],
            Self::PolyCommitment {
                eon,
                sender,
                gammas,
            } => vec![
                Attribute::new("Eon", eon.to_string()),
                Attribute::new("Sender", sender.to_string()),
                Attribute::new("Gammas", encode_scale(gammas)),
            ],
            Self::PolyEval(event) => vec![
                Attribute::new("Eon", event.eon.to_string()),
                Attribute::new("Sender", event.sender.to_string()),
                Attribute::new("Receivers", encode_list(&event.receivers, Address::to_string)),
                Attribute::new(
                    "EncryptedEvals",
                    encode_list(&event.encrypted_evals, |evals| hex::encode(evals)),
                ),
            ],
            Self::BatchClosed { batch_index } => {
                vec![Attribute::new("BatchIndex", batch_index.to_string())]
            }
            Self::EpochSecretKeyShare {
                epoch,
                sender,
                share,
            } => vec![
                Attribute::new("BatchIndex", epoch.to_string()),
                Attribute::new("Sender", sender.to_string()),
                Attribute::new("Share", encode_scale(share)),
            ],
            Self::EonPublicKeyVote {
                eon,
                sender,
                pubkey,
            } => vec![
                Attribute::new("Eon", eon.to_string()),
                Attribute::new("Sender", sender.to_string()),
                Attribute::new("Pubkey", encode_scale(pubkey)),
            ],
        };

        RawEvent {
            kind: self.kind().to_string(),
            attributes,
        }
    }
}
