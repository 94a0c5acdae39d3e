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

use crate::{Action, ActionKind, ChainHeights, Decider, DkgPhase, EpochPhase, KeyperState};
use keyper_common::{
    Address, EvalEnvelope, MainChainEvent, MainChainLog, PolyEvalEvent, ShutterEvent,
    crypto::{EpochId, EpochSecretKey, EpochSecretKeyShare, PolyEval, Scalar, encrypt_with_rng},
    mock::{PlainEnvelope, batch_config},
};
use keyper_observer::{MainChainObserver, MainChainUpdate, ShutterObserver, ShutterUpdate};
use rand::{SeedableRng, rngs::StdRng};

const RESEND_AFTER: u64 = 5;

fn init_logger() {
    let _ = tracing_subscriber::fmt::try_init();
}

struct Keyper {
    address: Address,
    envelope: PlainEnvelope,
    state: KeyperState,
}

/// Keypers sharing one consensus chain and one main chain. Actions are
/// delivered by turning them into the events the chains would emit.
struct Network {
    shutter: ShutterObserver,
    main_chain: MainChainObserver,
    keypers: Vec<Keyper>,
    rng: StdRng,
}

impl Network {
    fn new(keypers: &[u64]) -> Self {
        init_logger();

        let mut network = Self {
            shutter: ShutterObserver::default(),
            main_chain: MainChainObserver::default(),
            keypers: keypers
                .iter()
                .map(|&id| Keyper {
                    address: Address::from(id),
                    envelope: PlainEnvelope::new(Address::from(id)),
                    state: KeyperState::default(),
                })
                .collect(),
            rng: StdRng::seed_from_u64(42),
        };
        network.shutter_block(vec![]);
        network.main_block(vec![]);
        network
    }

    fn shutter_block(&mut self, events: Vec<ShutterEvent>) {
        let head = self.shutter.current_height().map_or(0, |height| height + 1);
        self.shutter.apply(ShutterUpdate {
            head,
            events: events
                .into_iter()
                .map(|event| (head, event.to_raw()))
                .collect(),
        });
    }

    fn main_block(&mut self, events: Vec<MainChainEvent>) {
        let head = self.main_chain.current_height().map_or(0, |height| height + 1);
        self.main_chain.apply(MainChainUpdate {
            head,
            logs: events
                .into_iter()
                .map(|event| MainChainLog { block: head, event })
                .collect(),
        });
    }

    fn heights(&self) -> ChainHeights {
        ChainHeights {
            shutter: self.shutter.current_height().unwrap_or_default(),
            main_chain: self.main_chain.current_height().unwrap_or_default(),
        }
    }

    fn decide(&mut self, keyper: usize) -> Vec<Action> {
        let keyper = &mut self.keypers[keyper];
        let decider = Decider::new(keyper.address, &keyper.envelope, RESEND_AFTER);
        decider
            .decide(&mut keyper.state, &self.shutter, &self.main_chain, &mut self.rng)
            .expect("decision succeeds")
    }

    /// Every keyper decides, then all actions land in the next blocks.
    fn cycle(&mut self) -> Vec<(Address, Action)> {
        let mut decided = Vec::new();
        for index in 0..self.keypers.len() {
            let actions = self.decide(index);
            let at = self.heights();
            let keyper = &mut self.keypers[index];
            for action in actions {
                keyper.state.outbox_mut().mark_sent(action.id(), at);
                decided.push((keyper.address, action));
            }
        }

        let mut shutter_events = Vec::new();
        let mut main_events = Vec::new();
        for (sender, action) in &decided {
            match action.clone() {
                Action::VoteBatchConfig(config) => {
                    shutter_events.push(ShutterEvent::BatchConfigVote {
                        start_batch_index: config.start_batch_index,
                        sender: *sender,
                    })
                }
                Action::PublishGammas { eon, gammas } => {
                    shutter_events.push(ShutterEvent::PolyCommitment {
                        eon,
                        sender: *sender,
                        gammas,
                    })
                }
                Action::SendPolyEvals { eon, evals } => {
                    shutter_events.push(poly_eval_event(eon, *sender, &evals))
                }
                Action::PublishEonPublicKey { eon, pubkey } => {
                    shutter_events.push(ShutterEvent::EonPublicKeyVote {
                        eon,
                        sender: *sender,
                        pubkey,
                    })
                }
                Action::PublishEpochSecretKeyShare { epoch, share, .. } => {
                    shutter_events.push(ShutterEvent::EpochSecretKeyShare {
                        epoch,
                        sender: *sender,
                        share,
                    })
                }
                Action::BroadcastEonKey { eon, pubkey } => {
                    main_events.push(MainChainEvent::EonKeyBroadcast {
                        eon,
                        sender: *sender,
                        key: pubkey,
                    })
                }
                Action::ExecuteCipherBatch { epoch, .. } => {
                    main_events.push(MainChainEvent::CipherBatchExecuted { batch_index: epoch })
                }
            }
        }

        self.shutter_block(shutter_events);
        self.main_block(main_events);
        decided
    }

    fn kinds(decided: &[(Address, Action)]) -> Vec<(Address, ActionKind)> {
        decided
            .iter()
            .map(|(sender, action)| (*sender, action.kind()))
            .collect()
    }

    fn phases(&self, eon: u64) -> Vec<Option<DkgPhase>> {
        self.keypers
            .iter()
            .map(|keyper| keyper.state.eon(eon).map(|dkg| dkg.phase()))
            .collect()
    }

    /// Run key generation for `eon` up to a confirmed and broadcast eon key.
    fn generate_eon_key(&mut self, eon: u64) {
        for _ in 0..3 {
            self.cycle();
        }
        assert!(
            self.phases(eon)
                .iter()
                .all(|phase| *phase == Some(DkgPhase::EonKeyReady))
        );

        let pubkey = *self.keypers[0]
            .state
            .eon(eon)
            .and_then(|dkg| dkg.eon_public_key())
            .expect("eon key ready");
        self.shutter_block(vec![ShutterEvent::PubkeyGenerated { eon, pubkey }]);

        let decided = self.cycle();
        assert!(
            decided
                .iter()
                .all(|(_, action)| action.kind() == ActionKind::BroadcastEonKey)
        );
        assert!(self.cycle().is_empty());
    }
}

fn poly_eval_event(eon: u64, sender: Address, evals: &[(Address, PolyEval)]) -> ShutterEvent {
    let envelope = PlainEnvelope::new(sender);
    ShutterEvent::PolyEval(PolyEvalEvent {
        eon,
        sender,
        receivers: evals.iter().map(|(receiver, _)| *receiver).collect(),
        encrypted_evals: evals
            .iter()
            .map(|(receiver, eval)| envelope.seal(receiver, eval).expect("plain seal"))
            .collect(),
    })
}

#[test]
fn eon_key_generation() {
    let mut network = Network::new(&[1, 2, 3]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 2, &[1, 2, 3]))]);

    let decided = network.cycle();
    assert_eq!(
        Network::kinds(&decided),
        vec![
            (Address::from(1), ActionKind::PublishGammas),
            (Address::from(2), ActionKind::PublishGammas),
            (Address::from(3), ActionKind::PublishGammas),
        ]
    );
    assert_eq!(network.phases(0), vec![Some(DkgPhase::AwaitingGammas); 3]);

    let decided = network.cycle();
    assert_eq!(
        Network::kinds(&decided),
        vec![
            (Address::from(1), ActionKind::SendPolyEvals),
            (Address::from(2), ActionKind::SendPolyEvals),
            (Address::from(3), ActionKind::SendPolyEvals),
        ]
    );
    assert_eq!(network.phases(0), vec![Some(DkgPhase::AwaitingShares); 3]);

    let decided = network.cycle();
    assert_eq!(
        Network::kinds(&decided),
        vec![
            (Address::from(1), ActionKind::PublishEonPublicKey),
            (Address::from(2), ActionKind::PublishEonPublicKey),
            (Address::from(3), ActionKind::PublishEonPublicKey),
        ]
    );
    assert_eq!(network.phases(0), vec![Some(DkgPhase::EonKeyReady); 3]);

    let pubkeys: Vec<_> = network
        .keypers
        .iter()
        .map(|keyper| keyper.state.eon(0).and_then(|dkg| dkg.eon_public_key()).copied())
        .collect();
    assert!(pubkeys[0].is_some());
    assert!(pubkeys.iter().all(|pubkey| *pubkey == pubkeys[0]));

    // nothing to do until the consensus chain confirms the key
    assert!(network.cycle().is_empty());

    let pubkey = pubkeys[0].expect("computed");
    network.shutter_block(vec![ShutterEvent::PubkeyGenerated { eon: 0, pubkey }]);
    let decided = network.cycle();
    assert_eq!(
        Network::kinds(&decided),
        vec![
            (Address::from(1), ActionKind::BroadcastEonKey),
            (Address::from(2), ActionKind::BroadcastEonKey),
            (Address::from(3), ActionKind::BroadcastEonKey),
        ]
    );

    assert!(network.main_chain.has_broadcast_eon_key(0, &Address::from(3)));
    assert!(network.cycle().is_empty());
}

#[test]
fn closed_batch_gets_key_and_is_executed_by_leader() {
    let mut network = Network::new(&[1, 2, 3]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 2, &[1, 2, 3]))]);
    network.generate_eon_key(0);

    network.shutter_block(vec![ShutterEvent::BatchClosed { batch_index: 1 }]);
    let decided = network.cycle();
    assert_eq!(
        Network::kinds(&decided),
        vec![
            (Address::from(1), ActionKind::PublishEpochSecretKeyShare),
            (Address::from(2), ActionKind::PublishEpochSecretKeyShare),
            (Address::from(3), ActionKind::PublishEpochSecretKeyShare),
        ]
    );

    // batch 0 was never executed, so batch 1 has to wait
    let decided = network.cycle();
    assert!(decided.is_empty());
    let key = *network.keypers[0]
        .state
        .eon(0)
        .and_then(|dkg| dkg.epoch_key(1))
        .expect("epoch key ready");

    network.main_block(vec![MainChainEvent::CipherBatchExecuted { batch_index: 0 }]);
    let decided = network.cycle();
    assert_eq!(
        decided,
        vec![(
            Address::from(2),
            Action::ExecuteCipherBatch {
                eon: 0,
                epoch: 1,
                key
            }
        )]
    );
    assert_eq!(network.main_chain.num_executed_batches(), 2);
    assert!(network.cycle().is_empty());

    // the key decrypts what was encrypted for the epoch
    let pubkey = *network.keypers[2]
        .state
        .eon(0)
        .and_then(|dkg| dkg.eon_public_key())
        .expect("eon key ready");
    let epoch_id = EpochId::new(1).expect("hashes to curve");
    let encrypted = encrypt_with_rng(b"sealed bid", &pubkey, &epoch_id, &mut network.rng)
        .expect("encrypts");
    assert_eq!(encrypted.decrypt(&key).expect("decrypts"), b"sealed bid");
}

#[test]
fn published_epoch_key_short_circuits_shares() {
    let mut network = Network::new(&[1, 2, 3]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 2, &[1, 2, 3]))]);
    network.generate_eon_key(0);

    let epoch_id = EpochId::new(0).expect("hashes to curve");
    let shares: Vec<_> = network.keypers[..2]
        .iter()
        .map(|keyper| {
            let share = keyper
                .state
                .eon(0)
                .and_then(|dkg| dkg.eon_secret_key_share())
                .expect("eon key ready");
            EpochSecretKeyShare::compute(share, &epoch_id)
        })
        .collect();
    let key = EpochSecretKey::reconstruct(&[0, 1], &shares, 2, 3).expect("enough shares");

    network.shutter_block(vec![
        ShutterEvent::BatchClosed { batch_index: 0 },
        ShutterEvent::PrivkeyGenerated {
            epoch: 0,
            privkey: key,
        },
    ]);

    // requested, shares still go out this cycle
    let decided = network.decide(2);
    assert_eq!(decided.len(), 1);
    assert_eq!(
        network.keypers[2].state.eon(0).and_then(|dkg| dkg.epoch_phase(0)),
        Some(&EpochPhase::EpochKeyRequested)
    );

    // ready without any share on chain
    network.decide(2);
    assert_eq!(
        network.keypers[2].state.eon(0).and_then(|dkg| dkg.epoch_phase(0)),
        Some(&EpochPhase::EpochKeyReady(key))
    );
}

#[test]
fn invalid_poly_eval_is_ignored_until_resent() {
    let mut network = Network::new(&[1, 2]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 2, &[1, 2]))]);
    network.cycle();

    // keyper 1 follows the protocol, keyper 2 gets a forged evaluation
    let evals_of_1 = match network.decide(0).pop() {
        Some(Action::SendPolyEvals { evals, .. }) => evals,
        other => panic!("unexpected action {other:?}"),
    };
    network.decide(1);
    let forged = vec![(Address::from(2), PolyEval(Scalar::from(7u64)))];
    network.shutter_block(vec![poly_eval_event(0, Address::from(1), &forged)]);

    network.decide(1);
    assert_eq!(network.phases(0)[1], Some(DkgPhase::AwaitingShares));

    network.shutter_block(vec![poly_eval_event(0, Address::from(1), &evals_of_1)]);
    network.decide(1);
    assert_eq!(network.phases(0)[1], Some(DkgPhase::EonKeyReady));
}

#[test]
fn unexecuted_actions_are_decided_again() {
    let mut network = Network::new(&[1]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))]);

    let first = network.decide(0);
    assert_eq!(first.len(), 1);

    // not marked sent: the action survives a crash before execution
    let again = network.decide(0);
    assert_eq!(again, first);

    let at = network.heights();
    network.keypers[0].state.outbox_mut().mark_sent(first[0].id(), at);
    assert!(network.decide(0).is_empty());

    for _ in 0..RESEND_AFTER {
        network.shutter_block(vec![]);
    }
    assert_eq!(network.decide(0), first);
}

#[test]
fn decisions_are_deterministic() {
    let mut network = Network::new(&[1, 2, 3]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 2, &[1, 2, 3]))]);

    let envelope = PlainEnvelope::new(Address::from(1));
    let decider = Decider::new(Address::from(1), &envelope, RESEND_AFTER);

    let run = || {
        let mut state = KeyperState::default();
        let mut rng = StdRng::seed_from_u64(7);
        let actions = decider
            .decide(&mut state, &network.shutter, &network.main_chain, &mut rng)
            .expect("decision succeeds");
        (state, actions)
    };

    assert_eq!(run(), run());
}

#[test]
fn single_keyper_needs_no_evals() {
    let mut network = Network::new(&[1]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))]);

    assert_eq!(
        Network::kinds(&network.cycle()),
        vec![(Address::from(1), ActionKind::PublishGammas)]
    );
    assert!(network.cycle().is_empty());
    assert_eq!(
        Network::kinds(&network.cycle()),
        vec![(Address::from(1), ActionKind::PublishEonPublicKey)]
    );
}

#[test]
fn configs_are_voted_once_by_members() {
    let mut network = Network::new(&[1, 2, 3]);
    network.main_block(vec![MainChainEvent::ConfigScheduled(batch_config(
        10,
        1,
        &[1, 2],
    ))]);

    let decided = network.cycle();
    assert_eq!(
        Network::kinds(&decided),
        vec![
            (Address::from(1), ActionKind::VoteBatchConfig),
            (Address::from(2), ActionKind::VoteBatchConfig),
        ]
    );
    assert!(network.cycle().is_empty());

    // adopted: keyper 3 is not part of it and stays out of key generation
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(10, 1, &[1, 2]))]);
    network.cycle();
    assert_eq!(
        network.phases(10),
        vec![
            Some(DkgPhase::AwaitingGammas),
            Some(DkgPhase::AwaitingGammas),
            None
        ]
    );
}

#[test]
fn events_of_other_eons_are_not_mixed() {
    let mut network = Network::new(&[1, 2]);
    network.shutter_block(vec![
        ShutterEvent::BatchConfig(batch_config(0, 1, &[1, 2])),
        ShutterEvent::BatchConfig(batch_config(5, 1, &[1, 2])),
    ]);

    network.cycle();
    network.cycle();

    let state = &network.keypers[0].state;
    assert_eq!(state.eons().count(), 2);
    assert_eq!(network.phases(0), network.phases(5));
    assert!(state.short_info().contains("eon 5 AwaitingShares"));
}

#[test]
fn forged_epoch_share_does_not_block_reconstruction() {
    let mut network = Network::new(&[1, 2, 3]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 2, &[1, 2, 3]))]);
    network.generate_eon_key(0);

    let share_of = |network: &Network, keyper: usize, epoch: u64| {
        let eon_share = network.keypers[keyper]
            .state
            .eon(0)
            .and_then(|dkg| dkg.eon_secret_key_share())
            .expect("eon key ready");
        let epoch_id = EpochId::new(epoch).expect("hashes to curve");
        EpochSecretKeyShare::compute(eon_share, &epoch_id)
    };

    // keyper 3 publishes its share of another epoch first
    let forged = share_of(&network, 2, 5);
    network.shutter_block(vec![
        ShutterEvent::BatchClosed { batch_index: 0 },
        ShutterEvent::EpochSecretKeyShare {
            epoch: 0,
            sender: Address::from(3),
            share: forged,
        },
    ]);

    let decided = network.decide(0);
    assert_eq!(
        decided.iter().map(Action::kind).collect::<Vec<_>>(),
        vec![ActionKind::PublishEpochSecretKeyShare]
    );
    let own = share_of(&network, 0, 0);
    network.shutter_block(vec![ShutterEvent::EpochSecretKeyShare {
        epoch: 0,
        sender: Address::from(1),
        share: own,
    }]);

    // the forged share does not count towards the threshold
    network.decide(0);
    assert_eq!(
        network.keypers[0].state.eon(0).and_then(|dkg| dkg.epoch_phase(0)),
        Some(&EpochPhase::EpochKeyRequested)
    );

    let other = share_of(&network, 1, 0);
    network.shutter_block(vec![ShutterEvent::EpochSecretKeyShare {
        epoch: 0,
        sender: Address::from(2),
        share: other,
    }]);
    network.decide(0);

    let key = EpochSecretKey::reconstruct(&[0, 1], &[own, other], 2, 3).expect("enough shares");
    assert_eq!(
        network.keypers[0].state.eon(0).and_then(|dkg| dkg.epoch_phase(0)),
        Some(&EpochPhase::EpochKeyReady(key))
    );
}

#[test]
fn epoch_events_follow_config_active_when_emitted() {
    let mut network = Network::new(&[1, 2]);
    network.shutter_block(vec![ShutterEvent::BatchConfig(batch_config(0, 1, &[1, 2]))]);
    network.cycle();
    network.cycle();
    network.cycle();
    assert_eq!(network.phases(0), vec![Some(DkgPhase::EonKeyReady); 2]);

    // batch 10 closes before the config starting at 10 is adopted
    network.shutter_block(vec![
        ShutterEvent::BatchClosed { batch_index: 10 },
        ShutterEvent::BatchConfig(batch_config(10, 1, &[1, 2])),
    ]);
    network.decide(0);

    let state = &network.keypers[0].state;
    assert_eq!(
        state.eon(0).and_then(|dkg| dkg.epoch_phase(10)),
        Some(&EpochPhase::EpochKeyRequested)
    );
    assert_eq!(state.eon(10).and_then(|dkg| dkg.epoch_phase(10)), None);
}
