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

use crate::{
    Clients, CycleError, CycleOutcome, KeyperService,
    config::{ActionRetryConfig, KeyperConfig},
    executor::Executor,
    mock::{MockContractCaller, MockMessageSender},
    transport::TxBatch,
};
use keyper_common::{
    Address, ContractAddresses, ContractCall, KeyperMessage, MainChainEvent, PolyEvalEvent,
    ShutterEvent,
    crypto::{EonPublicKey, Polynomial},
    mock::{PlainEnvelope, batch_config},
};
use keyper_decider::{Action, ChainHeights, DkgPhase, Outbox, OutboxStatus};
use keyper_observer::mock::{MockMainChain, MockShutterChain};
use rand::{SeedableRng, rngs::StdRng};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use url::Url;

fn init_logger() {
    let _ = tracing_subscriber::fmt::try_init();
}

fn contracts() -> ContractAddresses {
    ContractAddresses {
        config: Address::from(0xc0),
        key_broadcast: Address::from(0xc1),
        batcher: Address::from(0xc2),
        executor: Address::from(0xc3),
    }
}

fn config(database_dir: &Path) -> KeyperConfig {
    KeyperConfig {
        address: Address::from(1),
        shutter_rpc: Url::parse("http://localhost:26657").expect("valid url"),
        main_chain_rpc: Url::parse("ws://localhost:8545").expect("valid url"),
        contracts: contracts(),
        database_dir: database_dir.to_path_buf(),
        cycle_interval_secs: 10,
        retry_delay_secs: 1,
        main_chain_batch_size: 10,
        resend_after: 5,
        action_retry: ActionRetryConfig {
            max_attempts: 2,
            base_backoff_ms: 100,
            max_backoff_ms: 1_000,
        },
    }
}

/// Mocks shared between the test and the service.
#[derive(Default, Clone)]
struct Env {
    shutter: MockShutterChain,
    main_chain: MockMainChain,
    messages: MockMessageSender,
    caller: MockContractCaller,
}

impl Env {
    fn service(&self, database_dir: &Path) -> KeyperService {
        let clients = Clients {
            shutter: Box::new(self.shutter.clone()),
            main_chain: Box::new(self.main_chain.clone()),
            messages: Box::new(self.messages.clone()),
            caller: Box::new(self.caller.clone()),
            envelope: Box::new(PlainEnvelope::new(Address::from(1))),
        };

        KeyperService::new(config(database_dir), clients)
            .expect("snapshot readable")
            .with_rng(StdRng::seed_from_u64(3))
    }

    /// Include everything keyper 1 submitted into a new consensus block.
    async fn include_submitted(&self) -> Vec<KeyperMessage> {
        let sender = Address::from(1);
        let messages = self.messages.take_submitted().await;
        let events = messages.iter().cloned().map(|message| match message {
            KeyperMessage::BatchConfigVote(config) => ShutterEvent::BatchConfigVote {
                start_batch_index: config.start_batch_index,
                sender,
            },
            KeyperMessage::PolyCommitment { eon, gammas } => ShutterEvent::PolyCommitment {
                eon,
                sender,
                gammas,
            },
            KeyperMessage::PolyEval {
                eon,
                receivers,
                encrypted_evals,
            } => ShutterEvent::PolyEval(PolyEvalEvent {
                eon,
                sender,
                receivers,
                encrypted_evals,
            }),
            KeyperMessage::EonPublicKeyVote { eon, pubkey } => ShutterEvent::EonPublicKeyVote {
                eon,
                sender,
                pubkey,
            },
            KeyperMessage::EpochSecretKeyShare { epoch, share } => {
                ShutterEvent::EpochSecretKeyShare {
                    epoch,
                    sender,
                    share,
                }
            }
        });
        self.shutter.push_block(events.collect::<Vec<_>>()).await;
        messages
    }
}

fn names(messages: &[KeyperMessage]) -> Vec<&'static str> {
    messages.iter().map(KeyperMessage::name).collect()
}

#[tokio::test]
async fn single_keyper_end_to_end() {
    init_logger();

    let dir = tempfile::tempdir().expect("temp dir");
    let env = Env::default();
    let cancel = CancellationToken::new();
    let mut service = env.service(dir.path());

    env.main_chain
        .push_block([MainChainEvent::ConfigScheduled(batch_config(0, 1, &[1]))])
        .await;
    assert_eq!(
        service.run_cycle(&cancel).await.expect("cycle runs"),
        CycleOutcome::Completed { executed: 1 }
    );
    assert_eq!(names(&env.include_submitted().await), vec!["batch-config-vote"]);

    env.shutter
        .push_block([ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))])
        .await;
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert_eq!(names(&env.include_submitted().await), vec!["poly-commitment"]);

    // a single keyper has nobody to send evaluations to
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert!(env.include_submitted().await.is_empty());

    service.run_cycle(&cancel).await.expect("cycle runs");
    let submitted = env.include_submitted().await;
    let Some(KeyperMessage::EonPublicKeyVote { pubkey, .. }) = submitted.first().cloned() else {
        panic!("expected eon public key vote, got {submitted:?}");
    };

    env.shutter
        .push_block([ShutterEvent::PubkeyGenerated { eon: 0, pubkey }])
        .await;
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert_eq!(
        env.caller.take_sent().await,
        vec![(
            contracts().key_broadcast,
            ContractCall::BroadcastEonKey { eon: 0, key: pubkey },
            0
        )]
    );
    env.main_chain
        .push_block([MainChainEvent::EonKeyBroadcast {
            eon: 0,
            sender: Address::from(1),
            key: pubkey,
        }])
        .await;

    env.shutter
        .push_block([ShutterEvent::BatchClosed { batch_index: 0 }])
        .await;
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert_eq!(
        names(&env.include_submitted().await),
        vec!["epoch-secret-key-share"]
    );

    service.run_cycle(&cancel).await.expect("cycle runs");
    let sent = env.caller.take_sent().await;
    assert!(matches!(
        sent.as_slice(),
        [(contract, ContractCall::ExecuteCipherBatch { batch_index: 0, .. }, 1)]
            if *contract == contracts().executor
    ));

    let dkg = service.snapshot().state.eon(0).expect("eon started");
    assert_eq!(dkg.phase(), DkgPhase::EonKeyReady);
    assert!(dkg.epoch_key(0).is_some());
    assert_eq!(env.caller.state.read().await.mined.len(), 2);
}

#[tokio::test]
async fn restart_resumes_without_repeating_actions() {
    init_logger();

    let dir = tempfile::tempdir().expect("temp dir");
    let env = Env::default();
    let cancel = CancellationToken::new();

    env.shutter
        .push_block([ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))])
        .await;

    let mut service = env.service(dir.path());
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert_eq!(names(&env.messages.take_submitted().await), vec!["poly-commitment"]);
    let before = service.snapshot().clone();
    drop(service);

    let mut service = env.service(dir.path());
    assert_eq!(service.snapshot(), &before);

    // the commitment never made it on chain, but the resend window is open
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert!(env.messages.take_submitted().await.is_empty());
    assert_eq!(
        service.snapshot().state.eon(0).map(|dkg| dkg.phase()),
        Some(DkgPhase::AwaitingGammas)
    );
}

#[tokio::test]
async fn sync_failure_aborts_cycle() {
    init_logger();

    let dir = tempfile::tempdir().expect("temp dir");
    let env = Env::default();
    let cancel = CancellationToken::new();
    let mut service = env.service(dir.path());

    env.shutter
        .push_block([ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))])
        .await;
    env.shutter.set_failing(true).await;

    let err = service.run_cycle(&cancel).await.unwrap_err();
    assert!(matches!(err, CycleError::Sync(_)));
    assert_eq!(service.snapshot(), &Default::default());
    assert!(!dir.path().join(crate::config::STATE_FILE).exists());
    assert!(env.messages.take_submitted().await.is_empty());

    env.shutter.set_failing(false).await;
    service.run_cycle(&cancel).await.expect("cycle runs");
    assert_eq!(names(&env.messages.take_submitted().await), vec!["poly-commitment"]);
}

#[tokio::test]
async fn failing_action_backs_off_then_halts() {
    init_logger();

    let dir = tempfile::tempdir().expect("temp dir");
    let env = Env::default();
    let cancel = CancellationToken::new();
    let mut service = env.service(dir.path());

    env.shutter
        .push_block([ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))])
        .await;
    env.messages.fail_next(10).await;

    assert_eq!(
        service.run_cycle(&cancel).await.expect("cycle runs"),
        CycleOutcome::ActionFailed {
            backoff: std::time::Duration::from_millis(100)
        }
    );
    let entry = service
        .snapshot()
        .state
        .outbox()
        .iter()
        .map(|(_, entry)| entry.clone())
        .next()
        .expect("failure recorded");
    assert_eq!(entry.attempts, 1);
    assert!(matches!(entry.status, OutboxStatus::Failed { .. }));

    match service.run_cycle(&cancel).await {
        Err(CycleError::Action(err)) => assert_eq!(err.attempts, 2),
        other => panic!("expected action error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_cycle_changes_nothing() {
    init_logger();

    let dir = tempfile::tempdir().expect("temp dir");
    let env = Env::default();
    let cancel = CancellationToken::new();
    let mut service = env.service(dir.path());

    env.shutter
        .push_block([ShutterEvent::BatchConfig(batch_config(0, 1, &[1]))])
        .await;
    cancel.cancel();

    assert_eq!(
        service.run_cycle(&cancel).await.expect("cycle runs"),
        CycleOutcome::Cancelled
    );
    assert_eq!(service.snapshot(), &Default::default());
}

#[tokio::test]
async fn run_stops_on_cancel() {
    init_logger();

    let dir = tempfile::tempdir().expect("temp dir");
    let env = Env::default();
    let cancel = CancellationToken::new();
    let service = env.service(dir.path());

    let (result, ()) = tokio::join!(service.run(cancel.clone()), async {
        cancel.cancel();
    });
    result.expect("stops cleanly");
}

#[tokio::test]
async fn execution_stops_at_first_failure() {
    let messages = MockMessageSender::default();
    let caller = MockContractCaller::default();
    let envelope = PlainEnvelope::new(Address::from(1));
    let contracts = contracts();
    let executor = Executor::new(&envelope, &messages, &caller, &contracts);

    let first = Action::VoteBatchConfig(batch_config(0, 1, &[1]));
    let second = Action::VoteBatchConfig(batch_config(5, 1, &[1]));
    let mut outbox = Outbox::default();
    messages.fail_next(1).await;

    let report = executor
        .execute(
            vec![first.clone(), second.clone()],
            &mut outbox,
            ChainHeights::default(),
        )
        .await;

    assert_eq!(report.executed, 0);
    assert_eq!(report.failure.map(|failure| failure.id), Some(first.id()));
    assert!(outbox.get(&second.id()).is_none());
    assert!(messages.take_submitted().await.is_empty());
}

#[tokio::test]
async fn poly_evals_are_sealed_per_receiver() {
    use keyper_common::{EvalEnvelope, crypto::PolyEval};

    let messages = MockMessageSender::default();
    let caller = MockContractCaller::default();
    let envelope = PlainEnvelope::new(Address::from(1));
    let contracts = contracts();
    let executor = Executor::new(&envelope, &messages, &caller, &contracts);

    let eval = PolyEval(5u64.into());
    let action = Action::SendPolyEvals {
        eon: 0,
        evals: vec![(Address::from(2), eval), (Address::from(3), eval)],
    };
    let mut outbox = Outbox::default();
    executor
        .execute(vec![action], &mut outbox, ChainHeights::default())
        .await;

    let submitted = messages.take_submitted().await;
    let [
        KeyperMessage::PolyEval {
            receivers,
            encrypted_evals,
            ..
        },
    ] = submitted.as_slice()
    else {
        panic!("expected one poly eval message, got {submitted:?}");
    };
    assert_eq!(receivers, &vec![Address::from(2), Address::from(3)]);

    let opened = PlainEnvelope::new(Address::from(3))
        .open(&Address::from(1), &encrypted_evals[1])
        .expect("sealed for keyper 3");
    assert_eq!(opened, eval);
    assert!(
        PlainEnvelope::new(Address::from(3))
            .open(&Address::from(1), &encrypted_evals[0])
            .is_err()
    );
}

#[tokio::test]
async fn tx_batch_assigns_sequential_nonces() {
    let caller = MockContractCaller::default();
    caller.state.write().await.nonce = 7;
    let contracts = contracts();

    let gammas = Polynomial::random(1, &mut StdRng::seed_from_u64(1))
        .expect("rng works")
        .gammas();
    let key = EonPublicKey::compute([&gammas]);

    let mut batch = TxBatch::new(&caller, &contracts);
    for eon in 0..3 {
        let call = ContractCall::BroadcastEonKey { eon, key };
        batch.send(call).await.expect("sent");
    }
    batch.wait_mined().await.expect("mined");

    let state = caller.state.read().await;
    assert_eq!(state.nonce_queries, 1);
    assert_eq!(
        state.sent.iter().map(|(_, _, nonce)| *nonce).collect::<Vec<_>>(),
        vec![7, 8, 9]
    );
    assert!(state.sent.iter().all(|(contract, ..)| *contract == contracts.key_broadcast));
    assert_eq!(state.mined.len(), 3);
}
