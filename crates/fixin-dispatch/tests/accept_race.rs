//! Concurrency properties of acceptance and cancellation.

mod common;

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Barrier;

use common::{credits, harness};
use fixin_dispatch::DispatchError;
use fixin_state::{Actor, BucketKind, LedgerReason};

const CONTENDERS: usize = 16;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exactly_one_of_many_concurrent_accepts_wins() {
    let h = harness();
    let agents: Vec<_> = (0..CONTENDERS).map(|_| h.agent(2000)).collect();
    let id = h.create().await;

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let mut handles = Vec::new();
    for agent in &agents {
        let engine = h.engine.clone();
        let barrier = barrier.clone();
        let agent = *agent;
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            (agent, engine.accept_request(agent, id).await)
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        let (agent, result) = handle.await.unwrap();
        match result {
            Ok(_) => winners.push(agent),
            Err(DispatchError::RequestUnavailable(_)) => {}
            Err(other) => panic!("unexpected accept outcome: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1);
    let winner = winners[0];
    assert_eq!(h.store.bucket_of(id), Some(BucketKind::Assigned));

    let debits: Vec<_> = h
        .store
        .ledger_for_request(id)
        .into_iter()
        .filter(|e| e.reason == LedgerReason::AcceptanceFee)
        .collect();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].agent_id, winner);

    for agent in agents {
        let expected = if agent == winner { 1500 } else { 2000 };
        assert_eq!(h.store.balance(agent), Some(credits(expected)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_racing_client_cancel_nets_to_zero() {
    for _ in 0..20 {
        let h = harness();
        let agent = h.agent(2000);
        let id = h.create().await;

        let barrier = Arc::new(Barrier::new(2));
        let accept = {
            let engine = h.engine.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                engine.accept_request(agent, id).await
            })
        };
        let cancel = {
            let engine = h.engine.clone();
            let barrier = barrier.clone();
            let client = h.client;
            tokio::spawn(async move {
                barrier.wait().await;
                engine
                    .cancel_request(Actor::Client(client), id, "changed my mind")
                    .await
            })
        };

        let accepted = accept.await.unwrap();
        let cancelled = cancel.await.unwrap();

        assert!(cancelled.is_ok(), "client cancel must win or follow: {cancelled:?}");
        assert_eq!(h.store.bucket_of(id), Some(BucketKind::Cancelled));
        assert_eq!(h.store.balance(agent), Some(credits(2000)));

        let net: Decimal = h
            .store
            .ledger_for_request(id)
            .iter()
            .map(|e| e.amount)
            .sum();
        assert_eq!(net, Decimal::ZERO);
        if accepted.is_ok() {
            assert_eq!(h.store.ledger_for_request(id).len(), 2);
        } else {
            assert!(h.store.ledger_for_request(id).is_empty());
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_requests_accept_in_parallel() {
    let h = harness();
    let requests: Vec<_> = {
        let mut v = Vec::new();
        for _ in 0..8 {
            v.push(h.create().await);
        }
        v
    };
    let agents: Vec<_> = requests.iter().map(|_| h.agent(2000)).collect();

    let mut handles = Vec::new();
    for (agent, id) in agents.iter().zip(&requests) {
        let engine = h.engine.clone();
        let (agent, id) = (*agent, *id);
        handles.push(tokio::spawn(async move { engine.accept_request(agent, id).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    for id in requests {
        assert_eq!(h.store.bucket_of(id), Some(BucketKind::Assigned));
    }
}
