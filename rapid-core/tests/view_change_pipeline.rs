// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! End-to-end coverage across the watermark buffer, the deferred dispatcher
//! and the server adapter, exercised only through `rapid-core`'s public API.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use rapid_core::{watermark::WatermarkBuffer, MembershipService, ServerAdapter};
use rapid_types::{ConsensusProposalMessage, Endpoint, JoinMessage, JoinResponse, LinkUpdateMessage};
use tokio::{runtime::Handle, time::Duration};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct CountingMembership {
    link_updates: AtomicUsize,
    proposals_forwarded: AtomicUsize,
}

impl CountingMembership {
    fn new() -> Self {
        Self {
            link_updates: AtomicUsize::new(0),
            proposals_forwarded: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MembershipService for CountingMembership {
    async fn handle_link_updates(&self, _updates: Vec<LinkUpdateMessage>) {
        self.link_updates.fetch_add(1, Ordering::SeqCst);
    }

    async fn handle_consensus_proposal(&self, _proposal: ConsensusProposalMessage) {
        self.proposals_forwarded.fetch_add(1, Ordering::SeqCst);
    }

    async fn handle_join(&self, msg: JoinMessage) -> JoinResponse {
        JoinResponse {
            accepted: msg.candidate.port != 0,
        }
    }

    async fn handle_join_phase2(&self, msg: JoinMessage) -> JoinResponse {
        JoinResponse {
            accepted: msg.candidate.port != 0,
        }
    }

    async fn shutdown(&self) {}
}

/// A burst of independent-looking reports against two destinations,
/// observed through overlapping monitoring sets, coalesces into a single
/// proposal once both destinations stabilise. Submitted sequentially from
/// one task; see `watermark::tests::concurrent_reports_from_multiple_tasks_serialize_cleanly`
/// for the multi-task case.
#[test]
fn watermark_buffer_coalesces_an_overlapping_failure_burst() {
    init_tracing();
    let buffer = WatermarkBuffer::new(10, 3, 2).expect("K=10, H=3, L=2 is valid");

    let reporters = ["m1", "m2", "m3"];
    let destinations = ["node-a", "node-b"];

    let mut last = rapid_types::Proposal::empty();
    for dst in destinations {
        for src in reporters {
            let msg = LinkUpdateMessage::new(Endpoint::new(src, 9000), Endpoint::new(dst, 9100));
            last = buffer.receive(msg).expect("receive is total on valid input");
        }
    }

    assert_eq!(last.iter().count(), 2);
    assert_eq!(buffer.num_proposals(), 1);
}

/// RPCs that arrive before the membership service is bound are held at the
/// deferred-dispatch boundary and delivered once binding completes; RPCs
/// that need a reply (join) still round-trip correctly afterwards.
#[tokio::test]
async fn server_adapter_defers_rpcs_until_bound_then_delivers_them() {
    init_tracing();
    let handle = Handle::current();
    let adapter = ServerAdapter::<CountingMembership>::new(handle.clone(), handle);

    assert!(!adapter.is_bound());
    adapter.batched_link_update(vec![LinkUpdateMessage::new(
        Endpoint::new("m1", 9000),
        Endpoint::new("node-a", 9100),
    )]);
    adapter.consensus_proposal(ConsensusProposalMessage { view: 7 });

    tokio::time::sleep(Duration::from_millis(20)).await;

    let membership = Arc::new(CountingMembership::new());
    adapter.set_membership_service(Arc::clone(&membership));
    assert!(adapter.is_bound());

    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            if membership.link_updates.load(Ordering::SeqCst) == 1
                && membership.proposals_forwarded.load(Ordering::SeqCst) == 1
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both deferred calls should be delivered after binding");

    let accepted = adapter
        .join(JoinMessage {
            candidate: Endpoint::new("candidate", 9200),
        })
        .await;
    assert!(accepted.accepted);

    let rejected = adapter
        .join_phase2(JoinMessage {
            candidate: Endpoint::new("candidate", 0),
        })
        .await;
    assert!(!rejected.accepted);

    adapter.shutdown().await;
}
