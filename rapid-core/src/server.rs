// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! The server adapter: translates typed inbound RPC entry points into
//! tasks on a protocol executor, acknowledging the transport either
//! immediately or once the protocol produces a reply.
//!
//! The RPC transport itself (connection handling, wire encoding) is an
//! external collaborator; this module only owns the boundary between
//! "a typed call arrived" and "the membership service ran on the protocol
//! executor and, if applicable, a reply went back out on the transport
//! executor."

use std::{
    sync::{Arc, OnceLock, Weak},
    time::Duration,
};

use async_trait::async_trait;
use rapid_types::{
    ConsensusProposalMessage, JoinMessage, JoinResponse, LinkUpdateMessage, ProbeResponse,
};
use tokio::runtime::Handle;

use crate::{dispatch::DeferredDispatcher, error::DispatchError};

/// The membership service that consumes the output of the watermark buffer
/// and drives the external consensus/join protocol.
///
/// This is an external collaborator from the core's point of view: the
/// server adapter only needs to know how to hand it typed messages and,
/// for join requests, how to get a typed reply back.
#[async_trait]
pub trait MembershipService: Send + Sync + 'static {
    /// Handle a batch of link-update reports. No reply is expected.
    async fn handle_link_updates(&self, updates: Vec<LinkUpdateMessage>);

    /// Handle a consensus proposal. No reply is expected.
    async fn handle_consensus_proposal(&self, proposal: ConsensusProposalMessage);

    /// Handle a phase-1 join request, producing the outcome to reply with.
    async fn handle_join(&self, msg: JoinMessage) -> JoinResponse;

    /// Handle a phase-2 join request, producing the outcome to reply with.
    async fn handle_join_phase2(&self, msg: JoinMessage) -> JoinResponse;

    /// Gracefully stop the membership service as part of adapter shutdown.
    async fn shutdown(&self);
}

/// Adapts typed inbound RPCs onto a protocol executor and a transport/reply
/// executor, deferring dispatch via a [`DeferredDispatcher`] until a
/// [`MembershipService`] is bound.
///
/// Construct behind an `Arc` (via [`ServerAdapter::new`]) since the
/// fire-and-forget entry points spawn tasks that outlive the call that
/// created them. The adapter keeps a [`Weak`] reference to itself (set up
/// via [`Arc::new_cyclic`]) so those spawns can obtain an owned `Arc` from
/// an `&self` method without requiring every caller to hold the adapter by
/// `Arc` and clone it at each call site.
pub struct ServerAdapter<M: MembershipService> {
    self_ref: Weak<Self>,
    dispatcher: DeferredDispatcher,
    membership: OnceLock<Arc<M>>,
    protocol_executor: Handle,
    transport_executor: Handle,
}

impl<M: MembershipService> ServerAdapter<M> {
    /// Construct an adapter that has not yet been bound to a membership
    /// service. `protocol_executor` runs all protocol-level work;
    /// `transport_executor` runs reply callbacks for async RPCs. They may be
    /// the same [`Handle`] for a single-pool deployment.
    pub fn new(protocol_executor: Handle, transport_executor: Handle) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            dispatcher: DeferredDispatcher::new(),
            membership: OnceLock::new(),
            protocol_executor,
            transport_executor,
        })
    }

    /// An owned handle to this adapter, for moving into spawned tasks.
    fn arc(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("ServerAdapter is always held by an Arc for its entire lifetime")
    }

    /// Bind the membership service and release every call held at the
    /// deferred-dispatch boundary.
    ///
    /// # Panics
    /// Panics if called more than once: rebinding the membership service is
    /// a programmer error, not a recoverable condition.
    pub fn set_membership_service(&self, service: Arc<M>) {
        if self.membership.set(service).is_err() {
            panic!("{}", DispatchError::AlreadyBound);
        }
        tracing::info!("membership service bound, releasing deferred calls");
        self.dispatcher.unblock();
    }

    /// Whether a membership service has been bound yet.
    pub fn is_bound(&self) -> bool {
        self.membership.get().is_some()
    }

    /// Handle a `BatchedLinkUpdateMessage` RPC: immediately acknowledges
    /// (returns) and schedules the work on the protocol executor.
    pub fn batched_link_update(&self, updates: Vec<LinkUpdateMessage>) {
        let this = self.arc();
        self.protocol_executor.spawn(async move {
            this.dispatcher.hold().await;
            let service = this.bound_service();
            service.handle_link_updates(updates).await;
        });
    }

    /// Handle a `ConsensusProposal` RPC: immediately acknowledges (returns)
    /// and schedules the work on the protocol executor.
    pub fn consensus_proposal(&self, proposal: ConsensusProposalMessage) {
        let this = self.arc();
        self.protocol_executor.spawn(async move {
            this.dispatcher.hold().await;
            let service = this.bound_service();
            service.handle_consensus_proposal(proposal).await;
        });
    }

    /// Handle a phase-1 `JoinMessage` RPC: runs on the protocol executor,
    /// then replies via the transport executor once the future completes.
    pub async fn join(&self, msg: JoinMessage) -> JoinResponse {
        let this = self.arc();
        let protocol_task = self.protocol_executor.spawn(async move {
            this.dispatcher.hold().await;
            this.bound_service().handle_join(msg).await
        });
        self.reply_on_transport(protocol_task).await
    }

    /// Handle a phase-2 `JoinMessage` RPC, mirroring [`ServerAdapter::join`].
    pub async fn join_phase2(&self, msg: JoinMessage) -> JoinResponse {
        let this = self.arc();
        let protocol_task = self.protocol_executor.spawn(async move {
            this.dispatcher.hold().await;
            this.bound_service().handle_join_phase2(msg).await
        });
        self.reply_on_transport(protocol_task).await
    }

    /// Wait for a protocol-executor join task to complete, then hand the
    /// resulting reply to the transport executor, per the RPC table's
    /// "protocol executor -> transport executor on completion" timing.
    async fn reply_on_transport(
        &self,
        protocol_task: tokio::task::JoinHandle<JoinResponse>,
    ) -> JoinResponse {
        let response = match protocol_task.await {
            Ok(response) => response,
            Err(join_err) => {
                tracing::error!(error = %join_err, "join protocol task failed");
                JoinResponse { accepted: false }
            }
        };

        self.transport_executor
            .spawn(async move { response })
            .await
            .expect("transport executor reply task panicked")
    }

    /// Answer a probe. If the membership service is not yet bound, replies
    /// synchronously with the canned `BOOTSTRAPPING` status rather than
    /// queuing behind the deferred-dispatch boundary, so external failure
    /// detectors can tell "joining" apart from "down".
    pub async fn probe(&self) -> ProbeResponse {
        if !self.is_bound() {
            tracing::debug!("probe received before binding; replying BOOTSTRAPPING");
            return ProbeResponse::BOOTSTRAPPING;
        }
        ProbeResponse::OK
    }

    /// Gracefully stop the membership service. Honors a zero-timeout
    /// graceful window before treating the service as forcibly terminated,
    /// matching the shutdown ordering in the design (transport, then
    /// membership service, then protocol executor — the transport and
    /// executor lifecycles belong to the embedding process).
    pub async fn shutdown(&self) {
        let Some(service) = self.membership.get() else {
            return;
        };
        match tokio::time::timeout(Duration::ZERO, service.shutdown()).await {
            Ok(()) => tracing::info!("membership service shut down gracefully"),
            Err(_elapsed) => {
                tracing::warn!(
                    "membership service shutdown did not complete immediately; \
                     treating as forced termination"
                );
            }
        }
    }

    fn bound_service(&self) -> &Arc<M> {
        self.membership
            .get()
            .expect("deferred dispatcher only releases calls after the membership service is bound")
    }
}
