// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! Data model shared by the watermark buffer, the deferred dispatcher and the
//! server adapter. Nothing in this crate talks to a socket: wire encoding and
//! the RPC transport that carries these values are external collaborators.

use std::fmt;

use derive_more::{Deref, From};

/// The stable network identity of a cluster node (host + port pair).
///
/// Opaque to the aggregation core beyond equality and hashing: the core never
/// interprets the host or port, it only uses `Endpoint` as a map/set key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    /// Hostname or address of the node.
    pub host: String,
    /// Port the node's RPC transport listens on.
    pub port: u16,
}

impl Endpoint {
    /// Construct an endpoint from a host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A report that `src` observed a status change on the edge to `dst`.
///
/// Only `src` and `dst` are semantically consumed by the watermark buffer;
/// the message carries no other fields the core relies on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkUpdateMessage {
    /// The endpoint that made the observation.
    pub src: Endpoint,
    /// The endpoint the observation is about.
    pub dst: Endpoint,
}

impl LinkUpdateMessage {
    /// Construct a report of `src` observing a status change on the edge to `dst`.
    pub fn new(src: Endpoint, dst: Endpoint) -> Self {
        Self { src, dst }
    }
}

/// A destination endpoint destined to appear in a [`Proposal`].
///
/// `Node` wraps a single endpoint rather than exposing the endpoint directly
/// so that a future protocol version can attach more state without breaking
/// the [`Proposal`] type; today equality and ordering are purely by endpoint.
#[derive(Clone, Debug, PartialEq, Eq, From)]
pub struct Node(pub Endpoint);

impl Node {
    /// The endpoint this node wraps.
    pub fn endpoint(&self) -> &Endpoint {
        &self.0
    }
}

/// An ordered, immutable batch of [`Node`]s emitted atomically by the
/// watermark buffer.
///
/// Order reflects the order in which destinations crossed the high
/// threshold within the batch; there is no secondary sort. An empty
/// proposal (the common case) means no batch was ready to emit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref)]
pub struct Proposal(Vec<Node>);

impl Proposal {
    /// The empty proposal, returned on every `receive` call that does not
    /// complete a batch.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Build a proposal from nodes already in crossing order.
    pub fn from_ordered(nodes: Vec<Node>) -> Self {
        Self(nodes)
    }

    /// Whether this proposal carries any destinations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the destinations in crossing order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.iter()
    }
}

impl IntoIterator for Proposal {
    type Item = Node;
    type IntoIter = std::vec::IntoIter<Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Health status reported in a [`ProbeResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// The membership service is bound and serving normally.
    Ok,
    /// The transport is open but the membership service has not been bound
    /// yet; the node is still joining the cluster.
    Bootstrapping,
}

/// Reply to a probe RPC, built once and reused as a protocol-level constant
/// for the pre-binding case (see [`NodeStatus::Bootstrapping`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProbeResponse {
    /// Health status of the node answering the probe.
    pub status: NodeStatus,
}

impl ProbeResponse {
    /// The canned response returned to every probe that arrives before the
    /// membership service is bound.
    pub const BOOTSTRAPPING: ProbeResponse = ProbeResponse {
        status: NodeStatus::Bootstrapping,
    };

    /// The response returned to a probe once the membership service is bound.
    pub const OK: ProbeResponse = ProbeResponse {
        status: NodeStatus::Ok,
    };
}

/// A consensus-protocol proposal forwarded to the membership service.
///
/// The consensus/join protocol that consumes this is an external
/// collaborator; the core only needs enough shape to route the message to
/// the right executor and, eventually, the right membership-service method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsensusProposalMessage {
    /// The configuration epoch (view number) this proposal concerns.
    pub view: u64,
}

/// Phase 1 or phase 2 join request from a candidate node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinMessage {
    /// The endpoint asking to join the cluster.
    pub candidate: Endpoint,
}

/// Outcome of a join request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinResponse {
    /// Whether the candidate was accepted.
    pub accepted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_equality_is_by_endpoint() {
        let a = Node(Endpoint::new("10.0.0.1", 7000));
        let b = Node(Endpoint::new("10.0.0.1", 7000));
        assert_eq!(a, b);
    }

    #[test]
    fn proposal_preserves_insertion_order() {
        let nodes = vec![
            Node(Endpoint::new("a", 1)),
            Node(Endpoint::new("b", 2)),
        ];
        let proposal = Proposal::from_ordered(nodes.clone());
        assert_eq!(proposal.iter().cloned().collect::<Vec<_>>(), nodes);
    }

    #[test]
    fn empty_proposal_has_no_nodes() {
        assert!(Proposal::empty().is_empty());
    }
}
