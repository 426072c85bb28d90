// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! The watermark buffer: a threshold filter that turns a stream of
//! per-edge link-update reports into batched view-change proposals.
//!
//! This is the "almost-everywhere agreement" trick that lets Rapid scale:
//! by holding a destination's emission open until every other destination
//! that has become "interesting" in the same window also stabilises, a
//! burst of independent failures observed through overlapping monitoring
//! sets coalesces into a single proposal instead of a cascade of
//! single-node reconfigurations.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use rapid_types::{Endpoint, LinkUpdateMessage, Node, Proposal};

use crate::error::{AccountingInvariantViolation, ConfigError, ReceiveError};

/// Minimum value accepted for `K`, the expected per-node monitor fan-in.
pub const MIN_MONITORS: usize = 3;

/// Mutable aggregation state, held behind [`WatermarkBuffer`]'s single
/// exclusive region. There is no atomic split between the counters and the
/// maps: every meaningful transition happens under the same lock, so a
/// plain struct is sufficient.
struct WatermarkState {
    /// Distinct reporters seen so far for each destination.
    reports_per_host: HashMap<Endpoint, HashSet<Endpoint>>,
    /// Destinations that crossed `H` in the current batch but have not yet
    /// been emitted.
    proposal: Vec<Node>,
    /// Count of destinations currently in the half-open band `[L, H)`.
    updates_in_progress: usize,
    /// Monotonic count of proposals emitted so far.
    proposal_count: u64,
}

impl WatermarkState {
    fn new() -> Self {
        Self {
            reports_per_host: HashMap::new(),
            proposal: Vec::new(),
            updates_in_progress: 0,
            proposal_count: 0,
        }
    }
}

/// Aggregates per-destination edge reports into batched view-change
/// proposals, obeying the two-threshold (`L`, `H`) almost-everywhere
/// agreement rule described in the module docs.
///
/// A single [`WatermarkBuffer::receive`] call holds the buffer's exclusive
/// region for its entire duration, so all state transitions across
/// concurrently submitted calls are linearised.
pub struct WatermarkBuffer {
    /// Expected number of monitors per node; upper bound on report-set size.
    k: usize,
    /// High (stability) threshold.
    h: usize,
    /// Low (suspicion) threshold.
    l: usize,
    state: Mutex<WatermarkState>,
}

impl WatermarkBuffer {
    /// Construct a buffer with the given `(K, H, L)` triple.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `K < MIN_MONITORS`, if `H > K`, or if
    /// `L > H`. These are programmer errors in the enclosing membership
    /// service and are rejected eagerly rather than tolerated at runtime.
    pub fn new(k: usize, h: usize, l: usize) -> Result<Self, ConfigError> {
        if k < MIN_MONITORS {
            return Err(ConfigError::KTooSmall(k));
        }
        if h > k {
            return Err(ConfigError::HExceedsK { h, k });
        }
        if l > h {
            return Err(ConfigError::LExceedsH { l, h });
        }
        Ok(Self {
            k,
            h,
            l,
            state: Mutex::new(WatermarkState::new()),
        })
    }

    /// The expected per-node monitor fan-in this buffer was constructed with.
    pub fn k(&self) -> usize {
        self.k
    }

    /// The high (stability) threshold this buffer was constructed with.
    pub fn h(&self) -> usize {
        self.h
    }

    /// The low (suspicion) threshold this buffer was constructed with.
    pub fn l(&self) -> usize {
        self.l
    }

    /// Count of proposals emitted so far.
    pub fn num_proposals(&self) -> u64 {
        self.state.lock().proposal_count
    }

    /// Record a link-update report, returning a batched proposal if one
    /// became ready as a result.
    ///
    /// The returned proposal is empty in the common case; it is non-empty
    /// exactly when `dst`'s report set crossed `H` and no other destination
    /// was still sitting in the `[L, H)` band at that moment.
    ///
    /// # Panics
    /// Panics if an accounting-invariant violation (`E1`) is detected: a
    /// destination in the pending proposal had no report set to clear on
    /// emission. This indicates a bug in the buffer itself, not a caller
    /// error, so it is not representable as a `Result`.
    #[tracing::instrument(level = "debug", skip(self, msg), fields(src = %msg.src, dst = %msg.dst))]
    pub fn receive(&self, msg: LinkUpdateMessage) -> Result<Proposal, ReceiveError> {
        let LinkUpdateMessage { src, dst } = msg;
        let mut state = self.state.lock();

        let reporters = state.reports_per_host.entry(dst.clone()).or_default();
        if !reporters.insert(src) {
            tracing::debug!(%dst, "duplicate reporter, no transition");
            return Ok(Proposal::empty());
        }
        let n = reporters.len();
        tracing::debug!(%dst, reporters = n, "accepted link-update report");

        // Entering the band happens on the report that brings the count to L,
        // except when L == 0: a fresh destination's count is never 0 after a
        // report, so the band is entered on the first report instead.
        if n == self.l.max(1) {
            state.updates_in_progress += 1;
        }

        let mut crossed_high = false;
        if n == self.h {
            state.proposal.push(Node(dst));
            state.updates_in_progress -= 1;
            crossed_high = true;
        }

        if crossed_high && state.updates_in_progress == 0 {
            return Ok(self.emit(&mut state));
        }
        Ok(Proposal::empty())
    }

    /// Drain the pending proposal, clearing every emitted destination's
    /// report set and bumping `proposal_count`.
    fn emit(&self, state: &mut WatermarkState) -> Proposal {
        state.proposal_count += 1;
        let nodes = std::mem::take(&mut state.proposal);

        for node in &nodes {
            match state.reports_per_host.get_mut(node.endpoint()) {
                Some(reporters) => reporters.clear(),
                None => panic!(
                    "{}",
                    AccountingInvariantViolation {
                        destination: node.endpoint().to_string(),
                    }
                ),
            }
        }

        tracing::info!(
            proposal_count = state.proposal_count,
            destinations = nodes.len(),
            "emitting view-change proposal"
        );
        Proposal::from_ordered(nodes)
    }
}
