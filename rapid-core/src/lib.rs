// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! The view-change aggregation core for a Rapid-style group-membership
//! service: a threshold filter that turns per-edge link-update reports into
//! batched proposals ([`watermark`]), a deferred-dispatch boundary that
//! holds inbound RPCs until a membership service is bound ([`dispatch`]),
//! and the adapter that ties both to a pair of executors and a typed
//! [`server::MembershipService`] boundary ([`server`]).
//!
//! Wire encoding, the RPC transport and the consensus/join protocol itself
//! are external collaborators; this crate only owns the aggregation and
//! dispatch logic between them.

pub mod dispatch;
pub mod error;
pub mod server;
pub mod watermark;

pub use dispatch::DeferredDispatcher;
pub use server::{MembershipService, ServerAdapter};
pub use watermark::WatermarkBuffer;
