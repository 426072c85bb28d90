// Copyright (c) 2021-2024 Espresso Systems (espressosys.com)
// This file is part of the HotShot repository.

// You should have received a copy of the MIT License
// along with the HotShot repository. If not, see <https://mit-license.org/>.

//! Error types for the watermark buffer, the deferred dispatcher and the
//! server adapter.
//!
//! Configuration mistakes are recoverable `Result`s surfaced at
//! construction time. Accounting-invariant violations and double-binding
//! are programmer errors: per the design, they panic with a descriptive
//! diagnostic rather than propagate, since there is no sensible recovery
//! inside the core itself.

use thiserror::Error;

use crate::watermark::MIN_MONITORS;

/// Rejected `(K, H, L)` configuration for a [`crate::watermark::WatermarkBuffer`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `K` fell below [`MIN_MONITORS`].
    #[error("K must be at least {MIN_MONITORS} monitors per node, got {0}")]
    KTooSmall(usize),
    /// The high threshold exceeded the monitor fan-in bound.
    #[error("H ({h}) must not exceed K ({k})")]
    HExceedsK {
        /// Offending high threshold.
        h: usize,
        /// Configured fan-in bound.
        k: usize,
    },
    /// The low threshold exceeded the high threshold.
    #[error("L ({l}) must not exceed H ({h})")]
    LExceedsH {
        /// Offending low threshold.
        l: usize,
        /// Configured high threshold.
        h: usize,
    },
}

/// Reserved for future rejections of [`crate::watermark::WatermarkBuffer::receive`].
///
/// Uninhabited today: the operation is total on valid, non-null input, per
/// the spec. Kept as a named error type (rather than changing the return
/// type later) so the signature is forward-compatible with a future
/// rejection path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {}

/// Diagnostic for an accounting-invariant violation (`E1`): a destination
/// present in the pending proposal had no report set to clear on emission.
///
/// This can only happen if the watermark buffer's own bookkeeping is wrong;
/// it is not a caller error, so it is carried as a panic payload rather than
/// a `Result` variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "accounting invariant violated: destination {destination} was part of an emitted proposal \
     but had no report set to clear"
)]
pub struct AccountingInvariantViolation {
    /// The destination whose report set was unexpectedly missing.
    pub destination: String,
}

/// Diagnostics for programmer errors at the [`crate::server::ServerAdapter`]
/// boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The membership service was bound more than once.
    #[error("membership service already bound: setMembershipService may only be called once")]
    AlreadyBound,
}
