/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Error types for the engine.
//!
//! The engine distinguishes two fatal error kinds (see `spec.md` §7):
//! configuration errors, caught at [`crate::run`] entry before any thread is
//! spawned, and allocation failures, which are fatal and unrecoverable.
//! Capability-contract violations (a non-monotone `gatherFunc`) are
//! deliberately not represented here: they are undefined behavior, not a
//! detected error condition.

use thiserror::Error;

/// Errors that can terminate a call to [`crate::run`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine was asked to run with an invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the violated precondition.
        reason: String,
    },

    /// A backing array or chunk pool could not be allocated.
    ///
    /// This is fatal: the engine does not retry or degrade gracefully, per
    /// the propagation policy in `spec.md` §7.
    #[error("allocation failure while building {what}")]
    Allocation {
        /// What was being allocated when the failure occurred.
        what: &'static str,
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
