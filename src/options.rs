/*
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Engine configuration (`spec.md` §6, §4.11 of `SPEC_FULL.md`).

use crate::error::EngineError;

/// Recognized options for [`crate::run`].
///
/// A `0` value for `threads` or `numPart` is a sentinel meaning "pick a
/// default"; use [`Options::validate`] to turn this into a
/// [`ValidatedOptions`] with all defaults resolved.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Number of worker threads bound to the pool. `0` picks
    /// [`std::thread::available_parallelism`].
    pub threads: usize,
    /// Priority quantum for delta-stepping: `Index = val >> step_shift`.
    pub step_shift: u32,
    /// Partition count. `0` picks `4 * threads`.
    pub num_part: u32,
    /// Prefetch lane size.
    pub lane_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            threads: 0,
            step_shift: 1,
            num_part: 0,
            lane_size: 64,
        }
    }
}

/// [`Options`] with every default resolved and validated against a graph of
/// `num_v` vertices.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedOptions {
    pub threads: usize,
    pub step_shift: u32,
    pub num_part: u32,
    pub lane_size: usize,
}

impl Options {
    /// Validates this configuration against a graph with `num_v` vertices,
    /// resolving `0`-sentinels to their defaults.
    ///
    /// Fails fast (`spec.md` §7, "Configuration invalid"): called once at
    /// [`crate::run`] entry, before any thread is spawned or array
    /// allocated.
    pub fn validate(&self, num_v: u32) -> Result<ValidatedOptions, EngineError> {
        if num_v == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "numV == 0".to_string(),
            });
        }

        let threads = if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        };

        let num_part = if self.num_part == 0 {
            (4 * threads) as u32
        } else {
            self.num_part
        };

        if num_part == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "numPart == 0".to_string(),
            });
        }
        if self.lane_size == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "laneSize == 0".to_string(),
            });
        }

        Ok(ValidatedOptions {
            threads,
            step_shift: self.step_shift,
            num_part,
            lane_size: self.lane_size,
        })
    }
}
