// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::num::NonZeroUsize;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::OptionsError;
use crate::byte_count::ByteCount;

const MIN_PAGE_SIZE: u64 = 1024 * 1024; // 1MiB
const MAX_PAGE_SIZE: u64 = 64 * MIN_PAGE_SIZE; // 64MiB
const PAGE_SIZE_SAFETY_FACTOR: u64 = 16;

/// What to do when a task releases more memory than it was granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleasePolicy {
    /// Release the whole grant and log a warning.
    #[default]
    Clamp,
    /// Reject the release with [`MemoryError::ReleaseExceedsGrant`](crate::MemoryError::ReleaseExceedsGrant).
    Strict,
}

/// # Shuffle memory options
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case", default)]
#[builder(default)]
pub struct ShuffleMemoryOptions {
    /// # Process memory
    ///
    /// Memory the whole process is allowed to use. The shuffle pool is carved out of it using
    /// `memory-fraction` and `safety-fraction` unless `pool-size` is set.
    #[serde_as(as = "ByteCount")]
    pub process_memory: ByteSize,

    /// # Memory fraction
    ///
    /// Fraction of the process memory dedicated to shuffle buffers.
    pub memory_fraction: f64,

    /// # Safety fraction
    ///
    /// Applied on top of the memory fraction to leave headroom for estimation errors.
    pub safety_fraction: f64,

    /// # Pool size
    ///
    /// Explicit size of the shuffle memory pool. Takes precedence over the fractions.
    #[serde_as(as = "Option<ByteCount>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub pool_size: Option<ByteSize>,

    /// # Page size
    ///
    /// Size of the pages consumers should allocate their buffers in. Derived from the pool size
    /// and the number of cores if unset.
    #[serde_as(as = "Option<ByteCount>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub page_size: Option<ByteSize>,

    /// # Number of cores
    ///
    /// Number of concurrently running tasks to expect when deriving the page size. Defaults to
    /// the available parallelism of the machine.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(setter(strip_option))]
    pub num_cores: Option<usize>,

    /// # Release policy
    ///
    /// `clamp` releases the whole grant when a task gives back more than it holds, `strict`
    /// rejects such a release with an error.
    pub release_policy: ReleasePolicy,
}

impl ShuffleMemoryOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        check_fraction("memory-fraction", self.memory_fraction)?;
        check_fraction("safety-fraction", self.safety_fraction)?;
        if self.num_cores == Some(0) {
            return Err(OptionsError::ZeroCores);
        }
        if self.page_size.is_some_and(|size| size.as_u64() == 0) {
            return Err(OptionsError::ZeroPageSize);
        }
        Ok(())
    }

    /// Size of the shuffle memory pool in bytes.
    pub fn pool_size(&self) -> u64 {
        match self.pool_size {
            Some(size) => size.as_u64(),
            None => {
                (self.process_memory.as_u64() as f64 * self.memory_fraction * self.safety_fraction)
                    as u64
            }
        }
    }

    pub fn num_cores(&self) -> NonZeroUsize {
        self.num_cores
            .and_then(NonZeroUsize::new)
            .or_else(|| std::thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN)
    }

    /// Page size in bytes, see [`default_page_size`] for the derived value.
    pub fn page_size(&self) -> u64 {
        match self.page_size {
            Some(size) => size.as_u64(),
            None => default_page_size(self.pool_size(), self.num_cores()),
        }
    }
}

impl Default for ShuffleMemoryOptions {
    fn default() -> Self {
        Self {
            process_memory: ByteSize::gib(1),
            memory_fraction: 0.2,
            safety_fraction: 0.8,
            pool_size: None,
            page_size: None,
            num_cores: None,
            release_policy: ReleasePolicy::default(),
        }
    }
}

/// A page size that lets every core hold a handful of pages at once without the pool
/// fragmenting into tiny pages: `pool / cores / 16` rounded up to a power of two and kept
/// within [1MiB, 64MiB].
pub fn default_page_size(pool_size: u64, num_cores: NonZeroUsize) -> u64 {
    let per_core = pool_size / num_cores.get() as u64 / PAGE_SIZE_SAFETY_FACTOR;
    per_core
        .checked_next_power_of_two()
        .unwrap_or(MAX_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

fn check_fraction(name: &'static str, value: f64) -> Result<(), OptionsError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(OptionsError::FractionOutOfRange { name, value })
    }
}
