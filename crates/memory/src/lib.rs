// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Shuffle memory management.
//!
//! This crate provides:
//! - [`MemoryArbiter`]: Fair-share accounting of a bounded shuffle memory pool
//!   across concurrently running tasks
//! - [`task`]: Task identity resolution for callers of the arbiter
//! - [`ShuffleMemoryOptions`]: Pool and page sizing configuration

mod arbiter;
mod byte_count;
mod error;
pub mod metric_definitions;
mod options;
pub mod task;

pub use arbiter::MemoryArbiter;
pub use error::{MemoryError, OptionsError};
pub use options::{
    ReleasePolicy, ShuffleMemoryOptions, ShuffleMemoryOptionsBuilder,
    ShuffleMemoryOptionsBuilderError, default_page_size,
};
pub use task::{TaskId, TaskResolver, ThreadLocalResolver};
