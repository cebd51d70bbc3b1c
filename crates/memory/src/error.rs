// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::TaskId;

/// Failure of a single arbiter call. Running out of pool memory is not an
/// error; it shows up as a grant smaller than the request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("invalid memory request of {requested} bytes, byte counts must not be negative")]
    InvalidRequest { requested: i64 },
    #[error("memory operation called outside of a task, caller could not be identified")]
    UnidentifiedCaller,
    #[error("task {task} released {requested} bytes but only holds {granted}")]
    ReleaseExceedsGrant {
        task: TaskId,
        requested: u64,
        granted: u64,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptionsError {
    #[error("{name} must be within (0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },
    #[error("num-cores must be positive")]
    ZeroCores,
    #[error("page-size must be positive")]
    ZeroPageSize,
}
