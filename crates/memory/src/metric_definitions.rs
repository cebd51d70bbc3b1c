// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{Unit, describe_counter, describe_gauge};

pub const SHUFFLE_MEMORY_GRANTED: &str = "shuffle.memory.granted.bytes";
pub const SHUFFLE_MEMORY_ACTIVE_TASKS: &str = "shuffle.memory.active_tasks";
pub const SHUFFLE_MEMORY_WAITING_THREADS: &str = "shuffle.memory.waiting_threads";

pub const SHUFFLE_MEMORY_ACQUIRE_BLOCKED: &str = "shuffle.memory.acquire_blocked.total";
pub const SHUFFLE_MEMORY_RELEASE_EXCEEDS_GRANT: &str =
    "shuffle.memory.release_exceeds_grant.total";

pub fn describe_metrics() {
    describe_gauge!(
        SHUFFLE_MEMORY_GRANTED,
        Unit::Bytes,
        "Bytes of the shuffle memory pool currently granted to tasks"
    );
    describe_gauge!(
        SHUFFLE_MEMORY_ACTIVE_TASKS,
        Unit::Count,
        "Tasks holding a grant or waiting for one"
    );
    describe_gauge!(
        SHUFFLE_MEMORY_WAITING_THREADS,
        Unit::Count,
        "Threads blocked until they reach half of their fair share"
    );
    describe_counter!(
        SHUFFLE_MEMORY_ACQUIRE_BLOCKED,
        Unit::Count,
        "Number of times an acquire call had to wait for memory"
    );
    describe_counter!(
        SHUFFLE_MEMORY_RELEASE_EXCEEDS_GRANT,
        Unit::Count,
        "Number of releases that exceeded the task's grant and were clamped"
    );
}
