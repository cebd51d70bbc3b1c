// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Useful test utilities for shuffle crates. Import them with:
//!
//! ```rust
//! use shuffle_test_util::{assert, assert_eq, assert_ne};
//! ```
//!
//! Note: You cannot import them with a glob import, as the compiler won't be able to distinguish our imports and the stdlib imports.

use std::time::{Duration, Instant};

/// How long [`assert_blocked!`] waits by default before checking a thread.
pub const BLOCKED_GRACE_PERIOD: Duration = Duration::from_millis(100);

/// Macro to assert a thread is still blocked.
///
/// Accepts anything with an `is_finished()` method, i.e. both
/// [`std::thread::JoinHandle`] and [`std::thread::ScopedJoinHandle`].
///
/// Note: this check is based on a timeout, hence based on the context it might not be enough to
/// prove the thread would block forever.
#[macro_export]
macro_rules! assert_blocked {
    ($handle:expr) => {
        $crate::assert_blocked!($handle, $crate::BLOCKED_GRACE_PERIOD)
    };
    ($handle:expr, $grace:expr) => {
        ::std::thread::sleep($grace);
        ::std::assert!(
            !$handle.is_finished(),
            "thread was expected to still be blocked"
        );
    };
}

/// Polls `condition` until it holds or `timeout` elapses. Returns whether it held.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

// A couple of useful re-exports
pub use assert2::{assert, check, let_assert};
pub use pretty_assertions::{assert_eq, assert_ne};
