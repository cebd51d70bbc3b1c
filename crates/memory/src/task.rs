// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Task identity as seen by the arbiter.
//!
//! The arbiter never learns about task lifecycles; it only asks a
//! [`TaskResolver`] which task the current call belongs to. The default
//! resolver reads a thread-local slot that the surrounding engine fills with
//! [`enter`] or [`scope`] before running a task's body on a worker thread.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TASK_ID: AtomicU64 = const { AtomicU64::new(0) };

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskId>> = const { Cell::new(None) };
}

#[derive(
    Clone,
    Debug,
    Copy,
    Hash,
    PartialEq,
    Eq,
    Ord,
    PartialOrd,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
pub struct TaskId(u64);

impl TaskId {
    /// Allocates a process-wide unique id. Ids are never reused.
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Resolves the task on whose behalf the current call is made.
///
/// Must answer synchronously. Returning `None` means the call happens outside
/// of any task, which the arbiter reports as
/// [`MemoryError::UnidentifiedCaller`](crate::MemoryError::UnidentifiedCaller).
pub trait TaskResolver: Send + Sync {
    fn current_task_id(&self) -> Option<TaskId>;
}

/// Reads the task installed on the calling thread via [`enter`] or [`scope`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLocalResolver;

impl TaskResolver for ThreadLocalResolver {
    fn current_task_id(&self) -> Option<TaskId> {
        current_task_id()
    }
}

impl<F> TaskResolver for F
where
    F: Fn() -> Option<TaskId> + Send + Sync,
{
    fn current_task_id(&self) -> Option<TaskId> {
        self()
    }
}

/// The task running on this thread. This returns None if we are not in the scope
/// of a task.
pub fn current_task_id() -> Option<TaskId> {
    CURRENT_TASK.get()
}

/// Makes `task_id` the current task of this thread until the guard is dropped.
///
/// Guards nest: dropping one restores whatever task was current before it.
#[must_use = "the task is only current while the guard is alive"]
pub fn enter(task_id: TaskId) -> TaskGuard {
    let previous = CURRENT_TASK.replace(Some(task_id));
    TaskGuard {
        previous,
        _not_send: std::marker::PhantomData,
    }
}

/// Runs `f` with `task_id` as the current task of this thread.
pub fn scope<F, R>(task_id: TaskId, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = enter(task_id);
    f()
}

/// Restores the previously current task on drop, including during unwinding.
#[derive(Debug)]
pub struct TaskGuard {
    previous: Option<TaskId>,
    // the guard manipulates a thread-local and must be dropped on the same thread
    _not_send: std::marker::PhantomData<*const ()>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        CURRENT_TASK.set(self.previous);
    }
}
