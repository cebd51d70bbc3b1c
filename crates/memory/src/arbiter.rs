// Copyright (c) 2023 - 2026 Shuffle Developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Fair-share arbitration of the shuffle memory pool.
//!
//! # Policy
//!
//! With `N` active tasks (tasks holding a grant or blocked waiting for one), every task may hold
//! up to `1/N` of the pool. A task that cannot be fully served and would end up below `1/2N`
//! blocks until other tasks give memory back; above that floor it receives a partial grant
//! (possibly zero) straight away and is expected to spill.
//!
//! Partial grants are never recorded while a caller is blocked. Every wake-up re-evaluates the
//! request from scratch since `N` may have changed in the meantime.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Once;

use bytesize::ByteSize;
use metrics::{counter, gauge};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};
use triomphe::Arc;

use crate::metric_definitions::{
    self, SHUFFLE_MEMORY_ACQUIRE_BLOCKED, SHUFFLE_MEMORY_ACTIVE_TASKS, SHUFFLE_MEMORY_GRANTED,
    SHUFFLE_MEMORY_RELEASE_EXCEEDS_GRANT, SHUFFLE_MEMORY_WAITING_THREADS,
};
use crate::options::default_page_size;
use crate::task::{self, TaskId, TaskResolver, ThreadLocalResolver};
use crate::{MemoryError, OptionsError, ReleasePolicy, ShuffleMemoryOptions};

static DESCRIBE_METRICS: Once = Once::new();

/// Arbitrates a fixed pool of shuffle memory between concurrently running tasks.
///
/// Cheaply cloneable (uses `Arc` internally). The arbiter only does accounting, it never
/// allocates the memory it hands out.
pub struct MemoryArbiter<R = ThreadLocalResolver> {
    inner: Arc<Inner<R>>,
}

struct Inner<R> {
    max_memory: u64,
    page_size: u64,
    release_policy: ReleasePolicy,
    resolver: R,
    state: Mutex<PoolState>,
    /// Signalled on every release, waiters re-check their fair share.
    memory_freed: Condvar,
}

#[derive(Debug, Default)]
struct PoolState {
    /// Never contains zero-valued entries.
    granted: HashMap<TaskId, u64>,
    total_granted: u64,
    /// Number of threads blocked in acquire, per task.
    waiting: HashMap<TaskId, usize>,
    /// Threads still blocked on behalf of tasks that were cleaned up. They leave without a
    /// grant on their next wake-up.
    cancelled: HashMap<TaskId, Cancelled>,
    /// Number of cleanups that cancelled blocked threads so far.
    cleanups: u64,
}

#[derive(Debug)]
struct Cancelled {
    threads: usize,
    /// Latest cleanup that cancelled threads of the task.
    cleanup: u64,
}

enum Decision {
    Grant(u64),
    Wait { min_per_task: u64 },
}

impl PoolState {
    fn grant_of(&self, task: TaskId) -> u64 {
        self.granted.get(&task).copied().unwrap_or(0)
    }

    fn num_active_tasks(&self) -> usize {
        let waiting_without_grant = self
            .waiting
            .keys()
            .filter(|task| !self.granted.contains_key(task))
            .count();
        self.granted.len() + waiting_without_grant
    }

    /// Active tasks from the point of view of `caller`, who is about to become active.
    fn num_active_tasks_with(&self, caller: TaskId) -> u64 {
        let is_new = !self.granted.contains_key(&caller) && !self.waiting.contains_key(&caller);
        (self.num_active_tasks() + usize::from(is_new)) as u64
    }

    fn num_waiting(&self) -> usize {
        self.waiting.values().sum()
    }

    fn evaluate(&self, task: TaskId, num_bytes: u64, max_memory: u64) -> Decision {
        let num_active_tasks = self.num_active_tasks_with(task);
        let cur_mem = self.grant_of(task);
        let max_per_task = max_memory / num_active_tasks;
        let min_per_task = max_memory / (2 * num_active_tasks);
        // the fair share can shrink below what older tasks still hold, so the pool may have
        // less left than the share suggests
        let free_memory = max_memory.saturating_sub(self.total_granted);

        let to_grant = num_bytes
            .min(max_per_task.saturating_sub(cur_mem))
            .min(free_memory);

        if to_grant < num_bytes && cur_mem + to_grant < min_per_task {
            Decision::Wait { min_per_task }
        } else {
            Decision::Grant(to_grant)
        }
    }

    fn add(&mut self, task: TaskId, amount: u64) {
        if amount > 0 {
            *self.granted.entry(task).or_insert(0) += amount;
            self.total_granted += amount;
        }
    }

    /// Caller guarantees `amount <= grant_of(task)`.
    fn subtract(&mut self, task: TaskId, amount: u64) {
        if let Some(cur_mem) = self.granted.get_mut(&task) {
            *cur_mem -= amount;
            self.total_granted -= amount;
            if *cur_mem == 0 {
                self.granted.remove(&task);
            }
        }
    }

    fn remove(&mut self, task: TaskId) -> u64 {
        let released = self.granted.remove(&task).unwrap_or(0);
        self.total_granted -= released;
        released
    }

    fn start_waiting(&mut self, task: TaskId) {
        *self.waiting.entry(task).or_insert(0) += 1;
    }

    fn stop_waiting(&mut self, task: TaskId) {
        if let Some(count) = self.waiting.get_mut(&task) {
            *count -= 1;
            if *count == 0 {
                self.waiting.remove(&task);
            }
        }
    }

    /// Moves the blocked threads of `task` out of the waiting set, returns how many there were.
    fn cancel_waiters(&mut self, task: TaskId) -> usize {
        let Some(threads) = self.waiting.remove(&task) else {
            return 0;
        };
        self.cleanups += 1;
        let cancelled = self.cancelled.entry(task).or_insert(Cancelled {
            threads: 0,
            cleanup: 0,
        });
        cancelled.threads += threads;
        cancelled.cleanup = self.cleanups;
        threads
    }

    /// Whether a thread of `task` that started waiting after `since` cleanups has been cancelled
    /// in the meantime. Consumes the cancellation if so.
    fn take_cancelled(&mut self, task: TaskId, since: u64) -> bool {
        match self.cancelled.get_mut(&task) {
            Some(cancelled) if cancelled.cleanup > since => {
                cancelled.threads -= 1;
                if cancelled.threads == 0 {
                    self.cancelled.remove(&task);
                }
                true
            }
            _ => false,
        }
    }

    fn record_metrics(&self) {
        gauge!(SHUFFLE_MEMORY_GRANTED).set(self.total_granted as f64);
        gauge!(SHUFFLE_MEMORY_ACTIVE_TASKS).set(self.num_active_tasks() as f64);
        gauge!(SHUFFLE_MEMORY_WAITING_THREADS).set(self.num_waiting() as f64);
    }
}

impl MemoryArbiter<ThreadLocalResolver> {
    /// Creates an arbiter over `max_memory` bytes that identifies callers through the
    /// thread-local task context (see [`task::enter`]).
    pub fn new(max_memory: u64) -> Self {
        Self::with_resolver(max_memory, ThreadLocalResolver)
    }

    pub fn from_options(options: &ShuffleMemoryOptions) -> Result<Self, OptionsError> {
        Self::from_options_with_resolver(options, ThreadLocalResolver)
    }
}

impl<R: TaskResolver> MemoryArbiter<R> {
    pub fn with_resolver(max_memory: u64, resolver: R) -> Self {
        let num_cores = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::build(
            max_memory,
            default_page_size(max_memory, num_cores),
            ReleasePolicy::default(),
            resolver,
        )
    }

    pub fn from_options_with_resolver(
        options: &ShuffleMemoryOptions,
        resolver: R,
    ) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self::build(
            options.pool_size(),
            options.page_size(),
            options.release_policy,
            resolver,
        ))
    }

    fn build(max_memory: u64, page_size: u64, release_policy: ReleasePolicy, resolver: R) -> Self {
        DESCRIBE_METRICS.call_once(metric_definitions::describe_metrics);
        debug!(
            "Creating shuffle memory arbiter with {} pool and {} pages",
            ByteSize(max_memory),
            ByteSize(page_size)
        );
        Self {
            inner: Arc::new(Inner {
                max_memory,
                page_size,
                release_policy,
                resolver,
                state: Mutex::new(PoolState::default()),
                memory_freed: Condvar::new(),
            }),
        }
    }

    /// Tries to acquire up to `num_bytes` for the calling task and returns how many bytes were
    /// granted, which may be fewer than requested (or zero) if the task already holds its fair
    /// share.
    ///
    /// Blocks if the task cannot be fully served and would remain below half of its fair share,
    /// until enough memory is released by other tasks. There is no timeout. A blocked call
    /// returns zero if its task is cleaned up through
    /// [`release_memory_for_task`](Self::release_memory_for_task) in the meantime.
    pub fn try_to_acquire(&self, num_bytes: i64) -> Result<u64, MemoryError> {
        let num_bytes = check_request(num_bytes)?;
        let task = self.caller()?;
        Ok(self.acquire_for(task, num_bytes))
    }

    fn acquire_for(&self, task: TaskId, num_bytes: u64) -> u64 {
        let mut state = self.inner.state.lock();
        let mut is_waiting = false;
        let since = state.cleanups;

        loop {
            match state.evaluate(task, num_bytes, self.inner.max_memory) {
                Decision::Grant(to_grant) => {
                    if is_waiting {
                        state.stop_waiting(task);
                    }
                    state.add(task, to_grant);
                    state.record_metrics();
                    trace!(%task, "Granted {} of {} requested", to_grant, num_bytes);
                    return to_grant;
                }
                Decision::Wait { min_per_task } => {
                    if !is_waiting {
                        is_waiting = true;
                        state.start_waiting(task);
                        state.record_metrics();
                        counter!(SHUFFLE_MEMORY_ACQUIRE_BLOCKED).increment(1);
                        info!(
                            %task,
                            "Waiting for at least 1/2N of the shuffle memory pool to be free, holding {} of {}",
                            ByteSize(state.grant_of(task)),
                            ByteSize(min_per_task),
                        );
                    } else {
                        trace!(%task, "Still below 1/2N of the shuffle memory pool, waiting again");
                    }
                    self.inner.memory_freed.wait(&mut state);

                    if state.take_cancelled(task, since) {
                        state.record_metrics();
                        debug!(%task, "Task was cleaned up while waiting for shuffle memory");
                        return 0;
                    }
                }
            }
        }
    }

    /// Releases `num_bytes` held by the calling task and returns how many bytes were released.
    ///
    /// Releasing more than the task holds is handled according to the configured
    /// [`ReleasePolicy`].
    pub fn release(&self, num_bytes: i64) -> Result<u64, MemoryError> {
        let num_bytes = check_request(num_bytes)?;
        let task = self.caller()?;

        let mut state = self.inner.state.lock();
        let granted = state.grant_of(task);
        let released = if num_bytes > granted {
            match self.inner.release_policy {
                ReleasePolicy::Strict => {
                    return Err(MemoryError::ReleaseExceedsGrant {
                        task,
                        requested: num_bytes,
                        granted,
                    });
                }
                ReleasePolicy::Clamp => {
                    counter!(SHUFFLE_MEMORY_RELEASE_EXCEEDS_GRANT).increment(1);
                    warn!(
                        %task,
                        "Task released {} but only holds {}, releasing what it holds",
                        ByteSize(num_bytes),
                        ByteSize(granted)
                    );
                    granted
                }
            }
        } else {
            num_bytes
        };

        state.subtract(task, released);
        state.record_metrics();
        drop(state);

        self.inner.memory_freed.notify_all();
        Ok(released)
    }

    /// Releases everything the calling task holds, returns the number of bytes released.
    pub fn release_memory_for_this_task(&self) -> Result<u64, MemoryError> {
        let task = self.caller()?;
        Ok(self.release_memory_for_task(task))
    }

    /// Releases everything `task` holds, returns the number of bytes released.
    ///
    /// Meant for the scheduler cleaning up after a task that finished on another thread. The
    /// task stops counting as active, threads still blocked on its behalf wake up and return
    /// without a grant. A later acquire for `task` counts it as a new task.
    pub fn release_memory_for_task(&self, task: TaskId) -> u64 {
        let mut state = self.inner.state.lock();
        let released = state.remove(task);
        let cancelled = state.cancel_waiters(task);
        state.record_metrics();
        drop(state);

        if released > 0 {
            debug!(%task, "Released {} of shuffle memory on task cleanup", ByteSize(released));
        }
        if cancelled > 0 {
            debug!(%task, "Cancelling {} blocked acquire(s) on task cleanup", cancelled);
        }
        self.inner.memory_freed.notify_all();
        released
    }

    /// Runs `f` as task `task` on the current thread and releases all memory the task holds
    /// once `f` returns or panics.
    ///
    /// Only meaningful with a resolver reading the thread-local task context, such as
    /// [`ThreadLocalResolver`].
    pub fn run_task<F, T>(&self, task: TaskId, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _cleanup = TaskCleanup {
            arbiter: self,
            task,
        };
        task::scope(task, f)
    }

    pub fn memory_for_this_task(&self) -> Result<u64, MemoryError> {
        let task = self.caller()?;
        Ok(self.memory_for_task(task))
    }

    pub fn memory_for_task(&self, task: TaskId) -> u64 {
        self.inner.state.lock().grant_of(task)
    }

    fn caller(&self) -> Result<TaskId, MemoryError> {
        self.inner
            .resolver
            .current_task_id()
            .ok_or(MemoryError::UnidentifiedCaller)
    }
}

impl<R> MemoryArbiter<R> {
    #[inline]
    pub fn max_memory(&self) -> u64 {
        self.inner.max_memory
    }

    /// Page size consumers should allocate their buffers in.
    #[inline]
    pub fn page_size(&self) -> u64 {
        self.inner.page_size
    }

    #[inline]
    pub fn release_policy(&self) -> ReleasePolicy {
        self.inner.release_policy
    }

    /// Total bytes granted across all tasks.
    pub fn granted(&self) -> u64 {
        self.inner.state.lock().total_granted
    }

    pub fn available(&self) -> u64 {
        self.inner.max_memory - self.granted()
    }

    /// Tasks holding a grant or blocked waiting for one.
    pub fn num_active_tasks(&self) -> usize {
        self.inner.state.lock().num_active_tasks()
    }

    /// Threads currently blocked in [`try_to_acquire`](Self::try_to_acquire), not counting
    /// those of cleaned-up tasks that have yet to wake up.
    pub fn num_waiting(&self) -> usize {
        self.inner.state.lock().num_waiting()
    }
}

impl<R> Clone for MemoryArbiter<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> std::fmt::Debug for MemoryArbiter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryArbiter")
            .field("max_memory", &self.inner.max_memory)
            .field("granted", &state.total_granted)
            .field("active_tasks", &state.num_active_tasks())
            .field("waiting", &state.num_waiting())
            .finish_non_exhaustive()
    }
}

struct TaskCleanup<'a, R: TaskResolver> {
    arbiter: &'a MemoryArbiter<R>,
    task: TaskId,
}

impl<R: TaskResolver> Drop for TaskCleanup<'_, R> {
    fn drop(&mut self) {
        self.arbiter.release_memory_for_task(self.task);
    }
}

fn check_request(num_bytes: i64) -> Result<u64, MemoryError> {
    u64::try_from(num_bytes).map_err(|_| MemoryError::InvalidRequest {
        requested: num_bytes,
    })
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MemoryArbiter>();
};

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ShuffleMemoryOptionsBuilder;

    fn single_task(max_memory: u64) -> (MemoryArbiter<impl TaskResolver>, TaskId) {
        let task = TaskId::next();
        (MemoryArbiter::with_resolver(max_memory, move || Some(task)), task)
    }

    #[test]
    fn single_task_sequence() {
        let (arbiter, task) = single_task(1000);

        assert_eq!(arbiter.try_to_acquire(100), Ok(100));
        assert_eq!(arbiter.try_to_acquire(400), Ok(400));
        assert_eq!(arbiter.try_to_acquire(400), Ok(400));
        assert_eq!(arbiter.granted(), 900);
        assert_eq!(arbiter.try_to_acquire(200), Ok(100));
        assert_eq!(arbiter.try_to_acquire(100), Ok(0));

        assert_eq!(arbiter.release(500), Ok(500));
        assert_eq!(arbiter.try_to_acquire(300), Ok(300));
        assert_eq!(arbiter.try_to_acquire(300), Ok(200));
        assert_eq!(arbiter.memory_for_task(task), 1000);

        assert_eq!(arbiter.release_memory_for_this_task(), Ok(1000));
        assert_eq!(arbiter.granted(), 0);
        assert_eq!(arbiter.num_active_tasks(), 0);

        assert_eq!(arbiter.try_to_acquire(1000), Ok(1000));
    }

    #[test]
    fn grants_never_exceed_request_or_pool() {
        let (arbiter, task) = single_task(1000);

        for request in [0, 1, 7, 250, 999, 1000, 5000] {
            let granted = arbiter.try_to_acquire(request).unwrap();
            assert!(granted <= request as u64);
            assert!(arbiter.memory_for_task(task) <= arbiter.max_memory());
            arbiter.release(granted as i64).unwrap();
        }
        assert_eq!(arbiter.memory_for_task(task), 0);
    }

    #[test]
    fn zero_request_creates_no_entry() {
        let (arbiter, _) = single_task(1000);

        assert_eq!(arbiter.try_to_acquire(0), Ok(0));
        assert_eq!(arbiter.num_active_tasks(), 0);
    }

    #[test]
    fn negative_requests_are_rejected() {
        let (arbiter, _) = single_task(1000);

        assert_eq!(
            arbiter.try_to_acquire(-1),
            Err(MemoryError::InvalidRequest { requested: -1 })
        );
        assert_eq!(
            arbiter.release(-10),
            Err(MemoryError::InvalidRequest { requested: -10 })
        );
        assert_eq!(arbiter.granted(), 0);
    }

    #[test]
    fn calls_outside_a_task_are_rejected() {
        let arbiter = MemoryArbiter::new(1000);

        assert_eq!(
            arbiter.try_to_acquire(10),
            Err(MemoryError::UnidentifiedCaller)
        );
        assert_eq!(arbiter.release(10), Err(MemoryError::UnidentifiedCaller));
        assert_eq!(
            arbiter.release_memory_for_this_task(),
            Err(MemoryError::UnidentifiedCaller)
        );
        assert_eq!(
            arbiter.memory_for_this_task(),
            Err(MemoryError::UnidentifiedCaller)
        );
    }

    #[test]
    fn thread_local_task_context_identifies_caller() {
        let arbiter = MemoryArbiter::new(1000);
        let task = TaskId::next();

        let granted = task::scope(task, || arbiter.try_to_acquire(300)).unwrap();
        assert_eq!(granted, 300);
        assert_eq!(arbiter.memory_for_task(task), 300);
        assert_eq!(
            task::scope(task, || arbiter.memory_for_this_task()),
            Ok(300)
        );
    }

    #[test_log::test]
    fn over_release_is_clamped_by_default() {
        let (arbiter, task) = single_task(1000);
        assert_eq!(arbiter.release_policy(), ReleasePolicy::Clamp);

        arbiter.try_to_acquire(100).unwrap();
        assert_eq!(arbiter.release(300), Ok(100));
        assert_eq!(arbiter.memory_for_task(task), 0);
        assert_eq!(arbiter.granted(), 0);
        assert_eq!(arbiter.available(), 1000);

        // releasing with nothing held is a clamped no-op as well
        assert_eq!(arbiter.release(50), Ok(0));
        assert_eq!(arbiter.available(), 1000);
    }

    #[test]
    fn over_release_is_rejected_when_strict() {
        let task = TaskId::next();
        let options = ShuffleMemoryOptionsBuilder::default()
            .pool_size(ByteSize::b(1000))
            .release_policy(ReleasePolicy::Strict)
            .build()
            .unwrap();
        let arbiter =
            MemoryArbiter::from_options_with_resolver(&options, move || Some(task)).unwrap();

        arbiter.try_to_acquire(100).unwrap();
        assert_eq!(
            arbiter.release(300),
            Err(MemoryError::ReleaseExceedsGrant {
                task,
                requested: 300,
                granted: 100,
            })
        );
        // nothing changed
        assert_eq!(arbiter.memory_for_task(task), 100);
        assert_eq!(arbiter.release(100), Ok(100));
    }

    #[test]
    fn release_memory_for_other_task() {
        let arbiter = MemoryArbiter::new(1000);
        let finished = TaskId::next();

        task::scope(finished, || arbiter.try_to_acquire(600)).unwrap();
        assert_eq!(arbiter.release_memory_for_task(finished), 600);
        assert_eq!(arbiter.granted(), 0);
        assert_eq!(arbiter.release_memory_for_task(finished), 0);
        assert_eq!(arbiter.release_memory_for_task(TaskId::next()), 0);
    }

    #[test]
    fn run_task_releases_on_completion() {
        let arbiter = MemoryArbiter::new(1000);
        let task = TaskId::next();

        let granted = arbiter.run_task(task, || arbiter.try_to_acquire(400).unwrap());
        assert_eq!(granted, 400);
        assert_eq!(arbiter.memory_for_task(task), 0);
        assert_eq!(task::current_task_id(), None);
    }

    #[test]
    fn run_task_releases_on_panic() {
        let arbiter = MemoryArbiter::new(1000);
        let task = TaskId::next();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            arbiter.run_task::<_, ()>(task, || {
                arbiter.try_to_acquire(400).unwrap();
                panic!("task failed");
            })
        }));

        assert!(result.is_err());
        assert_eq!(arbiter.granted(), 0);
    }

    #[test]
    fn empty_pool_never_blocks() {
        let (arbiter, _) = single_task(0);

        assert_eq!(arbiter.try_to_acquire(100), Ok(0));
        assert_eq!(arbiter.num_active_tasks(), 0);
    }

    #[test]
    fn options_configure_pool_and_pages() {
        let options = ShuffleMemoryOptionsBuilder::default()
            .pool_size(ByteSize::mib(64))
            .page_size(ByteSize::kib(256))
            .build()
            .unwrap();
        let arbiter = MemoryArbiter::from_options(&options).unwrap();

        assert_eq!(arbiter.max_memory(), 64 * 1024 * 1024);
        assert_eq!(arbiter.page_size(), 256 * 1024);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = ShuffleMemoryOptionsBuilder::default()
            .safety_fraction(-0.5)
            .build()
            .unwrap();

        assert!(matches!(
            MemoryArbiter::from_options(&options),
            Err(OptionsError::FractionOutOfRange { .. })
        ));
    }

    #[test]
    fn clones_share_the_pool() {
        let (arbiter, task) = single_task(1000);
        let clone = arbiter.clone();

        arbiter.try_to_acquire(250).unwrap();
        assert_eq!(clone.memory_for_task(task), 250);
        assert_eq!(clone.available(), 750);
    }

    #[test]
    fn cleanup_cancels_only_threads_already_waiting() {
        let mut state = PoolState::default();
        let task = TaskId::from(7);

        let before_cleanup = state.cleanups;
        state.start_waiting(task);
        assert_eq!(state.num_active_tasks(), 1);
        assert_eq!(state.cancel_waiters(task), 1);
        assert_eq!(state.num_active_tasks(), 0);
        assert_eq!(state.num_waiting(), 0);

        // the task acquires again after its cleanup and blocks once more
        let after_cleanup = state.cleanups;
        state.start_waiting(task);
        assert_eq!(state.num_active_tasks(), 1);

        assert!(!state.take_cancelled(task, after_cleanup));
        assert!(state.take_cancelled(task, before_cleanup));
        assert!(state.cancelled.is_empty());
        assert_eq!(state.num_waiting(), 1);

        // nobody to cancel
        assert_eq!(state.cancel_waiters(TaskId::from(8)), 0);
        assert_eq!(state.cleanups, after_cleanup);
    }
}
