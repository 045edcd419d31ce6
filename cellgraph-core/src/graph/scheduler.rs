//! Flush Queue
//!
//! The scheduler coalesces every job queued during a burst of writes into a
//! single ordered pass.
//!
//! # Algorithm
//!
//! 1. Jobs land in one of three buckets: the pre bucket, the main queue, or
//!    the post bucket. A job already queued is not queued again.
//! 2. The main queue is kept sorted by job id (binary-search insertion).
//!    Ids grow with creation order, so a subscriber created inside another's
//!    run sorts after it.
//! 3. A flush drains the pre bucket, then walks the main queue with an index
//!    cursor, then drains the post bucket, and repeats until all three are
//!    empty. Jobs queued while the flush runs are inserted after the cursor,
//!    so a long chain of triggered updates never grows the call stack.
//! 4. Each job runs inside its own `catch_unwind`; one failing job never
//!    prevents its siblings from running.
//!
//! Flushes are never started implicitly. A host either calls [`flush`]
//! itself, awaits [`crate::tick::next_tick`], or installs a hook with
//! [`on_flush_requested`] that is told when a flush becomes pending.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::error::ReactiveError;
use crate::reactive::Runtime;

bitflags! {
    /// State bits of a scheduler job.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JobFlags: u8 {
        /// Sitting in one of the buckets.
        const QUEUED = 1 << 0;
        /// May be queued again while it runs.
        const ALLOW_RECURSE = 1 << 1;
        /// Skipped by every future flush.
        const DISPOSED = 1 << 2;
    }
}

/// A unit of deferred work.
pub struct Job {
    id: u64,
    flags: Cell<JobFlags>,
    callback: RefCell<Box<dyn FnMut()>>,
}

impl Job {
    /// Create a job. `id` orders it within the main queue.
    pub fn new<F>(id: u64, callback: F) -> Rc<Self>
    where
        F: FnMut() + 'static,
    {
        Rc::new(Self {
            id,
            flags: Cell::new(JobFlags::empty()),
            callback: RefCell::new(Box::new(callback)),
        })
    }

    /// Get the ordering id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn flags(&self) -> JobFlags {
        self.flags.get()
    }

    pub fn is_queued(&self) -> bool {
        self.flags().contains(JobFlags::QUEUED)
    }

    pub fn is_disposed(&self) -> bool {
        self.flags().contains(JobFlags::DISPOSED)
    }

    /// Allow the job to queue itself again while running.
    pub fn set_allow_recurse(&self, allow: bool) {
        self.set_flag(JobFlags::ALLOW_RECURSE, allow);
    }

    /// Mark the job dead. A queued copy is skipped, not removed.
    pub fn dispose(&self) {
        self.set_flag(JobFlags::DISPOSED, true);
    }

    fn set_flag(&self, flag: JobFlags, value: bool) {
        let mut flags = self.flags.get();
        flags.set(flag, value);
        self.flags.set(flags);
    }

    /// Run the callback unless it is already running further up the stack.
    pub(crate) fn invoke(&self) -> bool {
        match self.callback.try_borrow_mut() {
            Ok(mut callback) => {
                callback();
                true
            }
            Err(_) => {
                debug!(job = self.id, "skipping re-entrant job");
                false
            }
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("flags", &self.flags())
            .finish()
    }
}

#[derive(Default)]
struct Scheduler {
    queue: Vec<Rc<Job>>,
    /// Index of the main-queue job currently running.
    cursor: Option<usize>,
    pre: VecDeque<Rc<Job>>,
    post: Vec<Rc<Job>>,
    flushing: bool,
    pending: bool,
    /// Runs per job id within the current flush.
    runs: HashMap<u64, usize>,
    hook: Option<Rc<dyn Fn()>>,
}

impl Scheduler {
    /// First position after the cursor whose id is greater than `id`.
    fn insertion_index(&self, id: u64) -> usize {
        let start = self.cursor.map_or(0, |cursor| cursor + 1).min(self.queue.len());
        start + self.queue[start..].partition_point(|job| job.id <= id)
    }

    /// Mark a flush as pending; returns the host hook the first time.
    fn request_flush(&mut self) -> Option<Rc<dyn Fn()>> {
        if self.flushing || self.pending {
            return None;
        }
        self.pending = true;
        self.hook.clone()
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.pre.is_empty() && self.post.is_empty()
    }
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::default());
}

fn with_scheduler<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    SCHEDULER.with(|scheduler| f(&mut scheduler.borrow_mut()))
}

#[derive(Clone, Copy)]
enum Bucket {
    Pre,
    Main,
    Post,
}

fn enqueue(job: Rc<Job>, bucket: Bucket) {
    if job.is_queued() || job.is_disposed() {
        return;
    }
    job.set_flag(JobFlags::QUEUED, true);
    let hook = with_scheduler(|s| {
        match bucket {
            Bucket::Pre => s.pre.push_back(job),
            Bucket::Main => {
                let index = s.insertion_index(job.id);
                s.queue.insert(index, job);
            }
            Bucket::Post => s.post.push(job),
        }
        s.request_flush()
    });
    if let Some(hook) = hook {
        hook();
    }
}

/// Queue a job on the main queue, ordered by id.
pub fn queue_job(job: Rc<Job>) {
    enqueue(job, Bucket::Main);
}

/// Queue a job that must run before the main pass.
pub fn queue_pre_flush(job: Rc<Job>) {
    enqueue(job, Bucket::Pre);
}

/// Queue a job that must run after the main pass settles.
pub fn queue_post_flush(job: Rc<Job>) {
    enqueue(job, Bucket::Post);
}

/// Whether jobs are waiting for a flush.
pub fn has_pending_flush() -> bool {
    with_scheduler(|s| s.pending || !s.is_idle())
}

/// Whether a flush is running on this thread.
pub fn is_flushing() -> bool {
    with_scheduler(|s| s.flushing)
}

/// Install the hook called whenever a flush becomes pending.
pub fn on_flush_requested<F>(hook: F)
where
    F: Fn() + 'static,
{
    let previous = with_scheduler(|s| s.hook.replace(Rc::new(hook)));
    drop(previous);
}

/// Remove the flush hook.
pub fn clear_flush_hook() {
    let previous = with_scheduler(|s| s.hook.take());
    drop(previous);
}

/// Drop every queued job and the flush hook.
pub(crate) fn reset() {
    let dropped = with_scheduler(mem::take);
    drop(dropped);
}

/// Resets the flushing state even if a flush unwinds.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = SCHEDULER.try_with(|scheduler| {
            if let Ok(mut s) = scheduler.try_borrow_mut() {
                s.flushing = false;
                s.cursor = None;
            }
        });
    }
}

/// Run every queued job: pre bucket, main queue in id order, post bucket,
/// repeated until nothing is left.
///
/// Calling `flush` from inside a running job is a no-op; the outer flush
/// picks up whatever was queued. Returns the first error raised by a job
/// unless an error handler is installed.
pub fn flush() -> Result<(), ReactiveError> {
    let started = with_scheduler(|s| {
        if s.flushing {
            return false;
        }
        s.flushing = true;
        s.pending = false;
        s.runs.clear();
        true
    });
    if !started {
        return Ok(());
    }
    let _guard = FlushGuard;

    let limit = Runtime::config().recursion_limit;
    let mut first_error = None;
    let mut executed = 0usize;
    trace!("flush started");

    loop {
        drain_pre(limit, &mut first_error, &mut executed);

        let mut index = 0;
        while let Some(job) = with_scheduler(|s| {
            let job = s.queue.get(index).cloned();
            if job.is_some() {
                s.cursor = Some(index);
            }
            job
        }) {
            run_job(&job, limit, &mut first_error, &mut executed);
            index += 1;
            drain_pre(limit, &mut first_error, &mut executed);
        }
        let finished = with_scheduler(|s| {
            s.cursor = None;
            mem::take(&mut s.queue)
        });
        drop(finished);

        let post = with_scheduler(|s| mem::take(&mut s.post));
        for job in &post {
            run_job(job, limit, &mut first_error, &mut executed);
        }
        drop(post);

        if with_scheduler(|s| s.is_idle()) {
            break;
        }
    }

    trace!(executed, "flush finished");
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn drain_pre(limit: usize, first_error: &mut Option<ReactiveError>, executed: &mut usize) {
    while let Some(job) = with_scheduler(|s| s.pre.pop_front()) {
        run_job(&job, limit, first_error, executed);
    }
}

fn run_job(job: &Job, limit: usize, first_error: &mut Option<ReactiveError>, executed: &mut usize) {
    let flags = job.flags();
    if flags.contains(JobFlags::DISPOSED) {
        job.set_flag(JobFlags::QUEUED, false);
        return;
    }

    let runs = with_scheduler(|s| {
        let runs = s.runs.entry(job.id).or_insert(0);
        *runs += 1;
        *runs
    });
    if runs > limit {
        job.set_flag(JobFlags::QUEUED, false);
        warn!(job = job.id, limit, "job exceeded the recursion limit, skipping");
        Runtime::report(ReactiveError::RecursionLimit { job: job.id, limit }, first_error);
        return;
    }

    let allow_recurse = flags.contains(JobFlags::ALLOW_RECURSE);
    if allow_recurse {
        job.set_flag(JobFlags::QUEUED, false);
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.invoke()));
    if !allow_recurse {
        job.set_flag(JobFlags::QUEUED, false);
    }
    *executed += 1;

    if let Err(payload) = outcome {
        Runtime::report(ReactiveError::from_panic(job.id, payload.as_ref()), first_error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_job(id: u64, log: &Rc<RefCell<Vec<u64>>>) -> Rc<Job> {
        let log = log.clone();
        Job::new(id, move || log.borrow_mut().push(id))
    }

    #[test]
    fn main_queue_runs_in_id_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        queue_job(recording_job(3, &log));
        queue_job(recording_job(1, &log));
        queue_job(recording_job(2, &log));

        flush().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert!(!has_pending_flush());
    }

    #[test]
    fn queued_job_is_not_queued_twice() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let job = recording_job(7, &log);
        queue_job(job.clone());
        queue_job(job.clone());
        queue_post_flush(job.clone());

        flush().unwrap();
        assert_eq!(*log.borrow(), vec![7]);
        assert!(!job.is_queued());
    }

    #[test]
    fn phases_run_pre_main_post() {
        let log = Rc::new(RefCell::new(Vec::new()));
        queue_post_flush(recording_job(100, &log));
        queue_job(recording_job(5, &log));
        queue_pre_flush(recording_job(50, &log));
        queue_post_flush(recording_job(1, &log));

        flush().unwrap();
        // Pre and post buckets keep insertion order.
        assert_eq!(*log.borrow(), vec![50, 5, 100, 1]);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let late = recording_job(2, &log);
        let log_clone = log.clone();
        queue_job(Job::new(1, move || {
            log_clone.borrow_mut().push(1);
            queue_job(late.clone());
        }));

        flush().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn disposed_job_is_skipped() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let job = recording_job(1, &log);
        queue_job(job.clone());
        job.dispose();

        flush().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn panicking_job_does_not_stop_siblings() {
        let log = Rc::new(RefCell::new(Vec::new()));
        queue_job(Job::new(1, || panic!("boom")));
        queue_job(recording_job(2, &log));

        let err = flush().unwrap_err();
        assert!(matches!(err, ReactiveError::Panicked { subscriber: 1, .. }));
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn self_requeueing_job_hits_recursion_limit() {
        let job_slot: Rc<RefCell<Option<Rc<Job>>>> = Rc::new(RefCell::new(None));
        let slot = job_slot.clone();
        let job = Job::new(9, move || {
            if let Some(job) = slot.borrow().as_ref() {
                queue_job(job.clone());
            }
        });
        job.set_allow_recurse(true);
        *job_slot.borrow_mut() = Some(job.clone());

        queue_job(job);
        let err = flush().unwrap_err();
        assert!(matches!(err, ReactiveError::RecursionLimit { job: 9, .. }));

        // Break the Rc cycle.
        job_slot.borrow_mut().take();
    }

    #[test]
    fn hook_fires_once_per_pending_flush() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        on_flush_requested(move || calls_clone.set(calls_clone.get() + 1));

        let log = Rc::new(RefCell::new(Vec::new()));
        queue_job(recording_job(1, &log));
        queue_job(recording_job(2, &log));
        assert_eq!(calls.get(), 1);

        flush().unwrap();
        queue_job(recording_job(3, &log));
        assert_eq!(calls.get(), 2);

        flush().unwrap();
        clear_flush_hook();
    }
}
