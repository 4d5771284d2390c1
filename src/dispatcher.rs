use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::call::{AsyncCall, CallState};
use crate::error::{CallResult, Error};
use crate::util::lock_unpoisoned;

pub(crate) const DEFAULT_MAX_REQUESTS: usize = 6;

type IdleCallback = Arc<dyn Fn() + Send + Sync>;

/// Admission controller for asynchronous calls.
///
/// Bounds how many calls execute concurrently: up to `max_requests` calls run
/// at once and the rest wait in a FIFO ready queue, promoted as running calls
/// finish. Cheap to clone; clones share the same queues and budget, which is
/// how several clients share one concurrency budget.
///
/// Queue mutation happens under a single short-lived lock. The lock is never
/// held while a call's own code runs.
pub struct Dispatcher<Req, Res> {
    inner: Arc<DispatcherInner<Req, Res>>,
}

impl<Req, Res> Clone for Dispatcher<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct DispatcherInner<Req, Res> {
    ids: AtomicU64,
    state: Mutex<DispatcherState<Req, Res>>,
}

struct DispatcherState<Req, Res> {
    max_requests: usize,
    /// Ready calls in the order they'll be run.
    ready: VecDeque<AsyncCall<Req, Res>>,
    /// Running calls in promotion order. Includes canceled calls that haven't
    /// finished yet.
    running: Vec<RunningCall>,
    idle_callback: Option<IdleCallback>,
}

/// What the running set remembers about a promoted call: enough to cancel it
/// and to recognize its completion.
struct RunningCall {
    id: u64,
    state: Arc<CallState>,
}

impl<Req, Res> Dispatcher<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                ids: AtomicU64::new(1),
                state: Mutex::new(DispatcherState {
                    max_requests: DEFAULT_MAX_REQUESTS,
                    ready: VecDeque::new(),
                    running: Vec::new(),
                    idle_callback: None,
                }),
            }),
        }
    }

    /// The maximum number of calls to execute concurrently. Above this, calls
    /// queue in memory waiting for running calls to complete.
    pub fn max_requests(&self) -> usize {
        lock_unpoisoned(&self.inner.state).max_requests
    }

    /// Updates the concurrency limit and immediately promotes queued calls,
    /// so raising the limit takes effect without waiting for a completion.
    ///
    /// Values below 1 are rejected with [`Error::InvalidMaxRequests`] and the
    /// previous limit is retained. Shrinking the limit below the current
    /// running count never interrupts running calls; they finish naturally
    /// and promotion resumes under the new limit.
    pub fn set_max_requests(&self, max_requests: usize) -> CallResult<()> {
        if max_requests < 1 {
            return Err(Error::InvalidMaxRequests {
                value: max_requests,
            });
        }
        lock_unpoisoned(&self.inner.state).max_requests = max_requests;
        self.promote_and_execute();
        Ok(())
    }

    /// Registers a callback invoked each time the dispatcher becomes idle
    /// (the running count returns to zero after a call finishes).
    pub fn set_idle_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        lock_unpoisoned(&self.inner.state).idle_callback = Some(Arc::new(callback));
    }

    pub fn clear_idle_callback(&self) {
        lock_unpoisoned(&self.inner.state).idle_callback = None;
    }

    /// Number of calls awaiting promotion.
    pub fn queued_calls_count(&self) -> usize {
        lock_unpoisoned(&self.inner.state).ready.len()
    }

    /// Number of calls currently executing.
    pub fn running_calls_count(&self) -> usize {
        lock_unpoisoned(&self.inner.state).running.len()
    }

    /// Marks every queued and running call canceled. Cancellation is
    /// cooperative: running work stops at its next chain boundary rather than
    /// being interrupted.
    pub fn cancel_all(&self) {
        let guard = lock_unpoisoned(&self.inner.state);
        for call in &guard.ready {
            call.state().cancel();
        }
        for call in &guard.running {
            call.state.cancel();
        }
    }

    pub(crate) fn enqueue(&self, mut call: AsyncCall<Req, Res>) {
        call.id = self.inner.ids.fetch_add(1, Ordering::Relaxed);
        debug!(call = call.id, "call admitted");
        lock_unpoisoned(&self.inner.state).ready.push_back(call);
        self.promote_and_execute();
    }

    /// Completion hook; runs exactly once per promoted call regardless of
    /// outcome. Removes the call from the running set, promotes queued calls,
    /// and reports idleness.
    pub(crate) fn finished(&self, id: u64) {
        let idle_callback = {
            let mut guard = lock_unpoisoned(&self.inner.state);
            let Some(position) = guard.running.iter().position(|entry| entry.id == id) else {
                panic!("call {id} reported finished but was not running");
            };
            guard.running.remove(position);
            guard.idle_callback.clone()
        };

        let is_running = self.promote_and_execute();

        if !is_running {
            if let Some(idle_callback) = idle_callback {
                idle_callback();
            }
        }
    }

    /// Promotes eligible calls from ready to running, then spawns them.
    /// Returns whether any call is running afterwards.
    ///
    /// Spawning happens after the lock is released because spawned calls run
    /// user code.
    fn promote_and_execute(&self) -> bool {
        let mut executable = Vec::new();
        let is_running;
        {
            let mut guard = lock_unpoisoned(&self.inner.state);
            while guard.running.len() < guard.max_requests {
                let Some(call) = guard.ready.pop_front() else {
                    break;
                };
                guard.running.push(RunningCall {
                    id: call.id,
                    state: Arc::clone(call.state()),
                });
                executable.push(call);
            }
            is_running = !guard.running.is_empty();
        }

        for call in executable {
            debug!(call = call.id, "call promoted");
            let dispatcher = self.clone();
            let runtime = call.runtime().clone();
            runtime.spawn(call.run(dispatcher));
        }

        is_running
    }
}

impl<Req, Res> Default for Dispatcher<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
