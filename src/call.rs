use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info_span, Instrument};

use crate::client::Client;
use crate::dispatcher::Dispatcher;
use crate::error::{CallResult, Error};
use crate::interceptor::{Chain, Interceptor};
use crate::retry::RetryInterceptor;

/// Execution flags shared by the call handle, the dispatcher, and every chain
/// hop. `canceled` is monotonic; `executed` flips exactly once.
#[derive(Debug, Default)]
pub(crate) struct CallState {
    canceled: AtomicBool,
    executed: AtomicBool,
}

impl CallState {
    pub(crate) fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn is_executed(&self) -> bool {
        self.executed.load(Ordering::SeqCst)
    }

    fn try_mark_executed(&self) -> CallResult<()> {
        self.executed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| Error::AlreadyExecuted)
    }
}

/// A request that has been prepared for execution.
///
/// A call represents a single request/response pair and cannot be started
/// twice; [`Call::clone`] yields a fresh, unexecuted call for the same request
/// when a rerun is wanted.
pub struct Call<Req, Res> {
    client: Client<Req, Res>,
    request: Req,
    state: Arc<CallState>,
}

impl<Req, Res> Call<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub(crate) fn new(client: Client<Req, Res>, request: Req) -> Self {
        Self {
            client,
            request,
            state: Arc::new(CallState::default()),
        }
    }

    /// The original request that initiated this call.
    pub fn request(&self) -> &Req {
        &self.request
    }

    /// True once [`enqueue`](Call::enqueue) has been invoked.
    pub fn is_executed(&self) -> bool {
        self.state.is_executed()
    }

    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    /// Requests cooperative cancellation. Idempotent and safe from any
    /// thread. In-flight work stops at its next chain boundary and the call
    /// finishes with [`Error::Canceled`]; a call that already completed is
    /// unaffected.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    /// Schedules the call on the client's dispatcher and waits for its one
    /// terminal outcome: a response or an error.
    ///
    /// The dispatcher decides when the request runs: usually immediately,
    /// unless `max_requests` calls are already in flight. Fails with
    /// [`Error::AlreadyExecuted`] when invoked a second time on the same call
    /// object. Dropping the returned future before it completes cancels the
    /// call. Must be awaited inside a tokio runtime.
    pub async fn enqueue(&self) -> CallResult<Res> {
        self.state.try_mark_executed()?;

        let (completion, outcome) = oneshot::channel();
        self.client.dispatcher().enqueue(AsyncCall {
            id: 0, // assigned on admission
            runtime: Handle::current(),
            client: self.client.clone(),
            request: self.request.clone(),
            state: Arc::clone(&self.state),
            completion,
        });

        let canceler = CancelOnDrop {
            state: Some(Arc::clone(&self.state)),
        };
        let outcome = outcome.await;
        canceler.disarm();
        outcome.unwrap_or(Err(Error::CompletionLost))
    }
}

impl<Req, Res> Clone for Call<Req, Res>
where
    Req: Clone,
{
    /// A fresh, unexecuted, uncanceled call to the same request on the same
    /// client.
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            request: self.request.clone(),
            state: Arc::new(CallState::default()),
        }
    }
}

/// Cancels an abandoned call: created before waiting on the completion
/// channel and disarmed once an outcome arrives, so a caller that drops the
/// `enqueue` future mid-flight releases the dispatcher slot promptly.
struct CancelOnDrop {
    state: Option<Arc<CallState>>,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.state = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.cancel();
        }
    }
}

/// Execution wrapper handed to the dispatcher: the call's request and state
/// plus the channel its terminal outcome is delivered on. Spawned onto the
/// runtime captured at enqueue time once the dispatcher promotes it.
pub(crate) struct AsyncCall<Req, Res> {
    pub(crate) id: u64,
    runtime: Handle,
    client: Client<Req, Res>,
    request: Req,
    state: Arc<CallState>,
    completion: oneshot::Sender<CallResult<Res>>,
}

impl<Req, Res> AsyncCall<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub(crate) fn state(&self) -> &Arc<CallState> {
        &self.state
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub(crate) async fn run(self, dispatcher: Dispatcher<Req, Res>) {
        let id = self.id;
        // Dropped on every exit path, including a panicking interceptor, so
        // the dispatcher always observes completion and promotes the next
        // queued call.
        let _finish = FinishGuard { dispatcher, id };

        let AsyncCall {
            client,
            request,
            state,
            completion,
            ..
        } = self;

        let span = info_span!("call", id);
        let result = execute_chain(&client, request, &state).instrument(span).await;
        match &result {
            Ok(_) => debug!(call = id, "call succeeded"),
            Err(error) => {
                debug!(call = id, error = %error, "call failed");
                state.cancel();
            }
        }
        let _ = completion.send(result);
    }
}

/// Builds the effective interceptor stack and drives it end to end:
/// application interceptors, then the retry stage, then network interceptors.
async fn execute_chain<Req, Res>(
    client: &Client<Req, Res>,
    request: Req,
    state: &Arc<CallState>,
) -> CallResult<Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    if state.is_canceled() {
        return Err(Error::Canceled);
    }

    let application = client.interceptors();
    let network = client.network_interceptors();
    let mut interceptors: Vec<Arc<dyn Interceptor<Req, Res>>> =
        Vec::with_capacity(application.len() + network.len() + 1);
    interceptors.extend(application.iter().cloned());
    interceptors.push(Arc::new(RetryInterceptor));
    interceptors.extend(network.iter().cloned());

    let chain = Chain::new(
        interceptors.into(),
        request.clone(),
        Arc::clone(state),
        client.clone(),
    );
    chain.proceed(request).await
}

struct FinishGuard<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    dispatcher: Dispatcher<Req, Res>,
    id: u64,
}

impl<Req, Res> Drop for FinishGuard<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    fn drop(&mut self) {
        self.dispatcher.finished(self.id);
    }
}
