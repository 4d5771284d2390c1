use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::call::Call;
use crate::dispatcher::Dispatcher;
use crate::error::CallResult;
use crate::interceptor::{Chain, FnInterceptor, Interceptor};

const DEFAULT_RETRY_TIMES_ON_ERROR: usize = 3;
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Advisory timeout configuration carried by the client.
///
/// The engine stores these values for transport interceptors to consult; it
/// does not enforce them itself, because only the terminal stage knows what
/// connecting, reading, and writing mean for its medium. `call` bounds a
/// whole call and is unset by default; the per-step timeouts default to 10
/// seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub call: Option<Duration>,
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            call: None,
            connect: DEFAULT_STEP_TIMEOUT,
            read: DEFAULT_STEP_TIMEOUT,
            write: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// Factory for [`Call`]s.
///
/// Clients perform best when one instance is created and shared for all calls
/// against the same backend: each client otherwise drags along its own
/// dispatcher and concurrency budget. Configuration is immutable once built;
/// [`Client::to_builder`] derives a customized client that keeps sharing this
/// one's dispatcher.
pub struct Client<Req, Res> {
    inner: Arc<ClientInner<Req, Res>>,
}

struct ClientInner<Req, Res> {
    dispatcher: Dispatcher<Req, Res>,
    interceptors: Vec<Arc<dyn Interceptor<Req, Res>>>,
    network_interceptors: Vec<Arc<dyn Interceptor<Req, Res>>>,
    retry_times_on_error: usize,
    timeouts: Timeouts,
}

impl<Req, Res> Clone for Client<Req, Res> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Req, Res> Client<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub fn builder() -> ClientBuilder<Req, Res> {
        ClientBuilder::new()
    }

    /// Prepares `request` to be executed at some point in the future. Does
    /// not start anything.
    pub fn new_call(&self, request: Req) -> Call<Req, Res> {
        Call::new(self.clone(), request)
    }

    /// A builder seeded with this client's configuration. The derived client
    /// shares this one's dispatcher.
    pub fn to_builder(&self) -> ClientBuilder<Req, Res> {
        ClientBuilder {
            dispatcher: self.inner.dispatcher.clone(),
            interceptors: self.inner.interceptors.clone(),
            network_interceptors: self.inner.network_interceptors.clone(),
            retry_times_on_error: self.inner.retry_times_on_error,
            timeouts: self.inner.timeouts,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<Req, Res> {
        &self.inner.dispatcher
    }

    /// Interceptors observing the full span of each call, in execution order.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor<Req, Res>>] {
        &self.inner.interceptors
    }

    /// Interceptors positioned after the retry stage, closest to the
    /// transport; they run once per attempt.
    pub fn network_interceptors(&self) -> &[Arc<dyn Interceptor<Req, Res>>] {
        &self.inner.network_interceptors
    }

    /// Extra attempts after the first when a call fails with a transient
    /// error.
    pub fn retry_times_on_error(&self) -> usize {
        self.inner.retry_times_on_error
    }

    pub fn timeouts(&self) -> Timeouts {
        self.inner.timeouts
    }
}

pub struct ClientBuilder<Req, Res> {
    dispatcher: Dispatcher<Req, Res>,
    interceptors: Vec<Arc<dyn Interceptor<Req, Res>>>,
    network_interceptors: Vec<Arc<dyn Interceptor<Req, Res>>>,
    retry_times_on_error: usize,
    timeouts: Timeouts,
}

impl<Req, Res> ClientBuilder<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            dispatcher: Dispatcher::new(),
            interceptors: Vec::new(),
            network_interceptors: Vec::new(),
            retry_times_on_error: DEFAULT_RETRY_TIMES_ON_ERROR,
            timeouts: Timeouts::default(),
        }
    }

    /// Replaces the dispatcher used to schedule asynchronous calls. Passing
    /// one dispatcher to several clients makes them share its concurrency
    /// budget.
    pub fn dispatcher(mut self, dispatcher: Dispatcher<Req, Res>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Appends an interceptor observing the full span of each call. Order is
    /// significant: application interceptors run in insertion order, before
    /// the retry stage.
    pub fn add_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor<Req, Res> + 'static,
    {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// [`add_interceptor`](ClientBuilder::add_interceptor) for an async
    /// closure.
    pub fn add_interceptor_fn<F, Fut>(self, name: impl Into<String>, behavior: F) -> Self
    where
        F: Fn(Chain<Req, Res>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult<Res>> + Send + 'static,
    {
        self.add_interceptor(FnInterceptor::new(name, behavior))
    }

    /// Appends an interceptor positioned after the retry stage, closest to
    /// the transport. Network interceptors run once per attempt; the last one
    /// must produce the response rather than proceed.
    pub fn add_network_interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: Interceptor<Req, Res> + 'static,
    {
        self.network_interceptors.push(Arc::new(interceptor));
        self
    }

    /// [`add_network_interceptor`](ClientBuilder::add_network_interceptor)
    /// for an async closure.
    pub fn add_network_interceptor_fn<F, Fut>(self, name: impl Into<String>, behavior: F) -> Self
    where
        F: Fn(Chain<Req, Res>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CallResult<Res>> + Send + 'static,
    {
        self.add_network_interceptor(FnInterceptor::new(name, behavior))
    }

    /// Extra attempts after the first when a call fails with a transient
    /// error. Zero disables retrying.
    pub fn retry_times_on_error(mut self, retry_times_on_error: usize) -> Self {
        self.retry_times_on_error = retry_times_on_error;
        self
    }

    /// Advisory bound on a complete call, consulted by transport stages.
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.timeouts.call = Some(call_timeout);
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.timeouts.connect = connect_timeout;
        self
    }

    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.timeouts.read = read_timeout;
        self
    }

    pub fn write_timeout(mut self, write_timeout: Duration) -> Self {
        self.timeouts.write = write_timeout;
        self
    }

    pub fn build(self) -> Client<Req, Res> {
        Client {
            inner: Arc::new(ClientInner {
                dispatcher: self.dispatcher,
                interceptors: self.interceptors,
                network_interceptors: self.network_interceptors,
                retry_times_on_error: self.retry_times_on_error,
                timeouts: self.timeouts,
            }),
        }
    }
}

impl<Req, Res> Default for ClientBuilder<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
