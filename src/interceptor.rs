use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::trace;

use crate::call::CallState;
use crate::client::Client;
use crate::context::CallContext;
use crate::error::{CallResult, Error};

/// Interceptor invocation future type alias.
pub type InterceptFut<'a, Res> = Pin<Box<dyn Future<Output = CallResult<Res>> + Send + 'a>>;

/// A pipeline stage that may observe or rewrite the request, delegate
/// downstream via [`Chain::proceed`], and observe or rewrite the response on
/// the way back.
///
/// Stages nest: a stage's code before `proceed` runs before every later stage,
/// and its code after `proceed` runs after every later stage has completed.
/// Calling `proceed` twice genuinely re-executes the rest of the chain, which
/// is how retry stages work; stages that do not want that must call it once.
pub trait Interceptor<Req, Res>: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str {
        "interceptor"
    }

    fn intercept(&self, chain: Chain<Req, Res>) -> InterceptFut<'_, Res>;
}

/// Adapts an async closure into an [`Interceptor`].
///
/// ```no_run
/// # use callx::{Chain, FnInterceptor};
/// let passthrough = FnInterceptor::new("passthrough", |chain: Chain<u32, String>| async move {
///     chain.proceed(*chain.request()).await
/// });
/// ```
pub struct FnInterceptor<F> {
    name: String,
    behavior: F,
}

impl<F> FnInterceptor<F> {
    pub fn new(name: impl Into<String>, behavior: F) -> Self {
        Self {
            name: name.into(),
            behavior,
        }
    }
}

/// Convenience constructor for [`FnInterceptor`].
pub fn from_fn<F>(name: impl Into<String>, behavior: F) -> FnInterceptor<F> {
    FnInterceptor::new(name, behavior)
}

impl<Req, Res, F, Fut> Interceptor<Req, Res> for FnInterceptor<F>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
    F: Fn(Chain<Req, Res>) -> Fut + Send + Sync,
    Fut: Future<Output = CallResult<Res>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn intercept(&self, chain: Chain<Req, Res>) -> InterceptFut<'_, Res> {
        Box::pin((self.behavior)(chain))
    }
}

/// Cursor over the interceptor list for one call execution.
///
/// A chain value is immutable: `proceed` does not advance it in place but
/// builds the next cursor with `index + 1` and the given request, so a
/// misbehaving stage that holds on to its chain (or proceeds repeatedly)
/// cannot corrupt another hop's view of the pipeline.
pub struct Chain<Req, Res> {
    interceptors: Arc<[Arc<dyn Interceptor<Req, Res>>]>,
    index: usize,
    request: Req,
    state: Arc<CallState>,
    client: Client<Req, Res>,
    context: CallContext,
}

impl<Req, Res> Chain<Req, Res>
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    pub(crate) fn new(
        interceptors: Arc<[Arc<dyn Interceptor<Req, Res>>]>,
        request: Req,
        state: Arc<CallState>,
        client: Client<Req, Res>,
    ) -> Self {
        Self {
            interceptors,
            index: 0,
            request,
            state,
            client,
            context: CallContext::new(),
        }
    }

    fn next(&self, request: Req) -> Self {
        Self {
            interceptors: Arc::clone(&self.interceptors),
            index: self.index + 1,
            request,
            state: Arc::clone(&self.state),
            client: self.client.clone(),
            context: self.context.clone(),
        }
    }

    /// The request as seen at this hop, including rewrites by earlier stages.
    pub fn request(&self) -> &Req {
        &self.request
    }

    pub fn client(&self) -> &Client<Req, Res> {
        &self.client
    }

    /// Mutable storage shared by every hop of this call's execution.
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Whether the owning call has been canceled. Long-running terminal
    /// stages should poll this and bail out early.
    pub fn is_canceled(&self) -> bool {
        self.state.is_canceled()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Hands `request` to the next pipeline stage and returns its outcome
    /// unchanged.
    ///
    /// Fails with [`Error::Canceled`] once the call's cancel flag is set, and
    /// with [`Error::ChainExhausted`] when invoked by the terminal stage.
    pub async fn proceed(&self, request: Req) -> CallResult<Res> {
        if self.state.is_canceled() {
            return Err(Error::Canceled);
        }
        let len = self.interceptors.len();
        if self.index >= len {
            return Err(Error::ChainExhausted {
                index: self.index,
                len,
            });
        }

        let interceptor = Arc::clone(&self.interceptors[self.index]);
        trace!(
            index = self.index,
            interceptor = interceptor.name(),
            "proceeding"
        );
        let next = self.next(request);
        interceptor.intercept(next).await
    }
}
