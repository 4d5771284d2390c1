use tracing::warn;

use crate::error::Error;
use crate::interceptor::{Chain, InterceptFut, Interceptor};

/// Built-in pipeline stage that reattempts the downstream chain on transient
/// failure.
///
/// Sits between application and network interceptors, so application stages
/// observe one logical call while network stages run once per attempt. Each
/// attempt restarts downstream processing from the request this stage
/// received, not one rewritten by a failed attempt. The configured
/// [`retry_times_on_error`](crate::Client::retry_times_on_error) counts extra
/// attempts after the first.
///
/// Retries are immediate, with no backoff; a transport stage that knows what a
/// sensible delay looks like for its medium should sleep before failing.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryInterceptor;

impl<Req, Res> Interceptor<Req, Res> for RetryInterceptor
where
    Req: Clone + Send + Sync + 'static,
    Res: Send + 'static,
{
    fn name(&self) -> &str {
        "retry"
    }

    fn intercept(&self, chain: Chain<Req, Res>) -> InterceptFut<'_, Res> {
        Box::pin(async move {
            let request = chain.request().clone();
            let attempts = chain.client().retry_times_on_error().saturating_add(1);
            let mut last_error = None;

            for attempt in 1..=attempts {
                match chain.proceed(request.clone()).await {
                    Ok(response) => return Ok(response),
                    Err(error) if error.is_retryable() => {
                        warn!(attempt, max_attempts = attempts, error = %error, "call attempt failed");
                        last_error = Some(error);
                    }
                    // Cancellation and contract violations pass through.
                    Err(error) => return Err(error),
                }
            }

            Err(last_error.unwrap_or_else(|| Error::failed("no call attempt was executed")))
        })
    }
}
