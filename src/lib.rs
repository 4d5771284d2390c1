//! `callx` is a generic, asynchronous call-execution engine: a [`Client`]
//! accepts typed requests, runs each one through an ordered pipeline of
//! [`Interceptor`]s, and bounds concurrent execution with a [`Dispatcher`]
//! and its FIFO ready queue.
//!
//! The engine is parametric over the request and response types and knows
//! nothing about any transport. The terminal pipeline stage, a network
//! interceptor supplied by the embedding application, is what actually talks
//! to a socket, a radio, or whatever else produces responses.
//!
//! # Quick Start
//!
//! ```no_run
//! use callx::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! struct Ping(&'static str);
//!
//! #[derive(Debug)]
//! struct Pong(String);
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::<Ping, Pong>::builder()
//!         .retry_times_on_error(2)
//!         .add_interceptor_fn("stamp", |chain| async move {
//!             chain.context().insert("accepted", true);
//!             chain.proceed(chain.request().clone()).await
//!         })
//!         .add_network_interceptor_fn("transport", |chain| async move {
//!             Ok(Pong(format!("pong: {}", chain.request().0)))
//!         })
//!         .build();
//!
//!     let pong = client.new_call(Ping("hello")).enqueue().await?;
//!     println!("{pong:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Create one `Client` per logical backend and share it; every client drags
//!   along a dispatcher and its concurrency budget.
//! - Keep the terminal transport stage a network interceptor so the built-in
//!   retry stage can reattempt it.
//! - Long-running transport stages should poll [`Chain::is_canceled`] so
//!   cancellation takes effect before the next chain boundary.

mod call;
mod client;
mod context;
mod dispatcher;
mod error;
mod interceptor;
mod retry;
mod util;

pub use crate::call::Call;
pub use crate::client::{Client, ClientBuilder, Timeouts};
pub use crate::context::CallContext;
pub use crate::dispatcher::Dispatcher;
pub use crate::error::{BoxError, CallResult, Error, ErrorCode};
pub use crate::interceptor::{from_fn, Chain, FnInterceptor, InterceptFut, Interceptor};
pub use crate::retry::RetryInterceptor;

pub mod prelude {
    pub use crate::{
        Call, CallContext, CallResult, Chain, Client, ClientBuilder, Dispatcher, Error, ErrorCode,
        FnInterceptor, Interceptor, RetryInterceptor, Timeouts,
    };
}
