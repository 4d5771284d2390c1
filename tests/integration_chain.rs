use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use callx::prelude::*;
use callx::InterceptFut;

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn counting_transport(
    counter: &Arc<AtomicUsize>,
    failures_before_success: usize,
) -> impl Fn(Chain<u32, String>) -> InterceptFut<'static, String> + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |chain| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= failures_before_success {
                return Err(Error::failed(format!("attempt {attempt} failed")));
            }
            Ok(format!("response-{}", chain.request()))
        })
    }
}

#[tokio::test]
async fn pipeline_runs_in_onion_order() {
    let log: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));

    let mut builder = Client::<u32, String>::builder().retry_times_on_error(0);
    for index in 0..3 {
        let log = Arc::clone(&log);
        builder = builder.add_interceptor_fn(format!("log-{index}"), move |chain| {
            let log = Arc::clone(&log);
            async move {
                lock_unpoisoned(&log).push(index);
                let response = chain.proceed(*chain.request()).await;
                lock_unpoisoned(&log).push(index);
                response
            }
        });
    }
    let client = builder
        .add_network_interceptor_fn("transport", |chain| async move {
            Ok(format!("response-{}", chain.request()))
        })
        .build();

    let response = client
        .new_call(7)
        .enqueue()
        .await
        .expect("call should succeed");

    assert_eq!(response, "response-7");
    assert_eq!(*lock_unpoisoned(&log), vec![0, 1, 2, 2, 1, 0]);
}

#[tokio::test]
async fn context_is_shared_across_hops_and_directions() {
    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let tag_observed = Arc::clone(&observed);
    let transport_observed = Arc::clone(&observed);
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(0)
        .add_interceptor_fn("tag", move |chain| {
            let observed = Arc::clone(&tag_observed);
            async move {
                chain.context().insert("request_id", "r-1".to_owned());
                let response = chain.proceed(*chain.request()).await;
                if let Some(status) = chain.context().get::<u16>("status") {
                    lock_unpoisoned(&observed).push(format!("status={status}"));
                }
                response
            }
        })
        .add_network_interceptor_fn("transport", move |chain| {
            let observed = Arc::clone(&transport_observed);
            async move {
                if let Some(request_id) = chain.context().get::<String>("request_id") {
                    lock_unpoisoned(&observed).push(format!("id={request_id}"));
                }
                chain.context().insert("status", 200_u16);
                Ok("done".to_owned())
            }
        })
        .build();

    client
        .new_call(1)
        .enqueue()
        .await
        .expect("call should succeed");

    assert_eq!(*lock_unpoisoned(&observed), vec!["id=r-1", "status=200"]);
}

#[tokio::test]
async fn rewritten_request_is_visible_downstream() {
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(0)
        .add_interceptor_fn("rewrite", |chain| async move {
            chain.proceed(chain.request() + 1).await
        })
        .add_network_interceptor_fn("transport", |chain| async move {
            Ok(format!("saw-{}", chain.request()))
        })
        .build();

    let response = client
        .new_call(41)
        .enqueue()
        .await
        .expect("call should succeed");
    assert_eq!(response, "saw-42");
}

#[tokio::test]
async fn retry_returns_success_from_third_attempt() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(2)
        .add_network_interceptor(callx::from_fn(
            "flaky-transport",
            counting_transport(&attempts, 2),
        ))
        .build();

    let response = client
        .new_call(3)
        .enqueue()
        .await
        .expect("third attempt should succeed");

    assert_eq!(response, "response-3");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_exhausts_and_surfaces_last_cause() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(2)
        .add_network_interceptor(callx::from_fn(
            "failing-transport",
            counting_transport(&attempts, usize::MAX),
        ))
        .build();

    let error = client
        .new_call(3)
        .enqueue()
        .await
        .expect_err("all attempts fail");

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(error.code(), ErrorCode::CallFailed);
    assert!(error.to_string().contains("attempt 3 failed"));
}

#[tokio::test]
async fn retry_zero_extra_attempts_runs_once() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(0)
        .add_network_interceptor(callx::from_fn(
            "failing-transport",
            counting_transport(&attempts, usize::MAX),
        ))
        .build();

    let error = client.new_call(1).enqueue().await.expect_err("must fail");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(error.code(), ErrorCode::CallFailed);
}

#[tokio::test]
async fn proceeding_past_the_terminal_stage_is_a_contract_violation() {
    // No network interceptor: the retry stage is the last one and its
    // delegation has nowhere to go.
    let client = Client::<u32, String>::builder().build();

    let error = client
        .new_call(1)
        .enqueue()
        .await
        .expect_err("chain has no terminal stage");

    assert_eq!(error.code(), ErrorCode::ChainExhausted);
    assert!(error.is_contract_violation());
    match error {
        Error::ChainExhausted { index, len } => {
            assert_eq!(index, 1);
            assert_eq!(len, 1);
        }
        other => panic!("unexpected error variant: {other}"),
    }
}

#[tokio::test]
async fn short_circuiting_interceptor_skips_downstream_stages() {
    let transport_runs = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&transport_runs);
    let client = Client::<u32, String>::builder()
        .add_interceptor_fn("cache", |_chain| async move { Ok("cached".to_owned()) })
        .add_network_interceptor_fn("transport", move |_chain| {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok("live".to_owned())
            }
        })
        .build();

    let response = client
        .new_call(1)
        .enqueue()
        .await
        .expect("call should succeed");
    assert_eq!(response, "cached");
    assert_eq!(transport_runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn double_proceed_genuinely_reexecutes_downstream() {
    let transport_runs = Arc::new(AtomicUsize::new(0));
    let runs = Arc::clone(&transport_runs);
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(0)
        .add_interceptor_fn("replay", |chain| async move {
            let first = chain.proceed(*chain.request()).await?;
            let second = chain.proceed(*chain.request()).await?;
            Ok(format!("{first}+{second}"))
        })
        .add_network_interceptor_fn("transport", move |chain| {
            let runs = Arc::clone(&runs);
            async move {
                let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("{}#{run}", chain.request()))
            }
        })
        .build();

    let response = client
        .new_call(9)
        .enqueue()
        .await
        .expect("call should succeed");
    assert_eq!(response, "9#1+9#2");
    assert_eq!(transport_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn interceptor_can_translate_failure_into_fallback_response() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let client = Client::<u32, String>::builder()
        .retry_times_on_error(1)
        .add_interceptor_fn("fallback", |chain| async move {
            match chain.proceed(*chain.request()).await {
                Ok(response) => Ok(response),
                Err(error) if error.is_canceled() => Err(error),
                Err(_) => Ok("fallback".to_owned()),
            }
        })
        .add_network_interceptor(callx::from_fn(
            "failing-transport",
            counting_transport(&attempts, usize::MAX),
        ))
        .build();

    let response = client
        .new_call(1)
        .enqueue()
        .await
        .expect("fallback should mask the failure");
    assert_eq!(response, "fallback");
    // Retry ran its two attempts before the fallback stage saw the error.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}
