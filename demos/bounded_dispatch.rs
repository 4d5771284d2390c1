use std::time::Duration;

use callx::prelude::*;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let dispatcher = Dispatcher::new();
    dispatcher.set_max_requests(2)?;
    dispatcher.set_idle_callback(|| println!("dispatcher idle"));

    let client = Client::<u32, String>::builder()
        .dispatcher(dispatcher)
        .retry_times_on_error(0)
        .add_network_interceptor_fn("slow-transport", |chain| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(format!("done-{}", chain.request()))
        })
        .build();

    let started = Instant::now();
    let mut handles = Vec::new();
    for id in 0..6_u32 {
        let call = client.new_call(id);
        handles.push(tokio::spawn(async move { call.enqueue().await }));
    }

    for handle in handles {
        match handle.await? {
            Ok(response) => println!("{response} at {:?}", started.elapsed()),
            Err(error) => println!("error={error}"),
        }
    }

    // Six 300ms calls through two slots take ~900ms end to end.
    println!("elapsed_ms={}", started.elapsed().as_millis());
    Ok(())
}
