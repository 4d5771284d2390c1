use callx::prelude::*;

#[derive(Clone, Debug)]
struct Command {
    name: &'static str,
}

#[derive(Debug)]
struct Reply {
    body: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let client = Client::<Command, Reply>::builder()
        .retry_times_on_error(1)
        .add_interceptor_fn("timer", |chain| async move {
            let started = std::time::Instant::now();
            let reply = chain.proceed(chain.request().clone()).await;
            println!("timer: {} took {:?}", chain.request().name, started.elapsed());
            reply
        })
        .add_interceptor_fn("tag", |chain| async move {
            chain.context().insert("request_id", "r-0001".to_owned());
            chain.proceed(chain.request().clone()).await
        })
        .add_network_interceptor_fn("transport", |chain| async move {
            let request_id = chain
                .context()
                .get::<String>("request_id")
                .map(|id| id.as_str().to_owned())
                .unwrap_or_default();
            Ok(Reply {
                body: format!("ack {} ({request_id})", chain.request().name),
            })
        })
        .build();

    let reply = client
        .new_call(Command { name: "sync-state" })
        .enqueue()
        .await?;
    println!("reply: {}", reply.body);
    Ok(())
}
