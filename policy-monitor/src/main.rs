use anyhow::Context as _;
use clap::Parser;
use policy_monitor::client;
use policy_monitor::config::Args;
use policy_monitor::monitor::Monitor;
use policy_monitor::pubsub;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let builder = match &args.credentials {
        Some(path) => client::Builder::new().credentials_path(path.clone()),
        None => client::Builder::new().credentials(args.prompt_credentials()?),
    };
    let subscription = args.subscription()?;

    let auth = builder
        .build()?
        .connect()
        .await
        .context("OAuth JWT bearer exchange failed")?;

    info!("Authenticated against {}", auth.instance_url()?);

    let channel = pubsub::connect(pubsub::ENDPOINT)
        .await
        .context("Failed to connect to the Pub/Sub endpoint")?;
    let context = pubsub::Client::new(channel, auth)?;

    let mut monitor = Monitor::new(context, subscription);
    let outcome = tokio::select! {
        result = monitor.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(result) => result?,
        None => {
            info!("Shutting down");
            if let Some(replay_id) = monitor.last_replay_id() {
                info!("Resume after this event with --replay custom --replay-id {replay_id}");
            }
        }
    }

    Ok(())
}
