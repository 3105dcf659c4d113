use std::{sync::Arc, time::Duration};

use metrics_loggregator::{MetricRegistry, Options, Reporter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,metrics_loggregator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = Arc::new(MetricRegistry::new());
    let requests = registry.get_or_register_counter("requests")?;
    let queue_depth = registry.get_or_register_gauge("queue_depth")?;
    let latency = registry.get_or_register_timer("latency")?;
    std::thread::spawn(move || {
        let mut i = 0;
        loop {
            latency.time(|| std::thread::sleep(Duration::from_millis(50)));
            requests.inc(1);
            queue_depth.update(i % 16);
            i += 1;
        }
    });

    let config = Options::new()
        .with_frequency(Duration::from_secs(5))
        .with_origin("metron-demo")
        .with_tag("deployment", "local")
        .build();
    let handle = Reporter::new(registry, &config).spawn();

    tracing::info!(
        address = config.collector_address(),
        "Exporting every {:?}, Ctrl+C to stop",
        config.frequency()
    );
    tokio::signal::ctrl_c().await?;
    handle.shutdown().await;
    Ok(())
}
