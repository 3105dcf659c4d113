//! Drives the exporter on a fixed interval until cancelled.

use std::{io, time::Duration};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, SystemClock},
    config::{Config, Options, DEFAULT_FREQUENCY},
    exporter::Exporter,
    registry::Registry,
    transport::{MetronTransport, Transport},
};

#[derive(Debug)]
pub struct Reporter<R, T = MetronTransport, C = SystemClock> {
    registry: R,
    exporter: Exporter<T, C>,
    frequency: Duration,
}
impl<R: Registry> Reporter<R> {
    /// Opens the UDP transport to the configured Metron agent.
    pub fn new(registry: R, config: &Config) -> Self {
        let transport = MetronTransport::new(config);
        let exporter = Exporter::new(transport, config.time_unit());
        Self::with_exporter(registry, exporter, config.frequency())
    }
}
impl<R, T, C> Reporter<R, T, C>
where
    R: Registry,
    T: Transport,
    C: Clock,
{
    /// A zero `frequency` falls back to [`DEFAULT_FREQUENCY`].
    pub fn with_exporter(registry: R, exporter: Exporter<T, C>, frequency: Duration) -> Self {
        let frequency = if frequency.is_zero() {
            DEFAULT_FREQUENCY
        } else {
            frequency
        };
        Self {
            registry,
            exporter,
            frequency,
        }
    }

    /// Exports once per `frequency` until `token` is cancelled.
    ///
    /// The first export happens one full period after the call. An export
    /// that overruns the period is followed immediately by the next one.
    pub async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.frequency, self.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!(frequency = ?self.frequency, "Metrics reporter started");
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.exporter.export(&self.registry);
        }
        tracing::debug!("Metrics reporter stopped");
    }
}
impl<R, T, C> Reporter<R, T, C>
where
    R: Registry + 'static,
    T: Transport + 'static,
    C: Clock + 'static,
{
    /// Spawns onto the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Outside of a tokio runtime. Use [`Reporter::install`] there.
    pub fn spawn(self) -> ReporterHandle {
        let token = CancellationToken::new();
        let join = tokio::spawn(self.run(token.clone()));
        ReporterHandle {
            token,
            join: Join::Task(join),
        }
    }

    /// Spawns onto the current tokio runtime if there is one, otherwise onto
    /// a background thread running its own single-threaded runtime.
    pub fn install(self) -> io::Result<ReporterHandle> {
        let token = CancellationToken::new();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let join = runtime.spawn(self.run(token.clone()));
            return Ok(ReporterHandle {
                token,
                join: Join::Task(join),
            });
        }
        let child = token.clone();
        let thread = std::thread::Builder::new()
            .name("metrics-reporter".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        tracing::warn!(error = %e, "Cannot start metrics reporter runtime");
                        return;
                    }
                };
                runtime.block_on(self.run(child));
            })?;
        Ok(ReporterHandle {
            token,
            join: Join::Thread(thread),
        })
    }
}

/// Runs the exporter against `registry` for the life of the process.
pub async fn loggregator<R: Registry>(registry: R, options: Options) {
    let config = options.build();
    Reporter::new(registry, &config)
        .run(CancellationToken::new())
        .await
}

#[derive(Debug)]
enum Join {
    Task(tokio::task::JoinHandle<()>),
    Thread(std::thread::JoinHandle<()>),
}

#[derive(Debug)]
pub struct ReporterHandle {
    token: CancellationToken,
    join: Join,
}
impl ReporterHandle {
    /// Stops the loop after the export in flight, if any, completes.
    pub fn cancel(&self) {
        self.token.cancel();
    }
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        let finished = match self.join {
            Join::Task(task) => task.await.is_ok(),
            Join::Thread(thread) => matches!(
                tokio::task::spawn_blocking(move || thread.join()).await,
                Ok(Ok(()))
            ),
        };
        if !finished {
            tracing::warn!("Metrics reporter panicked");
        }
    }
}
