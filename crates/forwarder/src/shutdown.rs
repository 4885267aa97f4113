//! Dual-component graceful shutdown.
//!
//! The coordinator starts the pipeline and the health server, waits for a
//! termination signal, cancels the shared token and then waits for every
//! component's completion signal within the shutdown budget. Missing the
//! budget is the one shutdown condition treated as an operational failure.

use std::future::Future;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ForwardError;

/// Lifecycle of a shutdown round.
///
/// `Running` → `Draining` on the first termination signal; `Draining` →
/// `Done` once every component reports completion in time; `Draining` →
/// `Forced` on budget expiry or a second signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Forced,
    Done,
}

type ComponentResult = (&'static str, Result<Result<(), ForwardError>, JoinError>);

/// A supervised long-lived task with an independent completion signal.
pub struct Component {
    name: &'static str,
    handle: JoinHandle<Result<(), ForwardError>>,
}

impl Component {
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = Result<(), ForwardError>> + Send + 'static,
    {
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }

    async fn join(self) -> ComponentResult {
        (self.name, self.handle.await)
    }
}

pub struct ShutdownCoordinator {
    cancel: CancellationToken,
    shutdown_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            shutdown_timeout,
        }
    }

    /// The token shared with every component.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Supervise `components` until a termination signal arrives, then drive
    /// the drain. A component finishing early (cleanly or not) also starts
    /// the drain, since the service is incomplete without it.
    pub async fn run(self, components: Vec<Component>) -> Result<(), ForwardError> {
        let mut signals = TerminationSignals::install();
        let mut pending: FuturesUnordered<_> =
            components.into_iter().map(Component::join).collect();
        let mut state = ShutdownState::Running;
        let mut early_failure: Option<ForwardError> = None;

        while state == ShutdownState::Running {
            tokio::select! {
                _ = signals.recv() => {
                    info!("termination signal received, draining");
                    state = ShutdownState::Draining;
                }
                completion = pending.next(), if !pending.is_empty() => {
                    if let Some((name, joined)) = completion {
                        match settle(name, joined) {
                            Ok(()) => warn!(component = name, "component finished before shutdown, draining"),
                            Err(err) => {
                                error!(component = name, error = %err, "component failed, draining");
                                early_failure = Some(err);
                            }
                        }
                    }
                    state = ShutdownState::Draining;
                }
            }
        }

        self.cancel.cancel();

        let drained = tokio::select! {
            result = drain_components(&mut pending, self.shutdown_timeout) => {
                state = if result.is_ok() { ShutdownState::Done } else { ShutdownState::Forced };
                result
            }
            // A second signal forces an immediate return without waiting.
            _ = signals.recv() => {
                warn!("second termination signal received, forcing shutdown");
                state = ShutdownState::Forced;
                Ok(())
            }
        };

        match early_failure {
            Some(err) => Err(err),
            None => drained.map(|()| {
                if state == ShutdownState::Done {
                    info!("shutdown complete");
                }
            }),
        }
    }
}

/// Wait for all component completion signals within `timeout`; expiry yields
/// the distinguished graceful-shutdown failure.
async fn drain_components<F>(
    pending: &mut FuturesUnordered<F>,
    timeout: Duration,
) -> Result<(), ForwardError>
where
    F: Future<Output = ComponentResult>,
{
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut first_failure: Option<ForwardError> = None;

    while !pending.is_empty() {
        tokio::select! {
            _ = &mut deadline => {
                error!(timeout = ?timeout, "components did not finish in time");
                return Err(ForwardError::ShutdownTimeout { timeout });
            }
            completion = pending.next() => {
                if let Some((name, joined)) = completion {
                    match settle(name, joined) {
                        Ok(()) => info!(component = name, "component finished"),
                        Err(err) => {
                            error!(component = name, error = %err, "component failed during drain");
                            first_failure.get_or_insert(err);
                        }
                    }
                }
            }
        }
    }

    match first_failure {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

fn settle(
    name: &'static str,
    joined: Result<Result<(), ForwardError>, JoinError>,
) -> Result<(), ForwardError> {
    match joined {
        Ok(result) => result,
        Err(join_err) => Err(ForwardError::ComponentPanic {
            component: name,
            reason: join_err.to_string(),
        }),
    }
}

struct TerminationSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    fn install() -> Self {
        Self {
            #[cfg(unix)]
            sigterm: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler"),
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = self.sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_from(
        components: Vec<Component>,
    ) -> FuturesUnordered<impl Future<Output = ComponentResult>> {
        components.into_iter().map(Component::join).collect()
    }

    #[tokio::test]
    async fn drain_succeeds_when_all_components_finish_in_time() {
        let components = vec![
            Component::spawn("pipeline", async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            }),
            Component::spawn("health-server", async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(())
            }),
        ];
        let mut pending = pending_from(components);

        let result = drain_components(&mut pending, Duration::from_secs(5)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn drain_times_out_with_the_distinguished_error() {
        let components = vec![Component::spawn("pipeline", async {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(())
        })];
        let mut pending = pending_from(components);

        let result = drain_components(&mut pending, Duration::from_millis(50)).await;
        match result {
            Err(ForwardError::ShutdownTimeout { .. }) => {}
            other => panic!("expected shutdown timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drain_surfaces_a_component_failure() {
        let components = vec![
            Component::spawn("pipeline", async { Ok(()) }),
            Component::spawn("health-server", async {
                Err(ForwardError::health_server("failed to bind"))
            }),
        ];
        let mut pending = pending_from(components);

        let result = drain_components(&mut pending, Duration::from_secs(5)).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("failed to bind"));
    }

    #[tokio::test]
    async fn drain_reports_a_panicked_component() {
        let components = vec![Component::spawn("pipeline", async { panic!("boom") })];
        let mut pending = pending_from(components);

        let result = drain_components(&mut pending, Duration::from_secs(5)).await;
        match result {
            Err(ForwardError::ComponentPanic { component, .. }) => {
                assert_eq!(component, "pipeline");
            }
            other => panic!("expected component panic, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn drain_of_nothing_is_immediate() {
        let mut pending = pending_from(Vec::new());
        let result = drain_components(&mut pending, Duration::from_millis(10)).await;
        assert!(result.is_ok());
    }
}
