// src/readiness.rs

//! Readiness polling: wait for the application unit to finish starting.
//!
//! The application's own status endpoint is unavailable while it migrates
//! and seeds, so its log output is the only signal. Each iteration:
//!
//! 1. the application unit must still be running (else `CrashedExternally`),
//! 2. its recent logs are searched for the success marker (`Ready`),
//! 3. the database unit's recent logs are searched for the known credential
//!    mismatch marker (`Failed`),
//! 4. otherwise the poller sleeps one interval; after the iteration ceiling
//!    it gives up (`TimedOut`).
//!
//! The decision for one iteration is the pure function [`evaluate`]; the
//! async driver [`wait_until_ready`] only gathers observations and sleeps
//! through an injectable [`Clock`].

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::{DeploymentLayout, ReadinessSection};
use crate::errors::Result;
use crate::exec::BoxFuture;
use crate::units::UnitObserver;

/// State of the readiness state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Still starting; `iteration` observations have been made so far.
    Waiting { iteration: u32 },
    Ready,
    Failed,
    TimedOut,
    CrashedExternally,
}

impl ReadinessState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReadinessState::Waiting { .. })
    }
}

/// Fatal outcomes of the readiness wait.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadinessFailure {
    #[error("The `{0}` unit is no longer running; check its logs with `ghostctl logs`")]
    Crashed(String),

    #[error(
        "The database rejected the configured credentials. This usually means the database volume was created with a different password. See: {0}"
    )]
    BadConfiguration(String),

    #[error("The application did not finish starting after {0} checks")]
    TimedOut(u32),
}

/// Everything the poller needs to know, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ReadinessPlan {
    pub app_unit: String,
    pub dependency_unit: String,
    pub success_marker: String,
    pub failure_marker: String,
    pub max_iterations: u32,
    pub interval: Duration,
    pub app_tail: usize,
    pub dependency_tail: usize,
    pub remediation_url: String,
}

impl ReadinessPlan {
    pub fn from_config(layout: &DeploymentLayout, readiness: &ReadinessSection) -> Self {
        Self {
            app_unit: layout.app_unit.clone(),
            dependency_unit: layout.db_unit.clone(),
            success_marker: readiness.success_marker.clone(),
            failure_marker: readiness.failure_marker.clone(),
            max_iterations: readiness.max_iterations,
            interval: Duration::from_millis(readiness.interval_ms),
            app_tail: readiness.app_tail,
            dependency_tail: readiness.dependency_tail,
            remediation_url: readiness.remediation_url.clone(),
        }
    }

    /// Map a terminal state to the caller-facing result.
    pub fn into_result(&self, state: ReadinessState) -> std::result::Result<(), ReadinessFailure> {
        match state {
            ReadinessState::Ready => Ok(()),
            ReadinessState::Failed => Err(ReadinessFailure::BadConfiguration(
                self.remediation_url.clone(),
            )),
            ReadinessState::CrashedExternally => {
                Err(ReadinessFailure::Crashed(self.app_unit.clone()))
            }
            ReadinessState::TimedOut | ReadinessState::Waiting { .. } => {
                Err(ReadinessFailure::TimedOut(self.max_iterations))
            }
        }
    }
}

/// What one iteration saw.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub app_running: bool,
    pub app_logs: Vec<String>,
    pub dependency_logs: Vec<String>,
}

/// Decide the next state after observation number `iteration` (0-based).
pub fn evaluate(plan: &ReadinessPlan, iteration: u32, obs: &Observation) -> ReadinessState {
    if !obs.app_running {
        return ReadinessState::CrashedExternally;
    }
    if contains_marker(&obs.app_logs, &plan.success_marker) {
        return ReadinessState::Ready;
    }
    if contains_marker(&obs.dependency_logs, &plan.failure_marker) {
        return ReadinessState::Failed;
    }

    let next = iteration + 1;
    if next >= plan.max_iterations {
        ReadinessState::TimedOut
    } else {
        ReadinessState::Waiting { iteration: next }
    }
}

fn contains_marker(lines: &[String], marker: &str) -> bool {
    lines.iter().any(|line| line.contains(marker))
}

/// Source of delays for the polling loop.
pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Real time, via `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Gather one [`Observation`].
async fn observe(plan: &ReadinessPlan, observer: &dyn UnitObserver) -> Result<Observation> {
    let units = observer.running_units().await?;

    let Some(app) = units.iter().find(|u| u.name == plan.app_unit) else {
        return Ok(Observation::default());
    };
    let app_logs = observer.tail_logs(app, plan.app_tail).await?;

    // The database is only consulted once the application is known not ready.
    let dependency_logs = if contains_marker(&app_logs, &plan.success_marker) {
        Vec::new()
    } else {
        match units.iter().find(|u| u.name == plan.dependency_unit) {
            Some(db) => observer.tail_logs(db, plan.dependency_tail).await?,
            None => Vec::new(),
        }
    };

    Ok(Observation {
        app_running: true,
        app_logs,
        dependency_logs,
    })
}

/// Poll until a terminal state is reached and return it.
///
/// Errors only when the observer itself fails (for example the engine is
/// unreachable); every readiness outcome is a state.
pub async fn wait_until_ready(
    plan: &ReadinessPlan,
    observer: &dyn UnitObserver,
    clock: &dyn Clock,
) -> Result<ReadinessState> {
    let mut state = ReadinessState::Waiting { iteration: 0 };

    while let ReadinessState::Waiting { iteration } = state {
        let obs = observe(plan, observer).await?;
        state = evaluate(plan, iteration, &obs);
        debug!(iteration, ?state, "readiness check");

        if !state.is_terminal() {
            clock.sleep(plan.interval).await;
        }
    }

    info!(?state, "readiness wait finished");
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(max_iterations: u32) -> ReadinessPlan {
        let section = ReadinessSection {
            max_iterations,
            ..Default::default()
        };
        ReadinessPlan::from_config(&DeploymentLayout::default(), &section)
    }

    fn running(app: &[&str], db: &[&str]) -> Observation {
        Observation {
            app_running: true,
            app_logs: app.iter().map(|s| s.to_string()).collect(),
            dependency_logs: db.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn stopped_unit_is_a_crash_even_with_markers() {
        let obs = Observation {
            app_running: false,
            app_logs: vec!["Application startup complete.".into()],
            dependency_logs: vec![],
        };
        assert_eq!(evaluate(&plan(5), 0, &obs), ReadinessState::CrashedExternally);
    }

    #[test]
    fn success_wins_over_failure_marker() {
        let obs = running(
            &["INFO: Application startup complete."],
            &["FATAL: Password does not match for user \"postgres\""],
        );
        assert_eq!(evaluate(&plan(5), 3, &obs), ReadinessState::Ready);
    }

    #[test]
    fn failure_marker_in_dependency_logs_fails() {
        let obs = running(&["migrating"], &["Password does not match for user x"]);
        assert_eq!(evaluate(&plan(5), 0, &obs), ReadinessState::Failed);
    }

    #[test]
    fn counter_advances_then_times_out() {
        let obs = running(&["migrating"], &[]);
        assert_eq!(
            evaluate(&plan(3), 0, &obs),
            ReadinessState::Waiting { iteration: 1 }
        );
        assert_eq!(
            evaluate(&plan(3), 1, &obs),
            ReadinessState::Waiting { iteration: 2 }
        );
        assert_eq!(evaluate(&plan(3), 2, &obs), ReadinessState::TimedOut);
    }

    #[test]
    fn terminal_states_map_to_failures() {
        let p = plan(7);
        assert_eq!(p.into_result(ReadinessState::Ready), Ok(()));
        assert_eq!(
            p.into_result(ReadinessState::TimedOut),
            Err(ReadinessFailure::TimedOut(7))
        );
        assert!(matches!(
            p.into_result(ReadinessState::Failed),
            Err(ReadinessFailure::BadConfiguration(url)) if url.contains("ghostwriter.wiki")
        ));
        assert_eq!(
            p.into_result(ReadinessState::CrashedExternally),
            Err(ReadinessFailure::Crashed("ghostwriter_django".to_string()))
        );
    }
}
