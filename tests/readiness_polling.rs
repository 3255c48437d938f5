use std::error::Error;
use std::time::Duration;

use ghostctl::config::{DeploymentLayout, ReadinessSection};
use ghostctl::readiness::{ReadinessPlan, ReadinessState, wait_until_ready};
use ghostctl_test_utils::builders::unit;
use ghostctl_test_utils::init_tracing;
use ghostctl_test_utils::scripted::{ManualClock, ScriptedObserver};

type TestResult = Result<(), Box<dyn Error>>;

const APP: &str = "ghostwriter_django";
const DB: &str = "ghostwriter_postgres";

fn plan(max_iterations: u32) -> ReadinessPlan {
    let readiness = ReadinessSection {
        max_iterations,
        ..Default::default()
    };
    ReadinessPlan::from_config(&DeploymentLayout::default(), &readiness)
}

fn both_running() -> Vec<ghostctl::units::Unit> {
    vec![
        unit(APP, "ghostwriter_production_django"),
        unit(DB, "ghostwriter_production_postgres"),
    ]
}

#[tokio::test]
async fn ready_once_the_success_marker_appears() -> TestResult {
    init_tracing();
    let observer = ScriptedObserver::new(both_running()).with_logs(
        APP,
        vec![
            vec!["Applying migrations..."],
            vec!["Applying migrations...", "Seeding"],
            vec!["Seeding", "INFO:     Application startup complete."],
        ],
    );
    let clock = ManualClock::new();

    let state = wait_until_ready(&plan(120), &observer, &clock).await?;

    assert_eq!(state, ReadinessState::Ready);
    assert_eq!(observer.list_calls(), 3);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);
    Ok(())
}

#[tokio::test]
async fn tails_use_the_configured_line_counts() -> TestResult {
    let observer = ScriptedObserver::new(both_running()).with_logs(
        APP,
        vec![vec!["migrating"], vec!["Application startup complete"]],
    );
    let clock = ManualClock::new();

    wait_until_ready(&plan(120), &observer, &clock).await?;

    assert_eq!(
        observer.tail_requests(),
        vec![
            (APP.to_string(), 500),
            (DB.to_string(), 100),
            (APP.to_string(), 500),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn database_logs_are_skipped_once_the_app_is_ready() -> TestResult {
    let observer = ScriptedObserver::new(both_running())
        .with_logs(APP, vec![vec!["Application startup complete"]])
        .with_logs(DB, vec![vec!["Password does not match for user \"postgres\""]]);
    let clock = ManualClock::new();

    let state = wait_until_ready(&plan(120), &observer, &clock).await?;

    assert_eq!(state, ReadinessState::Ready);
    assert_eq!(observer.tail_requests(), vec![(APP.to_string(), 500)]);
    Ok(())
}

#[tokio::test]
async fn credential_mismatch_fails_before_the_ceiling() -> TestResult {
    let observer = ScriptedObserver::new(both_running())
        .with_logs(APP, vec![vec!["waiting for database"]])
        .with_logs(
            DB,
            vec![
                vec!["starting"],
                vec!["FATAL:  password authentication failed for user \"postgres\"", "DETAIL:  Password does not match for user \"postgres\"."],
            ],
        );
    let clock = ManualClock::new();

    let state = wait_until_ready(&plan(120), &observer, &clock).await?;

    assert_eq!(state, ReadinessState::Failed);
    assert_eq!(observer.list_calls(), 2);
    assert!(clock.sleeps().len() < 120);
    Ok(())
}

#[tokio::test]
async fn gives_up_after_the_iteration_ceiling() -> TestResult {
    let observer =
        ScriptedObserver::new(both_running()).with_logs(APP, vec![vec!["still migrating"]]);
    let clock = ManualClock::new();

    let state = wait_until_ready(&plan(5), &observer, &clock).await?;

    assert_eq!(state, ReadinessState::TimedOut);
    assert_eq!(observer.list_calls(), 5);
    assert_eq!(clock.elapsed(), Duration::from_secs(4));
    Ok(())
}

#[tokio::test]
async fn a_vanished_unit_is_reported_as_crashed() -> TestResult {
    let observer = ScriptedObserver::with_unit_frames(vec![
        both_running(),
        vec![unit(DB, "ghostwriter_production_postgres")],
    ])
    .with_logs(APP, vec![vec!["booting"]]);
    let clock = ManualClock::new();

    let state = wait_until_ready(&plan(120), &observer, &clock).await?;

    assert_eq!(state, ReadinessState::CrashedExternally);
    assert_eq!(clock.sleeps().len(), 1);
    Ok(())
}

#[tokio::test]
async fn missing_database_unit_is_not_a_failure() -> TestResult {
    let observer = ScriptedObserver::new(vec![unit(APP, "ghostwriter_local_django")])
        .with_logs(APP, vec![vec![], vec!["Application startup complete"]]);
    let clock = ManualClock::new();

    let state = wait_until_ready(&plan(120), &observer, &clock).await?;

    assert_eq!(state, ReadinessState::Ready);
    assert!(observer.tail_requests().iter().all(|(name, _)| name == APP));
    Ok(())
}
