use std::error::Error;
use std::time::Duration;

use ghostctl::backup::upgrade::{DatabaseUpgrade, UpgradeOutcome};
use ghostctl::config::DeploymentLayout;
use ghostctl::errors::OpsError;
use ghostctl::exec::Compose;
use ghostctl::types::{ComposeFlavor, Mode};
use ghostctl_test_utils::builders::InstallRoot;
use ghostctl_test_utils::fake_runner::FakeRunner;
use ghostctl_test_utils::init_tracing;
use ghostctl_test_utils::scripted::ManualClock;

type TestResult = Result<(), Box<dyn Error>>;

const RENDERED_CONFIG: &str = "\
name: ghostwriter
services:
  postgres:
    image: ghostwriter_production_postgres
volumes:
  production_postgres_data:
    name: ghostwriter_production_postgres_data
networks:
  default:
    name: ghostwriter_default
";

fn scripted(root: &InstallRoot, server: &str, data: &str) -> FakeRunner {
    FakeRunner::new(root.path(), root.units_dir())
        .respond(" config", RENDERED_CONFIG)
        .respond("--version", server)
        .respond("PG_VERSION", data)
}

/// Engine calls that bypass the compose tool.
fn engine_calls(runner: &FakeRunner) -> Vec<String> {
    runner
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("docker ") && !c.starts_with("docker compose "))
        .collect()
}

#[tokio::test]
async fn matching_versions_stop_after_the_check() -> TestResult {
    init_tracing();
    let root = InstallRoot::new()?;
    let runner = scripted(&root, "postgres (PostgreSQL) 16.4 (Debian 16.4-1.pgdg120+1)\n", "16\n");
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let clock = ManualClock::new();

    let outcome = DatabaseUpgrade::new(&runner, &compose, &layout, &clock, Mode::Production)
        .run()
        .await?;

    assert_eq!(outcome, UpgradeOutcome::UpToDate(16));
    assert_eq!(
        runner.compose_actions(),
        vec![
            "down",
            "config",
            "build postgres",
            "run -T --rm --entrypoint postgres postgres --version",
            "run -T --rm --entrypoint cat postgres /var/lib/postgresql/data/PG_VERSION",
        ]
    );
    assert!(engine_calls(&runner).is_empty());
    assert!(clock.sleeps().is_empty());
    Ok(())
}

#[tokio::test]
async fn older_data_is_dumped_and_restored_into_a_fresh_volume() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = scripted(&root, "postgres (PostgreSQL) 16.4\n", "13\n");
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let clock = ManualClock::new();

    let outcome = DatabaseUpgrade::new(&runner, &compose, &layout, &clock, Mode::Production)
        .run()
        .await?;

    assert_eq!(outcome, UpgradeOutcome::Upgraded { from: 13, to: 16 });
    assert_eq!(
        engine_calls(&runner),
        vec![
            "docker run -d --rm --name ghostwriter_postgres_upgrade \
             --volume ghostwriter_production_postgres_data:/var/lib/postgresql/data/ \
             --network ghostwriter_default postgres:13",
            "docker stop ghostwriter_postgres_upgrade",
            "docker volume rm ghostwriter_production_postgres_data",
        ]
    );

    let actions = runner.compose_actions();
    assert!(actions[5].starts_with("run -T --rm postgres bash -o pipefail -euc "));
    assert!(actions[5].contains("pg_dump -h ghostwriter_postgres_upgrade"));
    assert_eq!(
        actions[6..],
        [
            "up -d postgres",
            "run -T --rm postgres restore _ghostwriter_postgres_upgrade.sql.gz",
        ]
    );
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(10),
            Duration::from_secs(2),
            Duration::from_secs(10),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn failed_dump_stops_the_old_server_and_keeps_the_volume() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = scripted(&root, "postgres (PostgreSQL) 16.4\n", "13\n").fail_when("pg_dump");
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let clock = ManualClock::new();

    let err = DatabaseUpgrade::new(&runner, &compose, &layout, &clock, Mode::Production)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, OpsError::CommandFailed { .. }));
    let engine = engine_calls(&runner);
    assert_eq!(engine.len(), 2);
    assert_eq!(engine[1], "docker stop ghostwriter_postgres_upgrade");
    assert!(!runner.calls().iter().any(|c| c.contains("volume rm")));
    Ok(())
}

#[tokio::test]
async fn unknown_volume_key_fails_before_building() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = scripted(&root, "postgres (PostgreSQL) 16.4\n", "13\n");
    let compose = Compose::new(ComposeFlavor::Plugin, "local.yml");
    let layout = DeploymentLayout::default();
    let clock = ManualClock::new();

    let err = DatabaseUpgrade::new(&runner, &compose, &layout, &clock, Mode::Development)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, OpsError::Precondition(msg) if msg.contains("local_postgres_data")));
    assert_eq!(runner.compose_actions(), vec!["down", "config"]);
    Ok(())
}
