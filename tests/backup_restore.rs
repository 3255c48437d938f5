use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use ghostctl::backup::BackupCoordinator;
use ghostctl::config::DeploymentLayout;
use ghostctl::errors::OpsError;
use ghostctl::exec::Compose;
use ghostctl::types::ComposeFlavor;
use ghostctl_test_utils::builders::InstallRoot;
use ghostctl_test_utils::fake_runner::FakeRunner;
use ghostctl_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

const MEDIA: &str = "/app/ghostwriter/media";

/// Relative path -> (contents, permission bits).
fn snapshot(root: &Path) -> std::io::Result<BTreeMap<PathBuf, (Vec<u8>, u32)>> {
    fn walk(
        base: &Path,
        dir: &Path,
        out: &mut BTreeMap<PathBuf, (Vec<u8>, u32)>,
    ) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                walk(base, &path, out)?;
            } else {
                let rel = path.strip_prefix(base).unwrap_or(&path).to_path_buf();
                out.insert(rel, (fs::read(&path)?, mode_of(&path)?));
            }
        }
        Ok(())
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

#[cfg(unix)]
fn mode_of(path: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_path: &Path) -> std::io::Result<u32> {
    Ok(0)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn seed_media(runner: &FakeRunner) -> std::io::Result<PathBuf> {
    let media = runner.unit_path("django", MEDIA);
    fs::create_dir_all(media.join("evidence/2024/q1"))?;
    fs::create_dir_all(media.join("templates"))?;
    fs::write(media.join("evidence/2024/q1/screenshot.png"), [137u8, 80, 78, 71, 0, 255])?;
    fs::write(media.join("evidence/notes.txt"), "found creds in share\n")?;
    fs::write(media.join("templates/report.docx"), "PK fake docx")?;
    fs::write(media.join("README"), "")?;
    set_mode(&media.join("templates/report.docx"), 0o640)?;
    set_mode(&media.join("evidence/notes.txt"), 0o600)?;
    set_mode(&media.join("README"), 0o755)?;
    Ok(media)
}

#[tokio::test]
async fn backup_then_restore_reproduces_the_media_tree() -> TestResult {
    init_tracing();
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let media = seed_media(&runner)?;
    let before = snapshot(&media)?;
    assert_eq!(before.len(), 4);

    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap();
    let name = coordinator.backup_at(at).await?;
    assert_eq!(name, "media_backup_2024_05_01T12_30_45.tar.gz");

    let volume = runner.unit_path("postgres", "/backups");
    assert!(volume.join(&name).is_file());
    assert!(volume.join("backup_0.sql.gz").is_file());
    assert!(!root.path().join("media").exists());
    assert!(!root.path().join(&name).exists());

    fs::remove_dir_all(&media)?;
    coordinator.restore("backup_0.sql.gz", Some(&name)).await?;

    assert_eq!(snapshot(&media)?, before);
    assert!(!root.path().join("media").exists());
    assert!(!root.path().join(&name).exists());
    Ok(())
}

#[tokio::test]
async fn backup_runs_the_expected_compose_steps() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());
    seed_media(&runner)?;

    let at = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap();
    coordinator.backup_at(at).await?;

    assert_eq!(
        runner.compose_actions(),
        vec![
            "run --rm postgres backup",
            "cp --archive django:/app/ghostwriter/media .",
            "cp media_backup_2023_12_31T23_59_59.tar.gz postgres:/backups",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn existing_staging_dir_blocks_backup_untouched() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());
    seed_media(&runner)?;

    let staging = root.path().join("media");
    fs::create_dir_all(&staging)?;
    fs::write(staging.join("unrelated.txt"), "keep me")?;

    let err = coordinator.backup().await.unwrap_err();
    assert!(matches!(err, OpsError::StagingCollision(ref p) if p == &staging));

    assert_eq!(fs::read_to_string(staging.join("unrelated.txt"))?, "keep me");
    assert_eq!(fs::read_dir(&staging)?.count(), 1);
    assert!(!runner.calls().iter().any(|c| c.contains(" cp ")));
    Ok(())
}

#[tokio::test]
async fn existing_staging_dir_blocks_restore_before_the_database() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let staging = root.path().join("media");
    fs::create_dir_all(&staging)?;

    let err = coordinator
        .restore("backup_0.sql.gz", Some("media_backup_2024_01_01T00_00_00.tar.gz"))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::StagingCollision(_)));
    assert!(runner.calls().is_empty());
    assert!(staging.is_dir());
    Ok(())
}

#[tokio::test]
async fn restore_without_media_only_touches_the_database() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir()).with_program("docker-compose");
    let compose = Compose::new(ComposeFlavor::Standalone, "local.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let volume = runner.unit_path("postgres", "/backups");
    fs::create_dir_all(&volume)?;
    fs::write(volume.join("backup_2024.sql.gz"), "dump")?;
    // A stray staging dir does not matter for a database-only restore.
    fs::create_dir_all(root.path().join("media"))?;

    coordinator.restore("backup_2024.sql.gz", None).await?;

    assert_eq!(
        runner.calls(),
        vec!["docker-compose -f local.yml run --rm postgres restore backup_2024.sql.gz"]
    );
    Ok(())
}

#[tokio::test]
async fn failed_database_restore_stops_the_sequence() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let err = coordinator
        .restore("missing.sql.gz", Some("media_backup_x.tar.gz"))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::CommandFailed { code: Some(1), .. }));
    assert_eq!(runner.compose_actions().len(), 1);
    Ok(())
}

#[tokio::test]
async fn media_names_must_be_plain_file_names() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let err = coordinator
        .restore("backup.sql.gz", Some("../media_backup_x.tar.gz"))
        .await
        .unwrap_err();
    assert!(matches!(err, OpsError::Precondition(_)));
    assert!(runner.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn download_copies_the_backup_volume() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let volume = runner.unit_path("postgres", "/backups");
    fs::create_dir_all(&volume)?;
    fs::write(volume.join("backup_1.sql.gz"), "dump")?;

    let local = coordinator.download().await?;
    assert_eq!(local, root.path().join("backups"));
    assert_eq!(fs::read_to_string(local.join("backup_1.sql.gz"))?, "dump");
    Ok(())
}

#[tokio::test]
async fn list_is_a_single_read_only_call() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    coordinator.list().await?;
    assert_eq!(runner.compose_actions(), vec!["run --rm postgres backups"]);
    assert_eq!(fs::read_dir(root.path())?.count(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_upload_keeps_the_staging_dir_and_archive() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir()).fail_when("cp media_backup_");
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());
    seed_media(&runner)?;

    let at = Utc.with_ymd_and_hms(2024, 2, 29, 8, 0, 0).unwrap();
    let err = coordinator.backup_at(at).await.unwrap_err();

    assert!(matches!(err, OpsError::CommandFailed { .. }));
    assert!(root.path().join("media/evidence/notes.txt").is_file());
    assert!(root.path().join("media_backup_2024_02_29T08_00_00.tar.gz").is_file());
    assert!(!runner
        .unit_path("postgres", "/backups")
        .join("media_backup_2024_02_29T08_00_00.tar.gz")
        .exists());
    Ok(())
}

#[tokio::test]
async fn media_copy_that_is_not_a_directory_is_a_missing_artifact() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let media = runner.unit_path("django", MEDIA);
    fs::create_dir_all(media.parent().unwrap())?;
    fs::write(&media, "not a directory")?;

    let err = coordinator.backup().await.unwrap_err();
    assert!(matches!(err, OpsError::MissingArtifact(p) if p == root.path().join("media")));
    assert_eq!(runner.compose_actions().len(), 2);
    Ok(())
}

#[tokio::test]
async fn download_without_a_backup_directory_is_a_missing_artifact() -> TestResult {
    let root = InstallRoot::new()?;
    let runner = FakeRunner::new(root.path(), root.units_dir());
    let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
    let layout = DeploymentLayout::default();
    let coordinator = BackupCoordinator::new(&runner, &compose, &layout, root.path());

    let volume = runner.unit_path("postgres", "/backups");
    fs::create_dir_all(volume.parent().unwrap())?;
    fs::write(&volume, "")?;

    let err = coordinator.download().await.unwrap_err();
    assert!(matches!(err, OpsError::MissingArtifact(p) if p == root.path().join("backups")));
    Ok(())
}
