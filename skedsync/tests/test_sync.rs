use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

mod common;
use common::*;
use skedsync::backup;
use skedsync::session::ScheduleType;
use skedsync::sync::retrieval::TargetId;
use skedsync::sync::{SyncCoordinator, SyncOptions, SyncState, SyncTarget};

const TYPES: [ScheduleType; 2] = [ScheduleType::Vex, ScheduleType::Skd];

fn servers() -> Vec<String> {
    vec![SERVER_A.to_string(), SERVER_B.to_string()]
}

fn schedule(code: &str, sched_type: ScheduleType) -> TargetId {
    TargetId::Schedule {
        code: code.to_string(),
        year: 2024,
        sched_type,
    }
}

fn backups_of(path: &Path) -> usize {
    backup::leftover_backups(path).unwrap().len()
}

#[tokio::test]
async fn test_first_download() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeServers::default();
    fake.publish(SERVER_A, "r41140.vex", "VEX_rev = 1.5;", true);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());

    let target = SyncTarget::new(schedule("r41140", ScheduleType::Vex), dir.path(), 1.0, false);
    let result = coordinator.sync_target(&target).await.unwrap();

    assert_eq!(result.state, SyncState::NewConfirmed);
    assert!(result.got_file && result.is_new && result.ok_to_process);
    assert_eq!(fs::read_to_string(&target.local_path).unwrap(), "VEX_rev = 1.5;");
    assert_eq!(backups_of(&target.local_path), 0);
    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test]
async fn test_recent_file_is_skipped_without_contacting_servers() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("r41140.vex");
    fs::write(&local, "local").unwrap();
    fs::write(backup::backup_path(&local, 1), "stale backup").unwrap();

    let fake = FakeServers::default();
    fake.publish(SERVER_A, "r41140.vex", "remote", true);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());

    let target = SyncTarget::new(schedule("r41140", ScheduleType::Vex), dir.path(), 1.0, false);
    let result = coordinator.sync_target(&target).await.unwrap();

    assert_eq!(result.state, SyncState::Skipped);
    assert!(result.got_file && result.ok_to_process);
    assert!(fake.calls().is_empty());
    assert_eq!(backups_of(&local), 0);
    assert_eq!(fs::read_to_string(&local).unwrap(), "local");
}

#[tokio::test]
async fn test_identical_republication_keeps_local_copy() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("r41140.skd");
    fs::write(&local, "$EXPER R41140").unwrap();
    age_file(&local, Duration::from_secs(2 * 3600));

    let fake = FakeServers::default();
    fake.publish(SERVER_A, "r41140.skd", "$EXPER R41140", true);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());

    let target = SyncTarget::new(schedule("r41140", ScheduleType::Skd), dir.path(), 1.0, false);
    let result = coordinator.sync_target(&target).await.unwrap();

    assert_eq!(result.state, SyncState::Unchanged);
    assert!(!result.ok_to_process);
    assert_eq!(fs::read_to_string(&local).unwrap(), "$EXPER R41140");
    assert_eq!(backups_of(&local), 0);
    assert!(!backup::quarantine_path(&local).exists());
}

#[tokio::test]
async fn test_changed_content_is_quarantined_then_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("r41140.skd");
    fs::write(&local, "version 1").unwrap();
    age_file(&local, Duration::from_secs(2 * 3600));

    let fake = FakeServers::default();
    fake.publish(SERVER_A, "r41140.skd", "version 2", true);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());
    let target = SyncTarget::new(schedule("r41140", ScheduleType::Skd), dir.path(), 1.0, false);
    let result = coordinator.sync_target(&target).await.unwrap();

    assert_eq!(result.state, SyncState::NewAmbiguous);
    assert!(result.got_file && !result.ok_to_process);
    assert_eq!(fs::read_to_string(&local).unwrap(), "version 1");
    let held = backup::quarantine_path(&local);
    assert_eq!(fs::read_to_string(&held).unwrap(), "version 2");
    assert_eq!(backups_of(&local), 0);

    // the operator accepts; the server has nothing newer by now
    fake.publish(SERVER_A, "r41140.skd", "version 2", false);
    let accept = SyncOptions {
        accept_updates: true,
        ..Default::default()
    };
    let coordinator = SyncCoordinator::new(&fake, &servers, accept, SystemTime::now());
    let target = SyncTarget::new(schedule("r41140", ScheduleType::Skd), dir.path(), 1.0, false);
    assert!(!target.is_due(SystemTime::now()));
    let result = coordinator.sync_target(&target).await.unwrap();

    assert_eq!(result.state, SyncState::NewConfirmed);
    assert!(result.ok_to_process);
    assert_eq!(fs::read_to_string(&local).unwrap(), "version 2");
    assert!(!held.exists());
    assert_eq!(backups_of(&local), 0);
}

#[tokio::test]
async fn test_accepting_a_fresh_download_supersedes_quarantine() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("master24.txt");
    fs::write(&local, "old catalog").unwrap();
    fs::write(backup::quarantine_path(&local), "held catalog").unwrap();
    age_file(&local, Duration::from_secs(24 * 3600));

    let fake = FakeServers::default();
    fake.publish(SERVER_B, "master24.txt", "newest catalog", true);
    let servers = servers();
    let accept = SyncOptions {
        accept_updates: true,
        ..Default::default()
    };
    let coordinator = SyncCoordinator::new(&fake, &servers, accept, SystemTime::now());
    let result = coordinator
        .sync_master(TargetId::Master { year: 2024 }, dir.path(), 12.0, false)
        .await
        .unwrap();

    assert_eq!(result.state, SyncState::NewConfirmed);
    assert_eq!(fs::read_to_string(&local).unwrap(), "newest catalog");
    assert!(!backup::quarantine_path(&local).exists());
    assert_eq!(backups_of(&local), 0);
}

#[tokio::test]
async fn test_forced_flag_cleared_after_first_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("master24.txt");
    fs::write(&local, "catalog").unwrap();

    let fake = FakeServers::default();
    fake.publish(SERVER_A, "master24.txt", "catalog", false);
    fake.publish(SERVER_B, "master24.txt", "catalog", false);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());
    let result = coordinator
        .sync_master(TargetId::Master { year: 2024 }, dir.path(), 12.0, true)
        .await
        .unwrap();

    let calls = fake.calls_for("master24.txt");
    assert_eq!(calls.len(), 2);
    assert!(calls[0].forced);
    assert!(!calls[1].forced);
    // same bytes came back, so the local copy stays and nothing is reprocessed
    assert_eq!(result.state, SyncState::Unchanged);
    assert!(!result.ok_to_process);
}

#[tokio::test]
async fn test_failing_server_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeServers::default();
    fake.fail(SERVER_A, "master24-int.txt");
    fake.publish(SERVER_B, "master24-int.txt", "intensives", true);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());
    let result = coordinator
        .sync_master(TargetId::MasterIntensive { year: 2024 }, dir.path(), 12.0, false)
        .await
        .unwrap();
    assert_eq!(result.state, SyncState::NewConfirmed);
    assert!(dir.path().join("master24-int.txt").exists());
}

#[tokio::test]
async fn test_nothing_on_servers() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("r11140.vex");
    fs::write(&local, "local only").unwrap();
    age_file(&local, Duration::from_secs(2 * 3600));

    let fake = FakeServers::default();
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());
    let target = SyncTarget::new(schedule("r11140", ScheduleType::Vex), dir.path(), 1.0, false);
    let result = coordinator.sync_target(&target).await.unwrap();

    assert_eq!(result.state, SyncState::NoneFound);
    assert!(!result.ok_to_process);
    assert_eq!(fs::read_to_string(&local).unwrap(), "local only");
    assert_eq!(backups_of(&local), 0);
}

#[tokio::test]
async fn test_schedule_type_priority() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeServers::default();
    fake.publish(SERVER_A, "r41140.skd", "skd only", true);
    let servers = servers();
    let coordinator =
        SyncCoordinator::new(&fake, &servers, SyncOptions::default(), SystemTime::now());

    let result = coordinator
        .sync_schedule("r41140", 2024, dir.path(), &TYPES, 1.0, false)
        .await
        .unwrap();
    assert_eq!(result.resolved_type, Some(ScheduleType::Skd));
    assert_eq!(result.state, SyncState::NewConfirmed);
    assert_eq!(fake.calls_for("r41140.vex").len(), 2);
    assert_eq!(fake.calls_for("r41140.skd").len(), 2);

    // with a local skd copy only that type is looked at
    fake.publish(SERVER_A, "r41140.vex", "vex now", true);
    age_file(&dir.path().join("r41140.skd"), Duration::from_secs(2 * 3600));
    let result = coordinator
        .sync_schedule("r41140", 2024, dir.path(), &TYPES, 1.0, false)
        .await
        .unwrap();
    assert_eq!(result.resolved_type, Some(ScheduleType::Skd));
    assert_eq!(fake.calls_for("r41140.vex").len(), 2);
    assert!(!dir.path().join("r41140.vex").exists());
}

#[tokio::test]
async fn test_check_only_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("r41140.vex");
    fs::write(&local, "local").unwrap();
    age_file(&local, Duration::from_secs(5 * 3600));

    let fake = FakeServers::default();
    fake.publish(SERVER_A, "r41140.vex", "remote", true);
    let servers = servers();
    let check = SyncOptions {
        check_only: true,
        ..Default::default()
    };
    let coordinator = SyncCoordinator::new(&fake, &servers, check, SystemTime::now());
    let result = coordinator
        .sync_schedule("r41140", 2024, dir.path(), &TYPES, 1.0, true)
        .await
        .unwrap();

    assert_eq!(result.state, SyncState::Skipped);
    assert!(result.got_file);
    assert!(fake.calls().is_empty());
    assert_eq!(fs::read_to_string(&local).unwrap(), "local");
    assert_eq!(backups_of(&local), 0);

    let missing = coordinator
        .sync_schedule("r99999", 2024, dir.path(), &TYPES, 1.0, false)
        .await
        .unwrap();
    assert!(!missing.got_file);
}
