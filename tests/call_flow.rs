//! End-to-end call flows: signals in, recordings and metadata out.

mod common;

use callvault::app::{drive, ServiceCommand};
use callvault::call::{CallState, MonitorOutcome};
use callvault::recording::SessionStatus;
use callvault::settings::{MemorySettingsStore, SettingsStore};
use callvault::upload::UploadOutcome;
use common::{harness, recordings_in, DeviceLog, FakeDevice, MemoryObjects};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn device_log() -> Arc<Mutex<DeviceLog>> {
    Arc::new(Mutex::new(DeviceLog::default()))
}

#[tokio::test(start_paused = true)]
async fn test_single_call_is_recorded_and_uploaded() {
    let dir = TempDir::new().unwrap();
    let settings = Arc::new(MemorySettingsStore::new());
    let mut h = harness(
        dir.path(),
        FakeDevice::new(device_log()),
        settings.clone(),
        Arc::new(MemoryObjects::default()),
    );

    let started = match h.monitor.on_signal("OFFHOOK") {
        MonitorOutcome::Started { handle, recovered } => {
            assert!(recovered.is_none());
            handle
        }
        other => panic!("expected Started, got {:?}", other),
    };
    assert_eq!(h.monitor.state(), CallState::OffHook);
    assert_eq!(
        settings.get_current_path().unwrap().as_deref(),
        Some(started.file_path.as_path())
    );

    let upload = match h.monitor.on_signal("IDLE") {
        MonitorOutcome::Stopped { handle, upload } => {
            assert_eq!(handle, started);
            upload.expect("upload scheduled")
        }
        other => panic!("expected Stopped, got {:?}", other),
    };
    assert_eq!(h.monitor.state(), CallState::Idle);
    assert_eq!(h.monitor.session().status(), SessionStatus::Stopped);
    assert_eq!(settings.get_current_path().unwrap(), None);

    let record = match upload.await.unwrap() {
        UploadOutcome::Succeeded(record) => record,
        UploadOutcome::Failed(e) => panic!("upload failed: {e}"),
    };

    let files = recordings_in(dir.path());
    assert_eq!(files, vec![started.file_path.clone()]);
    let filename = started.file_name().unwrap().to_string();
    assert!(filename.starts_with("call_recording_"));
    assert!(filename.ends_with(".3gp"));

    assert_eq!(record.filename, filename);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.file_size_bytes, std::fs::metadata(&files[0]).unwrap().len());
    assert_eq!(
        record.remote_url,
        format!("https://recordings.example/call_recordings/{filename}")
    );
    assert_eq!(h.metadata.records(), vec![record]);
    assert_eq!(h.objects.keys(), vec![format!("call_recordings/{filename}")]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_offhook_keeps_one_recording() {
    let dir = TempDir::new().unwrap();
    let log = device_log();
    let mut h = harness(
        dir.path(),
        FakeDevice::new(log.clone()),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(MemoryObjects::default()),
    );

    assert!(matches!(
        h.monitor.on_signal("OFFHOOK"),
        MonitorOutcome::Started { .. }
    ));
    assert!(matches!(
        h.monitor.on_signal("OFFHOOK"),
        MonitorOutcome::AlreadyRecording
    ));

    let upload = match h.monitor.on_signal("IDLE") {
        MonitorOutcome::Stopped { upload, .. } => upload.unwrap(),
        other => panic!("expected Stopped, got {:?}", other),
    };
    assert!(upload.await.unwrap().is_success());

    assert_eq!(recordings_in(dir.path()).len(), 1);
    assert_eq!(h.metadata.records().len(), 1);
    assert_eq!(log.lock().unwrap().starts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_idle_without_recording_does_nothing() {
    let dir = TempDir::new().unwrap();
    let log = device_log();
    let mut h = harness(
        dir.path(),
        FakeDevice::new(log.clone()),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(MemoryObjects::default()),
    );

    assert!(matches!(h.monitor.on_signal("IDLE"), MonitorOutcome::NotRecording));
    assert!(recordings_in(dir.path()).is_empty());
    assert!(h.objects.keys().is_empty());
    assert_eq!(log.lock().unwrap().stops, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_states_are_ignored() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(
        dir.path(),
        FakeDevice::new(device_log()),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(MemoryObjects::default()),
    );

    assert!(matches!(h.monitor.on_signal("RINGING"), MonitorOutcome::Ignored));
    assert!(matches!(h.monitor.on_signal(""), MonitorOutcome::Ignored));
    assert_eq!(h.monitor.state(), CallState::Idle);
    assert!(!h.monitor.session().is_recording());
}

#[tokio::test(start_paused = true)]
async fn test_call_end_after_restart_uploads_persisted_recording() {
    let dir = TempDir::new().unwrap();
    let leftover = dir.path().join("call_recording_20260601_120000.3gp");
    std::fs::write(&leftover, b"audio from the previous process").unwrap();

    let settings = Arc::new(MemorySettingsStore::with_path(leftover.clone()));
    let log = device_log();
    let mut h = harness(
        dir.path(),
        FakeDevice::new(log.clone()),
        settings.clone(),
        Arc::new(MemoryObjects::default()),
    );
    assert!(h.monitor.session().has_persisted_handle());

    let upload = match h.monitor.on_signal("IDLE") {
        MonitorOutcome::Stopped { handle, upload } => {
            assert_eq!(handle.file_path, leftover);
            upload.unwrap()
        }
        other => panic!("expected Stopped, got {:?}", other),
    };

    let outcome = upload.await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(h.metadata.records()[0].filename, "call_recording_20260601_120000.3gp");
    assert_eq!(settings.get_current_path().unwrap(), None);
    // The device was never started in this process.
    assert_eq!(log.lock().unwrap().stops, 0);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_leaves_nothing_to_upload() {
    let dir = TempDir::new().unwrap();
    let log = device_log();
    let settings = Arc::new(MemorySettingsStore::new());
    let mut h = harness(
        dir.path(),
        FakeDevice::failing(log.clone()),
        settings.clone(),
        Arc::new(MemoryObjects::default()),
    );

    assert!(matches!(
        h.monitor.on_signal("OFFHOOK"),
        MonitorOutcome::StartFailed { recovered: None, .. }
    ));
    assert_eq!(h.monitor.session().status(), SessionStatus::Idle);
    assert!(h.monitor.session().last_error().is_some());
    assert_eq!(settings.get_current_path().unwrap(), None);
    assert_eq!(log.lock().unwrap().releases, 1);

    assert!(matches!(h.monitor.on_signal("IDLE"), MonitorOutcome::NotRecording));
    assert!(recordings_in(dir.path()).is_empty());
    assert!(h.objects.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_flaky_network_upload_reports_retries() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjects {
        failures: 2,
        ..Default::default()
    });
    let mut h = harness(
        dir.path(),
        FakeDevice::new(device_log()),
        Arc::new(MemorySettingsStore::new()),
        objects,
    );

    h.monitor.on_signal("OFFHOOK");
    let upload = match h.monitor.on_signal("IDLE") {
        MonitorOutcome::Stopped { upload, .. } => upload.unwrap(),
        other => panic!("expected Stopped, got {:?}", other),
    };

    match upload.await.unwrap() {
        UploadOutcome::Succeeded(record) => assert_eq!(record.retry_count, 2),
        UploadOutcome::Failed(e) => panic!("upload failed: {e}"),
    }
    assert_eq!(h.objects.keys().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_calls_produce_distinct_recordings() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(
        dir.path(),
        FakeDevice::new(device_log()),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(MemoryObjects::default()),
    );

    let (tx, mut rx) = mpsc::channel(8);
    for signal in ["OFFHOOK", "IDLE", "RINGING", "OFFHOOK", "IDLE"] {
        tx.send(ServiceCommand::Signal(signal.to_string()))
            .await
            .unwrap();
    }
    drop(tx);

    let outcomes = drive(&mut h.monitor, &mut rx).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_success()));

    let files = recordings_in(dir.path());
    assert_eq!(files.len(), 2);
    let mut uploaded: Vec<String> = h.metadata.records().into_iter().map(|r| r.filename).collect();
    uploaded.sort();
    let mut names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(uploaded, names);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_loop_and_keeps_the_handle() {
    let dir = TempDir::new().unwrap();
    let settings = Arc::new(MemorySettingsStore::new());
    let mut h = harness(
        dir.path(),
        FakeDevice::new(device_log()),
        settings.clone(),
        Arc::new(MemoryObjects::default()),
    );

    let (tx, mut rx) = mpsc::channel(8);
    tx.send(ServiceCommand::Signal("OFFHOOK".to_string()))
        .await
        .unwrap();
    tx.send(ServiceCommand::Shutdown).await.unwrap();

    let outcomes = drive(&mut h.monitor, &mut rx).await;
    assert!(outcomes.is_empty());
    assert!(h.monitor.session().is_recording());
    assert!(settings.get_current_path().unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_call_start_after_restart_uploads_leftover_and_new_recording() {
    let dir = TempDir::new().unwrap();
    let leftover = dir.path().join("call_recording_20260601_120000.3gp");
    std::fs::write(&leftover, b"audio from the crashed process").unwrap();

    let settings = Arc::new(MemorySettingsStore::with_path(leftover.clone()));
    let mut h = harness(
        dir.path(),
        FakeDevice::new(device_log()),
        settings.clone(),
        Arc::new(MemoryObjects::default()),
    );

    let (started, recovered) = match h.monitor.on_signal("OFFHOOK") {
        MonitorOutcome::Started { handle, recovered } => (handle, recovered.unwrap()),
        other => panic!("expected Started, got {:?}", other),
    };
    assert_ne!(started.file_path, leftover);
    assert_eq!(
        settings.get_current_path().unwrap(),
        Some(started.file_path.clone())
    );

    let upload = match h.monitor.on_signal("IDLE") {
        MonitorOutcome::Stopped { upload, .. } => upload.unwrap(),
        other => panic!("expected Stopped, got {:?}", other),
    };
    assert!(recovered.await.unwrap().is_success());
    assert!(upload.await.unwrap().is_success());

    let mut uploaded: Vec<String> = h.metadata.records().into_iter().map(|r| r.filename).collect();
    uploaded.sort();
    let mut expected = vec![
        "call_recording_20260601_120000.3gp".to_string(),
        started.file_name().unwrap().to_string(),
    ];
    expected.sort();
    assert_eq!(uploaded, expected);
    assert!(matches!(h.monitor.on_signal("IDLE"), MonitorOutcome::NotRecording));
}

#[tokio::test(start_paused = true)]
async fn test_leftover_is_uploaded_even_when_new_call_cannot_record() {
    let dir = TempDir::new().unwrap();
    let leftover = dir.path().join("call_recording_20260601_120000.3gp");
    std::fs::write(&leftover, b"audio from the crashed process").unwrap();

    let mut h = harness(
        dir.path(),
        FakeDevice::failing(device_log()),
        Arc::new(MemorySettingsStore::with_path(leftover)),
        Arc::new(MemoryObjects::default()),
    );

    let recovered = match h.monitor.on_signal("OFFHOOK") {
        MonitorOutcome::StartFailed { recovered, .. } => recovered.unwrap(),
        other => panic!("expected StartFailed, got {:?}", other),
    };
    assert!(recovered.await.unwrap().is_success());
    assert_eq!(h.metadata.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_recording_across_mixed_signals() {
    let dir = TempDir::new().unwrap();
    let log = device_log();
    let mut h = harness(
        dir.path(),
        FakeDevice::new(log.clone()),
        Arc::new(MemorySettingsStore::new()),
        Arc::new(MemoryObjects::default()),
    );

    let signals = ["OFFHOOK", "IDLE", "RINGING"];
    let mut seed: u32 = 0x2545_f491;
    let mut uploads = Vec::new();

    for _ in 0..150 {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let signal = signals[((seed >> 16) % 3) as usize];

        if let MonitorOutcome::Stopped {
            upload: Some(upload),
            ..
        } = h.monitor.on_signal(signal)
        {
            uploads.push(upload);
        }

        let log = log.lock().unwrap();
        let open = i64::from(log.starts) - i64::from(log.stops);
        assert!(
            (0..=1).contains(&open),
            "{} starts vs {} stops after {}",
            log.starts,
            log.stops,
            signal
        );
        assert_eq!(open == 1, h.monitor.session().is_recording());
    }

    let stops = log.lock().unwrap().stops as usize;
    assert!(stops > 0);
    assert_eq!(uploads.len(), stops);
    for upload in uploads {
        assert!(upload.await.unwrap().is_success());
    }
    assert_eq!(h.metadata.records().len(), stops);
}
