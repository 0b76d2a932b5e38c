// Integration tests for the session orchestrator
//
// Every test drives the public intents, waits for the session to settle,
// then checks storage, the files on disk and what the observer was told.

mod common;

use anyhow::Result;
use audio_session::error::ErrorCode;
use audio_session::playback::PlayerState;
use audio_session::record::{Record, RecordInfo, NO_ID};
use audio_session::recorder::RecorderState;
use audio_session::session::{CommitKind, ImportStage, SessionEvent, METADATA_MIGRATION_VERSION};
use audio_session::session::SessionConfig;
use audio_session::storage::{RecordStore, Settings, SettingsStore};
use audio_session::FileReplaySource;
use common::{
    migrated_settings, EventRecorder, FlakyRecords, GatedSettings, Harness, HarnessOptions,
    WAVEFORM_SAMPLES,
};
use std::sync::Arc;
use std::time::Duration;

fn count<F: Fn(&SessionEvent) -> bool>(recorder: &EventRecorder, wanted: F) -> usize {
    recorder.events().iter().filter(|e| wanted(e)).count()
}

async fn replay(h: &Harness, name: &str, duration_ms: u32) -> Result<()> {
    let input = h.source_wav(name, 8000, duration_ms)?;
    FileReplaySource::open(&input, 20)?
        .spawn(h.sink.clone())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_first_attach_replays_idle_state() -> Result<()> {
    let h = Harness::new()?;
    assert_eq!(h.settings.ask_to_rename(), None);

    h.attach().await;

    let events = h.recorder.events();
    assert_eq!(
        events[0],
        SessionEvent::Restored {
            recorder: RecorderState::Idle,
            duration_ms: 0,
            amplitudes: Vec::new(),
            playback: PlayerState::Stopped,
            position_ms: 0,
        }
    );
    assert!(h.recorder.contains(&SessionEvent::RecordCleared));
    assert_eq!(h.settings.ask_to_rename(), Some(true));
    assert!(h.session.is_attached());

    Ok(())
}

#[tokio::test]
async fn test_import_shows_placeholder_then_decoded_waveform() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;
    h.recorder.clear();
    let mut commits = h.session.subscribe_commits();

    // 5 s of 16-bit mono at 20 kHz is 200000 bytes of audio data
    let source = h.source_wav("interview.wav", 20_000, 5000)?;
    let record = h.import(&source).await?;

    assert_eq!(record.name, "interview");
    assert_eq!(record.duration_ms, 5000);
    assert_eq!(record.size, std::fs::metadata(&record.path)?.len());
    assert!(record.path.starts_with(h.recordings_dir()));
    assert!(source.exists(), "Import must copy, not move");

    let loaded = h.recorder.loaded();
    assert_eq!(loaded.len(), 2, "Expected placeholder and decoded loads");

    let placeholder = &loaded[0];
    assert!(!placeholder.waveform_processed);
    assert_eq!(placeholder.amplitudes.len(), WAVEFORM_SAMPLES);
    assert!(placeholder.amplitudes.iter().all(|&a| a == 0));

    let decoded = &loaded[1];
    assert!(decoded.waveform_processed);
    assert_eq!(decoded.amplitudes.len(), WAVEFORM_SAMPLES);
    assert!(decoded.amplitudes.iter().all(|&a| a > 0));
    assert_eq!(decoded, &record);

    let stages: Vec<ImportStage> = h
        .recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::ImportProgress { stage } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![ImportStage::Copying, ImportStage::ReadingInfo, ImportStage::Saving]
    );
    assert!(h.recorder.contains(&SessionEvent::ImportStarted {
        name: "interview".to_string()
    }));
    assert!(h.recorder.contains(&SessionEvent::ImportFinished));
    assert!(h.recorder.events().iter().any(|e| matches!(
        e,
        SessionEvent::Information { line } if line.contains("wav") && line.contains("20 kHz")
    )));

    let inserted = commits.try_recv()?;
    assert_eq!(inserted.kind, CommitKind::Inserted);
    assert_eq!(inserted.record_id, record.id);
    assert_eq!(commits.try_recv()?.kind, CommitKind::Updated);

    Ok(())
}

#[tokio::test]
async fn test_import_unreadable_file_leaves_nothing_behind() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;

    let source = h.dir.path().join("broken.mp3");
    std::fs::write(&source, b"definitely not audio")?;

    h.session.import_file(&source);
    h.session.settle().await;

    assert!(h.recorder.events().iter().any(|e| matches!(
        e,
        SessionEvent::Error {
            code: ErrorCode::UnreadableFile,
            ..
        }
    )));
    assert!(h.recorder.contains(&SessionEvent::ImportFinished));
    assert!(h.recording_files()?.is_empty());
    assert_eq!(h.settings.active_record(), NO_ID);
    assert!(h.records.active_ids().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_rename_conflict_keeps_record() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;

    let a = h.import(&h.source_wav("a.wav", 8000, 500)?).await?;
    let b = h.import(&h.source_wav("b.wav", 8000, 500)?).await?;
    h.recorder.clear();

    h.session.rename_record(a.id, "b");
    h.session.settle().await;

    assert!(h.recorder.events().iter().any(|e| matches!(
        e,
        SessionEvent::Error {
            code: ErrorCode::RenameConflict,
            ..
        }
    )));
    assert!(h.recorder.contains(&SessionEvent::ProgressHidden));
    let unchanged = h.records.get(a.id).await?.expect("record a");
    assert_eq!(unchanged.name, "a");
    assert!(unchanged.path.exists());
    assert!(b.path.exists());

    h.recorder.clear();
    h.session.rename_record(a.id, "c");
    h.session.settle().await;

    assert!(h.recorder.contains(&SessionEvent::RecordRenamed {
        id: a.id,
        name: "c".to_string()
    }));
    let renamed = h.records.get(a.id).await?.expect("record a");
    assert_eq!(renamed.name, "c");
    assert_eq!(renamed.path, h.recordings_dir().join("c.wav"));
    assert!(renamed.path.exists());
    assert!(!a.path.exists());

    Ok(())
}

#[tokio::test]
async fn test_detach_during_rename_drops_notifications() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;
    let record = h.import(&h.source_wav("talk.wav", 8000, 500)?).await?;
    h.recorder.clear();

    h.session.rename_record(record.id, "renamed");
    h.session.detach();
    h.session.settle().await;

    assert!(h.recorder.events().is_empty());
    let stored = h.records.get(record.id).await?.expect("record");
    assert_eq!(stored.name, "renamed");

    // A new observer sees the outcome through the replay
    let second = EventRecorder::default();
    h.session.attach(second.observer());
    h.session.settle().await;

    let loaded = second.loaded();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "renamed");
    assert!(h.recorder.events().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_trash_then_delete_forever() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;
    let record = h.import(&h.source_wav("memo.wav", 8000, 500)?).await?;
    h.recorder.clear();

    h.session.delete_record(record.id, false);
    h.session.settle().await;

    let trashed = h.records.get(record.id).await?.expect("trashed record");
    assert!(trashed.is_trashed());
    assert!(record.path.exists());
    assert_eq!(h.settings.active_record(), NO_ID);
    assert!(h.records.trash_ids().await?.contains(&record.id));
    assert!(h.recorder.contains(&SessionEvent::RecordCleared));
    assert!(h.recorder.contains(&SessionEvent::RecordDeleted {
        id: record.id,
        forever: false
    }));

    h.recorder.clear();
    h.session.delete_record(record.id, true);
    h.session.settle().await;

    assert!(h.records.get(record.id).await?.is_none());
    assert!(!record.path.exists());
    assert!(h.recorder.contains(&SessionEvent::RecordDeleted {
        id: record.id,
        forever: true
    }));

    // Unknown ids are a silent no-op
    h.recorder.clear();
    h.session.delete_record(9999, true);
    h.session.settle().await;
    assert!(h.recorder.events().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_migration_skips_missing_files() -> Result<()> {
    let h = Harness::with_settings(Settings {
        migration_version: 0,
        ..Settings::default()
    })?;

    let stale = RecordInfo {
        duration_ms: 0,
        size: 0,
        sample_rate: 1,
        channel_count: 1,
        bitrate: 0,
        format: "wav".to_string(),
    };
    let present_path = h.source_wav("present.wav", 8000, 1000)?;
    let present = h
        .records
        .insert(Record::new_unsaved(&present_path, &stale, WAVEFORM_SAMPLES))
        .await?;
    let missing = h
        .records
        .insert(Record::new_unsaved(
            h.dir.path().join("gone.wav"),
            &stale,
            WAVEFORM_SAMPLES,
        ))
        .await?;

    h.attach().await;

    assert_eq!(h.settings.migration_version(), METADATA_MIGRATION_VERSION);

    let present = h.records.get(present.id).await?.expect("present record");
    assert_eq!(present.sample_rate, 8000);
    assert_eq!(present.duration_ms, 1000);
    assert!(present.size > 0);

    let missing = h.records.get(missing.id).await?.expect("missing record");
    assert_eq!(missing.sample_rate, 1);

    Ok(())
}

#[tokio::test]
async fn test_record_end_to_end() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;
    h.recorder.clear();

    h.session.start_recording();
    h.session.settle().await;

    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Recording);
    assert!(h
        .recorder
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::RecordingStarted { .. })));

    let input = h.source_wav("voice.wav", 8000, 600)?;
    FileReplaySource::open(&input, 20)?
        .spawn(h.sink.clone())
        .await?;
    assert!(h.sink.samples_written() > 0);

    h.session.stop_recording(false);
    h.session.settle().await;

    let ids = h.records.active_ids().await?;
    assert_eq!(ids.len(), 1);
    let record = h.records.get(ids[0]).await?.expect("recorded record");

    assert!(record.name.starts_with("Record-"));
    assert!(record.path.exists());
    assert!(record.duration_ms > 0);
    assert_eq!(record.sample_rate, 8000);
    assert_eq!(record.amplitudes.len(), WAVEFORM_SAMPLES);
    assert!(record.waveform_processed);
    assert_eq!(h.settings.active_record(), record.id);

    assert!(h.recorder.contains(&SessionEvent::RecordingStopped));
    assert!(h.recorder.contains(&SessionEvent::AskRename {
        id: record.id,
        name: record.name.clone()
    }));
    assert!(h.recorder.contains(&SessionEvent::ProgressHidden));
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_cancel_then_discard_recording() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;

    h.session.start_recording();
    h.session.settle().await;

    h.session.cancel_recording();
    h.session.settle().await;

    assert!(h.recorder.contains(&SessionEvent::ConfirmDiscard));
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Paused);

    h.session.stop_recording(true);
    h.session.settle().await;

    assert!(h.recording_files()?.is_empty());
    assert!(h.records.active_ids().await?.is_empty());
    assert!(!h
        .recorder
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::AskRename { .. })));

    Ok(())
}

#[tokio::test]
async fn test_playback_toggle_cycle() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;
    h.import(&h.source_wav("song.wav", 8000, 2000)?).await?;
    h.recorder.clear();

    h.session.toggle_playback();
    h.session.settle().await;
    assert!(h
        .recorder
        .contains(&SessionEvent::PlaybackStarted { position_ms: 0 }));
    assert_eq!(h.session.snapshot().await.playback, PlayerState::Playing);

    h.session.toggle_playback();
    h.session.settle().await;
    assert!(h
        .recorder
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::PlaybackPaused { .. })));
    assert_eq!(h.session.snapshot().await.playback, PlayerState::Paused);

    h.session.stop_playback();
    h.session.settle().await;
    assert!(h.recorder.contains(&SessionEvent::PlaybackStopped));
    assert_eq!(h.session.snapshot().await.playback, PlayerState::Stopped);

    Ok(())
}

#[tokio::test]
async fn test_shutdown_saves_running_recording() -> Result<()> {
    let h = Harness::new()?;
    let observer = EventRecorder::default();
    h.session.attach(observer.observer());
    h.session.settle().await;

    h.session.start_recording();
    h.session.settle().await;
    h.session.shutdown().await;

    assert!(!h.session.is_attached());
    assert_eq!(h.records.active_ids().await?.len(), 1);
    assert!(!observer
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::AskRename { .. })));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_default_does_not_block_replay() -> Result<()> {
    let gated = Arc::new(GatedSettings::new(migrated_settings()));
    let store: Arc<dyn SettingsStore> = gated.clone();
    let h = Harness::build(HarnessOptions {
        settings_store: Some(store),
        ..HarnessOptions::default()
    })?;

    h.session.attach(h.recorder.observer());
    let replayed = tokio::time::timeout(Duration::from_secs(2), async {
        while !h
            .recorder
            .events()
            .iter()
            .any(|e| matches!(e, SessionEvent::Restored { .. }))
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(replayed.is_ok(), "Replay waited on the settings write");
    assert_eq!(h.settings.ask_to_rename(), None);

    gated.open();
    h.session.settle().await;
    assert_eq!(h.settings.ask_to_rename(), Some(true));

    Ok(())
}

#[tokio::test]
async fn test_rename_default_keeps_user_choice() -> Result<()> {
    let h = Harness::with_settings(Settings {
        ask_to_rename: Some(false),
        ..migrated_settings()
    })?;

    h.attach().await;

    assert_eq!(h.settings.ask_to_rename(), Some(false));
    Ok(())
}

#[tokio::test]
async fn test_rename_restores_file_when_store_update_fails() -> Result<()> {
    let records = Arc::new(FlakyRecords::new());
    let store: Arc<dyn RecordStore> = records.clone();
    let h = Harness::build(HarnessOptions {
        records: Some(store),
        ..HarnessOptions::default()
    })?;
    h.attach().await;
    let record = h.import(&h.source_wav("lecture.wav", 8000, 500)?).await?;
    h.recorder.clear();

    records.fail_updates(true);
    h.session.rename_record(record.id, "notes");
    h.session.settle().await;

    assert_eq!(h.error_codes(), vec![ErrorCode::RenameFailed]);
    assert!(h.recorder.contains(&SessionEvent::ProgressHidden));
    assert!(record.path.exists());
    assert!(!h.recordings_dir().join("notes.wav").exists());
    let stored = h.records.get(record.id).await?.expect("record");
    assert_eq!(stored.name, "lecture");
    assert_eq!(stored.path, record.path);

    Ok(())
}

#[tokio::test]
async fn test_information_refresh_is_throttled_while_recording() -> Result<()> {
    let h = Harness::build(HarnessOptions {
        config: SessionConfig {
            waveform_samples: WAVEFORM_SAMPLES,
            info_refresh_interval: Duration::from_secs(3600),
            ..SessionConfig::default()
        },
        ..HarnessOptions::default()
    })?;
    h.attach().await;
    h.recorder.clear();

    h.session.start_recording();
    h.session.settle().await;
    replay(&h, "voice.wav", 300).await?;
    h.session.settle().await;

    let progress = count(&h.recorder, |e| matches!(e, SessionEvent::RecordingProgress { .. }));
    let information = count(&h.recorder, |e| matches!(e, SessionEvent::Information { .. }));
    assert!(progress >= 2, "Expected several progress ticks, got {}", progress);
    assert_eq!(information, 1, "Only the start may refresh inside the interval");

    h.session.stop_recording(true);
    h.session.settle().await;
    Ok(())
}

#[tokio::test]
async fn test_attach_during_capture_replays_live_state() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;

    h.session.start_recording();
    h.session.settle().await;
    replay(&h, "voice.wav", 300).await?;
    h.session.pause_resume_recording();
    h.session.settle().await;

    let progress = count(&h.recorder, |e| matches!(e, SessionEvent::RecordingProgress { .. }));
    assert!(progress > 0);

    let paused = EventRecorder::default();
    h.session.detach();
    h.session.attach(paused.observer());
    h.session.settle().await;

    let snapshot = h.session.snapshot().await;
    match paused.events().first() {
        Some(SessionEvent::Restored {
            recorder,
            duration_ms,
            amplitudes,
            ..
        }) => {
            assert_eq!(*recorder, RecorderState::Paused);
            assert!(*duration_ms > 0);
            assert_eq!(*duration_ms, snapshot.recording_duration_ms);
            assert_eq!(amplitudes.len(), progress);
        }
        other => panic!("Expected a replay first, got {:?}", other),
    }
    assert!(paused.loaded().is_empty());

    h.session.pause_resume_recording();
    h.session.settle().await;

    let recording = EventRecorder::default();
    h.session.attach(recording.observer());
    h.session.settle().await;

    match recording.events().first() {
        Some(SessionEvent::Restored {
            recorder,
            duration_ms,
            amplitudes,
            ..
        }) => {
            assert_eq!(*recorder, RecorderState::Recording);
            assert!(*duration_ms > 0);
            assert!(amplitudes.len() >= progress);
        }
        other => panic!("Expected a replay first, got {:?}", other),
    }

    h.session.stop_recording(true);
    h.session.settle().await;
    Ok(())
}

#[tokio::test]
async fn test_cancel_while_paused_confirms_immediately() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;

    h.session.start_recording();
    h.session.settle().await;
    h.session.pause_resume_recording();
    h.session.settle().await;
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Paused);
    h.recorder.clear();

    h.session.cancel_recording();
    h.session.settle().await;

    assert_eq!(h.recorder.events(), vec![SessionEvent::ConfirmDiscard]);
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Paused);

    h.session.stop_recording(true);
    h.session.settle().await;
    assert!(h.recording_files()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_long_records_keep_placeholder_waveform() -> Result<()> {
    let h = Harness::build(HarnessOptions {
        config: SessionConfig {
            waveform_samples: WAVEFORM_SAMPLES,
            decode_duration_limit: Duration::from_secs(1),
            ..SessionConfig::default()
        },
        ..HarnessOptions::default()
    })?;
    h.attach().await;
    h.recorder.clear();

    let long = h.import(&h.source_wav("long.wav", 8000, 1000)?).await?;
    assert_eq!(long.duration_ms, 1000);
    assert!(!long.waveform_processed);
    assert!(long.amplitudes.iter().all(|&a| a == 0));
    assert_eq!(h.recorder.loaded().len(), 1);

    h.session.decode_record(long.id);
    h.session.settle().await;
    let stored = h.records.get(long.id).await?.expect("long record");
    assert!(!stored.waveform_processed);

    let short = h.import(&h.source_wav("short.wav", 8000, 500)?).await?;
    assert!(short.waveform_processed);

    Ok(())
}

#[tokio::test]
async fn test_start_and_import_report_no_space() -> Result<()> {
    let h = Harness::build(HarnessOptions {
        quota_bytes: Some(0),
        ..HarnessOptions::default()
    })?;
    h.attach().await;
    h.recorder.clear();

    h.session.start_recording();
    h.session.settle().await;

    assert_eq!(h.error_codes(), vec![ErrorCode::NoSpace]);
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Idle);
    assert!(h.recording_files()?.is_empty());

    h.recorder.clear();
    let source = h.source_wav("call.wav", 8000, 500)?;
    h.session.import_file(&source);
    h.session.settle().await;

    assert_eq!(h.error_codes(), vec![ErrorCode::NoSpace]);
    assert!(h.recording_files()?.is_empty());
    assert!(h.records.active_ids().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_resume_without_space_stays_paused() -> Result<()> {
    let h = Harness::build(HarnessOptions {
        quota_bytes: Some(1024),
        ..HarnessOptions::default()
    })?;
    h.attach().await;

    h.session.start_recording();
    h.session.settle().await;
    h.session.pause_resume_recording();
    h.session.settle().await;
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Paused);

    std::fs::write(h.recordings_dir().join("filler.bin"), vec![0u8; 4096])?;
    h.recorder.clear();

    h.session.pause_resume_recording();
    h.session.settle().await;

    assert_eq!(h.error_codes(), vec![ErrorCode::NoSpace]);
    assert!(!h.recorder.contains(&SessionEvent::RecordingResumed));
    assert_eq!(h.session.snapshot().await.recorder, RecorderState::Paused);

    h.session.stop_recording(true);
    h.session.settle().await;
    Ok(())
}

#[tokio::test]
async fn test_legacy_warning_waits_for_a_finding() -> Result<()> {
    let h = Harness::new()?;
    h.attach().await;
    let legacy = h.dir.path().join("legacy");

    h.session.check_legacy_storage(&legacy);
    h.session.settle().await;

    assert!(h.settings.last_legacy_check().is_none());
    assert!(!h
        .recorder
        .events()
        .iter()
        .any(|e| matches!(e, SessionEvent::LegacyStorageFound { .. })));

    let info = RecordInfo {
        duration_ms: 1000,
        size: 100,
        sample_rate: 8000,
        channel_count: 1,
        bitrate: 128_000,
        format: "wav".to_string(),
    };
    h.records
        .insert(Record::new_unsaved(legacy.join("old.wav"), &info, WAVEFORM_SAMPLES))
        .await?;

    h.session.check_legacy_storage(&legacy);
    h.session.settle().await;

    assert!(h.recorder.contains(&SessionEvent::LegacyStorageFound {
        dir: legacy.clone()
    }));
    assert!(h.settings.last_legacy_check().is_some());

    // A shown warning is not repeated inside the cooldown
    h.recorder.clear();
    h.session.check_legacy_storage(&legacy);
    h.session.settle().await;
    assert!(h.recorder.events().is_empty());

    Ok(())
}
