//! End-to-end tests for the directory watch engine.
//!
//! These exercise real filesystem events, so each scenario budgets for the
//! 2000 ms debounce floor.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use callwatch::access::{AccessScope, Apikey, SystemRule, TalkgroupScope};
use callwatch::call::Call;
use callwatch::dialect::DialectKind;
use callwatch::ingest::Ingestor;
use callwatch::storage::{init_storage, Database};
use callwatch::watch::{Dirwatch, Dirwatches};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

/// Wait past the debounce floor so the initial scan has subscribed the tree.
async fn wait_for_subscription() {
    sleep(Duration::from_millis(2600)).await;
}

async fn recv_call(rx: &mut mpsc::UnboundedReceiver<Call>, secs: u64) -> Option<Call> {
    timeout(Duration::from_secs(secs), rx.recv()).await.ok()?
}

/// S1: a default watch with a mask extracts system, talkgroup and local
/// date/time from the filename.
#[tokio::test]
async fn test_default_watch_with_mask() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let mut watch = Dirwatch::new(tmp.path());
    watch.mask = Some("SYS#SYS_TG#TG_#DATE-#TIME".to_string());
    watch.extension = Some("wav".to_string());
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    wait_for_subscription().await;

    let audio = b"RIFFxxxxWAVE".to_vec();
    std::fs::write(tmp.path().join("SYS7_TG100_20220115-123045.wav"), &audio).unwrap();

    let call = recv_call(&mut rx, 6).await.expect("expected one call");
    assert_eq!(call.system, 7);
    assert_eq!(call.talkgroup, 100);
    assert_eq!(call.audio, audio);
    assert_eq!(call.audio_name, "SYS7_TG100_20220115-123045.wav");

    let expected = Local
        .from_local_datetime(
            &NaiveDate::from_ymd_opt(2022, 1, 15)
                .unwrap()
                .and_hms_opt(12, 30, 45)
                .unwrap(),
        )
        .earliest()
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(call.date_time, expected);

    watch.stop();
}

/// S2: a trunk-recorder pair deposited while the server was down is swept by
/// the initial scan; both files are removed afterwards.
#[tokio::test]
async fn test_trunk_recorder_pair_swept_on_startup() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let audio = b"RIFFxxxxWAVE".to_vec();
    std::fs::write(tmp.path().join("call.wav"), &audio).unwrap();
    std::fs::write(
        tmp.path().join("call.json"),
        br#"{"talkgroup":8001,"start_time":1642251045}"#,
    )
    .unwrap();

    let mut watch = Dirwatch::new(tmp.path());
    watch.kind = DialectKind::TrunkRecorder;
    watch.system_id = Some(11);
    watch.delete_after = true;
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    let call = recv_call(&mut rx, 6).await.expect("expected one call");
    assert_eq!(call.system, 11);
    assert_eq!(call.talkgroup, 8001);
    assert_eq!(call.audio, audio);
    assert_eq!(call.audio_name, "call.wav");
    assert_eq!(
        call.date_time,
        DateTime::<Utc>::from_timestamp(1_642_251_045, 0).unwrap()
    );

    // Both the sidecar and the audio are gone.
    sleep(Duration::from_millis(200)).await;
    assert!(!tmp.path().join("call.json").exists());
    assert!(!tmp.path().join("call.wav").exists());

    watch.stop();
}

/// S3: a burst of writes on one path coalesces into exactly one ingest,
/// fired a debounce delay after the last write.
#[tokio::test]
async fn test_debounce_coalesces_write_bursts() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let mut watch = Dirwatch::new(tmp.path());
    watch.system_id = Some(1);
    watch.talkgroup_id = Some(1);
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    wait_for_subscription().await;

    let path = tmp.path().join("a.wav");
    for i in 0..10u8 {
        std::fs::write(&path, vec![i; 64]).unwrap();
        sleep(Duration::from_millis(200)).await;
    }
    let last_write = Instant::now();

    let call = recv_call(&mut rx, 6).await.expect("expected one call");
    let elapsed = last_write.elapsed();
    assert!(
        elapsed >= Duration::from_millis(1900),
        "ingest fired {elapsed:?} after the last write, before the debounce window"
    );
    assert_eq!(call.audio, vec![9u8; 64]);

    // No second ingest follows.
    assert!(
        recv_call(&mut rx, 3).await.is_none(),
        "burst produced more than one ingest"
    );

    watch.stop();
}

/// S4: delete_after controls whether the ingested file survives.
#[tokio::test]
async fn test_delete_after_removes_file() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let mut watch = Dirwatch::new(tmp.path());
    watch.system_id = Some(1);
    watch.talkgroup_id = Some(1);
    watch.delete_after = true;
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    wait_for_subscription().await;

    let path = tmp.path().join("a.wav");
    std::fs::write(&path, b"RIFF").unwrap();

    recv_call(&mut rx, 6).await.expect("expected one call");
    sleep(Duration::from_millis(200)).await;
    assert!(!path.exists(), "delete_after should remove the file");

    watch.stop();
}

#[tokio::test]
async fn test_without_delete_after_file_remains() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let mut watch = Dirwatch::new(tmp.path());
    watch.system_id = Some(1);
    watch.talkgroup_id = Some(1);
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    wait_for_subscription().await;

    let path = tmp.path().join("a.wav");
    std::fs::write(&path, b"RIFF").unwrap();

    recv_call(&mut rx, 6).await.expect("expected one call");
    assert!(path.exists(), "file should remain without delete_after");

    watch.stop();
}

/// S5: a file matching the extension whose call stays invalid (mask
/// mismatch, no defaults) is dropped without deletion.
#[tokio::test]
async fn test_invalid_call_dropped_file_retained() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let mut watch = Dirwatch::new(tmp.path());
    watch.mask = Some("SYS#SYS_TG#TG".to_string());
    watch.delete_after = true;
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    wait_for_subscription().await;

    let path = tmp.path().join("unrelated-name.wav");
    std::fs::write(&path, b"RIFF").unwrap();

    assert!(
        recv_call(&mut rx, 5).await.is_none(),
        "invalid call must not reach the sink"
    );
    assert!(path.exists(), "invalid call must not delete the file");

    watch.stop();
}

/// Files dropped into a subdirectory created after start are picked up.
#[tokio::test]
async fn test_created_subdirectory_is_tracked() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let mut watch = Dirwatch::new(tmp.path());
    watch.system_id = Some(1);
    watch.talkgroup_id = Some(1);
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    wait_for_subscription().await;

    let sub = tmp.path().join("2022-01-15");
    std::fs::create_dir(&sub).unwrap();
    sleep(Duration::from_millis(500)).await;

    std::fs::write(sub.join("a.wav"), b"RIFF").unwrap();

    let call = recv_call(&mut rx, 6).await.expect("expected one call");
    assert_eq!(call.audio_name, "a.wav");

    watch.stop();
}

/// A DSDPlus recording deposited while the server was down is swept and its
/// filename metadata extracted.
#[tokio::test]
async fn test_dsdplus_sweep_parses_filename() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, mut rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    std::fs::write(
        tmp.path().join("20220115_123045_462550000_TG100_SRC4521.mp3"),
        b"ID3mp3bytes",
    )
    .unwrap();

    let mut watch = Dirwatch::new(tmp.path());
    watch.kind = DialectKind::DsdPlus;
    watch.system_id = Some(3);
    watch.delete_after = true;
    let watch = Arc::new(watch);
    Arc::clone(&watch).start(&ingestor).unwrap();

    let call = recv_call(&mut rx, 6).await.expect("expected one call");
    assert_eq!(call.system, 3);
    assert_eq!(call.talkgroup, 100);
    assert_eq!(call.frequency, Some(462_550_000));
    assert_eq!(call.sources.len(), 1);
    assert_eq!(call.sources[0].src, 4521);

    watch.stop();
}

/// S6: the access predicate over a listed scope and the wildcard.
#[test]
fn test_access_rules() {
    let call = |system: u32, talkgroup: u32| {
        let mut call = Call::new();
        call.system = system;
        call.talkgroup = talkgroup;
        call
    };

    let mut apikey = Apikey::new("feed");
    apikey.systems = AccessScope::Systems(vec![SystemRule {
        id: 7,
        talkgroups: TalkgroupScope::List(vec![100, 200]),
    }]);

    assert!(apikey.has_access(&call(7, 100)));
    assert!(!apikey.has_access(&call(7, 300)));
    assert!(!apikey.has_access(&call(8, 100)));

    apikey.systems = AccessScope::Wildcard;
    assert!(apikey.has_access(&call(42, 9999)));
}

/// Persistence round-trip: load → replace → save → load preserves the list
/// field-wise, ids included.
#[test]
fn test_registry_persistence_round_trip() {
    let tmp = TempDir::new().unwrap();
    let db = Database::open(tmp.path().join("callwatch.db")).unwrap();
    init_storage(&db).unwrap();

    let registry = Dirwatches::new();
    let mut a = Dirwatch::new("/calls/a");
    a.kind = DialectKind::SdrTrunk;
    a.delay = Some(3000);
    a.order = Some(1);
    let mut b = Dirwatch::new("/calls/b");
    b.mask = Some("TG#TG".to_string());
    b.order = Some(2);
    registry.replace(vec![a, b]);
    registry.write(&db).unwrap();

    registry.read(&db).unwrap();
    let first = registry.snapshot();
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|w| w.id.is_some()));

    // Save again and reload; everything survives, ids preserved.
    registry.write(&db).unwrap();
    registry.read(&db).unwrap();
    let second = registry.snapshot();

    assert_eq!(first.len(), second.len());
    for (x, y) in first.iter().zip(second.iter()) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.directory, y.directory);
        assert_eq!(x.kind, y.kind);
        assert_eq!(x.mask, y.mask);
        assert_eq!(x.delay, y.delay);
        assert_eq!(x.order, y.order);
    }
}

/// Watches whose directory disappears at start are logged and skipped while
/// the rest keep running (configuration error taxonomy).
#[tokio::test]
async fn test_start_all_with_missing_directory() {
    let tmp = TempDir::new().unwrap();
    let (ingestor, _rx) = Ingestor::new();
    let ingestor = Arc::new(ingestor);

    let registry = Dirwatches::new();
    registry.replace(vec![
        Dirwatch::new(Path::new("/no/such/directory")),
        Dirwatch::new(tmp.path()),
    ]);
    registry.start_all(&ingestor);

    let snapshot = registry.snapshot();
    assert!(!snapshot[0].is_running());
    assert!(snapshot[1].is_running());

    registry.stop_all();
    assert!(!snapshot[1].is_running());
}
