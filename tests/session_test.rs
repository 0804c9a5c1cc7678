//! Session engine integration tests.
//!
//! Each test drives a real [`StreamSession`] against a scripted `sh` encoder
//! and a polled temporary output directory.

#![cfg(unix)]

mod common;

use assert_matches::assert_matches;
use common::{
    arg_value, producing_encoder, source_media, wait_until, ScriptLauncher, TestEnv, FAILING_ENCODER,
    IDLE_ENCODER,
};
use hlsvod::session::{
    CloseReason, Error, Lifecycle, SegmentResponse, SessionNotice, StreamSession,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn open(env: &TestEnv, name: &str) -> (Arc<StreamSession>, mpsc::UnboundedReceiver<SessionNotice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = StreamSession::open(
        name,
        source_media(Path::new("/media/movie.mkv")),
        env.options.clone(),
        tx,
    )
    .await
    .unwrap();
    (session, rx)
}

#[tokio::test]
async fn test_open_writes_playlists_and_starts_encoder() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, _notices) = open(&env, "movie").await;

    let dir = env.session_dir("movie");
    let master = std::fs::read_to_string(dir.join("master.m3u8")).unwrap();
    assert!(master.starts_with("#EXTM3U"));
    assert!(master.contains("1080p.m3u8"));
    assert!(master.contains("360p.m3u8"));

    let variant = std::fs::read_to_string(dir.join("1080p.m3u8")).unwrap();
    assert_eq!(variant.matches("#EXTINF:").count(), 40);
    assert!(variant.contains("1080p-39.ts"));

    assert_eq!(session.lifecycle(), Lifecycle::Running);
    assert_eq!(session.master_playlist_url(), "/movie/master.m3u8");
    assert_eq!(session.selected_rendition().await, "1080p");
    assert_eq!(session.cursor().await, 0);
    assert_eq!(env.spawns(), 1);

    let args = env.last_args();
    assert_eq!(arg_value(&args, "-start_number"), Some("0"));
    assert_eq!(arg_value(&args, "-ss"), None);
    assert!(args.last().unwrap().ends_with("1080p.encoder.m3u8"));

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_open_fails_when_encoder_cannot_start() {
    let env = TestEnv::new(IDLE_ENCODER).with(|o| o.launcher = Arc::new(common::MissingLauncher));
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = StreamSession::open(
        "movie",
        source_media(Path::new("/media/movie.mkv")),
        env.options.clone(),
        tx,
    )
    .await;

    assert_matches!(result, Err(Error::EncoderSpawn(_)));
    assert!(!env.session_dir("movie").exists());
}

#[tokio::test]
async fn test_invalid_name_is_rejected() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = StreamSession::open(
        "../outside",
        source_media(Path::new("/media/movie.mkv")),
        env.options.clone(),
        tx,
    )
    .await;
    assert_matches!(result, Err(Error::InvalidName(_)));
    assert_eq!(env.spawns(), 0);
}

#[tokio::test]
async fn test_restart_within_cooldown_is_throttled() {
    let env = TestEnv::new(IDLE_ENCODER).with(|o| o.restart_cooldown = Duration::from_millis(500));
    let (session, _notices) = open(&env, "movie").await;

    // Straight after open: the start counts against the cool-down.
    assert_matches!(
        session.restart(20, None).await,
        Err(Error::RestartThrottled { .. })
    );
    assert_eq!(env.spawns(), 1);
    assert_eq!(session.cursor().await, 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    session.restart(20, None).await.unwrap();
    assert_eq!(env.spawns(), 2);
    assert_eq!(session.cursor().await, 20);

    // Two restarts 100ms apart: the second is rejected and spawns nothing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_matches!(
        session.restart(25, None).await,
        Err(Error::RestartThrottled { elapsed_ms }) if elapsed_ms < 500
    );
    assert_eq!(env.spawns(), 2);
    assert_eq!(session.cursor().await, 20);
    assert_eq!(session.lifecycle(), Lifecycle::Running);

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_restart_seeks_by_segment_durations() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, _notices) = open(&env, "movie").await;

    session.restart(20, None).await.unwrap();

    let args = env.last_args();
    assert_eq!(arg_value(&args, "-ss"), Some("60.000000"));
    assert_eq!(arg_value(&args, "-start_number"), Some("20"));
    assert_eq!(session.status().await.segment_start, 20);

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_lookahead_window_decisions() {
    let env = TestEnv::new(producing_encoder(3));
    let (session, _notices) = open(&env, "movie").await;

    session.restart(5, None).await.unwrap();
    assert_eq!(env.spawns(), 2);

    // cursor=5: segment 7 is inside the window.
    let response = session.on_segment_request("1080p", 7).await.unwrap();
    assert_matches!(response, SegmentResponse::ServeImmediate(_) | SegmentResponse::Wait(_));
    assert_eq!(env.spawns(), 2);
    assert_eq!(session.cursor().await, 5);

    // Segment 20 is past the window: restart there.
    let response = session.on_segment_request("1080p", 20).await.unwrap();
    assert_matches!(&response, SegmentResponse::RestartThenWait(_));
    assert!(response.path().ends_with("1080p-20.ts"));
    assert_eq!(std::fs::read_to_string(response.path()).unwrap(), "segment 20");
    assert_eq!(env.spawns(), 3);
    assert_eq!(session.cursor().await, 20);
    assert_eq!(arg_value(&env.last_args(), "-start_number"), Some("20"));

    // Segment 12 is behind the cursor: restart there too.
    let response = session.on_segment_request("1080p", 12).await.unwrap();
    assert_matches!(response, SegmentResponse::RestartThenWait(_));
    assert_eq!(env.spawns(), 4);
    assert_eq!(session.cursor().await, 12);

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_window_edge_advances_cursor() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, _notices) = open(&env, "movie").await;
    let dir = env.session_dir("movie");

    std::fs::write(dir.join("1080p-10.ts"), b"ten").unwrap();
    assert!(wait_until(Duration::from_secs(5), || session.tracker().is_created("1080p", 10)).await);

    let response = session.on_segment_request("1080p", 10).await.unwrap();
    assert_eq!(response, SegmentResponse::ServeImmediate(dir.join("1080p-10.ts")));
    assert_eq!(session.cursor().await, 1);

    // Written while the request is already waiting.
    let writer_dir = dir.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(writer_dir.join("1080p-11.ts"), b"eleven").unwrap();
    });
    let response = session.on_segment_request("1080p", 11).await.unwrap();
    assert_eq!(response, SegmentResponse::Wait(dir.join("1080p-11.ts")));
    assert_eq!(session.cursor().await, 2);
    assert_eq!(env.spawns(), 1);

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_rendition_switch_always_restarts() {
    let env = TestEnv::new(producing_encoder(3));
    let (session, _notices) = open(&env, "movie").await;
    assert!(wait_until(Duration::from_secs(5), || session.tracker().is_created("1080p", 2)).await);

    let response = session.on_segment_request("720p", 1).await.unwrap();
    assert_matches!(&response, SegmentResponse::RestartThenWait(_));
    assert!(response.path().ends_with("720p-1.ts"));
    assert_eq!(session.selected_rendition().await, "720p");
    assert_eq!(env.spawns(), 2);

    let args = env.last_args();
    assert!(arg_value(&args, "-hls_segment_filename").unwrap().ends_with("720p-%d.ts"));
    assert_eq!(arg_value(&args, "-start_number"), Some("1"));

    // Same rendition, inside the window: no restart.
    session.on_segment_request("720p", 2).await.unwrap();
    assert_eq!(env.spawns(), 2);

    // Back to 1080p for a segment that already exists: still a restart.
    let response = session.on_segment_request("1080p", 2).await.unwrap();
    assert_matches!(response, SegmentResponse::RestartThenWait(_));
    assert_eq!(env.spawns(), 3);
    assert_eq!(session.selected_rendition().await, "1080p");

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_unknown_rendition_changes_nothing() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, _notices) = open(&env, "movie").await;

    assert_matches!(
        session.on_segment_request("4k", 3).await,
        Err(Error::RenditionNotFound(name)) if name == "4k"
    );
    assert_matches!(
        session.restart(3, Some("4k")).await,
        Err(Error::RenditionNotFound(_))
    );
    assert_eq!(env.spawns(), 1);
    assert_eq!(session.selected_rendition().await, "1080p");
    assert_eq!(session.lifecycle(), Lifecycle::Running);

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_segment_past_end_is_rejected() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, _notices) = open(&env, "movie").await;
    assert_eq!(session.total_segments("1080p"), Some(40));

    assert_matches!(
        session.on_segment_request("1080p", 40).await,
        Err(Error::SegmentOutOfRange { number: 40, total: 40, .. })
    );
    assert_matches!(
        session.on_segment_request("1080p", 2_000_000_000).await,
        Err(Error::SegmentOutOfRange { .. })
    );
    // A rendition switch is checked before anything is killed.
    assert_matches!(
        session.on_segment_request("720p", 40).await,
        Err(Error::SegmentOutOfRange { rendition, .. }) if rendition == "720p"
    );
    assert_matches!(
        session.restart(u32::MAX, None).await,
        Err(Error::SegmentOutOfRange { .. })
    );

    assert_eq!(env.spawns(), 1);
    assert_eq!(session.cursor().await, 0);
    assert_eq!(session.selected_rendition().await, "1080p");
    assert_eq!(session.lifecycle(), Lifecycle::Running);

    // The last segment is still reachable.
    session.restart(39, None).await.unwrap();
    assert_eq!(env.spawns(), 2);
    assert_eq!(arg_value(&env.last_args(), "-start_number"), Some("39"));
    assert_eq!(arg_value(&env.last_args(), "-ss"), Some("117.000000"));

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_restart_spawn_failure_closes_session() {
    let env = TestEnv::with_launcher(ScriptLauncher::failing_after(IDLE_ENCODER, 1));
    let (session, mut notices) = open(&env, "movie").await;
    assert_eq!(session.lifecycle(), Lifecycle::Running);

    assert_matches!(session.restart(20, None).await, Err(Error::EncoderSpawn(_)));
    assert_eq!(env.spawns(), 2);

    assert_eq!(session.lifecycle(), Lifecycle::Closed);
    assert!(!session.status().await.encoder_running);
    assert!(!env.session_dir("movie").exists());

    let notice = tokio::time::timeout(Duration::from_secs(1), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(
        notice,
        SessionNotice::Closed { reason: CloseReason::EncoderFailed(reason), .. }
            if reason.contains("failed to start encoder")
    );

    assert_matches!(
        session.on_segment_request("1080p", 22).await,
        Err(Error::SessionClosed(_))
    );
    assert_eq!(env.spawns(), 2);
}

#[tokio::test]
async fn test_wait_is_superseded_by_restart() {
    let env = TestEnv::new(IDLE_ENCODER).with(|o| o.restart_cooldown = Duration::from_millis(100));
    let (session, _notices) = open(&env, "movie").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let waiter = {
        let session = session.clone();
        tokio::spawn(async move { session.wait_for_segment("1080p", 5).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    session.restart(30, None).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_matches!(result, Err(Error::Superseded { number: 5, target: 30 }));

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_wait_times_out() {
    let env = TestEnv::new(IDLE_ENCODER).with(|o| {
        o.wait_attempts = 3;
        o.wait_interval = Duration::from_millis(20);
    });
    let (session, _notices) = open(&env, "movie").await;

    let result = session.on_segment_request("1080p", 4).await;
    assert_matches!(
        result,
        Err(Error::SegmentTimeout { rendition, number: 4 }) if rendition == "1080p"
    );
    // A timeout leaves the session alive.
    assert_eq!(session.lifecycle(), Lifecycle::Running);

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_deliberate_kill_is_not_a_failure() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, mut notices) = open(&env, "movie").await;

    session.restart(10, None).await.unwrap();
    session.restart(20, None).await.unwrap();

    let notice = tokio::time::timeout(Duration::from_millis(300), notices.recv()).await;
    assert!(notice.is_err(), "unexpected notice: {:?}", notice);
    assert_eq!(session.lifecycle(), Lifecycle::Running);
    assert!(env.session_dir("movie").exists());

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_encoder_failure_tears_down_session() {
    let env = TestEnv::new(FAILING_ENCODER);
    let (session, mut notices) = open(&env, "movie").await;

    let notice = tokio::time::timeout(Duration::from_secs(5), notices.recv())
        .await
        .unwrap()
        .unwrap();
    assert_matches!(
        notice,
        SessionNotice::Closed { name, reason: CloseReason::EncoderFailed(reason) }
            if name == "movie" && reason.contains("Invalid data found")
    );

    assert!(session.is_closed());
    assert!(!env.session_dir("movie").exists());
    assert_matches!(
        session.on_segment_request("1080p", 0).await,
        Err(Error::SessionClosed(_))
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let env = TestEnv::new(IDLE_ENCODER);
    let (session, mut notices) = open(&env, "movie").await;

    session.close(CloseReason::Requested).await;
    session.close(CloseReason::Shutdown).await;

    assert_eq!(session.lifecycle(), Lifecycle::Closed);
    assert!(!env.session_dir("movie").exists());
    assert_eq!(
        notices.recv().await,
        Some(SessionNotice::Closed {
            name: "movie".to_string(),
            reason: CloseReason::Requested,
        })
    );
    assert!(notices.try_recv().is_err());

    assert_matches!(session.restart(5, None).await, Err(Error::SessionClosed(_)));
}

#[tokio::test]
async fn test_status_reports_progress() {
    let env = TestEnv::new(producing_encoder(3));
    let (session, _notices) = open(&env, "movie").await;

    session.on_segment_request("1080p", 1).await.unwrap();
    session.record_fetched("1080p", 1);
    assert!(wait_until(Duration::from_secs(5), || session.tracker().is_created("1080p", 2)).await);

    let status = session.status().await;
    assert_eq!(status.name, "movie");
    assert_eq!(status.state, Lifecycle::Running);
    assert_eq!(status.selected_rendition, "1080p");
    assert_eq!(status.renditions, vec!["1080p", "720p", "480p", "360p"]);
    assert_eq!(status.total_segments["1080p"], 40);
    assert_eq!(status.progress["1080p"].created, 3);
    assert_eq!(status.progress["1080p"].fetched, 1);
    assert!(status.encoder_running);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"], "running");

    session.close(CloseReason::Requested).await;
}

#[tokio::test]
async fn test_notify_observer_picks_up_segments() {
    let env = TestEnv::new(producing_encoder(3)).with(|o| o.watch_mode = hlsvod::watch::WatchMode::Notify);
    let (session, _notices) = open(&env, "movie").await;

    let response = session.on_segment_request("1080p", 2).await.unwrap();
    assert!(response.path().ends_with("1080p-2.ts"));

    session.close(CloseReason::Requested).await;
}
