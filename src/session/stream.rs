//! The per-stream orchestrator.
//!
//! A [`StreamSession`] owns one output directory, one encoder at a time and
//! the segment tracker fed by that directory's observer. Every segment
//! request goes through [`StreamSession::on_segment_request`], which decides
//! whether to serve, wait or restart the encoder somewhere else.
//!
//! State that decisions depend on (ladder selection, plan, cursor, process)
//! lives behind one async mutex, so requests are serialized per session while
//! segment waits run with the lock released.

use super::ladder::QualityLadder;
use super::options::SessionOptions;
use super::plan::EncodingPlan;
use super::playlist::{self, MASTER_PLAYLIST};
use super::process::{ExitOutcome, ProcessExit, TranscodeProcess};
use super::tracker::{segment_file_name, OutputFile, RenditionProgress, SegmentTracker};
use super::window::{LookaheadWindow, WindowPosition};
use super::{Error, Result};
use crate::watch;
use chrono::{DateTime, Utc};
use hlsvod_av::SourceMedia;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::{mpsc, watch as signal, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Idle,
    Running,
    /// Between killing one encoder run and starting the next.
    Restarting,
    /// Terminal.
    Closed,
}

/// Why a session was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum CloseReason {
    Requested,
    /// No requests within the idle timeout.
    Idle,
    EncoderFailed(String),
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Requested => write!(f, "requested"),
            CloseReason::Idle => write!(f, "idle"),
            CloseReason::EncoderFailed(reason) => write!(f, "encoder failed: {}", reason),
            CloseReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Outbound events for whoever owns the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// The session is gone and its name may be reused.
    Closed { name: String, reason: CloseReason },
    /// The encoder wrote the last segment of its run.
    EncodeFinished { name: String, run_id: u64 },
}

/// How a segment request was satisfied. The segment exists in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentResponse {
    /// Already written when the request arrived.
    ServeImmediate(PathBuf),
    /// Within the encoder's lookahead; waited for it.
    Wait(PathBuf),
    /// Outside the lookahead or another rendition; restarted the encoder there.
    RestartThenWait(PathBuf),
}

impl SegmentResponse {
    pub fn path(&self) -> &Path {
        match self {
            SegmentResponse::ServeImmediate(path)
            | SegmentResponse::Wait(path)
            | SegmentResponse::RestartThenWait(path) => path,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            SegmentResponse::ServeImmediate(path)
            | SegmentResponse::Wait(path)
            | SegmentResponse::RestartThenWait(path) => path,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub name: String,
    pub state: Lifecycle,
    pub source: PathBuf,
    pub duration: f64,
    pub master_playlist: String,
    pub selected_rendition: String,
    pub renditions: Vec<String>,
    pub cursor: u32,
    pub segment_start: u32,
    pub encoder_running: bool,
    pub progress: HashMap<String, RenditionProgress>,
    pub total_segments: BTreeMap<String, u32>,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Published on every restart so outstanding waits can tell they are stale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RestartMark {
    epoch: u64,
    target: u32,
    rendition: String,
}

struct SessionState {
    ladder: QualityLadder,
    plan: EncodingPlan,
    /// Last segment the viewer is assumed to have consumed.
    cursor: u32,
    process: Option<TranscodeProcess>,
    last_start: Option<Instant>,
}

/// One open stream.
pub struct StreamSession {
    name: String,
    source: SourceMedia,
    output_dir: PathBuf,
    options: SessionOptions,
    tracker: SegmentTracker,
    total_segments: BTreeMap<String, u32>,
    state: Mutex<SessionState>,
    lifecycle: RwLock<Lifecycle>,
    /// Run whose exit would be a failure; 0 while no run is expected to live.
    current_run: AtomicU64,
    next_run: AtomicU64,
    restarts: signal::Sender<RestartMark>,
    exits_tx: mpsc::UnboundedSender<ProcessExit>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    cancel: CancellationToken,
    span: Span,
    opened_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("name", &self.name)
            .field("source", &self.source.file_path)
            .field("output_dir", &self.output_dir)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

/// Reject names that are not a single, plain directory component.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

impl StreamSession {
    /// Open a session: write playlists, start observing the output directory
    /// and start the encoder at segment 0 of the default rendition.
    ///
    /// Any failure removes the output directory again.
    pub async fn open(
        name: impl Into<String>,
        source: SourceMedia,
        options: SessionOptions,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        validate_name(&name)?;

        let output_dir = options.output_root.join(&name);
        let span = tracing::info_span!("session", name = %name);
        let session_span = span.clone();

        async move {
            if tokio::fs::try_exists(&output_dir).await.unwrap_or(false) {
                tracing::warn!(dir = %output_dir.display(), "Removing stale output directory");
                tokio::fs::remove_dir_all(&output_dir).await?;
            }
            tokio::fs::create_dir_all(&output_dir).await?;

            let result = Self::start(name, source, options, output_dir.clone(), notices, session_span).await;
            if result.is_err() {
                if let Err(e) = tokio::fs::remove_dir_all(&output_dir).await {
                    tracing::warn!(dir = %output_dir.display(), "Failed to remove output directory: {}", e);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn start(
        name: String,
        source: SourceMedia,
        options: SessionOptions,
        output_dir: PathBuf,
        notices: mpsc::UnboundedSender<SessionNotice>,
        span: Span,
    ) -> Result<Arc<Self>> {
        let ladder = QualityLadder::build(&source, &options.ladder_options());
        let mut plan = EncodingPlan::new(&source, options.segment_length, options.hardcode_subtitles);

        let timelines =
            playlist::build_timelines(&source, &plan, &ladder, options.ffprobe_path.as_deref()).await?;
        let mut total_segments = BTreeMap::new();
        for (rendition, timeline) in &timelines {
            total_segments.insert(rendition.clone(), timeline.segment_count());
            plan.record_durations(rendition, timeline.durations());
        }
        playlist::write_playlists(&output_dir, &source, &plan, &ladder, &timelines).await?;

        tracing::info!(
            source = %source.file_path.display(),
            renditions = ?ladder.names(),
            selected = %ladder.selected().name,
            segment_length = %plan.actual_segment_length_string(),
            "Opening session"
        );

        let (exits_tx, exits_rx) = mpsc::unbounded_channel();
        let (files_tx, files_rx) = mpsc::channel(256);
        let (restarts, _) = signal::channel(RestartMark::default());
        let cancel = CancellationToken::new();
        let now = Utc::now();

        let session = Arc::new(Self {
            name,
            source,
            output_dir,
            tracker: SegmentTracker::new(),
            total_segments,
            state: Mutex::new(SessionState {
                ladder,
                plan,
                cursor: 0,
                process: None,
                last_start: None,
            }),
            lifecycle: RwLock::new(Lifecycle::Idle),
            current_run: AtomicU64::new(0),
            next_run: AtomicU64::new(1),
            restarts,
            exits_tx,
            notices,
            cancel,
            span,
            opened_at: now,
            last_activity: RwLock::new(now),
            options,
        });

        let mechanism = watch::observe_dir(
            session.options.watch_mode,
            &session.output_dir,
            session.options.settle,
            files_tx,
            session.cancel.child_token(),
        )?;
        tracing::debug!(mechanism, "Observing output directory");

        tokio::spawn(
            run_worker(Arc::downgrade(&session), files_rx, exits_rx, session.cancel.clone())
                .instrument(session.span.clone()),
        );

        let spawned = {
            let mut state = session.state.lock().await;
            session.spawn_locked(&mut state)
        };
        if let Err(e) = spawned {
            session.set_lifecycle(Lifecycle::Closed);
            session.cancel.cancel();
            return Err(e);
        }

        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &SourceMedia {
        &self.source
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn tracker(&self) -> &SegmentTracker {
        &self.tracker
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle() == Lifecycle::Closed
    }

    /// URL path of the master playlist.
    pub fn master_playlist_url(&self) -> String {
        format!("/{}/{}", self.name, MASTER_PLAYLIST)
    }

    /// Path of a segment file, whether or not it exists yet.
    pub fn segment_path(&self, rendition: &str, number: u32) -> PathBuf {
        self.output_dir.join(segment_file_name(rendition, number))
    }

    /// Path of a playlist in the output directory.
    pub fn playlist_path(&self, file_name: &str) -> Option<PathBuf> {
        if !file_name.ends_with(".m3u8") || validate_name(file_name).is_err() {
            return None;
        }
        Some(self.output_dir.join(file_name))
    }

    /// Number of segments a rendition has in total.
    pub fn total_segments(&self, rendition: &str) -> Option<u32> {
        self.total_segments.get(rendition).copied()
    }

    /// Playback cursor.
    pub async fn cursor(&self) -> u32 {
        self.state.lock().await.cursor
    }

    /// Name of the rendition the encoder is producing.
    pub async fn selected_rendition(&self) -> String {
        self.state.lock().await.ladder.selected().name.clone()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read()
    }

    /// Mark the session as in use.
    pub fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    /// Whether no request has arrived for longer than `timeout`.
    pub fn is_idle(&self, timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_activity()) > timeout
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        let mut lifecycle = self.lifecycle.write();
        if *lifecycle != Lifecycle::Closed {
            *lifecycle = next;
        }
    }

    /// Reject segment numbers past the end of a known rendition.
    fn ensure_in_range(&self, rendition: &str, number: u32) -> Result<()> {
        match self.total_segments(rendition) {
            Some(total) if number >= total => {
                tracing::debug!(rendition = %rendition, segment = number, total, "Segment out of range");
                Err(Error::SegmentOutOfRange {
                    rendition: rendition.to_string(),
                    number,
                    total,
                })
            }
            _ => Ok(()),
        }
    }

        fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed(self.name.clone()));
        }
        Ok(())
    }

    /// Start an encoder run for the current plan and selection.
    fn spawn_locked(&self, state: &mut SessionState) -> Result<()> {
        let run_id = self.next_run.fetch_add(1, Ordering::SeqCst);
        let rendition = state.ladder.selected();
        let args = state.plan.encoder_args(&self.source, rendition, &self.output_dir);

        // Published before the spawn so an immediate failure is not taken as stale.
        self.current_run.store(run_id, Ordering::SeqCst);
        let process = match TranscodeProcess::spawn(
            self.options.launcher.as_ref(),
            &args,
            run_id,
            self.exits_tx.clone(),
        ) {
            Ok(process) => process,
            Err(e) => {
                self.current_run.store(0, Ordering::SeqCst);
                tracing::error!(rendition = %rendition.name, "Failed to start encoder: {}", e);
                return Err(e);
            }
        };

        tracing::info!(
            run_id,
            rendition = %rendition.name,
            segment_start = state.plan.segment_start,
            start_time = state.plan.start_time(&rendition.name),
            "Encoder running"
        );
        state.process = Some(process);
        state.last_start = Some(Instant::now());
        self.set_lifecycle(Lifecycle::Running);
        Ok(())
    }

    /// Kill the encoder and start it again at `target`, optionally switching
    /// rendition first.
    ///
    /// # Errors
    ///
    /// - [`Error::RestartThrottled`] if the last start was within the
    ///   cool-down; nothing is touched.
    /// - [`Error::RenditionNotFound`] for an unknown rendition; nothing is
    ///   touched.
    /// - [`Error::SegmentOutOfRange`] if the rendition has no segment
    ///   `target`; nothing is touched.
    /// - [`Error::SessionClosed`] if the session closed meanwhile.
    /// - [`Error::EncoderSpawn`] if the new run could not be started. The
    ///   session is closed with [`CloseReason::EncoderFailed`].
    pub async fn restart(&self, target: u32, rendition: Option<&str>) -> Result<()> {
        async {
            let mut state = self.state.lock().await;
            self.ensure_open()?;
            self.restart_locked(&mut state, target, rendition).await
        }
        .instrument(self.span.clone())
        .await
    }

    async fn restart_locked(
        &self,
        state: &mut SessionState,
        target: u32,
        rendition: Option<&str>,
    ) -> Result<()> {
        if let Some(last) = state.last_start {
            let elapsed = last.elapsed();
            if elapsed < self.options.restart_cooldown {
                let elapsed_ms = elapsed.as_millis() as u64;
                tracing::warn!(segment = target, elapsed_ms, "Restart throttled");
                return Err(Error::RestartThrottled { elapsed_ms });
            }
        }
        if let Some(name) = rendition {
            if state.ladder.get(name).is_none() {
                tracing::warn!(rendition = %name, "Restart to unknown rendition");
                return Err(Error::RenditionNotFound(name.to_string()));
            }
        }
        match rendition {
            Some(name) => self.ensure_in_range(name, target)?,
            None => self.ensure_in_range(&state.ladder.selected().name, target)?,
        }

        self.set_lifecycle(Lifecycle::Restarting);
        self.current_run.store(0, Ordering::SeqCst);
        if let Some(process) = state.process.take() {
            process.kill().await;
        }

        if let Some(name) = rendition {
            state.ladder.select_by_name(name)?;
        }
        state.plan.segment_start = target;
        state.cursor = target;

        let selected = state.ladder.selected().name.clone();
        self.restarts.send_modify(|mark| {
            mark.epoch += 1;
            mark.target = target;
            mark.rendition = selected.clone();
        });
        tracing::info!(
            segment = target,
            rendition = %selected,
            seek = state.plan.start_time(&selected),
            "Restarting encoder"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.options.restart_grace) => {}
            _ = self.cancel.cancelled() => {
                return Err(Error::SessionClosed(self.name.clone()));
            }
        }
        self.ensure_open()?;

        if let Err(e) = self.spawn_locked(state) {
            // No encoder is left to serve anything; tear down with the lock held.
            let reason = CloseReason::EncoderFailed(e.to_string());
            if self.mark_closed(&reason) {
                self.finish_close(state.process.take(), reason).await;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Decide how to satisfy a request for `rendition`-`number` and carry it out.
    ///
    /// Returns once the segment exists.
    pub async fn on_segment_request(&self, rendition: &str, number: u32) -> Result<SegmentResponse> {
        async {
            self.touch();
            self.ensure_in_range(rendition, number)?;
            let path = self.segment_path(rendition, number);

            let (restarted, marks) = {
                let mut state = self.state.lock().await;
                self.ensure_open()?;

                if state.ladder.selected().name != rendition {
                    tracing::info!(
                        from = %state.ladder.selected().name,
                        to = %rendition,
                        segment = number,
                        "Switching rendition"
                    );
                    self.restart_locked(&mut state, number, Some(rendition)).await?;
                    let marks = self.restarts.subscribe();
                    drop(state);

                    return match self.wait_on(marks, rendition, number).await {
                        Ok(path) => Ok(SegmentResponse::RestartThenWait(path)),
                        Err(Error::SessionClosed(name)) => Err(Error::SessionClosed(name)),
                        Err(e) => {
                            tracing::warn!(segment = number, "Segment unavailable after switch: {}", e);
                            Err(Error::segment_unavailable(rendition, number))
                        }
                    };
                }

                let window = LookaheadWindow::new(state.cursor, self.options.window_size);
                let position = window.classify(number);
                if position == WindowPosition::Edge {
                    state.cursor += 1;
                }

                if self.tracker.is_created(rendition, number) {
                    tracing::trace!(segment = number, "Serving existing segment");
                    return Ok(SegmentResponse::ServeImmediate(path));
                }

                let restarted = position.needs_restart();
                if restarted {
                    tracing::debug!(
                        segment = number,
                        cursor = window.cursor,
                        ?position,
                        "Segment outside lookahead window"
                    );
                    self.restart_locked(&mut state, number, None).await?;
                }
                (restarted, self.restarts.subscribe())
            };

            let path = self.wait_on(marks, rendition, number).await?;
            Ok(if restarted {
                SegmentResponse::RestartThenWait(path)
            } else {
                SegmentResponse::Wait(path)
            })
        }
        .instrument(self.span.clone())
        .await
    }

    /// Wait until a segment has been written.
    ///
    /// Fails with [`Error::Superseded`] as soon as a restart moves the encoder
    /// to a different target, and with [`Error::SegmentTimeout`] once the
    /// attempt budget is spent.
    pub async fn wait_for_segment(&self, rendition: &str, number: u32) -> Result<PathBuf> {
        let marks = self.restarts.subscribe();
        self.wait_on(marks, rendition, number)
            .instrument(self.span.clone())
            .await
    }

    async fn wait_on(
        &self,
        mut marks: signal::Receiver<RestartMark>,
        rendition: &str,
        number: u32,
    ) -> Result<PathBuf> {
        let attempts = self.options.wait_attempts;

        for attempt in 0..=attempts {
            if self.tracker.is_created(rendition, number) {
                tracing::trace!(segment = number, attempt, "Segment ready");
                return Ok(self.segment_path(rendition, number));
            }
            if attempt == attempts {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.options.wait_interval) => {}
                changed = marks.changed() => {
                    if changed.is_err() {
                        return Err(Error::SessionClosed(self.name.clone()));
                    }
                    let mark = marks.borrow_and_update().clone();
                    if mark.target != number || mark.rendition != rendition {
                        tracing::debug!(segment = number, target = mark.target, "Wait superseded");
                        return Err(Error::Superseded {
                            number,
                            target: mark.target,
                        });
                    }
                }
                _ = self.cancel.cancelled() => {
                    return Err(Error::SessionClosed(self.name.clone()));
                }
            }
        }

        tracing::warn!(rendition = %rendition, segment = number, attempts, "Timed out waiting for segment");
        Err(Error::segment_timeout(rendition, number))
    }

    /// Record that a segment was handed to a viewer.
    pub fn record_fetched(&self, rendition: &str, number: u32) {
        if self.tracker.record_fetched(rendition, number) {
            self.log_progress(rendition);
        }
    }

    fn log_progress(&self, rendition: &str) {
        let progress = self.tracker.progress(rendition);
        let total = self.total_segments(rendition).unwrap_or(0);
        let percent = if total > 0 {
            (progress.created as f64 * 1000.0 / total as f64).round() / 10.0
        } else {
            0.0
        };
        tracing::debug!(
            parent: &self.span,
            rendition = %rendition,
            created = progress.created,
            fetched = progress.fetched,
            total,
            percent,
            "Progress"
        );
    }

    fn handle_file(&self, path: &Path) {
        match OutputFile::classify(path) {
            OutputFile::Segment(segment) => {
                if self.tracker.record_created(&segment.rendition, segment.number) {
                    tracing::trace!(segment = %segment.file_name(), "Segment created");
                    self.log_progress(&segment.rendition);
                }
            }
            OutputFile::Playlist => tracing::trace!(file = %path.display(), "Ignoring playlist"),
            OutputFile::Invalid(name) => {
                tracing::warn!(file = %name, "Ignoring segment with unparseable name")
            }
            OutputFile::Other => {}
        }
    }

    async fn handle_exit(&self, exit: ProcessExit) {
        let current = self.current_run.load(Ordering::SeqCst);
        match exit.outcome {
            ExitOutcome::Killed => tracing::debug!(run_id = exit.run_id, "Deliberate termination"),
            _ if exit.run_id != current => {
                tracing::debug!(run_id = exit.run_id, current, "Ignoring exit of retired run")
            }
            ExitOutcome::Completed => {
                let _ = self.notices.send(SessionNotice::EncodeFinished {
                    name: self.name.clone(),
                    run_id: exit.run_id,
                });
            }
            ExitOutcome::Failed(reason) => {
                self.close(CloseReason::EncoderFailed(reason)).await;
            }
        }
    }

    /// Tear the session down: kill the encoder, stop observing, delete the
    /// output directory and send [`SessionNotice::Closed`]. Idempotent.
    pub async fn close(&self, reason: CloseReason) {
        async {
            if !self.mark_closed(&reason) {
                return;
            }
            let process = self.state.lock().await.process.take();
            self.finish_close(process, reason).await;
        }
        .instrument(self.span.clone())
        .await
    }

    /// Flip the lifecycle to Closed and stop background work. Returns false
    /// if the session was already closed.
    fn mark_closed(&self, reason: &CloseReason) -> bool {
        {
            let mut lifecycle = self.lifecycle.write();
            if *lifecycle == Lifecycle::Closed {
                return false;
            }
            *lifecycle = Lifecycle::Closed;
        }
        match reason {
            CloseReason::EncoderFailed(_) => tracing::error!(%reason, "Closing session"),
            _ => tracing::info!(%reason, "Closing session"),
        }

        self.current_run.store(0, Ordering::SeqCst);
        self.cancel.cancel();
        true
    }

    async fn finish_close(&self, process: Option<TranscodeProcess>, reason: CloseReason) {
        if let Some(process) = process {
            process.kill().await;
        }

        match tokio::fs::remove_dir_all(&self.output_dir).await {
            Ok(()) => tracing::debug!(dir = %self.output_dir.display(), "Removed output directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.output_dir.display(), "Failed to remove output directory: {}", e)
            }
        }

        let _ = self.notices.send(SessionNotice::Closed {
            name: self.name.clone(),
            reason,
        });
    }

    /// Current status.
    pub async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        SessionStatus {
            name: self.name.clone(),
            state: self.lifecycle(),
            source: self.source.file_path.clone(),
            duration: self.source.duration,
            master_playlist: self.master_playlist_url(),
            selected_rendition: state.ladder.selected().name.clone(),
            renditions: state.ladder.names(),
            cursor: state.cursor,
            segment_start: state.plan.segment_start,
            encoder_running: state.process.as_ref().is_some_and(|p| !p.is_finished()),
            progress: self.tracker.snapshot(),
            total_segments: self.total_segments.clone(),
            opened_at: self.opened_at,
            last_activity: self.last_activity(),
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Single consumer of observer and process events for one session.
async fn run_worker(
    session: Weak<StreamSession>,
    mut files: mpsc::Receiver<PathBuf>,
    mut exits: mpsc::UnboundedReceiver<ProcessExit>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            Some(path) = files.recv() => {
                let Some(session) = session.upgrade() else { break };
                session.handle_file(&path);
            }
            Some(exit) = exits.recv() => {
                let Some(session) = session.upgrade() else { break };
                session.handle_exit(exit).await;
            }
            else => break,
        }
    }
    tracing::debug!("Session worker stopped");
}
