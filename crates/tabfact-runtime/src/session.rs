//! One streaming fact-check run.
//!
//! [`run_session`] reads the backend's byte stream chunk by chunk, frames
//! NDJSON lines, feeds token text through a [`Segmenter`] and publishes
//! deltas to a [`SessionObserver`] as they arrive. When the stream ends
//! the answer is parsed into a [`Verdict`] exactly once.
//!
//! A run ends in one of three ways:
//! - the stream completes: [`RunOutcome::Completed`] with a [`RunReport`];
//! - the cancellation token fires: [`RunOutcome::Cancelled`], all state is
//!   dropped and the observer hears nothing more;
//! - a read fails, the stream goes idle, or the backend reports an error:
//!   [`SessionError`], with no partial result.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::time::{Duration, Instant};
use tabfact_core::{
    extract_verdict_with_source, parse_token_line, Delta, LineFramer, MarkerPair, Region,
    SegmentUpdate, Segmenter, Verdict, VerdictSource,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::providers::{ByteStream, ProviderError};

/// Terminal failures of a run.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Stream read failed: {0}")]
    Read(#[from] ProviderError),

    #[error("No data received for {0:?}")]
    IdleTimeout(Duration),

    #[error("Backend reported an error: {0}")]
    Backend(String),
}

/// Receives live output of a run.
///
/// All methods default to doing nothing.
pub trait SessionObserver: Send {
    /// A region received its first text.
    fn on_region_started(&mut self, _region: Region) {}

    /// Text appended to a region.
    fn on_delta(&mut self, _delta: &Delta) {}

    /// The final verdict, delivered once per completed run.
    fn on_verdict(&mut self, _verdict: &Verdict, _source: &VerdictSource) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunReport),
    Cancelled,
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled)
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub reasoning: String,
    pub answer: String,
    pub verdict: Verdict,
    pub source: VerdictSource,

    /// Token events received
    pub tokens: usize,

    /// Lines that were not valid token events
    pub malformed_lines: usize,

    /// Time from the first reasoning text to the end marker
    pub reasoning_duration: Option<Duration>,

    pub total_duration: Duration,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Per-run state. Created when the stream opens, dropped with the run.
struct SessionState {
    framer: LineFramer,
    segmenter: Segmenter,
    tokens: usize,
    malformed_lines: usize,
    started: Instant,
    reasoning_started: Option<Instant>,
    reasoning_ended: Option<Instant>,
}

impl SessionState {
    fn new(markers: MarkerPair) -> Self {
        Self {
            framer: LineFramer::new(),
            segmenter: Segmenter::new(markers),
            tokens: 0,
            malformed_lines: 0,
            started: Instant::now(),
            reasoning_started: None,
            reasoning_ended: None,
        }
    }

    /// Process one framed line. Returns `false` once `cancel` has fired.
    fn handle_line(
        &mut self,
        line: &str,
        cancel: &CancellationToken,
        observer: &mut dyn SessionObserver,
    ) -> Result<bool, SessionError> {
        let event = match parse_token_line(line) {
            Ok(event) => event,
            Err(e) => {
                self.malformed_lines += 1;
                tracing::warn!(error = %e, line_len = line.len(), "skipping malformed stream line");
                return Ok(true);
            }
        };

        if let Some(message) = event.error {
            return Err(SessionError::Backend(message));
        }

        self.tokens += 1;
        if event.done {
            tracing::debug!(tokens = self.tokens, "backend signalled done");
        }
        if event.response.is_empty() {
            return Ok(true);
        }
        let update = self.segmenter.push(&event.response);
        Ok(self.publish(update, cancel, observer))
    }

    /// Deliver an update to the observer, stopping at the first callback
    /// after which `cancel` has fired. Returns `false` if it stopped.
    fn publish(
        &mut self,
        update: SegmentUpdate,
        cancel: &CancellationToken,
        observer: &mut dyn SessionObserver,
    ) -> bool {
        if update.reasoning_started {
            self.reasoning_started = Some(Instant::now());
            observer.on_region_started(Region::Reasoning);
            if cancel.is_cancelled() {
                return false;
            }
        }
        if update.answer_started {
            observer.on_region_started(Region::Answer);
            if cancel.is_cancelled() {
                return false;
            }
        }
        for delta in &update.deltas {
            observer.on_delta(delta);
            if cancel.is_cancelled() {
                return false;
            }
        }

        if self.reasoning_started.is_some()
            && self.reasoning_ended.is_none()
            && !self.segmenter.in_reasoning_block()
        {
            self.reasoning_ended = Some(Instant::now());
        }
        true
    }

    /// Flush the framer and segmenter, then extract the verdict.
    ///
    /// The flush still talks to the observer, so the token is checked
    /// again before the verdict is produced.
    fn finish(
        mut self,
        cancel: &CancellationToken,
        observer: &mut dyn SessionObserver,
    ) -> Result<RunOutcome, SessionError> {
        if let Some(line) = self.framer.finish() {
            if !self.handle_line(&line, cancel, observer)? {
                return Ok(RunOutcome::Cancelled);
            }
        }
        let update = self.segmenter.finish();
        if !self.publish(update, cancel, observer) || cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let finished = Instant::now();
        let reasoning_duration = self
            .reasoning_started
            .map(|start| self.reasoning_ended.unwrap_or(finished).duration_since(start));
        let total_duration = finished.duration_since(self.started);

        let (reasoning, answer) = self.segmenter.into_parts();
        let (verdict, source) = extract_verdict_with_source(&answer);
        observer.on_verdict(&verdict, &source);

        let finished_at = Utc::now();
        let started_at = finished_at
            - chrono::Duration::from_std(total_duration).unwrap_or_else(|_| chrono::Duration::zero());

        Ok(RunOutcome::Completed(RunReport {
            reasoning,
            answer,
            verdict,
            source,
            tokens: self.tokens,
            malformed_lines: self.malformed_lines,
            reasoning_duration,
            total_duration,
            started_at,
            finished_at,
        }))
    }
}

/// Drive one run to completion, cancellation or failure.
pub async fn run_session(
    mut stream: ByteStream,
    markers: MarkerPair,
    cancel: CancellationToken,
    observer: &mut dyn SessionObserver,
    idle_timeout: Duration,
) -> Result<RunOutcome, SessionError> {
    let mut state = SessionState::new(markers);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(tokens = state.tokens, "session cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            next = tokio::time::timeout(idle_timeout, stream.next()) => next,
        };

        let chunk = match next {
            Ok(Some(Ok(chunk))) => chunk,
            Ok(Some(Err(e))) => {
                tracing::error!(error = %e, tokens = state.tokens, "stream read failed");
                return Err(SessionError::Read(e));
            }
            Ok(None) => break,
            Err(_) => {
                tracing::error!(timeout = ?idle_timeout, "stream idle timeout");
                return Err(SessionError::IdleTimeout(idle_timeout));
            }
        };

        for line in state.framer.push(&chunk) {
            // An observer callback may have aborted the run.
            if cancel.is_cancelled() || !state.handle_line(&line, &cancel, observer)? {
                tracing::info!(tokens = state.tokens, "session cancelled");
                return Ok(RunOutcome::Cancelled);
            }
        }
    }

    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    let tokens = state.tokens;
    let report = match state.finish(&cancel, observer)? {
        RunOutcome::Completed(report) => report,
        RunOutcome::Cancelled => {
            tracing::info!(tokens, "session cancelled");
            return Ok(RunOutcome::Cancelled);
        }
    };
    tracing::info!(
        answer = %report.verdict.answer,
        source = ?report.source,
        tokens = report.tokens,
        malformed_lines = report.malformed_lines,
        elapsed = ?report.total_duration,
        "session completed"
    );
    Ok(RunOutcome::Completed(report))
}
