//! Metrics collection for consultation cycles.
//!
//! Tracks timing, file sizes, and error history for the
//! record/transcribe/generate workflow. Shown by the `status` command;
//! never persisted.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Maximum number of completed cycles to retain in history
const MAX_CYCLE_HISTORY: usize = 50;

/// Maximum number of errors to retain in history
const MAX_ERROR_HISTORY: usize = 20;

/// Metrics for a completed consultation cycle (recording through transcript)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleMetrics {
    /// Consultation identifier for this cycle
    pub consult_id: String,
    /// Unix timestamp when cycle started (seconds)
    pub started_at: u64,
    /// Recording duration in milliseconds (0 for loaded/pasted input)
    pub recording_duration_ms: u64,
    /// Audio file size in bytes
    pub audio_file_size_bytes: u64,
    /// Transcription API call duration in milliseconds
    pub transcription_duration_ms: u64,
    /// Length of transcribed text in characters
    pub transcript_length_chars: u64,
    /// Total cycle time (from start to archived transcript) in milliseconds
    pub total_cycle_ms: u64,
    /// Whether the cycle completed successfully
    pub success: bool,
    /// Error message if cycle failed
    pub error_message: Option<String>,
}

/// Aggregate counters for SOAP note generation calls.
/// Notes are generated on demand, possibly several times per transcript,
/// so they are tracked separately from the recording cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteGenerationStats {
    pub attempts: u64,
    pub successes: u64,
    pub total_duration_ms: u64,
    pub last_duration_ms: u64,
    pub last_note_chars: u64,
}

impl NoteGenerationStats {
    pub fn avg_duration_ms(&self) -> u64 {
        if self.successes == 0 {
            0
        } else {
            self.total_duration_ms / self.successes
        }
    }
}

/// Summary statistics across all recorded cycles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_cycles: u64,
    pub successful_cycles: u64,
    pub failed_cycles: u64,
    pub avg_recording_duration_ms: u64,
    pub avg_transcription_duration_ms: u64,
    pub avg_total_cycle_ms: u64,
    pub note_generation: NoteGenerationStats,
    pub last_error: Option<ErrorRecord>,
}

/// Record of an error that occurred during operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Unix timestamp when error occurred (seconds)
    pub timestamp: u64,
    /// Category of error (e.g., "audio", "transcription", "notegen")
    pub error_type: String,
    /// Human-readable error message
    pub message: String,
    /// Associated consultation id, if applicable
    pub consult_id: Option<String>,
}

/// Internal state for tracking an in-progress cycle
struct CycleInProgress {
    consult_id: Uuid,
    started_at: Instant,
    started_at_unix: u64,
    recording_started: Option<Instant>,
    recording_duration: Option<Duration>,
    audio_file_size: Option<u64>,
    transcription_started: Option<Instant>,
    transcription_duration: Option<Duration>,
    transcript_length: Option<usize>,
}

impl CycleInProgress {
    fn new(consult_id: Uuid) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            consult_id,
            started_at: Instant::now(),
            started_at_unix: now,
            recording_started: None,
            recording_duration: None,
            audio_file_size: None,
            transcription_started: None,
            transcription_duration: None,
            transcript_length: None,
        }
    }

    fn to_metrics(&self, success: bool, error_message: Option<String>) -> CycleMetrics {
        CycleMetrics {
            consult_id: self.consult_id.to_string(),
            started_at: self.started_at_unix,
            recording_duration_ms: self
                .recording_duration
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            audio_file_size_bytes: self.audio_file_size.unwrap_or(0),
            transcription_duration_ms: self
                .transcription_duration
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            transcript_length_chars: self.transcript_length.unwrap_or(0) as u64,
            total_cycle_ms: self.started_at.elapsed().as_millis() as u64,
            success,
            error_message,
        }
    }
}

/// Collects and stores metrics for consultation cycles
pub struct MetricsCollector {
    /// History of completed cycles (newest first)
    history: VecDeque<CycleMetrics>,
    /// History of errors (newest first)
    errors: VecDeque<ErrorRecord>,
    /// Currently in-progress cycle, if any
    current_cycle: Option<CycleInProgress>,
    /// Note generation aggregates
    note_generation: NoteGenerationStats,
    /// Total cycles ever attempted
    total_cycles: u64,
    /// Total successful cycles
    successful_cycles: u64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_CYCLE_HISTORY),
            errors: VecDeque::with_capacity(MAX_ERROR_HISTORY),
            current_cycle: None,
            note_generation: NoteGenerationStats::default(),
            total_cycles: 0,
            successful_cycles: 0,
        }
    }

    /// Start tracking a new cycle.
    ///
    /// If a cycle is already in progress, it is marked as failed
    /// (this indicates a state machine bug).
    pub fn start_cycle(&mut self, consult_id: Uuid) {
        if let Some(old_cycle) = self.current_cycle.take() {
            tracing::warn!(
                "metrics: discarding in-progress cycle {} to start new cycle {}",
                old_cycle.consult_id,
                consult_id
            );
            let metrics =
                old_cycle.to_metrics(false, Some("Discarded: new cycle started".to_string()));
            self.add_to_history(metrics);
        }

        tracing::debug!("metrics: starting cycle {}", consult_id);
        self.current_cycle = Some(CycleInProgress::new(consult_id));
        self.total_cycles += 1;
    }

    /// Mark that recording has started for the current cycle
    pub fn recording_started(&mut self) {
        if let Some(ref mut cycle) = self.current_cycle {
            cycle.recording_started = Some(Instant::now());
        }
    }

    /// Mark that recording has stopped, with the resulting file size
    pub fn recording_stopped(&mut self, file_size_bytes: u64) {
        if let Some(ref mut cycle) = self.current_cycle {
            if let Some(started) = cycle.recording_started {
                cycle.recording_duration = Some(started.elapsed());
            }
            cycle.audio_file_size = Some(file_size_bytes);
            tracing::info!(
                "metrics: recording stopped for cycle {} - duration {:?}, size {} bytes",
                cycle.consult_id,
                cycle.recording_duration,
                file_size_bytes
            );
        }
    }

    /// Mark that transcription has started
    pub fn transcription_started(&mut self) {
        if let Some(ref mut cycle) = self.current_cycle {
            cycle.transcription_started = Some(Instant::now());
        }
    }

    /// Mark that transcription has completed successfully
    pub fn transcription_completed(&mut self, transcript_len: usize) {
        if let Some(ref mut cycle) = self.current_cycle {
            if let Some(started) = cycle.transcription_started {
                cycle.transcription_duration = Some(started.elapsed());
            }
            cycle.transcript_length = Some(transcript_len);
            tracing::info!(
                "metrics: transcription completed for cycle {} - duration {:?}, {} chars",
                cycle.consult_id,
                cycle.transcription_duration,
                transcript_len
            );
        }
    }

    /// Mark the current cycle as successfully completed
    pub fn cycle_completed(&mut self) {
        if let Some(cycle) = self.current_cycle.take() {
            let metrics = cycle.to_metrics(true, None);
            tracing::info!(
                "metrics: cycle {} completed - total {}ms (record {}ms + transcribe {}ms)",
                metrics.consult_id,
                metrics.total_cycle_ms,
                metrics.recording_duration_ms,
                metrics.transcription_duration_ms
            );
            self.add_to_history(metrics);
            self.successful_cycles += 1;
        }
    }

    /// Mark the current cycle as failed with an error message
    pub fn cycle_failed(&mut self, error: String) {
        let consult_id = self.current_cycle.as_ref().map(|c| c.consult_id.to_string());

        if let Some(cycle) = self.current_cycle.take() {
            let metrics = cycle.to_metrics(false, Some(error.clone()));
            tracing::warn!(
                "metrics: cycle {} failed after {}ms - {}",
                metrics.consult_id,
                metrics.total_cycle_ms,
                error
            );
            self.add_to_history(metrics);
        }

        self.record_error("cycle".to_string(), error, consult_id);
    }

    /// Cancel the current cycle without recording metrics
    pub fn cycle_cancelled(&mut self) {
        if let Some(cycle) = self.current_cycle.take() {
            tracing::debug!("metrics: cycle {} cancelled", cycle.consult_id);
            // Cancelled cycles aren't counted
            self.total_cycles = self.total_cycles.saturating_sub(1);
        }
    }

    /// Record a completed note-generation call.
    pub fn note_generation_completed(&mut self, duration: Duration, note_chars: usize) {
        self.note_generation.attempts += 1;
        self.note_generation.successes += 1;
        let ms = duration.as_millis() as u64;
        self.note_generation.total_duration_ms += ms;
        self.note_generation.last_duration_ms = ms;
        self.note_generation.last_note_chars = note_chars as u64;
        tracing::info!(duration_ms = ms, note_chars, "metrics: note generated");
    }

    /// Record a failed note-generation call.
    pub fn note_generation_failed(&mut self, error: String, consult_id: Option<String>) {
        self.note_generation.attempts += 1;
        self.record_error("notegen".to_string(), error, consult_id);
    }

    /// Record an error (not necessarily tied to a cycle)
    pub fn record_error(&mut self, error_type: String, message: String, consult_id: Option<String>) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let error = ErrorRecord {
            timestamp: now,
            error_type,
            message,
            consult_id,
        };

        tracing::debug!("metrics: recording error - {:?}", error);

        self.errors.push_front(error);
        while self.errors.len() > MAX_ERROR_HISTORY {
            self.errors.pop_back();
        }
    }

    /// Get summary statistics
    pub fn get_summary(&self) -> MetricsSummary {
        let successful: Vec<_> = self.history.iter().filter(|c| c.success).collect();
        let count = successful.len() as u64;

        let (avg_recording, avg_transcription, avg_total) = if count > 0 {
            let sum_recording: u64 = successful.iter().map(|c| c.recording_duration_ms).sum();
            let sum_transcription: u64 =
                successful.iter().map(|c| c.transcription_duration_ms).sum();
            let sum_total: u64 = successful.iter().map(|c| c.total_cycle_ms).sum();
            (
                sum_recording / count,
                sum_transcription / count,
                sum_total / count,
            )
        } else {
            (0, 0, 0)
        };

        MetricsSummary {
            total_cycles: self.total_cycles,
            successful_cycles: self.successful_cycles,
            failed_cycles: self.total_cycles.saturating_sub(self.successful_cycles),
            avg_recording_duration_ms: avg_recording,
            avg_transcription_duration_ms: avg_transcription,
            avg_total_cycle_ms: avg_total,
            note_generation: self.note_generation.clone(),
            last_error: self.errors.front().cloned(),
        }
    }

    /// Get the cycle history (newest first)
    pub fn get_history(&self) -> Vec<CycleMetrics> {
        self.history.iter().cloned().collect()
    }

    /// Get the error history (newest first)
    pub fn get_errors(&self) -> Vec<ErrorRecord> {
        self.errors.iter().cloned().collect()
    }

    /// Check if there's an active cycle for the given id
    pub fn is_active_cycle(&self, consult_id: Uuid) -> bool {
        self.current_cycle
            .as_ref()
            .map(|c| c.consult_id == consult_id)
            .unwrap_or(false)
    }

    fn add_to_history(&mut self, metrics: CycleMetrics) {
        self.history.push_front(metrics);
        while self.history.len() > MAX_CYCLE_HISTORY {
            self.history.pop_back();
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_collector_is_empty() {
        let collector = MetricsCollector::new();
        let summary = collector.get_summary();

        assert_eq!(summary.total_cycles, 0);
        assert_eq!(summary.successful_cycles, 0);
        assert_eq!(summary.failed_cycles, 0);
        assert_eq!(summary.note_generation.attempts, 0);
        assert!(collector.get_history().is_empty());
        assert!(collector.get_errors().is_empty());
    }

    #[test]
    fn successful_cycle_tracking() {
        let mut collector = MetricsCollector::new();
        let consult_id = Uuid::new_v4();

        collector.start_cycle(consult_id);
        collector.recording_started();
        std::thread::sleep(std::time::Duration::from_millis(10));
        collector.recording_stopped(1024);
        collector.transcription_started();
        std::thread::sleep(std::time::Duration::from_millis(10));
        collector.transcription_completed(50);
        collector.cycle_completed();

        let summary = collector.get_summary();
        assert_eq!(summary.total_cycles, 1);
        assert_eq!(summary.successful_cycles, 1);
        assert_eq!(summary.failed_cycles, 0);

        let history = collector.get_history();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].audio_file_size_bytes, 1024);
        assert_eq!(history[0].transcript_length_chars, 50);
        assert!(history[0].recording_duration_ms >= 10);
        assert!(history[0].transcription_duration_ms >= 10);
    }

    #[test]
    fn failed_cycle_tracking() {
        let mut collector = MetricsCollector::new();
        let consult_id = Uuid::new_v4();

        collector.start_cycle(consult_id);
        collector.recording_started();
        collector.recording_stopped(512);
        collector.cycle_failed("Network error".to_string());

        let summary = collector.get_summary();
        assert_eq!(summary.total_cycles, 1);
        assert_eq!(summary.successful_cycles, 0);
        assert_eq!(summary.failed_cycles, 1);
        assert!(summary.last_error.is_some());
        assert_eq!(summary.last_error.unwrap().message, "Network error");

        let history = collector.get_history();
        assert!(!history[0].success);
        assert_eq!(history[0].error_message, Some("Network error".to_string()));
    }

    #[test]
    fn cancelled_cycle_not_counted() {
        let mut collector = MetricsCollector::new();
        let consult_id = Uuid::new_v4();

        collector.start_cycle(consult_id);
        collector.recording_started();
        collector.cycle_cancelled();

        let summary = collector.get_summary();
        assert_eq!(summary.total_cycles, 0);
        assert!(collector.get_history().is_empty());
    }

    #[test]
    fn note_generation_aggregates() {
        let mut collector = MetricsCollector::new();

        collector.note_generation_completed(Duration::from_millis(400), 1200);
        collector.note_generation_completed(Duration::from_millis(600), 900);
        collector.note_generation_failed("API error (500)".to_string(), None);

        let stats = collector.get_summary().note_generation;
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.avg_duration_ms(), 500);
        assert_eq!(stats.last_note_chars, 900);

        let errors = collector.get_errors();
        assert_eq!(errors[0].error_type, "notegen");
    }

    #[test]
    fn history_limit() {
        let mut collector = MetricsCollector::new();

        for i in 0..(MAX_CYCLE_HISTORY + 10) {
            let consult_id = Uuid::new_v4();
            collector.start_cycle(consult_id);
            collector.recording_stopped(i as u64);
            collector.transcription_completed(i);
            collector.cycle_completed();
        }

        let history = collector.get_history();
        assert_eq!(history.len(), MAX_CYCLE_HISTORY);

        // Newest first (highest file size)
        assert!(
            history[0].audio_file_size_bytes > history[MAX_CYCLE_HISTORY - 1].audio_file_size_bytes
        );
    }
}
