//! Process-wide pipeline counters.
//!
//! Runs, fallbacks, auditor failures, refine passes and provider retries are
//! counted where they happen; the orchestrator logs a snapshot through
//! [`Metrics::flush`] when a run finishes or aborts.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    runs_completed: AtomicU64,
    runs_aborted: AtomicU64,
    agent_fallbacks: AtomicU64,
    auditor_failures: AtomicU64,
    refine_passes: AtomicU64,
    provider_retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_completed: AtomicU64::new(0),
            runs_aborted: AtomicU64::new(0),
            agent_fallbacks: AtomicU64::new(0),
            auditor_failures: AtomicU64::new(0),
            refine_passes: AtomicU64::new(0),
            provider_retries: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_completed", "counter incremented");
    }

    pub fn inc_runs_aborted(&self) {
        self.runs_aborted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_aborted", "counter incremented");
    }

    pub fn inc_agent_fallbacks(&self) {
        self.agent_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "agent_fallbacks", "counter incremented");
    }

    pub fn inc_auditor_failures(&self) {
        self.auditor_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "auditor_failures", "counter incremented");
    }

    pub fn inc_refine_passes(&self) {
        self.refine_passes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "refine_passes", "counter incremented");
    }

    pub fn inc_provider_retries(&self) {
        self.provider_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "provider_retries", "counter incremented");
    }

    /// One `info!` line with every counter.
    pub fn flush(&self) {
        tracing::info!(
            metric = "pipeline_counters",
            runs_completed = self.runs_completed(),
            runs_aborted = self.runs_aborted(),
            agent_fallbacks = self.agent_fallbacks(),
            auditor_failures = self.auditor_failures(),
            refine_passes = self.refine_passes(),
            provider_retries = self.provider_retries(),
        );
    }

    pub fn runs_completed(&self) -> u64 {
        self.runs_completed.load(Ordering::Relaxed)
    }

    pub fn runs_aborted(&self) -> u64 {
        self.runs_aborted.load(Ordering::Relaxed)
    }

    pub fn agent_fallbacks(&self) -> u64 {
        self.agent_fallbacks.load(Ordering::Relaxed)
    }

    pub fn auditor_failures(&self) -> u64 {
        self.auditor_failures.load(Ordering::Relaxed)
    }

    pub fn refine_passes(&self) -> u64 {
        self.refine_passes.load(Ordering::Relaxed)
    }

    pub fn provider_retries(&self) -> u64 {
        self.provider_retries.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        for counter in [
            &self.runs_completed,
            &self.runs_aborted,
            &self.agent_fallbacks,
            &self.auditor_failures,
            &self.refine_passes,
            &self.provider_retries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
