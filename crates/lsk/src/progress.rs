// AI
//! 📊 progress.rs: "Are we there yet?" Every pipeline, every time, forever.
//!
//! 🚀 Every task in the pipeline bumps the same set of atomic counters: the fetcher,
//! each worker, the updater. Nobody takes a lock to say "I did a thing".
//! When the supervisor stops, it freezes the counters into a [`PipelineReport`],
//! and the report knows how to sit down in a table so comfy it has lumbar support.
//!
//! ⚠️  Warning: Watching these numbers will not make them go faster.
//! Neither will refreshing them. We've tried. Science says no.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use serde::Serialize;

/// 🔢 Formats a number with commas for the 3 people in the audience who like readability.
/// "1000000" → "1,000,000", you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    // -- 🧵 pre-allocate like we know what we're doing (we do, we read the book)
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ Formats a Duration into MM:SS or HH:MM:SS.
/// If it shows HH:MM:SS, you should probably call your mom. It's been a while.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📡 Live counters, shared behind an `Arc` by every pipeline task.
///
/// `Relaxed` everywhere: these are tallies, not synchronization. The join barrier
/// in the supervisor is what makes the final snapshot complete.
#[derive(Debug)]
pub struct PipelineProgress {
    started: Instant,
    ticks: AtomicU64,
    discovered: AtomicU64,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    discovery_failures: AtomicU64,
    computed: AtomicU64,
    compute_failures: AtomicU64,
    persisted: AtomicU64,
    persist_failures: AtomicU64,
    worker_panics: AtomicU64,
}

impl Default for PipelineProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineProgress {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ticks: AtomicU64::new(0),
            discovered: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            discovery_failures: AtomicU64::new(0),
            computed: AtomicU64::new(0),
            compute_failures: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            worker_panics: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discovered(&self, n: usize) {
        self.discovered.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_discovery_failure(&self) {
        self.discovery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_computed(&self) {
        self.computed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compute_failure(&self) {
        self.compute_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_worker_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// 📸 Freeze the counters. Cheap, lock-free, and only exact once everyone has stopped.
    pub fn snapshot(&self) -> PipelineReport {
        PipelineReport {
            elapsed: self.started.elapsed(),
            ticks: self.ticks.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discovery_failures: self.discovery_failures.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
        }
    }
}

/// 🧾 What the pipeline did, frozen at the moment it stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub elapsed: Duration,
    pub ticks: u64,
    pub discovered: u64,
    pub enqueued: u64,
    /// 📦 items the input queue had no room for; they come back next tick
    pub dropped: u64,
    pub discovery_failures: u64,
    /// ✅ results with a vector in them
    pub computed: u64,
    /// 💀 results carrying a [`ComputeError`](crate::compute::ComputeError)
    pub compute_failures: u64,
    pub persisted: u64,
    pub persist_failures: u64,
    pub worker_panics: u64,
}

impl PipelineReport {
    /// 🍽️ Two right-aligned columns, no borders (preset: NOTHING), because we're minimalists.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let rows = [
            ("elapsed", format_duration(self.elapsed)),
            ("ticks", format_number(self.ticks)),
            ("discovered", format_number(self.discovered)),
            ("enqueued", format_number(self.enqueued)),
            ("dropped (queue full)", format_number(self.dropped)),
            ("discovery failures", format_number(self.discovery_failures)),
            ("computed", format_number(self.computed)),
            ("compute failures", format_number(self.compute_failures)),
            ("persisted", format_number(self.persisted)),
            ("persist failures", format_number(self.persist_failures)),
            ("worker panics", format_number(self.worker_panics)),
        ];
        for (label, value) in rows {
            table.add_row(vec![
                Cell::new(label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table
    }
}
