//! Bounded in-memory performance history: evaluation spans, parameter
//! update counts, cache hit/miss tallies and peak memory.
//!
//! Duration percentiles are served from an `hdrhistogram::Histogram`
//! rather than by sorting a `Vec<Duration>` on every query.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::types::NodeId;

/// Evaluation-span history is capped at this many entries; older spans
/// are dropped as new ones complete.
const MAX_HISTORY: usize = 1000;
/// Per-node timing history is kept separately and capped the same way —
/// these spans must never feed `total_evaluations`/`history`, which count
/// whole `evaluate()` calls, not individual node visits.
const MAX_NODE_HISTORY: usize = 1000;
/// Window used by `trend()`, clamped into `TREND_WINDOW_RANGE`.
const TREND_WINDOW: usize = 64;
const TREND_WINDOW_RANGE: std::ops::RangeInclusive<usize> = 10..=1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone)]
pub struct BottleneckReport {
    pub count: usize,
    pub average: Duration,
    pub evaluations: Vec<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_evaluations: u64,
    pub total_evaluation_time: Duration,
    pub average_evaluation_time: Duration,
    pub average_nodes_per_evaluation: f64,
    pub parameter_updates: u64,
    pub peak_memory_bytes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

struct EvaluationRecord {
    duration: Duration,
    nodes_touched: usize,
}

struct Inner {
    history: VecDeque<EvaluationRecord>,
    histogram: Histogram<u64>,
    open_spans: HashMap<u64, Instant>,
    next_span_id: u64,
    total_evaluations: u64,
    total_evaluation_time: Duration,
    total_nodes_touched: u64,
    /// Per-node visit timings, tracked separately from `history` above so a
    /// 100-node `evaluate()` call doesn't look like 101 evaluations.
    node_durations: VecDeque<Duration>,
    open_node_spans: HashMap<u64, Instant>,
    next_node_span_id: u64,
    parameter_updates: HashMap<(NodeId, String), u64>,
    total_parameter_updates: u64,
    peak_memory_bytes: u64,
    cache_hits: u64,
    cache_misses: u64,
    structural_events: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(MAX_HISTORY),
            // 1 microsecond to 60 seconds, 3 significant figures.
            histogram: Histogram::new_with_bounds(1, 60_000_000, 3)
                .expect("static histogram bounds are valid"),
            open_spans: HashMap::new(),
            next_span_id: 0,
            total_evaluations: 0,
            total_evaluation_time: Duration::ZERO,
            total_nodes_touched: 0,
            node_durations: VecDeque::with_capacity(MAX_NODE_HISTORY),
            open_node_spans: HashMap::new(),
            next_node_span_id: 0,
            parameter_updates: HashMap::new(),
            total_parameter_updates: 0,
            peak_memory_bytes: 0,
            cache_hits: 0,
            cache_misses: 0,
            structural_events: 0,
        }
    }
}

/// Thread-safe recorder of evaluation timings and counters. All recording
/// paths degrade to a logged no-op on malformed input rather than panic.
pub struct PerformanceMonitor {
    inner: Mutex<Inner>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::new()) }
    }

    /// Starts a timing span, returning a handle for the matching `complete`.
    pub fn begin(&self) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_span_id;
        inner.next_span_id += 1;
        inner.open_spans.insert(id, Instant::now());
        id
    }

    /// Completes a span started by `begin`. A `span_id` with no matching
    /// `begin` is recorded with a zero duration and a warning, never an error.
    pub fn complete(&self, span_id: u64, nodes_touched: usize) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let duration = match inner.open_spans.remove(&span_id) {
            Some(start) => start.elapsed(),
            None => {
                log::warn!("PerformanceMonitor::complete({span_id}) had no matching begin()");
                Duration::ZERO
            }
        };

        let micros = duration.as_micros().clamp(1, 60_000_000) as u64;
        if let Err(e) = inner.histogram.record(micros) {
            log::warn!("failed to record evaluation duration: {e}");
        }

        if inner.history.len() >= MAX_HISTORY {
            inner.history.pop_front();
        }
        inner.history.push_back(EvaluationRecord { duration, nodes_touched });
        inner.total_evaluations += 1;
        inner.total_evaluation_time += duration;
        inner.total_nodes_touched += nodes_touched as u64;
        Ok(())
    }

    /// Starts a timing span for a single node visit within an `evaluate()`
    /// call. Kept on its own id namespace and history so per-node timings
    /// never land in the whole-evaluation `history`/`total_evaluations`.
    pub fn begin_node(&self) -> u64 {
        let mut inner = self.inner.lock();
        let id = inner.next_node_span_id;
        inner.next_node_span_id += 1;
        inner.open_node_spans.insert(id, Instant::now());
        id
    }

    /// Completes a span started by `begin_node`. A `span_id` with no
    /// matching `begin_node` is recorded with a zero duration and a
    /// warning, never an error — same degraded-recording contract as
    /// `complete`.
    pub fn complete_node(&self, span_id: u64) {
        let mut inner = self.inner.lock();
        let duration = match inner.open_node_spans.remove(&span_id) {
            Some(start) => start.elapsed(),
            None => {
                log::warn!("PerformanceMonitor::complete_node({span_id}) had no matching begin_node()");
                Duration::ZERO
            }
        };
        if inner.node_durations.len() >= MAX_NODE_HISTORY {
            inner.node_durations.pop_front();
        }
        inner.node_durations.push_back(duration);
    }

    /// Number of per-node timings currently retained (bounded by
    /// `MAX_NODE_HISTORY`). Exposed for tests; not part of `PerformanceMetrics`.
    pub fn node_duration_count(&self) -> usize {
        self.inner.lock().node_durations.len()
    }

    /// Records a structural graph mutation (currently: `add_node`) for
    /// bookkeeping purposes. Never fails.
    pub fn record_structural_event(&self) {
        let mut inner = self.inner.lock();
        inner.structural_events += 1;
    }

    /// Number of structural events recorded so far. Exposed for tests; not
    /// part of `PerformanceMetrics`.
    pub fn structural_event_count(&self) -> u64 {
        self.inner.lock().structural_events
    }

    pub fn record_parameter_update(&self, node: &NodeId, parameter: &str) -> EngineResult<()> {
        if parameter.trim().is_empty() {
            return Err(EngineError::invalid_argument("parameter name must not be empty"));
        }
        let mut inner = self.inner.lock();
        *inner.parameter_updates.entry((node.clone(), parameter.to_string())).or_insert(0) += 1;
        inner.total_parameter_updates += 1;
        Ok(())
    }

    pub fn record_cache_access(&self, hit: bool) {
        let mut inner = self.inner.lock();
        if hit {
            inner.cache_hits += 1;
        } else {
            inner.cache_misses += 1;
        }
    }

    pub fn report_memory(&self, bytes_in_use: u64) {
        let mut inner = self.inner.lock();
        if bytes_in_use > inner.peak_memory_bytes {
            inner.peak_memory_bytes = bytes_in_use;
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        *inner = Inner::new();
    }

    /// Direction of the slope over the last `N` evaluation durations,
    /// `N = 64` clamped to `[10, 1000]`. Fewer than 10 samples is `Stable`.
    pub fn trend(&self) -> Trend {
        let inner = self.inner.lock();
        let window = TREND_WINDOW.clamp(*TREND_WINDOW_RANGE.start(), *TREND_WINDOW_RANGE.end());
        let samples: Vec<f64> = inner
            .history
            .iter()
            .rev()
            .take(window)
            .map(|r| r.duration.as_secs_f64())
            .collect();
        if samples.len() < *TREND_WINDOW_RANGE.start() {
            return Trend::Stable;
        }
        // samples[0] is most recent; restore chronological order for the slope.
        let ordered: Vec<f64> = samples.into_iter().rev().collect();
        let slope = linear_slope(&ordered);
        let mean = ordered.iter().sum::<f64>() / ordered.len() as f64;
        if mean <= 0.0 {
            return Trend::Stable;
        }
        let relative = slope / mean;
        if relative > 0.01 {
            Trend::Degrading
        } else if relative < -0.01 {
            Trend::Improving
        } else {
            Trend::Stable
        }
    }

    pub fn bottlenecks(&self, threshold: Duration) -> BottleneckReport {
        let inner = self.inner.lock();
        let evaluations: Vec<Duration> =
            inner.history.iter().filter(|r| r.duration >= threshold).map(|r| r.duration).collect();
        let average = if evaluations.is_empty() {
            Duration::ZERO
        } else {
            evaluations.iter().sum::<Duration>() / evaluations.len() as u32
        };
        BottleneckReport { count: evaluations.len(), average, evaluations }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        let inner = self.inner.lock();
        let total_accesses = inner.cache_hits + inner.cache_misses;
        PerformanceMetrics {
            total_evaluations: inner.total_evaluations,
            total_evaluation_time: inner.total_evaluation_time,
            average_evaluation_time: if inner.total_evaluations == 0 {
                Duration::ZERO
            } else {
                inner.total_evaluation_time / inner.total_evaluations as u32
            },
            average_nodes_per_evaluation: if inner.total_evaluations == 0 {
                0.0
            } else {
                inner.total_nodes_touched as f64 / inner.total_evaluations as f64
            },
            parameter_updates: inner.total_parameter_updates,
            peak_memory_bytes: inner.peak_memory_bytes,
            cache_hits: inner.cache_hits,
            cache_misses: inner.cache_misses,
            cache_hit_rate: if total_accesses == 0 {
                0.0
            } else {
                inner.cache_hits as f64 / total_accesses as f64
            },
        }
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Least-squares slope of `y` over evenly spaced integer `x = 0..len`.
fn linear_slope(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let xi = i as f64;
        num += (xi - x_mean) * (yi - y_mean);
        den += (xi - x_mean).powi(2);
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
