//! Performance metrics and statistics tracking for the attrition pipeline.

use crate::error::PipelineError;
use crate::pipeline::PredictionTrace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

const STAGES: [&str; 3] = ["preprocess", "network", "hybrid"];

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Total requests that produced a verdict
    pub predictions: AtomicU64,
    /// Verdicts of "likely to leave"
    pub leave_verdicts: AtomicU64,
    /// Total requests that failed
    pub failures: AtomicU64,
    /// Failures by error kind
    failures_by_kind: RwLock<HashMap<String, u64>>,
    /// End-to-end processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Per-stage times (in microseconds)
    stage_times: RwLock<HashMap<&'static str, Vec<u64>>>,
    /// Leave-probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
    /// Predictions where the network's side of 0.5 matched the final label
    stack_agreements: AtomicU64,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            predictions: AtomicU64::new(0),
            leave_verdicts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            failures_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            stage_times: RwLock::new(HashMap::new()),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
            stack_agreements: AtomicU64::new(0),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, processing_time: Duration, trace: &PredictionTrace) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if trace.verdict.is_leave() {
            self.leave_verdicts.fetch_add(1, Ordering::Relaxed);
        }

        push_sample(&self.processing_times, processing_time, 10000);

        if let Ok(mut stages) = self.stage_times.write() {
            let timings = [
                trace.timings.preprocess,
                trace.timings.network,
                trace.timings.classifier,
            ];
            for (stage, duration) in STAGES.iter().zip(timings) {
                let times = stages.entry(*stage).or_insert_with(Vec::new);
                times.push(duration.as_micros() as u64);
                // Keep only last 1000 per stage
                if times.len() > 1000 {
                    times.drain(0..500);
                }
            }
        }

        if let Some(probability) = trace.classification.probability {
            let bucket = (probability * 10.0).clamp(0.0, 9.0) as usize;
            if let Ok(mut buckets) = self.probability_buckets.write() {
                buckets[bucket] += 1;
            }
        }

        let network_says_leave = trace.network_score >= 0.5;
        if network_says_leave == trace.verdict.is_leave() {
            self.stack_agreements.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed request
    pub fn record_failure(&self, error: &PipelineError) {
        self.record_failure_kind(error.kind());
    }

    /// Record a failure that never reached the pipeline (e.g. bad payload)
    pub fn record_failure_kind(&self, kind: &str) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut by_kind) = self.failures_by_kind.write() {
            *by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        match self.processing_times.read() {
            Ok(times) => ProcessingStats::from_samples(&times),
            Err(_) => ProcessingStats::default(),
        }
    }

    /// Get per-stage statistics
    pub fn get_stage_stats(&self) -> HashMap<String, ProcessingStats> {
        let Ok(stages) = self.stage_times.read() else {
            return HashMap::new();
        };
        stages
            .iter()
            .filter(|(_, times)| !times.is_empty())
            .map(|(stage, times)| (stage.to_string(), ProcessingStats::from_samples(times)))
            .collect()
    }

    /// Share of predictions where network and hybrid model agree
    pub fn get_stack_agreement(&self) -> f64 {
        let predictions = self.predictions.load(Ordering::Relaxed);
        if predictions == 0 {
            return 0.0;
        }
        self.stack_agreements.load(Ordering::Relaxed) as f64 / predictions as f64
    }

    /// Get current throughput (requests per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let handled =
            self.predictions.load(Ordering::Relaxed) + self.failures.load(Ordering::Relaxed);
        if elapsed > 0.0 {
            handled as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get leave-probability distribution
    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|buckets| *buckets)
            .unwrap_or([0; 10])
    }

    /// Get failures by error kind
    pub fn get_failures_by_kind(&self) -> HashMap<String, u64> {
        self.failures_by_kind
            .read()
            .map(|by_kind| by_kind.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let leaves = self.leave_verdicts.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let leave_rate = if predictions > 0 {
            (leaves as f64 / predictions as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let agreement = self.get_stack_agreement();
        let failures_by_kind = self.get_failures_by_kind();
        let distribution = self.get_probability_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║          ATTRITION INFERENCE PIPELINE - METRICS SUMMARY      ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions:        {:>8}  │  Throughput: {:>6.1} req/s    ║",
            predictions, throughput
        );
        info!(
            "║ Leave Verdicts:     {:>8}  │  Leave Rate: {:>6.1}%         ║",
            leaves, leave_rate
        );
        info!("║ Failed Requests:    {:>8}                                  ║", failures);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!(
            "║ Stack Agreement: {:>5.1}% (network side matches verdict)      ║",
            agreement * 100.0
        );
        if !failures_by_kind.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Failures by Kind:                                            ║");
            for (kind, count) in &failures_by_kind {
                let pct = (*count as f64 / failures.max(1) as f64) * 100.0;
                info!("║   {:18}: {:>6} ({:>5.1}%)                        ║", kind, count, pct);
            }
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Leave Probability Distribution:                              ║");
        let total: u64 = distribution.iter().sum();
        for (i, &count) in distribution.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let stage_stats = self.get_stage_stats();
        if !stage_stats.is_empty() {
            info!("Stage Times (μs):");
            for stage in STAGES {
                if let Some(stats) = stage_stats.get(stage) {
                    info!(
                        "  {}: mean={} p50={} p99={} (calls={})",
                        stage, stats.mean_us, stats.p50_us, stats.p99_us, stats.count
                    );
                }
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_sample(samples: &RwLock<Vec<u64>>, duration: Duration, cap: usize) {
    if let Ok(mut times) = samples.write() {
        times.push(duration.as_micros() as u64);
        // Keep only the most recent half once the window is full
        if times.len() > cap {
            times.drain(0..cap / 2);
        }
    }
}

/// Processing time statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl ProcessingStats {
    fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        Self {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }
}

/// Real-time metrics reporter that prints periodic summaries
pub struct MetricsReporter {
    metrics: std::sync::Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: std::sync::Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Classification;
    use crate::pipeline::StageTimings;
    use crate::types::vector::{AugmentedVector, FeatureVector};
    use crate::types::verdict::{Attrition, Verdict};

    fn trace(network_score: f32, outcome: Attrition, probability: f64) -> PredictionTrace {
        let features = FeatureVector::new(vec![0.0, 1.0]);
        let augmented = AugmentedVector::stack(&features, network_score);
        PredictionTrace {
            defaulted_fields: Vec::new(),
            features,
            network_score,
            augmented,
            classification: Classification {
                label: outcome.label(),
                probability: Some(probability),
            },
            verdict: Verdict::new(outcome, Some(probability)),
            timings: StageTimings {
                preprocess: Duration::from_micros(20),
                network: Duration::from_micros(40),
                classifier: Duration::from_micros(60),
            },
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_prediction(Duration::from_micros(100), &trace(0.8, Attrition::Leave, 0.9));
        metrics.record_prediction(Duration::from_micros(200), &trace(0.3, Attrition::Stay, 0.1));
        metrics.record_failure(&PipelineError::coercion("Age", "abc", "not a number"));
        metrics.record_failure_kind("malformed_request");

        assert_eq!(metrics.predictions.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.leave_verdicts.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.failures.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.get_failures_by_kind().get("coercion"), Some(&1));

        let distribution = metrics.get_probability_distribution();
        assert_eq!(distribution[9], 1);
        assert_eq!(distribution[1], 1);

        let stages = metrics.get_stage_stats();
        assert_eq!(stages["network"].mean_us, 40);
        assert_eq!(stages["hybrid"].count, 2);
    }

    #[test]
    fn test_stack_agreement() {
        let metrics = PipelineMetrics::new();

        metrics.record_prediction(Duration::from_micros(10), &trace(0.8, Attrition::Leave, 0.9));
        metrics.record_prediction(Duration::from_micros(10), &trace(0.2, Attrition::Stay, 0.2));
        metrics.record_prediction(Duration::from_micros(10), &trace(0.7, Attrition::Stay, 0.4));
        metrics.record_prediction(Duration::from_micros(10), &trace(0.1, Attrition::Stay, 0.1));

        assert!((metrics.get_stack_agreement() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_processing_stats() {
        let samples: Vec<u64> = (1..=100).collect();
        let stats = ProcessingStats::from_samples(&samples);

        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.max_us, 100);
        assert_eq!(ProcessingStats::from_samples(&[]), ProcessingStats::default());
    }
}
