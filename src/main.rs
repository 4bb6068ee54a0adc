//! Attrition Pipeline - Main Entry Point
//!
//! Consumes prediction requests from NATS one at a time, runs the stacked
//! inference pipeline, and publishes a verdict (or failure) for each.

use anyhow::Result;
use attrition_pipeline::{
    config::AppConfig,
    consumer::{decode_request, RequestConsumer},
    metrics::{MetricsReporter, PipelineMetrics},
    pipeline::InferencePipeline,
    producer::VerdictProducer,
    telemetry,
    types::verdict::{FailureEvent, PredictionResponse, VerdictEvent, MALFORMED_REQUEST},
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    telemetry::init(&config.logging, "attrition_pipeline")?;

    info!("Starting Attrition Pipeline");
    info!(
        "Artifacts: {} ({:?}), {} defaults, {} bounds",
        config.artifacts.dir,
        config.artifacts.format,
        config.defaults.len(),
        config.bounds.len()
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Load the three read-only resources once
    let pipeline = InferencePipeline::from_config(&config)?;
    info!(
        "Inference pipeline expects fields: {:?}",
        pipeline.expected_fields().collect::<Vec<_>>()
    );

    // Connect to NATS
    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject);
    let producer = VerdictProducer::new(client.clone(), &config.nats.verdict_subject);

    info!("Listening on subject: {}", consumer.subject());
    info!("Publishing verdicts to: {}", producer.subject());

    // Start metrics reporter
    if config.metrics.report_interval_secs > 0 {
        let metrics_clone = metrics.clone();
        let interval = config.metrics.report_interval_secs;
        tokio::spawn(async move {
            let reporter = MetricsReporter::new(metrics_clone, interval);
            reporter.start().await;
        });
    }

    // One request at a time: a verdict is published before the next message is read
    let mut subscription = consumer.subscribe().await?;
    let mut processed: u64 = 0;

    while let Some(message) = subscription.next().await {
        let start_time = Instant::now();
        let reply = message.reply.clone();

        let response = match decode_request(&message) {
            Ok(request) => match pipeline.trace(&request.record) {
                Ok(trace) => {
                    let processing_time = start_time.elapsed();
                    metrics.record_prediction(processing_time, &trace);

                    info!(
                        request_id = %request.request_id,
                        label = trace.verdict.label(),
                        probability = ?trace.verdict.probability,
                        network_score = trace.network_score,
                        defaulted = trace.defaulted_fields.len(),
                        processing_time_us = processing_time.as_micros(),
                        "Verdict produced"
                    );

                    PredictionResponse::Ok(VerdictEvent::new(
                        request.request_id,
                        &trace.verdict,
                        trace.network_score,
                        trace.defaulted_fields,
                    ))
                }
                Err(e) => {
                    metrics.record_failure(&e);
                    if e.is_system_anomaly() {
                        error!(
                            request_id = %request.request_id,
                            error_kind = e.kind(),
                            error = %e,
                            "Model configuration anomaly"
                        );
                    } else {
                        warn!(
                            request_id = %request.request_id,
                            error_kind = e.kind(),
                            error = %e,
                            "Request rejected"
                        );
                    }
                    PredictionResponse::Error(FailureEvent::from_error(Some(request.request_id), &e))
                }
            },
            Err(e) => {
                metrics.record_failure_kind(MALFORMED_REQUEST);
                warn!(error = %e, "Failed to deserialize prediction request");
                PredictionResponse::Error(FailureEvent::malformed(format!(
                    "Request could not be read: {}",
                    e
                )))
            }
        };

        if let Err(e) = producer.publish(&response, reply).await {
            error!(error = %e, "Failed to publish response");
        }

        processed += 1;
        if processed % 100 == 0 {
            let processing_stats = metrics.get_processing_stats();
            info!(
                processed = processed,
                throughput = format!("{:.1} req/s", metrics.get_throughput()),
                avg_latency_us = processing_stats.mean_us,
                "Processing milestone"
            );
        } else {
            debug!(processed = processed, "Request handled");
        }
    }

    // Print final summary
    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}
