//! Test Request Producer
//!
//! Generates synthetic employee records and publishes them to NATS for
//! pipeline testing.

use attrition_pipeline::types::record::{PredictionRequest, RawRecord};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

const JOB_ROLES: [&str; 3] = ["HR", "Research & Development", "Sales"];

/// Employee record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
    request_counter: u64,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            request_counter: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.request_counter += 1;
        format!("req_{:012}", self.request_counter)
    }

    /// Generate a settled, well-paid employee
    fn generate_stayer(&mut self) -> PredictionRequest {
        let mut record = RawRecord::new()
            .with("Age", self.rng.gen_range(32..60_i64))
            .with("DistanceFromHome", self.rng.gen_range(1..10_i64))
            .with("JobRole", self.random_choice(&JOB_ROLES))
            .with("BusinessTravel", self.random_choice(&["Rarely", "None"]));

        let income: i64 = self.rng.gen_range(6000..20000);
        // Form input often arrives as formatted text
        if self.rng.gen_bool(0.3) {
            record.insert("MonthlyIncome", format_thousands(income));
        } else {
            record.insert("MonthlyIncome", income);
        }

        self.maybe_drop_field(&mut record);
        PredictionRequest {
            request_id: self.next_id(),
            record,
        }
    }

    /// Generate a young, underpaid, frequently travelling employee
    fn generate_leaver(&mut self) -> PredictionRequest {
        let mut record = RawRecord::new()
            .with("Age", self.rng.gen_range(18..30_i64))
            .with("DistanceFromHome", self.rng.gen_range(15..30_i64))
            .with("MonthlyIncome", self.rng.gen_range(1000..3500_i64))
            .with("JobRole", self.random_choice(&["Sales", "HR"]))
            .with("BusinessTravel", "Frequently");

        self.maybe_drop_field(&mut record);
        PredictionRequest {
            request_id: self.next_id(),
            record,
        }
    }

    /// Leave a field out now and then so the default table gets exercised
    fn maybe_drop_field(&mut self, record: &mut RawRecord) {
        if self.rng.gen_bool(0.1) {
            let field = self.random_choice(&["DistanceFromHome", "BusinessTravel", "JobRole"]);
            record.remove(field);
        }
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn format_thousands(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("attrition.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
    let leave_rate: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.2);
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        leave_rate = leave_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    // Connect to NATS
    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, leave_rate, delay_ms).await;
        }
    };

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    info!("Starting to publish {} requests...", count);

    let mut stayer_count = 0;
    let mut leaver_count = 0;

    for i in 0..count {
        let request = if rng.gen_bool(leave_rate) {
            leaver_count += 1;
            generator.generate_leaver()
        } else {
            stayer_count += 1;
            generator.generate_stayer()
        };

        let payload = serde_json::to_vec(&request)?;

        client.publish(subject.to_string(), payload.into()).await?;

        if (i + 1) % 10 == 0 {
            info!(
                "Published {}/{} requests ({} stay-like, {} leave-like)",
                i + 1,
                count,
                stayer_count,
                leaver_count
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    client.flush().await?;
    info!(
        "Completed! Published {} requests ({} stay-like, {} leave-like)",
        count, stayer_count, leaver_count
    );

    Ok(())
}

async fn run_dry_mode(count: u64, leave_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let request = if rng.gen_bool(leave_rate) {
            generator.generate_leaver()
        } else {
            generator.generate_stayer()
        };

        let json = serde_json::to_string_pretty(&request)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
