use std::env;
use std::fs;

use tracing::info;

use curlstress::config::TestConfig;
use curlstress::controller::LoadTestController;
use curlstress::data_source::RowSource;
use curlstress::errors::ErrorKind;
use curlstress::stats::StatsSnapshot;
use curlstress::template::RequestTemplate;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("Required environment variables:");
    eprintln!("  TEMPLATE_FILE       - Path to a file holding one curl-style request template");
    eprintln!();
    eprintln!("Optional environment variables:");
    eprintln!("  CSV_FILE            - CSV file of variable rows for {{{{row.column}}}} placeholders");
    eprintln!("  TARGET_RPS          - Target requests per second, 0 for unbounded (default: 10)");
    eprintln!("  TEST_DURATION       - Total run duration: 30s, 10m, 2h (default: 30s)");
    eprintln!("  REQUEST_TIMEOUT     - Per-request timeout (default: 10s)");
    eprintln!("  MAX_CONCURRENCY     - Cap on in-flight requests (default: 32, must be > 0)");
    eprintln!("  SUBSTITUTION_POLICY - lenient or strict (default: lenient)");
    eprintln!("  SHUTDOWN_GRACE      - Drain window before cancelling in-flight requests (default: 5s)");
    eprintln!("  OUTPUT_FORMAT       - Summary format: text or json (default: text)");
    eprintln!("  RUST_LOG            - Log filter, e.g. info or curlstress=debug (default: info)");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn output_format_from_env() -> Result<OutputFormat, String> {
    match env::var("OUTPUT_FORMAT") {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "OUTPUT_FORMAT must be 'text' or 'json', got '{}'",
                other
            )),
        },
        Err(_) => Ok(OutputFormat::Text),
    }
}

fn print_summary(summary: &StatsSnapshot) {
    println!("\n--- RUN SUMMARY ---");
    println!("  Elapsed:        {:.1}s", summary.elapsed_seconds);
    println!("  Issued:         {}", summary.issued);
    println!("  Completed:      {}", summary.completed);
    println!(
        "  Success:        {} ({:.2}%)",
        summary.success_count, summary.success_rate
    );
    println!("  Effective RPS:  {:.1}", summary.effective_rps);

    if !summary.status_codes.is_empty() {
        println!("  Status codes:");
        for (code, count) in &summary.status_codes {
            println!("    {}: {}", code, count);
        }
    }

    if summary.failure_count() > 0 {
        println!("  Failures:");
        for kind in ErrorKind::all() {
            if let Some(count) = summary.failure_by_kind.get(kind.label()) {
                println!("    {} ({}): {}", kind.label(), kind.description(), count);
            }
        }
    }

    if summary.missing_variable_warnings > 0 {
        println!(
            "  Missing variable warnings: {}",
            summary.missing_variable_warnings
        );
    }

    if let Some(ref latency) = summary.latency {
        println!("  Latency: {}", latency.format());
    }
    println!("--- END OF RUN SUMMARY ---");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load and validate engine configuration from environment variables
    let config = match TestConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    let output_format = match output_format_from_env() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    let template_path = match env::var("TEMPLATE_FILE") {
        Ok(path) => path,
        Err(_) => {
            eprintln!("Configuration error: TEMPLATE_FILE must be set\n");
            print_config_help();
            std::process::exit(1);
        }
    };

    let raw_template = match fs::read_to_string(&template_path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Failed to read template file '{}': {}", template_path, e);
            std::process::exit(1);
        }
    };

    let template = match RequestTemplate::parse(&raw_template) {
        Ok(template) => template,
        Err(e) => {
            eprintln!("Failed to parse template file '{}': {}", template_path, e);
            std::process::exit(1);
        }
    };

    let rows = match env::var("CSV_FILE") {
        Ok(path) => match RowSource::from_path(&path) {
            Ok(rows) => rows,
            Err(e) => {
                eprintln!("Failed to load CSV file '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        Err(_) => RowSource::empty(),
    };

    let controller = match LoadTestController::new(config, template, rows) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("Failed to start load test: {}", e);
            std::process::exit(1);
        }
    };

    // First Ctrl-C requests a graceful stop; the run then drains within
    // its grace window and still prints the summary.
    let interrupt_handle = controller.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping run");
            interrupt_handle.stop();
        }
    });

    let summary = match controller.run().await {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Load test failed: {}", e);
            std::process::exit(1);
        }
    };

    match output_format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}
