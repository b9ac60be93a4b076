//! batch-buckets entry point.
//!
//! ## CLI Subcommands
//!
//! - `batch-buckets validate <path>` - Parse a start config and start it once
//! - `batch-buckets defaults` - Print the effective environment settings
//! - `batch-buckets demo [path]` - Run an echo executor against a config
//! - `batch-buckets help` / `version`

use std::path::PathBuf;
use std::process::ExitCode;

use async_trait::async_trait;
use serde_json::{json, Value};

use batch_buckets::config::{self as bb_config, EnvConfig};
use batch_buckets::telemetry::init_logging;
use batch_buckets::{
    BatchExecutor, BatchRequest, BatchResponse, Context, ContextConfig, ExecutorError,
};

/// Answers every task with itself, tagged with its bucket and batch number.
/// The cache value counts batches per bucket.
struct EchoExecutor;

#[async_trait]
impl BatchExecutor for EchoExecutor {
    type Task = Value;
    type Output = Value;
    type Cache = Value;

    async fn execute(
        &self,
        batch: BatchRequest<Value, Value>,
    ) -> Result<BatchResponse<Value, Value>, ExecutorError> {
        let batch_no = batch.cache.as_ref().and_then(Value::as_u64).unwrap_or(0) + 1;
        let results = batch
            .tasks
            .into_iter()
            .map(|task| json!({ "bucket": batch.bucket.as_str(), "batch": batch_no, "task": task }))
            .collect();
        Ok(BatchResponse::new(results).with_cache(json!(batch_no)))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let env = bb_config::load_env();

    match command {
        "validate" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: batch-buckets validate <path>");
                return ExitCode::FAILURE;
            };
            run_validate(PathBuf::from(path))
        }
        "defaults" => match serde_json::to_string_pretty(&env.effective_config()) {
            Ok(out) => {
                println!("{out}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to render settings: {e}");
                ExitCode::FAILURE
            }
        },
        "demo" => {
            if let Err(e) = init_logging(&env.log) {
                eprintln!("Logging disabled: {e}");
            }
            run_demo(&env, args.get(2).map(PathBuf::from)).await
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("batch-buckets {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn run_validate(path: PathBuf) -> ExitCode {
    let config: ContextConfig<Value> = match bb_config::load_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let summary = match serde_json::to_value(&config) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Failed to render config: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Starting once is the only way to validate built-in trigger configs.
    match Context::start(EchoExecutor, config) {
        Ok(ctx) => {
            ctx.stop();
            println!("{}", json!({ "valid": true, "buckets": ctx.bucket_ids(), "config": summary }));
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", json!({ "valid": false, "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

async fn run_demo(env: &EnvConfig, path: Option<PathBuf>) -> ExitCode {
    let config: Result<ContextConfig<Value>, _> = match path {
        Some(path) => bb_config::load_file(path),
        None => env.context_config(),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let ctx = match Context::start(EchoExecutor, config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let bucket_ids = ctx.bucket_ids();
    let completions: Vec<_> = (0..env.demo_tasks)
        .map(|i| {
            let bucket = &bucket_ids[i % bucket_ids.len()];
            ctx.enqueue(bucket.as_str(), json!(i))
        })
        .collect();

    let code = match ctx.fetch_all().await {
        Ok(flushed) => {
            tracing::info!(flushed, "manual flush complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Flush failed: {e}");
            ExitCode::FAILURE
        }
    };
    ctx.stop();

    for outcome in futures::future::join_all(completions).await {
        match outcome {
            Ok(result) => println!("{result}"),
            Err(e) => eprintln!("task failed: {e}"),
        }
    }
    code
}

fn print_usage() {
    println!(
        "batch-buckets {}

Usage: batch-buckets <command> [args]

Commands:
  validate <path>   Parse a TOML start config and check its triggers
  defaults          Print effective BATCH_BUCKETS_* settings
  demo [path]       Run an echo executor against a config and flush it
  help              Show this message
  version           Show version",
        env!("CARGO_PKG_VERSION")
    );
}
