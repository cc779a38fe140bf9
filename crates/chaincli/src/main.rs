use anyhow::Result;
use chaincore::INPUT_SOURCE;
use chainruntime::{RunState, Worker};
use chaintools::{hold_string, int_to_string, multiply_by, parse_int, split_strings, StringHolder};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chain")]
#[command(about = "Chain engine demo CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the example pipeline over a batch of numeric strings
    Run {
        /// Input values (repeatable), parsed as integers downstream
        #[arg(short, long)]
        input: Vec<String>,

        /// Multiplier applied on the integer branch
        #[arg(short, long, default_value_t = 3)]
        multiplier: i64,

        /// Print run events while executing
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            input,
            multiplier,
            verbose,
        } => run_pipeline(input, multiplier, verbose).await,
    }
}

/// Assembles and runs the example graph:
/// input -> split -> parse-int -> {multiply -> int-to-string, int-to-string}
/// -> hold-string, with sinks on both string producers.
async fn run_pipeline(input: Vec<String>, multiplier: i64, verbose: bool) -> Result<()> {
    let batch = if input.is_empty() {
        vec!["3".to_string(), "5".to_string(), "8".to_string()]
    } else {
        input
    };

    // One seed envelope carrying the whole batch; the generator splits it.
    let mut worker = Worker::new(&[batch]);

    let split = split_strings();
    let parse = parse_int();
    let multiply = multiply_by(multiplier);
    let to_string = int_to_string();
    let holder = hold_string();

    worker.subscribe(INPUT_SOURCE, [split.clone()]);
    worker.subscribe(split.name().to_string(), [parse.clone(), holder.clone()]);
    worker.subscribe(parse.name().to_string(), [multiply.clone(), to_string.clone()]);
    worker.subscribe(multiply.name().to_string(), [to_string.clone()]);
    worker.subscribe(to_string.name().to_string(), [holder.clone()]);

    worker.set_output::<StringHolder>(holder.name().to_string());
    worker.set_output::<String>(to_string.name().to_string());

    if verbose {
        let mut events = worker.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "event not serializable"),
                }
            }
        });
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("cancellation requested");
            signal_token.cancel();
        }
    });

    let report = worker.run(shutdown).await?;

    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  {error}");
        }
    }

    let mut values: Vec<String> = report
        .results
        .iter()
        .map(|result| match &result.value {
            serde_json::Value::String(s) => s.clone(),
            other => other
                .get("value")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        })
        .collect();
    values.sort_by_key(|v| v.parse::<i64>().unwrap_or(i64::MAX));

    println!("Results:");
    for value in &values {
        println!("  {value:?}");
    }

    if report.state == RunState::Cancelled {
        println!("(run was cancelled; results are partial)");
    }

    Ok(())
}
