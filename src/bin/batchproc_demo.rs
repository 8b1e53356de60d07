//! batchproc-demo: sums the first N integers through the batch executor
//!
//! Usage:
//!   batchproc-demo [--count N] [--batch-size N] [--scale-down N] [--config PATH] [--json]

use batchproc::batch::{BatchRange, BatchUnit, Executor, PlannerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct Options {
    count: u64,
    batch_size: Option<usize>,
    scale_down: Option<usize>,
    config: Option<PathBuf>,
    json: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            count: 2000,
            batch_size: None,
            scale_down: None,
            config: None,
            json: false,
        }
    }
}

/// Adds up its slice of the collection.
#[derive(Default)]
struct SumUnit {
    result: u64,
}

#[async_trait::async_trait]
impl BatchUnit<Vec<u64>> for SumUnit {
    type Output = u64;

    async fn compute(
        &mut self,
        range: BatchRange,
        data: &Vec<u64>,
        scope: &CancellationToken,
    ) -> anyhow::Result<()> {
        if scope.is_cancelled() {
            anyhow::bail!("cancelled before start");
        }
        self.result += data[range.as_range()].iter().sum::<u64>();
        Ok(())
    }

    fn result(&self) -> u64 {
        self.result
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(Some(opts)) => opts,
        Ok(None) => return,
        Err(msg) => {
            eprintln!("{msg}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = run(opts).await {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}

async fn run(opts: Options) -> batchproc::Result<()> {
    let mut planner = PlannerConfig::load(opts.config.as_deref())?;
    if let Some(factor) = opts.scale_down {
        planner = planner.with_scale_down(factor);
    }

    let data: Arc<Vec<u64>> = Arc::new((1..=opts.count).collect());
    let mut builder = Executor::builder("main", data.len(), data).with_planner(planner);
    if let Some(size) = opts.batch_size {
        builder = builder.with_batch_size(size);
    }
    let mut executor = builder.build(SumUnit::default)?;
    println!(
        "Created batch executor loaded with number of batches: {}",
        executor.batch_count()
    );

    println!("Batch processor execution starting");
    executor.run().await?;

    println!("Batch processor result aggregation starting");
    let total = executor.aggregate(|parts| parts.into_iter().sum::<u64>())?;

    println!("Addition of first {} integers is: {}", opts.count, total);
    println!(
        "Batch processor took {}ns for execution",
        executor.elapsed().unwrap_or_default().as_nanos()
    );

    if opts.json {
        match serde_json::to_string_pretty(&executor.stats()) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("cannot encode stats: {e}"),
        }
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<Option<Options>, String> {
    let mut opts = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--count" => opts.count = parse_value(arg, iter.next())?,
            "--batch-size" => opts.batch_size = Some(parse_value(arg, iter.next())?),
            "--scale-down" => opts.scale_down = Some(parse_value(arg, iter.next())?),
            "--config" => {
                let path = iter.next().ok_or_else(|| format!("{arg} needs a value"))?;
                opts.config = Some(PathBuf::from(path));
            }
            "--json" => opts.json = true,
            "version" | "--version" | "-V" => {
                println!("batchproc-demo {}", env!("CARGO_PKG_VERSION"));
                return Ok(None);
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return Ok(None);
            }
            other => return Err(format!("Unknown argument: {other}")),
        }
    }
    Ok(Some(opts))
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T, String> {
    let raw = value.ok_or_else(|| format!("{flag} needs a value"))?;
    raw.parse::<T>()
        .map_err(|_| format!("{flag}: invalid value {raw:?}"))
}

fn print_usage() {
    println!(
        r#"batchproc-demo: concurrent batch summation demo

USAGE:
    batchproc-demo [OPTIONS]

OPTIONS:
    --count N           Sum the integers 1..=N (default 2000)
    --batch-size N      Use a fixed batch size instead of the tier table
    --scale-down N      Divide every tier limit by N
    --config PATH       Planner config YAML file
    --json              Print run statistics as JSON
    --version           Show version information
    --help              Show this help message

ENVIRONMENT:
    BATCHPROC_CONFIG        Planner config YAML file
    BATCHPROC_SCALE_DOWN    Tier limit divisor
    BATCHPROC_MAX_BATCHES   Upper bound on batches
    RUST_LOG                Log filter (default: info)"#
    );
}
