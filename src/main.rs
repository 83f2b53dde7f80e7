//! Decodes captured traffic from JSON lines and prints the records.

use clap::Parser;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trafficlight::capture::{CaptureError, CaptureReader};
use trafficlight::output::{Output, TextOutput};
use trafficlight::{Config, Context, Registry, Resolver};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args
{
    /// Schema files
    #[arg(short, long, required = true, num_args = 1..)]
    proto: Vec<PathBuf>,

    /// Capture file with one JSON record per line, stdin if omitted
    #[arg(short, long)]
    capture: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print each payload on a single line
    #[arg(long)]
    one_line: bool,

    /// Message mapping method identifiers to request types
    #[arg(long)]
    requests_message: Option<String>,

    /// Message mapping method identifiers to response types
    #[arg(long)]
    responses_message: Option<String>,

    /// Enum naming the methods
    #[arg(long)]
    methods_enum: Option<String>,

    /// Maximum number of nested proxy envelopes
    #[arg(long)]
    max_proxy_depth: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>>
{
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trafficlight=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(name) = args.requests_message {
        config.registry.requests_message = name;
    }
    if let Some(name) = args.responses_message {
        config.registry.responses_message = name;
    }
    if let Some(name) = args.methods_enum {
        config.registry.methods_enum = name;
    }
    if let Some(depth) = args.max_proxy_depth {
        config.resolver.max_proxy_depth = depth;
    }

    let sources = args
        .proto
        .iter()
        .map(std::fs::read_to_string)
        .collect::<Result<Vec<_>, _>>()?;
    let context = Context::parse(&sources)?;
    let registry = Registry::new(context, &config)?;
    info!(files = sources.len(), "Loaded schemas");

    let resolver = Resolver::new(&registry, &config.resolver);
    let stdout = std::io::stdout();
    let mut output = TextOutput::new(stdout.lock(), registry.context(), args.one_line);
    output.start()?;

    let input: Box<dyn BufRead> = match &args.capture {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    for capture in CaptureReader::new(input) {
        let capture = match capture {
            Ok(capture) => capture,
            Err(e @ CaptureError::Io { .. }) => return Err(e.into()),
            Err(e) => {
                error!(error = %e, "Skipping capture record");
                continue;
            }
        };

        match capture.resolve(&resolver) {
            Ok(record) => {
                let chain: Vec<_> = record.chain().collect();
                output.add_record(capture.id, capture.status, &chain)?;
            }
            Err(e) => error!(id = capture.id, error = %e, "Failed to resolve record"),
        }
    }

    Ok(())
}
