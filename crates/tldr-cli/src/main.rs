use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tldr_cli::{
    check_endpoint, stream_events, OpenAiSummarizer, Overrides, ProviderKind, TldrConfig,
};
use tldr_core::{
    CancellationToken, EstimatorKind, EventBus, MockSummarizer, Pipeline, PipelineError,
    Summarizer,
};
use tracing::{info, warn};

/// Summarize long text with an LLM by chunking and tree reduction.
#[derive(Debug, Parser)]
#[command(name = "tldr", version, about)]
struct Args {
    /// Input file. Reads stdin when absent or `-`.
    input: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    /// Chunk budget in estimator units.
    #[arg(long)]
    max_chunk_units: Option<usize>,

    /// Maximum summaries merged per call.
    #[arg(long)]
    branching_factor: Option<usize>,

    /// Merge levels before falling back to concatenation.
    #[arg(long)]
    max_reduce_depth: Option<usize>,

    /// Total tries per provider call.
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Provider calls in flight at once.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Style hint forwarded to the summarizer.
    #[arg(long)]
    style: Option<String>,

    /// Whole-run deadline in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Length estimator: chars or words.
    #[arg(long)]
    estimator: Option<EstimatorKind>,

    /// Print the full result as JSON.
    #[arg(long)]
    json: bool,

    /// Stream pipeline events to stderr as JSON lines.
    #[arg(long)]
    events: bool,

    /// Probe the provider endpoint and exit.
    #[arg(long)]
    check: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            provider: self.provider,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            max_chunk_units: self.max_chunk_units,
            branching_factor: self.branching_factor,
            max_reduce_depth: self.max_reduce_depth,
            retry_attempts: self.retry_attempts,
            concurrency: self.concurrency,
            style: self.style.clone(),
            timeout_secs: self.timeout_secs,
            estimator: self.estimator,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = TldrConfig::resolve(args.config.as_deref(), &args.overrides())
        .context("failed to load configuration")?;

    if args.check {
        return check(&config).await;
    }

    let text = read_input(args.input.as_ref())?;
    let summarizer = build_summarizer(&config)?;
    info!(
        provider = %config.provider.kind,
        summarizer = summarizer.name(),
        estimator = %config.estimator,
        bytes = text.len(),
        "tldr starting"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            on_signal.cancel();
        }
    });

    let mut pipeline = Pipeline::new(summarizer)
        .with_estimator(config.estimator.build())
        .with_cancellation(cancel);

    let printer = if args.events {
        let bus = EventBus::new().shared();
        let rx = bus.subscribe();
        pipeline = pipeline.with_events(bus);
        Some(tokio::spawn(stream_events(rx, std::io::stderr())))
    } else {
        None
    };

    let outcome = pipeline.tldr(&text, &config.pipeline).await;
    // Last sender gone: the printer drains what is queued, then exits.
    drop(pipeline);
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(error = %e, "event printer task failed");
        }
    }

    let result = match outcome {
        Ok(result) => result,
        Err(PipelineError::Cancelled {
            reason,
            stage,
            partial,
        }) => {
            for (position, summary) in partial.chunk_summaries.iter().enumerate() {
                if let Some(summary) = summary {
                    eprintln!("[chunk {position}] {summary}");
                }
            }
            bail!("run {reason} during {stage} ({partial})");
        }
        Err(e) => return Err(e).context("summarization failed"),
    };

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&result).context("failed to serialize result")?;
        println!("{rendered}");
    } else {
        println!("{}", result.summary);
    }
    if result.truncated_reduction {
        warn!("reduce depth limit reached: summary is a concatenation of partial summaries");
    }

    Ok(())
}

fn read_input(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn build_summarizer(config: &TldrConfig) -> Result<Arc<dyn Summarizer>> {
    let summarizer: Arc<dyn Summarizer> = match config.provider.kind {
        ProviderKind::OpenAi => Arc::new(
            OpenAiSummarizer::from_config(&config.provider)
                .context("failed to build OpenAI-compatible summarizer")?,
        ),
        ProviderKind::Mock => Arc::new(MockSummarizer::new()),
    };
    Ok(summarizer)
}

async fn check(config: &TldrConfig) -> Result<()> {
    match config.provider.kind {
        ProviderKind::Mock => {
            println!("mock provider: ok");
            Ok(())
        }
        ProviderKind::OpenAi => {
            let base_url = &config.provider.base_url;
            if check_endpoint(&config.provider).await {
                println!("{base_url}: ok");
                Ok(())
            } else {
                bail!("{base_url}: endpoint not reachable")
            }
        }
    }
}
