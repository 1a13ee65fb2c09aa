//! CLI command definitions for examforge.
//!
//! `generate` runs the pipeline once for one subject or for all of them and
//! optionally saves the validated items; `topics` lists the topic
//! vocabulary used to seed runs.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use crate::exam::{topics_for, Difficulty, ImagePayload, JobContext, Subject};
use crate::pipeline::{PipelineConfig, PipelineDriver, RunOutcome, RunRequest};
use crate::storage::ItemStore;

/// Year 6 multiple-choice exam item generator.
#[derive(Parser)]
#[command(name = "examforge")]
#[command(about = "Generate validated Year 6 multiple-choice exam items with an LLM")]
#[command(version)]
#[command(
    long_about = "examforge plans, drafts and validates multiple-choice exam items for math, english and thinking skills.\n\nThe LLM endpoint is configured through LITELLM_API_BASE, LITELLM_API_KEY and LITELLM_DEFAULT_MODEL.\n\nExample usage:\n  examforge generate --subject math --difficulty 3 --json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the pipeline once and collect validated items.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// List the topic vocabulary per subject.
    Topics(TopicsArgs),
}

/// Arguments for `examforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Subject to generate for: math, english, thinking or all.
    #[arg(short, long, default_value = "all")]
    pub subject: String,

    /// Topic to seed the run with. Defaults to a random topic pair.
    #[arg(short, long)]
    pub topic: Option<String>,

    /// Target difficulty on a 1-3 scale.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub difficulty: Option<u8>,

    /// Description of an image the items must refer to.
    #[arg(long)]
    pub image_description: Option<String>,

    /// Kind of image, e.g. "bar graph".
    #[arg(long, requires = "image_description")]
    pub image_type: Option<String>,

    /// Items requested per subject (1-5).
    #[arg(short = 'n', long)]
    pub items: Option<usize>,

    /// Run timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// LLM model override.
    #[arg(short, long)]
    pub model: Option<String>,

    /// API key for the LLM endpoint (can also be set via LITELLM_API_KEY env var).
    #[arg(long, env = "LITELLM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Output directory for saved items.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Skip the LLM review of structurally valid items.
    #[arg(long)]
    pub no_semantic: bool,

    /// Do not write items to disk.
    #[arg(long)]
    pub no_save: bool,

    /// Output JSON summary.
    #[arg(short, long)]
    pub json: bool,
}

/// Arguments for `examforge topics`.
#[derive(Parser, Debug)]
pub struct TopicsArgs {
    /// Only list this subject.
    #[arg(short, long)]
    pub subject: Option<String>,

    /// Output JSON.
    #[arg(short, long)]
    pub json: bool,
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run an already-parsed command line.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Topics(args) => run_topics_command(args),
    }
}

/// Parses a subject selector; `all` selects every subject.
fn parse_subjects(value: &str) -> anyhow::Result<Vec<Subject>> {
    if value.trim().eq_ignore_ascii_case("all") {
        return Ok(Subject::ALL.to_vec());
    }
    value
        .split(',')
        .map(|part| part.parse::<Subject>().map_err(anyhow::Error::msg))
        .collect()
}

fn apply_overrides(mut config: PipelineConfig, args: &GenerateArgs) -> PipelineConfig {
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }
    if let Some(key) = args.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        config = config.with_api_key(key);
    }
    if let Some(items) = args.items {
        config = config.with_items_per_subject(items);
    }
    if let Some(secs) = args.timeout {
        config = config.with_run_timeout(Duration::from_secs(secs));
    }
    if let Some(output) = &args.output {
        config = config.with_output_dir(PathBuf::from(output));
    }
    if args.no_semantic {
        config = config.with_semantic_validation(false);
    }
    config
}

fn build_context(args: &GenerateArgs) -> anyhow::Result<JobContext> {
    let mut ctx = JobContext::new();
    if let Some(level) = args.difficulty {
        ctx = ctx.with_difficulty(Difficulty::try_from(level).map_err(anyhow::Error::msg)?);
    }
    if let Some(description) = &args.image_description {
        let mut image = ImagePayload::new(description.clone());
        if let Some(kind) = &args.image_type {
            image = image.with_type(kind.clone());
        }
        ctx = ctx.with_image(image);
    }
    Ok(ctx)
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let subjects = parse_subjects(&args.subject)?;
    let config = apply_overrides(
        PipelineConfig::from_env().context("Failed to load configuration")?,
        &args,
    );
    let output_dir = config.output_dir.clone();
    let driver = PipelineDriver::from_config(config)?;

    let ctx = build_context(&args)?;
    let mut request = RunRequest::new(subjects).with_ctx(ctx);
    if let Some(topic) = &args.topic {
        request = request.with_topic(topic.clone());
    }

    let outcome = driver.run(request).await?;
    if outcome.timed_out {
        warn!(
            terminal_events = outcome.terminal_events,
            "Run stopped on timeout before every subject reported"
        );
    }

    let saved = if args.no_save || outcome.items.is_empty() {
        Vec::new()
    } else {
        ItemStore::new(output_dir.clone())
            .save(&outcome.ctx, &outcome.items)
            .await
            .with_context(|| format!("Failed to save items under {}", output_dir.display()))?
    };
    info!(files = saved.len(), "Generation finished");

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome_json(&outcome, &saved))?
        );
    } else {
        print_outcome(&outcome, &saved);
    }
    Ok(())
}

fn outcome_json(outcome: &RunOutcome, saved: &[PathBuf]) -> serde_json::Value {
    json!({
        "job_id": outcome.ctx.job_id,
        "topic": outcome.topic,
        "ctx": outcome.ctx,
        "items": outcome.items,
        "failed": outcome.failed,
        "batches": outcome
            .batches
            .iter()
            .map(|(subject, status)| json!({"subject": subject, "status": status}))
            .collect::<Vec<_>>(),
        "terminal_events": outcome.terminal_events,
        "timed_out": outcome.timed_out,
        "saved": saved.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
    })
}

fn print_outcome(outcome: &RunOutcome, saved: &[PathBuf]) {
    println!("Job {}", outcome.ctx.job_id);
    println!("  Topic:     {}", outcome.topic);
    println!("  Passed:    {}", outcome.items.len());
    println!("  Failed:    {}", outcome.failed.len());
    if outcome.timed_out {
        println!(
            "  Timed out after {} terminal event(s)",
            outcome.terminal_events
        );
    }
    for (subject, status) in &outcome.batches {
        println!("    {}: {}", subject, status);
    }
    for item in &outcome.items {
        println!();
        println!("[{}] {}", item.subject, item.prompt);
        for choice in &item.choices {
            println!("  {}. {}", choice.id, choice.text);
        }
        println!("  Answer: {}", item.answer);
    }
    for report in &outcome.failed {
        println!();
        println!("Rejected {}: {}", report.item_id, report.reasons.join("; "));
    }
    if !saved.is_empty() {
        println!();
        for path in saved {
            println!("Saved {}", path.display());
        }
    }
}

fn run_topics_command(args: TopicsArgs) -> anyhow::Result<()> {
    let subjects = match &args.subject {
        Some(value) => parse_subjects(value)?,
        None => Subject::ALL.to_vec(),
    };

    if args.json {
        let map: serde_json::Map<String, serde_json::Value> = subjects
            .iter()
            .map(|s| (s.as_str().to_string(), json!(topics_for(*s))))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for subject in subjects {
        println!("{}:", subject);
        for topic in topics_for(subject) {
            println!("  - {}", topic);
        }
    }
    Ok(())
}
