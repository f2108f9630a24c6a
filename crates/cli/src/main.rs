//! One-shot command line driver for the generation engine.
//!
//! Submits a single request against a project folder, streams lifecycle
//! events to stdout, and exits when the job reaches a terminal state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darkroom_assets::AssetStore;
use darkroom_core::request::{GenerationRequest, ModelOptions, MAX_OUTPUT_COUNT};
use darkroom_engine::batch::BatchConfig;
use darkroom_engine::preferences::Preferences;
use darkroom_engine::{GenerationEngine, JobEvent};
use darkroom_replicate::{ReplicateClient, ReplicateConfig};

const USAGE: &str = "\
Usage: darkroom [OPTIONS] <PROMPT>
       darkroom --list

Options:
  --project <DIR>         Project folder (default: current directory)
  --model <OWNER/NAME>    Model to run (default: last used, else flux-schnell)
  --count <N>             Number of images, 1..=8 (default: last used, else 1)
  --aspect-ratio <W:H>    Flux aspect ratio (default: last used, else 1:1)
  --size <WxH>            Explicit pixel size; selects the SDXL input shape
  --negative <TEXT>       Negative prompt (SDXL only)
  --seed <N>              Fixed sampling seed
  --reference <FILE>      Reference image, repeatable
  --list                  Print job history for the project and exit
";

struct Args {
    project: PathBuf,
    model: Option<String>,
    count: Option<u32>,
    aspect_ratio: Option<String>,
    size: Option<(u32, u32)>,
    negative: Option<String>,
    seed: Option<u64>,
    references: Vec<PathBuf>,
    list: bool,
    prompt: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        project: PathBuf::from("."),
        model: None,
        count: None,
        aspect_ratio: None,
        size: None,
        negative: None,
        seed: None,
        references: Vec::new(),
        list: false,
        prompt: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .with_context(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--project" => args.project = PathBuf::from(value("--project")?),
            "--model" => args.model = Some(value("--model")?),
            "--count" => {
                args.count = Some(value("--count")?.parse().context("--count must be a number")?)
            }
            "--aspect-ratio" => args.aspect_ratio = Some(value("--aspect-ratio")?),
            "--size" => {
                let raw = value("--size")?;
                let (w, h) = raw
                    .split_once('x')
                    .with_context(|| format!("--size must look like 1024x768, got {raw}"))?;
                args.size = Some((
                    w.parse().context("--size width must be a number")?,
                    h.parse().context("--size height must be a number")?,
                ));
            }
            "--negative" => args.negative = Some(value("--negative")?),
            "--seed" => {
                args.seed = Some(value("--seed")?.parse().context("--seed must be a number")?)
            }
            "--reference" => args.references.push(PathBuf::from(value("--reference")?)),
            "--list" => args.list = true,
            "--help" | "-h" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option {other}\n{USAGE}"),
            other => match &mut args.prompt {
                Some(prompt) => {
                    prompt.push(' ');
                    prompt.push_str(other);
                }
                None => args.prompt = Some(other.to_string()),
            },
        }
    }

    Ok(args)
}

fn build_request(args: &Args, prefs: &Preferences, prompt: String) -> Result<GenerationRequest> {
    let count = args.count.or(prefs.last_count).unwrap_or(1);
    if count == 0 || count > MAX_OUTPUT_COUNT {
        bail!("--count must be between 1 and {MAX_OUTPUT_COUNT}");
    }

    let options = match args.size {
        Some((width, height)) => ModelOptions::Sdxl {
            width,
            height,
            negative_prompt: args.negative.clone(),
            seed: args.seed,
        },
        None => ModelOptions::Flux {
            aspect_ratio: args
                .aspect_ratio
                .clone()
                .or_else(|| prefs.last_aspect_ratio.clone())
                .unwrap_or_else(|| "1:1".into()),
            seed: args.seed,
        },
    };

    let default_model = match options {
        ModelOptions::Flux { .. } => "black-forest-labs/flux-schnell",
        ModelOptions::Sdxl { .. } => "stability-ai/sdxl",
    };
    let model = args
        .model
        .clone()
        .or_else(|| prefs.last_model.clone())
        .unwrap_or_else(|| default_model.into());

    Ok(GenerationRequest {
        model,
        prompt,
        count,
        options,
    })
}

fn print_history(engine: &GenerationEngine) {
    let jobs = engine.jobs();
    if jobs.is_empty() {
        println!("No jobs recorded for this project.");
        return;
    }
    for job in jobs {
        let when = job.completed_at.or(job.started_at).unwrap_or(job.created_at);
        let detail = match &job.error {
            Some(error) => format!(" ({error})"),
            None => format!(" ({} files)", job.output_paths.len()),
        };
        println!(
            "{}  {:?}{}  {}",
            when.format("%Y-%m-%d %H:%M:%S"),
            job.status,
            detail,
            job.request.prompt
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "darkroom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;

    let config = ReplicateConfig::from_env().context(
        "REPLICATE_API_TOKEN is not set (put it in the environment or a .env file)",
    )?;
    let provider = Arc::new(ReplicateClient::new(config)?);
    let assets = Arc::new(AssetStore::new(&args.project));
    let engine = GenerationEngine::start(
        provider,
        assets,
        &args.project,
        BatchConfig::default(),
    )
    .await;

    if args.list {
        print_history(&engine);
        return Ok(());
    }

    let Some(prompt) = args.prompt.clone() else {
        bail!("a prompt is required\n{USAGE}");
    };

    let mut prefs = Preferences::load(&args.project).await;
    let request = build_request(&args, &prefs, prompt)?;

    let mut references = Vec::with_capacity(args.references.len());
    for path in &args.references {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read reference {}", path.display()))?;
        references.push(bytes);
    }

    prefs.last_model = Some(request.model.clone());
    prefs.last_count = Some(request.count);
    if let ModelOptions::Flux { aspect_ratio, .. } = &request.options {
        prefs.last_aspect_ratio = Some(aspect_ratio.clone());
    }
    prefs.save(&args.project).await;

    let mut events = engine.subscribe();
    let id = engine.submit(request, references);
    println!("Submitted job {id}");

    let outcome = loop {
        let event = events.recv().await.context("engine event feed closed")?;
        match event {
            JobEvent::Started { job_id } if job_id == id => {
                println!("Generating...");
            }
            JobEvent::PredictionCreated {
                job_id,
                prediction_id,
                index,
            } if job_id == id => {
                println!("  prediction {prediction_id} created (output {})", index + 1);
            }
            JobEvent::Completed {
                job_id,
                output_paths,
            } if job_id == id => {
                for path in &output_paths {
                    println!("  wrote {path}");
                }
                break Ok(());
            }
            JobEvent::Failed { job_id, error } if job_id == id => {
                break Err(anyhow::anyhow!("generation failed: {error}"));
            }
            JobEvent::Cancelled { job_id } if job_id == id => {
                break Err(anyhow::anyhow!("job was cancelled"));
            }
            _ => {}
        }
    };

    engine.shutdown().await;
    outcome
}
