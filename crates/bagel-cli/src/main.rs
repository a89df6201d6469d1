use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use bagel_contracts::{
    CaptionOptions, EditImageOptions, JobJournal, JobMilestone, Operation, SavedArtifact,
    TextToImageOptions,
};
use bagel_engine::{BagelClient, BagelConfig, ImageResult};
use clap::{ArgAction, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "bagel-rs", version, about = "Client for a BAGEL queue inference server")]
struct Cli {
    /// Server base URL; defaults to $BAGEL_URL, then http://localhost:7865.
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Give up on the whole operation after this many seconds.
    #[arg(long, global = true)]
    timeout: Option<f64>,
    /// Append job milestones to this JSONL file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Generate(GenerateArgs),
    Edit(EditArgs),
    Caption(CaptionArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    ratio: Option<String>,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    show_thinking: bool,
    /// Extra server options as a JSON object.
    #[arg(long)]
    options: Option<String>,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    show_thinking: bool,
    #[arg(long)]
    options: Option<String>,
}

#[derive(Debug, Parser)]
struct CaptionArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    show_thinking: bool,
    /// Print `{think, text}` as JSON instead of the bare text.
    #[arg(long)]
    json: bool,
    #[arg(long)]
    options: Option<String>,
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("bagel-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli
        .base_url
        .as_deref()
        .map(BagelConfig::new)
        .unwrap_or_else(BagelConfig::from_env);
    info!(base_url = config.base_url(), "using inference server");
    let client = BagelClient::new(config);
    let journal = cli.events.clone().map(JobJournal::new);
    let timeout = timeout_from_secs(cli.timeout)?;

    match cli.command {
        Command::Generate(args) => run_generate(&client, journal.as_ref(), timeout, args).await?,
        Command::Edit(args) => run_edit(&client, journal.as_ref(), timeout, args).await?,
        Command::Caption(args) => run_caption(&client, journal.as_ref(), timeout, args).await?,
    }
    Ok(0)
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `RUST_LOG` wins when set; otherwise `-v` switches from warnings to debug output.
fn default_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        _ => "debug",
    }
}

/// `None` and `0` mean no limit. Anything `Duration` cannot hold is rejected.
fn timeout_from_secs(secs: Option<f64>) -> Result<Option<Duration>> {
    match secs {
        None => Ok(None),
        Some(secs) if secs == 0.0 => Ok(None),
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(|err| anyhow!("--timeout {secs} is not a usable number of seconds: {err}")),
    }
}

async fn run_generate(
    client: &BagelClient,
    journal: Option<&JobJournal>,
    timeout: Option<Duration>,
    args: GenerateArgs,
) -> Result<()> {
    let mut options: TextToImageOptions = parse_options(args.options.as_deref())?;
    if let Some(ratio) = args.ratio {
        options.image_ratio = ratio;
    }
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    options.show_thinking |= args.show_thinking;

    let (result, saved) = bounded(timeout, async {
        let result = client
            .text_to_image(&args.prompt, &options)
            .await
            .context("text-to-image failed")?;
        record_resolution(journal, Operation::TextToImage, &result)?;
        let saved = save_image(client, &result.image_url, &args.out).await?;
        Ok::<_, anyhow::Error>((result, saved))
    })
    .await?;
    record_artifact(journal, &result, &saved)?;
    println!("{}", saved.path.display());
    Ok(())
}

async fn run_edit(
    client: &BagelClient,
    journal: Option<&JobJournal>,
    timeout: Option<Duration>,
    args: EditArgs,
) -> Result<()> {
    let mut options: EditImageOptions = parse_options(args.options.as_deref())?;
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    options.show_thinking |= args.show_thinking;

    let (result, saved) = bounded(timeout, async {
        let result = client
            .edit_image(&args.image, &args.prompt, &options)
            .await
            .with_context(|| format!("editing {} failed", args.image.display()))?;
        record_resolution(journal, Operation::EditImage, &result)?;
        let saved = save_image(client, &result.image_url, &args.out).await?;
        Ok::<_, anyhow::Error>((result, saved))
    })
    .await?;
    record_artifact(journal, &result, &saved)?;
    println!("{}", saved.path.display());
    Ok(())
}

async fn run_caption(
    client: &BagelClient,
    journal: Option<&JobJournal>,
    timeout: Option<Duration>,
    args: CaptionArgs,
) -> Result<()> {
    let mut options: CaptionOptions = parse_options(args.options.as_deref())?;
    options.show_thinking |= args.show_thinking;

    let result = bounded(timeout, client.caption_image(&args.image, &args.prompt, &options))
        .await
        .with_context(|| format!("captioning {} failed", args.image.display()))?;

    if let Some(journal) = journal {
        journal.record(
            &result.session,
            JobMilestone::UploadCompleted {
                file: result.upload.clone(),
            },
        )?;
        journal.record(
            &result.session,
            JobMilestone::CaptionReceived {
                event_id: result.event_id.clone(),
                think: result.think.clone(),
                text: result.text.clone(),
            },
        )?;
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({"think": result.think, "text": result.text}))?
        );
    } else {
        if let Some(think) = result.think.as_deref().filter(|_| options.show_thinking) {
            eprintln!("{think}");
        }
        println!("{}", result.text);
    }
    Ok(())
}

async fn bounded<T, E>(timeout: Option<Duration>, work: impl Future<Output = Result<T, E>>) -> Result<T>
where
    E: Into<anyhow::Error>,
{
    let outcome = match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| anyhow!("timed out after {:.1}s", limit.as_secs_f64()))?,
        None => work.await,
    };
    outcome.map_err(Into::into)
}

fn parse_options<T: DeserializeOwned + Default>(raw: Option<&str>) -> Result<T> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(T::default());
    };
    let value: Value = serde_json::from_str(raw).context("--options is not valid JSON")?;
    if !value.is_object() {
        return Err(anyhow!("--options must be a JSON object"));
    }
    serde_json::from_value(value).context("--options has a value of the wrong type")
}

async fn save_image(client: &BagelClient, url: &str, out: &Path) -> Result<SavedArtifact> {
    let asset = client
        .download(url)
        .await
        .with_context(|| format!("downloading {url} failed"))?;
    write_artifact(out, &asset.bytes, asset.mime_type)
}

fn write_artifact(out: &Path, bytes: &[u8], mime_type: Option<String>) -> Result<SavedArtifact> {
    let decoded = image::load_from_memory(bytes).context("server returned an undecodable image")?;
    if let Some(parent) = out.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(out, bytes).with_context(|| format!("failed to write {}", out.display()))?;
    Ok(SavedArtifact {
        path: out.to_path_buf(),
        width: decoded.width(),
        height: decoded.height(),
        bytes: bytes.len() as u64,
        sha256: hex::encode(Sha256::digest(bytes)),
        mime_type,
    })
}

fn record_resolution(journal: Option<&JobJournal>, operation: Operation, result: &ImageResult) -> Result<()> {
    let Some(journal) = journal else {
        return Ok(());
    };
    if let Some(upload) = result.upload.clone() {
        journal.record(&result.session, JobMilestone::UploadCompleted { file: upload })?;
    }
    journal.record(
        &result.session,
        JobMilestone::JobResolved {
            operation,
            event_id: result.event_id.clone(),
            url: result.image_url.clone(),
        },
    )?;
    Ok(())
}

fn record_artifact(journal: Option<&JobJournal>, result: &ImageResult, saved: &SavedArtifact) -> Result<()> {
    if let Some(journal) = journal {
        journal.record(&result.session, JobMilestone::ArtifactSaved(saved.clone()))?;
    }
    Ok(())
}
