use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use effect_pipeline::{
    extract, BrowserOpener, DownloadOutcome, DownloadResolver, EffectConfig, EffectPipeline,
    GenerationBackend, GenerationRequest, JobHandle, JobStatus, LocalFile, MediaUploader,
    Notifier, ResourceOpener, RunOutcome, StatusPoller, StudioBackend, UploadClient,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "mugshot-cli")]
#[command(about = "Apply the mugshot effect to images from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (JSON), defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory downloads are saved to
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload, generate and download in one go
    Run {
        /// Source image
        file: PathBuf,

        /// Open the result in the browser instead of saving it
        #[arg(long)]
        no_download: bool,
    },

    /// Upload an image and print its public URL
    Upload {
        file: PathBuf,
    },

    /// Submit an already uploaded image URL
    Submit {
        url: String,
    },

    /// Check the status of a submitted job
    Status {
        job_id: String,

        /// Keep polling until the job completes or fails
        #[arg(long)]
        wait: bool,
    },

    /// Save a result URL locally
    Download {
        url: String,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration to a file
    Init {
        path: PathBuf,
    },
}

/// Prints user-facing messages above the spinner
struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, message: &str) {
        eprintln!("{}", message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref(), cli.output)?;

    match cli.command {
        Commands::Run { file, no_download } => run_command(config, file, no_download).await,
        Commands::Upload { file } => upload_command(config, file).await,
        Commands::Submit { url } => submit_command(config, url).await,
        Commands::Status { job_id, wait } => status_command(config, job_id, wait).await,
        Commands::Download { url } => download_command(config, url).await,
        Commands::Config {
            command: ConfigCommands::Init { path },
        } => config_init_command(path),
    }
}

fn load_config(path: Option<&Path>, output: Option<PathBuf>) -> Result<EffectConfig> {
    let config = match path {
        Some(path) => EffectConfig::load(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => EffectConfig::default(),
    };

    Ok(match output {
        Some(dir) => config.with_output_dir(dir),
        None => config,
    })
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_outcome(outcome: &DownloadOutcome) {
    match outcome {
        DownloadOutcome::Saved { path, tier } => {
            println!("Saved {} ({})", path.display(), tier);
        }
        DownloadOutcome::Opened { url } => {
            println!("Opened {} in the browser", url);
        }
    }
}

async fn run_command(config: EffectConfig, file: PathBuf, no_download: bool) -> Result<()> {
    info!("Applying {} to {:?}", config.effect_id, file);

    let pipeline = EffectPipeline::new(config).with_notifier(Arc::new(StderrNotifier));
    let source = LocalFile::from_path(&file).await?;

    let pb = spinner("Uploading...");
    let ticker = {
        let pipeline = pipeline.clone();
        let pb = pb.clone();
        tokio::spawn(async move {
            loop {
                pb.set_message(pipeline.state().trigger.caption());
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    };

    let generated = async {
        pipeline.select_file(source).await?;
        pipeline.generate().await
    }
    .await;

    ticker.abort();
    pb.finish_and_clear();

    let url = match generated? {
        RunOutcome::Applied(url) => url,
        RunOutcome::Superseded => anyhow::bail!("run was superseded"),
    };
    println!("{}", url);

    if no_download {
        BrowserOpener.open(&url)?;
        return Ok(());
    }

    if let Err(e) = pipeline.load_preview().await {
        warn!("Could not load preview of {}: {}", url, e);
    }

    if let Some(outcome) = pipeline.download().await? {
        print_outcome(&outcome);
    }

    Ok(())
}

async fn upload_command(config: EffectConfig, file: PathBuf) -> Result<()> {
    let source = LocalFile::from_path(&file).await?;
    if !source.is_image() {
        anyhow::bail!("{:?} is not an image ({})", file, source.content_type);
    }

    let pb = spinner("Uploading...");
    let uploaded = UploadClient::new(&config).upload(&source).await;
    pb.finish_and_clear();

    println!("{}", uploaded?.remote_url);
    Ok(())
}

async fn submit_command(config: EffectConfig, url: String) -> Result<()> {
    let backend = StudioBackend::new(&config);
    let handle = backend
        .submit(&GenerationRequest::for_source(&config, &url))
        .await?;

    println!("{}", serde_json::to_string_pretty(&handle)?);
    Ok(())
}

async fn status_command(config: EffectConfig, job_id: String, wait: bool) -> Result<()> {
    let handle = JobHandle {
        job_id,
        user_id: config.user_id.clone(),
        kind: config.effect_kind(),
    };
    let backend = Arc::new(StudioBackend::new(&config));

    if !wait {
        match backend.query_status(&handle).await? {
            JobStatus::Pending { status } => println!("{}", status),
            JobStatus::Completed(payload) => println!("completed: {}", extract(&payload)?),
            JobStatus::Failed(reason) => println!("failed: {}", reason),
        }
        return Ok(());
    }

    let poller = StatusPoller::new(backend, config.poll);
    let pb = spinner("Processing...");
    let payload = poller
        .poll(&handle, |attempt| {
            pb.set_message(format!("Processing... ({})", attempt))
        })
        .await;
    pb.finish_and_clear();

    println!("{}", extract(&payload?)?);
    Ok(())
}

async fn download_command(config: EffectConfig, url: String) -> Result<()> {
    let resolver = DownloadResolver::standard(
        reqwest::Client::new(),
        &config.download,
        Arc::new(BrowserOpener),
    );

    let outcome = resolver.download(&url, None).await?;
    print_outcome(&outcome);
    Ok(())
}

fn config_init_command(path: PathBuf) -> Result<()> {
    EffectConfig::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}
