//! vshort command line entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use vshort_media::{
    check_ffmpeg, check_ffprobe, FfmpegTranscoder, SubtitleStyle, TimingSynchronizer,
};
use vshort_models::VideoFormat;
use vshort_pipeline::providers::{
    ClaudeClient, HttpDownloader, OpenAiChatClient, OpenAiSpeechClient, PexelsClient,
};
use vshort_pipeline::{
    init_tracing, produce_topic, ConcurrentPipelineRunner, Console, ContentService, PipelineConfig,
    PipelineError, PipelineResult, ProductionContext, RateLimitedExecutor, ReviewMode, RunMode,
    RunOutcome, ShutdownCoordinator, TempWorkspace, TopicSource, UsedResourceRegistry,
};

/// Turn a topic into a narrated short video.
#[derive(Debug, Parser)]
#[command(name = "vshort", version, about)]
struct Cli {
    /// Output format: shorts (1080x1920) or landscape (1920x1080)
    #[arg(long, env = "VSHORT_FORMAT")]
    format: Option<VideoFormat>,

    /// Run mode
    #[arg(long, value_enum, env = "VSHORT_MODE")]
    mode: Option<RunMode>,

    /// Produce this topic directly
    #[arg(long, conflicts_with = "keyword")]
    topic: Option<String>,

    /// Ask for topic suggestions on this keyword
    #[arg(long)]
    keyword: Option<String>,

    /// Tasks in flight per stage
    #[arg(long)]
    concurrency: Option<usize>,

    /// Extra attempts for a failed task
    #[arg(long)]
    task_retries: Option<u32>,
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            error!("Startup failed: {:#}", e);
            eprintln!("vshort: {:#}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<RunOutcome> {
    // Fails only when a provider is already installed
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    info!("Starting vshort");

    let mut config = PipelineConfig::from_env().context("invalid configuration")?;
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(task_retries) = cli.task_retries {
        config.task_retries = task_retries;
    }
    config.validate().context("invalid configuration")?;
    info!("Pipeline config: {:?}", config);

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;
    if !config.slate_path.exists() {
        warn!(
            path = %config.slate_path.display(),
            "Closing slate not found, videos will end without it"
        );
    }

    let workspace = Arc::new(TempWorkspace::new(&config.temp_dir));
    workspace.init().await.context("failed to prepare temp directory")?;

    let coordinator = ShutdownCoordinator::new(Arc::clone(&workspace));
    let shutdown = coordinator.subscribe();
    let outcome = coordinator
        .run(session(cli, config, workspace, shutdown))
        .await;

    info!(exit_code = outcome.exit_code(), "vshort finished");
    Ok(outcome)
}

async fn session(
    cli: Cli,
    config: PipelineConfig,
    workspace: Arc<TempWorkspace>,
    shutdown: watch::Receiver<bool>,
) -> PipelineResult<()> {
    let mut console = Console::stdio();

    let format = match cli.format {
        Some(format) => format,
        None => console.select_format().await?,
    };
    let mode = match cli.mode {
        Some(mode) => mode,
        None => console.select_mode().await?,
    };
    info!(format = %format, mode = ?mode, "Run configured");

    let executor = RateLimitedExecutor::new(config.retry_policy());
    let content = ContentService::new(
        Arc::new(ClaudeClient::new(&config)?),
        Arc::new(OpenAiChatClient::new(&config)?),
        Arc::new(PexelsClient::new(&config)?),
        Arc::new(UsedResourceRegistry::new(&config.registry_path)),
        executor.clone(),
    )?
    .with_shutdown(shutdown.clone());

    let source = match (cli.topic, cli.keyword) {
        (Some(topic), _) => TopicSource::Direct(topic),
        (None, Some(keyword)) => TopicSource::Suggest(keyword),
        (None, None) => console.select_topic_source().await?,
    };
    let mut topics = match source {
        TopicSource::Direct(topic) => vec![topic],
        TopicSource::Suggest(keyword) => {
            let topics = content.suggest_topics(&keyword).await?;
            console.show_topics(&topics).await?;
            topics
        }
    };
    if !mode.is_full_auto() && topics.len() > 1 {
        topics = vec![console.select_topic(topics).await?];
    }

    let production = ProductionContext {
        speech: Arc::new(OpenAiSpeechClient::new(&config)?),
        fetcher: Arc::new(HttpDownloader::new(config.download_timeout)?),
        transcoder: Arc::new(
            FfmpegTranscoder::new()
                .with_cancel(shutdown.clone())
                .with_command_timeout(config.ffmpeg_timeout.as_secs())
                .with_probe_timeout(config.request_timeout),
        ),
        executor,
        runner: ConcurrentPipelineRunner::new(config.runner_config())
            .with_shutdown(shutdown.clone()),
        sync: TimingSynchronizer::default(),
        workspace,
        format,
        slate_path: Some(config.slate_path.clone()),
        output_dir: config.output_dir.clone(),
        style: SubtitleStyle::default(),
    };

    let total = topics.len();
    let mut produced = 0usize;
    for (i, topic) in topics.iter().enumerate() {
        if *shutdown.borrow() {
            return Err(PipelineError::Cancelled);
        }
        info!(topic = %topic, position = i + 1, total, "Starting topic");
        let review = if mode.is_auto() {
            ReviewMode::Auto
        } else {
            ReviewMode::Manual(&mut console)
        };

        match produce_topic(&content, &production, review, topic).await {
            Ok(Some(video)) => {
                produced += 1;
                info!(
                    topic = %topic,
                    path = %video.path.display(),
                    duration = video.duration,
                    "Video created"
                );
            }
            Ok(None) => info!(topic = %topic, "Topic produced no video"),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if mode.is_full_auto() => {
                error!(topic = %topic, "Topic failed, continuing with the next one: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    info!(produced, total, "All topics processed");
    Ok(())
}
