use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use syncwatch::core::{ResourceKind, ScopeKey, SyncPoller};
use syncwatch::template::{TemplateConfig, TemplatePatch};
use syncwatch::{cli, config, context, logging};

#[derive(Parser)]
#[command(name = "syncwatch")]
#[command(about = "Trigger and watch backend resource sync jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./syncwatch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args)]
struct GlobalArgs {
    /// Backend base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Seconds after which a sync is no longer watched
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Log as JSON
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start syncing one or more resources and watch until they finish
    Sync {
        #[arg(value_parser = ResourceKind::parse)]
        kind: ResourceKind,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Watch a job that is already running
    Watch {
        #[arg(value_parser = ResourceKind::parse)]
        kind: ResourceKind,
        id: String,
        job_id: String,
    },
    /// Cancel a running job
    Cancel {
        #[arg(value_parser = ResourceKind::parse)]
        kind: ResourceKind,
        id: String,
        job_id: String,
    },
    /// Merge a template patch into a template and print the result
    Template { base: PathBuf, patch: PathBuf },
    /// Print the effective configuration
    Config,
}

/// CLI values layered over file and environment configuration.
#[derive(Serialize, Default)]
struct Overrides {
    api: ApiOverrides,
    polling: PollOverrides,
    logging: LoggingOverrides,
}

#[derive(Serialize, Default)]
struct ApiOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
}

#[derive(Serialize, Default)]
struct PollOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_duration_secs: Option<u64>,
}

#[derive(Serialize, Default)]
struct LoggingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    json: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    verbose: Option<bool>,
}

impl From<&GlobalArgs> for Overrides {
    fn from(args: &GlobalArgs) -> Self {
        Self {
            api: ApiOverrides {
                base_url: args.base_url.clone(),
            },
            polling: PollOverrides {
                max_duration_secs: args.timeout,
            },
            logging: LoggingOverrides {
                json: args.json.then_some(true),
                verbose: args.verbose.then_some(true),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = Overrides::from(&cli.global);
    let config = config::AppConfig::new(cli.config.as_deref(), Some(&overrides))
        .context("Failed to load configuration")?;
    logging::init(&config.logging).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Sync { kind, ids } => {
            let scopes = ids
                .into_iter()
                .map(|id| {
                    let scope = ScopeKey::new(kind, id);
                    scope.validate().map(|_| scope)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let ctx = context::AppContext::from_config(config)?;
            run_sync(ctx, scopes).await
        }
        Commands::Watch { kind, id, job_id } => {
            let ctx = context::AppContext::from_config(config)?;
            run_watch(ctx, ScopeKey::new(kind, id), job_id).await
        }
        Commands::Cancel { kind, id, job_id } => {
            let ctx = context::AppContext::from_config(config)?;
            let poller = SyncPoller::new(&ctx);
            poller
                .cancel_scoped(&ScopeKey::new(kind, id), &job_id)
                .await
                .context("Failed to cancel sync job")?;
            println!("Cancellation requested for job {}", job_id);
            Ok(())
        }
        Commands::Template { base, patch } => run_template(&base, &patch),
        Commands::Config => {
            print!("{}", config.to_toml().context("Failed to render configuration")?);
            Ok(())
        }
    }
}

async fn run_sync(ctx: context::AppContext, scopes: Vec<ScopeKey>) -> Result<()> {
    let poller = SyncPoller::new(&ctx);
    let mut events = ctx.tracker.subscribe();
    let mut pending = HashSet::new();
    let mut start_failures = 0;

    for scope in scopes {
        match poller.start_job(scope.clone()).await {
            Ok(job_id) => {
                println!("{}  watching job {}", scope, job_id);
                pending.insert(scope);
            }
            Err(e) => {
                eprintln!("{}  could not start sync: {}", scope, e);
                start_failures += 1;
            }
        }
    }

    let summary = cli::follow(
        &ctx.tracker,
        &mut events,
        pending,
        ctrl_c(),
        |line| println!("{}", line),
    )
    .await;
    poller.shutdown().await;

    if start_failures > 0 || !summary.all_succeeded() {
        bail!(
            "{} succeeded, {} failed, {} not finished, {} cancelled, {} could not start",
            summary.succeeded,
            summary.failed,
            summary.unwatched + usize::from(summary.interrupted),
            summary.cancelled,
            start_failures
        );
    }
    Ok(())
}

async fn run_watch(ctx: context::AppContext, scope: ScopeKey, job_id: String) -> Result<()> {
    let poller = SyncPoller::new(&ctx);
    let mut events = ctx.tracker.subscribe();

    poller
        .poll_job(&job_id, scope.clone())
        .await
        .context("Failed to watch sync job")?;

    let summary = cli::follow(
        &ctx.tracker,
        &mut events,
        HashSet::from([scope]),
        ctrl_c(),
        |line| println!("{}", line),
    )
    .await;
    poller.shutdown().await;

    if !summary.all_succeeded() {
        bail!("job {} did not complete successfully", job_id);
    }
    Ok(())
}

fn run_template(base: &Path, patch: &Path) -> Result<()> {
    let base_json = std::fs::read_to_string(base)
        .with_context(|| format!("Failed to read {}", base.display()))?;
    let patch_json = std::fs::read_to_string(patch)
        .with_context(|| format!("Failed to read {}", patch.display()))?;

    let template: TemplateConfig =
        serde_json::from_str(&base_json).context("Failed to parse template")?;
    let patch: TemplatePatch =
        serde_json::from_str(&patch_json).context("Failed to parse template patch")?;

    let merged = template.merge(patch).context("Failed to merge template")?;
    println!("{}", serde_json::to_string_pretty(&merged)?);
    Ok(())
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
