use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use jobdeck_client::{
    clear_expired_jobs, fetch_job_logs, fetch_job_profile, fetch_job_status, job_list_controller,
    pause_job, CreateJob, FileCache, JobHandle, JobRegistry, ReqwestTransport, Transport,
};
use jobdeck_core::{JobItem, JobRowView, ListResponse};
use jobdeck_logging::{jobdeck_info, jobdeck_warn};
use tokio::sync::Notify;

use super::config::{load_config, ConsoleConfig, DEFAULT_CONFIG_FILE};
use super::{logging, render};

const PAGE_SIZE: u32 = 20;

#[derive(Parser)]
#[command(name = "jobdeck", about = "Track and manage jobs of a media service")]
struct Cli {
    /// Path to the RON config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Service root, overriding the config file
    #[arg(long)]
    base_url: Option<String>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List jobs
    Jobs(JobsCommand),
    /// Follow the tracked jobs until none is left running
    Watch,
    /// Start tracking a job and follow it to completion
    Track { id: String },
    /// Ask the service to stop a running job
    Pause { id: String },
    /// Drop expired job records on the service
    ClearExpired,
    /// Show the output log of a job
    Logs(LogsCommand),
    /// Show details of a job
    Profile { id: String },
}

#[derive(Args)]
struct JobsCommand {
    /// Page through the whole list instead of showing the first page
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct LogsCommand {
    id: String,
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long, default_value_t = 50)]
    page_size: u32,
}

pub async fn run_app() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config);
    let mut config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => ConsoleConfig::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }

    logging::initialize(config.log, cli.verbose);
    match &loaded {
        Ok(Some(_)) => {
            jobdeck_info!("Loaded config from {:?}", cli.config);
        }
        Ok(None) => {
            jobdeck_info!("No config at {:?}; using defaults", cli.config);
        }
        Err(err) => {
            jobdeck_warn!("Using default config: {:#}", err);
        }
    }

    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::new(config.transport_settings()).context("failed to build HTTP client")?,
    );

    match cli.command {
        Command::Jobs(jobs) => list_jobs(transport, jobs.all).await,
        Command::Watch => watch(transport, &config).await,
        Command::Track { id } => track(transport, &config, &id).await,
        Command::Pause { id } => {
            pause_job(transport.as_ref(), &id).await?;
            println!("Pause requested for job {id}.");
            Ok(())
        }
        Command::ClearExpired => {
            clear_expired_jobs(transport.as_ref()).await?;
            println!("Expired jobs cleared.");
            Ok(())
        }
        Command::Logs(logs) => show_logs(transport, &logs).await,
        Command::Profile { id } => {
            let profile = fetch_job_profile(transport.as_ref(), &id).await?;
            print!("{}", render::profile(&profile));
            Ok(())
        }
    }
}

fn rows(response: &ListResponse<JobItem>) -> Vec<JobRowView> {
    response.data_source.iter().map(JobRowView::from).collect()
}

fn open_registry(transport: Arc<dyn Transport>, config: &ConsoleConfig) -> anyhow::Result<JobRegistry> {
    let cache = FileCache::open(&config.cache_dir)
        .with_context(|| format!("failed to open cache in {:?}", config.cache_dir))?;
    Ok(JobRegistry::new(transport, Arc::new(cache), config.poll_policy()))
}

async fn list_jobs(transport: Arc<dyn Transport>, all: bool) -> anyhow::Result<()> {
    let list = job_list_controller(transport, PAGE_SIZE);
    let mut response = list.init().await?;
    while all && !response.no_more {
        response = list.load_more().await?;
    }
    print!("{}", render::job_table(&rows(&response)));
    if !all && !response.no_more {
        println!("{} of {} shown; use --all for the rest.", response.data_source.len(), response.total);
    }
    Ok(())
}

async fn watch(transport: Arc<dyn Transport>, config: &ConsoleConfig) -> anyhow::Result<()> {
    let registry = open_registry(Arc::clone(&transport), config)?;
    let list = Arc::new(job_list_controller(transport, PAGE_SIZE));
    if let Err(err) = list.init().await {
        jobdeck_warn!("Job list unavailable: {}", err);
    }

    let done = Arc::new(Notify::new());
    let patched = Arc::clone(&list);
    let idle = Arc::clone(&done);
    let _jobs = registry.on_jobs_change(move |jobs| {
        patched.modify_data_source(|item| {
            match jobs.iter().find(|job| job.id() == item.id).and_then(JobHandle::snapshot) {
                Some(snapshot) => item.apply_snapshot(&snapshot),
                None => item,
            }
        });
        if jobs.is_empty() {
            idle.notify_one();
        }
    });
    let _progress = registry.on_jobs_percent_change(|percents| {
        for (id, percent) in percents {
            println!("{id}: {:.0}%", percent * 100.0);
        }
    });

    registry.initialize_jobs().await;
    if registry.jobs().is_empty() {
        println!("No tracked jobs are running.");
    } else {
        println!("Watching {} job(s); Ctrl-C to stop.", registry.jobs().len());
        tokio::select! {
            _ = done.notified() => {}
            _ = tokio::signal::ctrl_c() => {
                jobdeck_info!("Watch interrupted");
            }
        }
    }
    registry.dispose();

    let response = match list.refresh().await {
        Ok(response) => response,
        Err(err) => {
            jobdeck_warn!("Job list refresh failed: {}", err);
            list.response()
        }
    };
    print!("{}", render::job_table(&rows(&response)));
    Ok(())
}

async fn track(transport: Arc<dyn Transport>, config: &ConsoleConfig, id: &str) -> anyhow::Result<()> {
    let current = fetch_job_status(transport.as_ref(), id)
        .await
        .with_context(|| format!("cannot track job {id}"))?;
    println!("{}", render::progress_line(&current));

    let registry = open_registry(transport, config)?;
    let done = Arc::new(Notify::new());
    let finished = Arc::clone(&done);
    let job = registry.create_job(
        CreateJob::new(id)
            .on_tip(|tip| eprintln!("{tip}"))
            .on_finish(move |reason| {
                println!("Stopped following: {reason:?}");
                finished.notify_one();
            }),
    );
    let _updates = job.on_update(|snapshot| println!("{}", render::progress_line(snapshot)));

    tokio::select! {
        _ = done.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            println!("Job {id} stays tracked; `jobdeck watch` picks it up again.");
        }
    }
    registry.dispose();
    Ok(())
}

async fn show_logs(transport: Arc<dyn Transport>, logs: &LogsCommand) -> anyhow::Result<()> {
    let page = fetch_job_logs(transport.as_ref(), &logs.id, logs.page, logs.page_size).await?;
    if page.empty {
        println!("No output for job {}.", logs.id);
        return Ok(());
    }
    for line in &page.data_source {
        println!("{}", render::log_line(line));
    }
    if !page.no_more {
        println!("More output: --page {}", page.page.saturating_add(1));
    }
    Ok(())
}
