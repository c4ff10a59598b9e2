use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rja_core::{CanonicalJob, RunReport};
use rja_storage::{JobFilter, JobStore};
use rja_sync::{
    open_store, oracle_from_config, review_jobs, run_audit, run_sync_once_from_env, unquarantine, SyncConfig,
    SyncPipeline,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "rja-cli")]
#[command(about = "Regional Jobs Aggregator command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion pass.
    Sync {
        /// Restrict the run to these sources (repeatable).
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Show recent visible jobs.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        employer: Option<String>,
    },
    Stats,
    /// Sweep active jobs for scraper artifacts. Dry-run unless --delete.
    Audit {
        #[arg(long)]
        delete: bool,
    },
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },
    Migrate,
    Serve,
    /// Run ingestion on SYNC_CRON_1 and SYNC_CRON_2 until interrupted.
    Schedule,
}

#[derive(Debug, Subcommand)]
enum ReviewAction {
    /// Send every visible job past the advisory oracle.
    Run,
    /// List jobs flagged for operator review.
    Flags,
    Unquarantine { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync { sources: Vec::new() }) {
        Commands::Sync { sources } => {
            let report = run_sync_once_from_env(&sources).await?;
            print_run(&report);
        }
        Commands::List {
            limit,
            category,
            employer,
        } => {
            let store = open_store(&config).await?;
            let page = store
                .list_jobs(&JobFilter {
                    category,
                    employer,
                    per_page: limit,
                    ..JobFilter::default()
                })
                .await?;
            for job in &page.jobs {
                println!("{}", job_line(job));
            }
            println!("showing {} of {} jobs", page.jobs.len(), page.total);
        }
        Commands::Stats => {
            let store = open_store(&config).await?;
            print_stats(&store).await?;
        }
        Commands::Audit { delete } => {
            let store = open_store(&config).await?;
            let report = run_audit(&store, delete).await?;
            println!("anomalies: {}", report.anomalies.len());
            for (severity, count) in &report.by_severity {
                println!("  {severity}: {count}");
            }
            for (kind, count) in &report.by_kind {
                println!("  {kind}: {count}");
            }
            for (source, count) in &report.by_source {
                println!("  source {source}: {count}");
            }
            for anomaly in &report.anomalies {
                println!("{anomaly} (id {}, {})", anomaly.job_id, anomaly.source_name);
            }
            if report.dry_run {
                println!(
                    "dry run: {} high-severity jobs would be deleted (pass --delete)",
                    report.high_severity_jobs.len()
                );
            } else {
                println!("deleted {} jobs", report.deleted);
            }
        }
        Commands::Review { action } => {
            let store = open_store(&config).await?;
            match action {
                ReviewAction::Run => {
                    let oracle = oracle_from_config(&config)?;
                    let jobs: Vec<CanonicalJob> = store
                        .active_jobs()
                        .await?
                        .into_iter()
                        .filter(CanonicalJob::is_publicly_visible)
                        .collect();
                    let summary = review_jobs(&store, oracle.as_ref(), &jobs, Utc::now()).await?;
                    println!(
                        "reviewed={} approved={} quarantined={} flagged={} failed_open={}",
                        summary.reviewed,
                        summary.approved,
                        summary.quarantined,
                        summary.flagged,
                        summary.failed_open
                    );
                }
                ReviewAction::Flags => {
                    let flags = store.review_flags().await?;
                    for flag in &flags {
                        println!(
                            "{:>5}  job {}  {} | {} | {}\n       {}",
                            flag.id, flag.job_id, flag.title, flag.employer, flag.reason, flag.url
                        );
                    }
                    println!("{} flagged", flags.len());
                }
                ReviewAction::Unquarantine { id } => {
                    if unquarantine(&store, id).await? {
                        println!("job {id} is visible again");
                    } else {
                        anyhow::bail!("job {id} does not exist or is not quarantined");
                    }
                }
            }
        }
        Commands::Migrate => {
            open_store(&config).await?;
            println!("migrations applied to {}", config.database_url);
        }
        Commands::Serve => {
            let port: u16 = std::env::var("RJA_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000);
            let store = open_store(&config).await?;
            let pipeline = Arc::new(SyncPipeline::new(config, store.clone())?);
            let sched = pipeline.maybe_build_scheduler().await?;
            if let Some(sched) = &sched {
                sched.start().await.context("starting scheduler")?;
                info!("scheduler running alongside the api");
            }
            rja_web::serve(store, port).await?;
        }
        Commands::Schedule => {
            let store = open_store(&config).await?;
            let pipeline = Arc::new(SyncPipeline::new(config, store)?);
            let mut sched = pipeline.build_scheduler().await?;
            sched.start().await.context("starting scheduler")?;
            info!(
                cron_1 = %pipeline.config().sync_cron_1,
                cron_2 = %pipeline.config().sync_cron_2,
                "scheduler running; ctrl-c to stop"
            );
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn job_line(job: &CanonicalJob) -> String {
    let c = &job.job.candidate;
    let salary = c.salary_text.as_deref().unwrap_or("-");
    format!(
        "{:>5}  {} | {} | {} | {} | {}",
        job.id, c.title, c.employer, job.job.category, job.job.location, salary
    )
}

fn print_run(report: &RunReport) {
    println!(
        "sync complete: run_id={} scraped={} deduplicated={} rejected={} inserted={} updated={} deactivated={} active={} ({}s)",
        report.run_id,
        report.scraped,
        report.deduplicated,
        report.gate_rejected,
        report.inserted,
        report.updated,
        report.deactivated,
        report.active_total,
        report.duration_seconds()
    );
    for (source, count) in &report.source_counts {
        match report.source_errors.get(source) {
            Some(err) => println!("  {source}: FAILED {err}"),
            None => println!("  {source}: {count}"),
        }
    }
}

async fn print_stats(store: &JobStore) -> Result<()> {
    let stats = store.stats().await?;
    println!("active jobs: {}", stats.total_jobs);
    println!("employers:   {}", stats.total_employers);
    println!("by category:");
    for (category, count) in &stats.jobs_by_category {
        println!("  {category}: {count}");
    }
    println!("by source:");
    for (source, count) in &stats.jobs_by_source {
        println!("  {source}: {count}");
    }

    let runs = store.recent_run_reports(2).await?;
    match runs.as_slice() {
        [latest, previous, ..] => println!("{}", run_delta(latest, Some(previous))),
        [latest] => println!("{}", run_delta(latest, None)),
        [] => println!("no runs recorded yet"),
    }
    Ok(())
}

fn run_delta(latest: &RunReport, previous: Option<&RunReport>) -> String {
    let mut line = format!(
        "last run {} at {}: {} active, {} new",
        latest.run_id,
        latest.finished_at.format("%Y-%m-%d %H:%M UTC"),
        latest.active_total,
        latest.new_job_urls.len()
    );
    if let Some(prev) = previous {
        let delta = latest.active_total as i64 - prev.active_total as i64;
        line.push_str(&format!(" ({delta:+} vs previous run)"));
    }
    line
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn sync_is_the_default_and_sources_repeat() {
        let cli = Cli::try_parse_from(["rja-cli"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["rja-cli", "sync", "--source", "a", "--source", "b"]).unwrap();
        match cli.command {
            Some(Commands::Sync { sources }) => assert_eq!(sources, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn review_subcommands_parse() {
        let cli = Cli::try_parse_from(["rja-cli", "review", "unquarantine", "42"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Review {
                action: ReviewAction::Unquarantine { id: 42 }
            })
        ));
        let cli = Cli::try_parse_from(["rja-cli", "audit"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Audit { delete: false })));
    }

    #[test]
    fn delta_compares_active_totals() {
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).single().unwrap();
        let mut prev = RunReport::new(Uuid::nil(), at);
        prev.active_total = 40;
        let mut latest = RunReport::new(Uuid::nil(), at);
        latest.active_total = 37;
        latest.new_job_urls = vec!["https://x/1".into()];

        let line = run_delta(&latest, Some(&prev));
        assert!(line.contains("37 active, 1 new"));
        assert!(line.ends_with("(-3 vs previous run)"));
        assert!(!run_delta(&latest, None).contains("previous"));
    }
}
