mod analysis;
mod config;
mod gate;
mod github;
mod monitor;
mod rating;
mod report;
mod sonar;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use gate::{GateOutcome, QualityGate};

/// sonar-gate: publishes the SonarQube analysis of a GitHub Pull Request as
/// a status report and inline review, and exits non-zero unless the gate
/// passes.
#[derive(Parser, Debug)]
#[command(name = "sonar-gate", version, about)]
struct Cli {
    /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
    pr_url: String,

    /// Config file path (defaults to .sonar-gate.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also write the rendered report to this markdown file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// SonarQube project key, overrides the config file
    #[arg(long)]
    project_key: Option<String>,

    /// SonarQube pull request key, if it differs from the PR number
    #[arg(long)]
    pull_request: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let _main_span = info_span!("sonar_gate", pr_url = %cli.pr_url).entered();

    info!("parsing PR URL");
    let pr_url = github::parse_pr_url(&cli.pr_url)?;
    debug!(owner = %pr_url.owner, repo = %pr_url.repo, pr = pr_url.pr_number, "parsed PR URL");

    info!("loading configuration");
    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.project_key.is_some() {
        config.sonar.project_key = cli.project_key.clone();
    }

    let pull_request = cli
        .pull_request
        .clone()
        .unwrap_or_else(|| pr_url.pr_number.to_string());

    let sonar = sonar::SonarClient::new(&config, pull_request.clone())?;
    let renderer = report::ReportRenderer::new(sonar.host(), sonar.project_key());
    let git = github::GitHubClient::new(pr_url, &config)?;

    let mut quality_gate = QualityGate::new(
        Arc::new(sonar),
        Arc::new(git),
        renderer,
        pull_request.clone(),
    )
    .with_retry_delay(config.retry_delay());
    if let Some(monitor) = monitor::MonitorClient::from_config(&config, pull_request) {
        info!("metrics forwarding enabled");
        quality_gate = quality_gate.with_monitor(Arc::new(monitor));
    }

    let run = quality_gate.run().await?;

    if let (Some(path), Some(markdown)) = (cli.output.as_deref(), run.report.as_deref()) {
        report::output(markdown, path)?;
    }

    if let Some(counts) = run.counts {
        println!("{}", tally_line(&counts));
    }
    println!("Quality gate: {}", colorize_outcome(run.outcome));
    info!(outcome = %run.outcome, "done");

    Ok(if run.outcome.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn tally_line(counts: &analysis::AggregateCounts) -> String {
    format!(
        "Bugs: {}  Vulnerabilities: {}  Code smells: {}  Closed: {}  Hotspots: {}",
        counts.bug_count,
        counts.vulnerability_count,
        counts.code_smell_count,
        counts.closed_count,
        counts.hotspot_count
    )
}

fn colorize_outcome(outcome: GateOutcome) -> colored::ColoredString {
    match outcome {
        GateOutcome::Pass => "PASS".green().bold(),
        GateOutcome::Fail => "FAIL".red().bold(),
        GateOutcome::Inconclusive => "INCONCLUSIVE".yellow().bold(),
    }
}
