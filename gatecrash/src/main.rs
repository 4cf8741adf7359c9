use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use gatecrash::targets::load_targets_from_file;
use gatecrash_engine::{AuditConfig, Orchestrator, RunLog, TargetOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    if !quiet {
        print_banner();
    }

    tracing_subscriber::fmt::init();

    if let Err(e) = run(&chosen_command, quiet).await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn print_banner() {
    let banner = r#"
                 _                                 _
   __ _    __ _ | |_  ___   ___  _ __  __ _  ___ | |__
  / _` |  / _` || __|/ _ \ / __|| '__|/ _` |/ __|| '_ \
 | (_| | | (_| || |_|  __/| (__ | |  | (_| |\__ \| | | |
  \__, |  \__,_| \__|\___| \___||_|   \__,_||___/|_| |_|
  |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  weak-credential login auditor v{}",
        env!("CARGO_PKG_VERSION")
    );
    println!(
        "  {}\n",
        "only audit systems you are authorized to test".yellow()
    );
}

async fn run(matches: &ArgMatches, quiet: bool) -> Result<()> {
    let config = build_config(matches)?;
    let targets = collect_targets(matches)?;
    if targets.is_empty() {
        bail!("target list is empty after filtering");
    }

    let log_dir = shellexpand::tilde(
        matches
            .get_one::<String>("log-dir")
            .map(String::as_str)
            .unwrap_or("logs"),
    )
    .to_string();
    let log = RunLog::new(&log_dir)
        .with_context(|| format!("creating log directory under {log_dir}"))?;

    let orchestrator = Orchestrator::new(Arc::new(config), log);

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(targets.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let started = Instant::now();
    let mut outcomes = Vec::with_capacity(targets.len());
    for (index, url) in targets.iter().enumerate() {
        bar.set_message(url.clone());
        let outcome = orchestrator.run_target(index as u64 + 1, url).await;
        outcomes.push((url.clone(), outcome));
        bar.inc(1);
    }
    bar.finish_and_clear();

    print_summary(&outcomes, started.elapsed().as_secs());
    Ok(())
}

/// Layer the CLI flags over the file-or-default configuration.
fn build_config(matches: &ArgMatches) -> Result<AuditConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => AuditConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => AuditConfig::default(),
    };

    if let Some(threads) = matches.get_one::<usize>("threads") {
        config.timing.max_workers = *threads;
    }
    if let Some(proxy) = matches.get_one::<String>("proxy") {
        config.proxy = Some(proxy.clone());
    }
    if let Some(list) = matches.get_one::<String>("user-list") {
        config.dictionary.username_file = Some(PathBuf::from(shellexpand::tilde(list).to_string()));
    }
    if let Some(list) = matches.get_one::<String>("pass-list") {
        config.dictionary.password_file = Some(PathBuf::from(shellexpand::tilde(list).to_string()));
    }
    if matches.get_flag("sql-injection") {
        config.dictionary.sql_injection.always = true;
    }

    config.validate()?;
    Ok(config)
}

fn collect_targets(matches: &ArgMatches) -> Result<Vec<String>> {
    if let Some(url) = matches.get_one::<url::Url>("url") {
        return Ok(vec![url.to_string()]);
    }
    if let Some(path) = matches.get_one::<PathBuf>("targets-file") {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
        return load_targets_from_file(&PathBuf::from(expanded));
    }
    bail!("provide either --url or --targets-file");
}

fn print_summary(outcomes: &[(String, TargetOutcome)], elapsed_secs: u64) {
    let mut cracked = 0usize;
    let mut not_found = 0usize;
    let mut timed_out = 0usize;
    let mut failed = 0usize;

    println!("\n{}", "audit summary".bold());
    for (url, outcome) in outcomes {
        match outcome {
            TargetOutcome::Cracked { username, password } => {
                cracked += 1;
                println!(
                    "  {} {}  {}",
                    "✓".green().bold(),
                    url,
                    format!("{username} / {password}").green()
                );
            }
            TargetOutcome::NotFound => {
                not_found += 1;
                println!("  {} {}  {}", "·".white(), url, "no weak credentials".white());
            }
            TargetOutcome::Timeout => {
                timed_out += 1;
                println!("  {} {}  {}", "⏱".yellow(), url, "budget exceeded".yellow());
            }
            TargetOutcome::Failed(reason) => {
                failed += 1;
                println!("  {} {}  {}", "✗".red(), url, reason.red());
            }
        }
    }
    println!(
        "\n  {} cracked, {} clean, {} timed out, {} failed in {}s",
        cracked.to_string().green(),
        not_found,
        timed_out,
        failed,
        elapsed_secs
    );
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
