mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use udp_core::{
    build_client, notification_channel, run_check_cycle, AlertDispatcher, CheckConfig,
    CheckReport, Monitor, StreamConfig, StreamStatus, UdpProbe,
};

/// UDP stream monitor: check that unicast and multicast feeds are delivering.
#[derive(Parser)]
#[command(name = "udp-monitor", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configured streams on a fixed interval and alert on failures.
    Run {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Status API listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Check the given stream URLs once and print the result.
    Check {
        /// Stream URLs (udp://host:port).
        #[arg(required = true)]
        urls: Vec<String>,

        /// Receive timeout per attempt in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Retries after the first failed attempt.
        #[arg(long, default_value_t = 2)]
        retries: u32,

        /// Delay between attempts in milliseconds.
        #[arg(long, default_value_t = 2_000)]
        retry_delay_ms: u64,

        /// Report a stream UP as soon as its port can be bound.
        #[arg(long, default_value_t = false)]
        no_require_data: bool,

        /// Print the report as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, listen } => {
            run_monitor(config, listen).await;
        }
        Commands::Check {
            urls,
            timeout_ms,
            retries,
            retry_delay_ms,
            no_require_data,
            json,
        } => {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .with_writer(std::io::stderr)
                .init();

            let config = CheckConfig::default()
                .with_timeout(timeout_ms)
                .with_retry_attempts(retries)
                .with_retry_delay(retry_delay_ms)
                .with_require_data(!no_require_data);

            let all_up = run_check(urls, config, json).await;
            if !all_up {
                std::process::exit(1);
            }
        }
    }
}

async fn run_monitor(config_path: PathBuf, listen_override: Option<SocketAddr>) {
    let app_config = match config::AppConfig::load(&config_path) {
        Ok(c) => {
            init_tracing(&c.server.log_format);
            tracing::info!(path = %config_path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let listen = listen_override.or(app_config.server.listen);
    let check_config = app_config.check.to_check_config();
    let streams = app_config.to_stream_configs();
    let targets = app_config.alert_targets();

    let (notification_tx, notification_rx) = notification_channel();

    let dispatcher_handle = if !targets.is_empty() {
        let dispatcher = AlertDispatcher::new(notification_rx, targets, build_client());
        let handle = tokio::spawn(dispatcher.run());
        tracing::info!("Alert dispatcher started");
        handle
    } else {
        tracing::info!("No alert targets configured, failures are only logged");
        tokio::spawn(async move {
            let mut rx = notification_rx;
            while rx.recv().await.is_some() {}
        })
    };

    let monitor = Arc::new(Monitor::new(
        streams,
        check_config.clone(),
        Arc::new(UdpProbe::new()),
        Some(notification_tx),
    ));

    if let Err(e) = monitor.start().await {
        tracing::error!(error = %e, "Failed to start monitor");
        std::process::exit(1);
    }
    tracing::info!(
        streams = monitor.streams().len(),
        interval_ms = check_config.check_interval.as_millis() as u64,
        timeout_ms = check_config.timeout.as_millis() as u64,
        retry_attempts = check_config.retry_attempts,
        "Monitor started"
    );

    match listen {
        Some(addr) => {
            let state = udp_api::state::AppState::new(monitor.clone());
            if let Err(e) =
                udp_api::serve_with_state(addr, state, udp_api::shutdown_signal()).await
            {
                tracing::error!(error = %e, "Server failed");
                monitor.stop().await;
                std::process::exit(1);
            }
        }
        None => udp_api::shutdown_signal().await,
    }

    tracing::info!("Shutdown signal received, stopping monitor...");
    monitor.stop().await;
    drop(monitor);

    // The dispatcher exits once the scheduler task releases its sender.
    match tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await {
        Ok(_) => tracing::info!("Alert dispatcher shut down"),
        Err(_) => tracing::warn!("Alert dispatcher did not shut down in time, aborting"),
    }

    tracing::info!("Shutdown complete");
}

/// Runs one check cycle over `urls`. Returns `true` when every stream is UP.
async fn run_check(urls: Vec<String>, config: CheckConfig, json: bool) -> bool {
    let streams: Vec<StreamConfig> = urls
        .into_iter()
        .enumerate()
        .map(|(i, url)| StreamConfig::new(format!("stream_{}", i + 1), url))
        .collect();

    let spinner = if json {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        if let Ok(s) = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]") {
            spinner.set_style(s);
        }
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(format!("Checking {} stream(s)...", streams.len()));
        spinner
    };

    let probe = UdpProbe::new();
    let report = run_check_cycle(&probe, &streams, &config).await;
    spinner.finish_and_clear();

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("failed to encode report: {}", e);
                return false;
            }
        }
    } else {
        print_report(&report, &config);
    }

    report.all_up()
}

fn print_report(report: &CheckReport, config: &CheckConfig) {
    println!(
        "{} {}",
        style("udp-monitor").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!(
        "  {} {}ms x{}  {} {}",
        style("timeout:").dim(),
        config.timeout.as_millis(),
        config.max_attempts(),
        style("require data:").dim(),
        config.require_data
    );
    println!();

    let name_width = report
        .verdicts
        .iter()
        .map(|v| v.name.len())
        .max()
        .unwrap_or(4)
        .max(4);

    for v in &report.verdicts {
        let status = match v.status {
            StreamStatus::Up => style(format!("{:<4}", v.status.to_string())).green().bold(),
            StreamStatus::Down => style(format!("{:<4}", v.status.to_string())).red().bold(),
        };
        let detail = match &v.failure {
            Some(kind) => format!("{}: {}", style(kind).red(), v.reason),
            None => v.reason.clone(),
        };
        println!(
            "  {:<width$}  {}  {}  {}  {}",
            v.name,
            status,
            style(&v.url).dim(),
            style(format!("attempts={}", v.attempts)).dim(),
            detail,
            width = name_width
        );
    }

    println!();
    let summary = format!(
        "{} up, {} down in {:.1}s",
        report.up_count(),
        report.down_count(),
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
    if report.all_up() {
        println!("{}", style(summary).green());
    } else {
        println!("{}", style(summary).red());
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().json().with_env_filter(filter).init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}
