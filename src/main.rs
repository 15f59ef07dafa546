use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use radar::{
    utils::Logger, LogDispatch, Radar, RadarConfig, ScanMode, Task, TaskOption, TaskStatus,
};

// Ulimit adjustment for Unix systems
#[cfg(unix)]
fn adjust_ulimit_size(ulimit: Option<u64>) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            println!(
                "{} {}",
                "[~] Automatically increasing ulimit value to".bright_blue(),
                limit.to_string().bright_cyan().bold()
            );
        } else {
            eprintln!("{}", "[!] ERROR: Failed to set ulimit value.".bright_red());
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(_) => {
            eprintln!("{}", "[!] WARNING: Could not get file descriptor limit".bright_yellow());
            65535
        }
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_ulimit: Option<u64>) -> u64 {
    65535
}

fn build_cli() -> Command {
    Command::new("radar")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Network reconnaissance: host discovery, port scan and service dispatch")
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("TARGET")
                .help("Targets: comma separated addresses, CIDR blocks or ranges")
                .required(true),
        )
        .arg(
            Arg::new("exclude")
                .short('e')
                .long("exclude")
                .value_name("TARGETS")
                .help("Addresses to skip, same syntax as --target"),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("PORTS")
                .help("Ports and presets, e.g. top1000,8000-9000 (presets: top200, top1000, top5000)"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Scan mode: syn or connect")
                .value_parser(["syn", "connect", "tcp"]),
        )
        .arg(
            Arg::new("rate")
                .short('r')
                .long("rate")
                .value_name("PPS")
                .help("Probes per second (1-1000)")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("MS")
                .help("Probe timeout in milliseconds (100-10000)")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("ping")
                .long("ping")
                .help("Skip hosts that fail a liveness probe")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("pool-ping")
                .long("pool-ping")
                .value_name("N")
                .help("Concurrent liveness probes")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("pool-scan")
                .long("pool-scan")
                .value_name("N")
                .help("Hosts scanned concurrently")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("pool-finger")
                .long("pool-finger")
                .value_name("N")
                .help("Concurrent fingerprint dispatches")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("exclude-time")
                .long("exclude-time")
                .value_name("MODE,BEGIN,END")
                .help("Pause inside this window, e.g. daily,09:00,18:00 (modes: daily, every-workday, business-hours-broad)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (default ~/.radar.toml)"),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Automatically increase ulimit to this value")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Do not draw the progress bar")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Verbose task logging")
                .action(ArgAction::SetTrue),
        )
}

fn load_config(path: Option<&String>) -> anyhow::Result<RadarConfig> {
    match path {
        Some(path) => RadarConfig::from_toml_file(path)
            .with_context(|| format!("cannot load config {}", path)),
        None => Ok(RadarConfig::load_default_config()),
    }
}

fn task_option(matches: &clap::ArgMatches, config: &RadarConfig) -> radar::Result<TaskOption> {
    let target = matches
        .get_one::<String>("target")
        .cloned()
        .unwrap_or_default();
    let mut option = config.new_task_option(target);

    if let Some(exclude) = matches.get_one::<String>("exclude") {
        option.set_exclude_target(exclude);
    }
    if let Some(ports) = matches.get_one::<String>("ports") {
        option.port = ports.clone();
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        option.mode = mode.parse::<ScanMode>().unwrap_or_default();
    }
    if let Some(&rate) = matches.get_one::<u32>("rate") {
        option.set_rate(rate);
    }
    if let Some(&timeout) = matches.get_one::<u64>("timeout") {
        option.set_timeout(timeout);
    }
    if matches.get_flag("ping") {
        option.ping = true;
    }
    if let Some(&n) = matches.get_one::<usize>("pool-ping") {
        option.set_pool_ping(n);
    }
    if let Some(&n) = matches.get_one::<usize>("pool-scan") {
        option.set_pool_scan(n);
    }
    if let Some(&n) = matches.get_one::<usize>("pool-finger") {
        option.set_pool_finger(n);
    }
    if let Some(window) = matches.get_one::<String>("exclude-time") {
        option.set_exclude_time_range(window)?;
    }
    if matches.get_flag("debug") {
        option.debug = true;
    }
    option.validate()?;
    Ok(option)
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    bar.set_style(style);
    bar
}

async fn watch_progress(task: Arc<Task>, bar: ProgressBar) {
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        ticker.tick().await;
        let info = task.info();
        bar.set_length(info.task_all_num);
        bar.set_position(info.task_success_num);
        bar.set_message(format!("{} open, {}", info.task_asset_num, info.status));
        if info.status.is_terminal() {
            break;
        }
    }
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let debug = matches.get_flag("debug");
    Logger::init(if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let fd_limit = adjust_ulimit_size(matches.get_one::<u64>("ulimit").copied());
    log::debug!("file descriptor limit {}", fd_limit);

    let mut config = match load_config(matches.get_one::<String>("config")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "[!] ERROR:".bright_red(), e);
            process::exit(1);
        }
    };
    config.debug |= debug;

    let option = match task_option(&matches, &config) {
        Ok(option) => option,
        Err(e) => {
            eprintln!("{} {}", "[!] ERROR:".bright_red(), e);
            process::exit(1);
        }
    };

    if option.mode.requires_raw_socket()
        && !radar::network::protocol::NetworkUtils::has_raw_socket_privilege()
    {
        eprintln!(
            "{}",
            "[!] WARNING: SYN scan needs root, the task will fail. Use --mode connect.".bright_yellow()
        );
    }

    println!(
        "{} {} {} {}",
        "[~] Scanning".bright_blue(),
        option.target.bright_cyan().bold(),
        "ports".bright_blue(),
        option.port.bright_cyan()
    );

    let radar = Radar::new(config);
    let task = match radar.start_task(option, Arc::new(LogDispatch)).await {
        Ok(task) => task,
        Err(e) => {
            eprintln!("{} {}", "[!] ERROR:".bright_red(), e);
            process::exit(1);
        }
    };

    let bar = progress_bar(matches.get_flag("no-progress"));
    let progress = tokio::spawn(watch_progress(Arc::clone(&task), bar.clone()));

    let status = tokio::select! {
        status = radar.wait() => status,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", "[!] Interrupted, waiting for in-flight probes...".bright_yellow());
            radar.cancel().await;
            radar.wait().await
        }
    };

    let _ = progress.await;
    bar.finish_and_clear();

    match task.info().to_json_pretty() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("{} {}", "[!] ERROR:".bright_red(), e),
    }

    if status == Some(TaskStatus::Error) {
        process::exit(1);
    }
}
