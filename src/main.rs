use std::error::Error as _;

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use tracing::info;
use tracing_subscriber::EnvFilter;

use uring_probe::native::{NativeLayer, SystemNative};
use uring_probe::{ProbeConfig, UnavailabilityCause, MIN_KERNEL_VERSION, NO_NATIVE_ENV};

/// 解析命令行参数
fn build_cli() -> Command {
    Command::new("uring-probe")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Report whether the io_uring native transport can be used on this host")
        .arg(
            Arg::new("require")
                .short('r')
                .long("require")
                .help("Exit with an error when io_uring is unavailable")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log_level")
                .short('l')
                .long("log-level")
                .help("Log level used when RUST_LOG is not set")
                .value_name("LEVEL")
                .default_value("info")
                .action(ArgAction::Set),
        )
}

/// 初始化日志系统
fn init_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();
}

fn describe_cause(cause: &UnavailabilityCause) -> String {
    let mut description = cause.to_string();
    let mut source = cause.source();
    while let Some(inner) = source {
        description.push_str(": ");
        description.push_str(&inner.to_string());
        source = inner.source();
    }
    description
}

fn print_report() {
    let config = ProbeConfig::from_env();
    let release = SystemNative::new(&config)
        .kernel_version()
        .unwrap_or_else(|e| format!("unknown ({})", e));

    println!("kernel release:          {}", release);
    println!("minimum kernel version:  {}", MIN_KERNEL_VERSION);
    println!("{}: {}", NO_NATIVE_ENV, config.no_native);
    println!("io_uring available:      {}", uring_probe::is_available());
    if let Some(cause) = uring_probe::unavailability_cause() {
        println!("unavailability cause:    {}", describe_cause(cause));
    }
    println!(
        "tcp fastopen client:     {}",
        uring_probe::is_tcp_fastopen_client_side_available()
    );
    println!(
        "tcp fastopen server:     {}",
        uring_probe::is_tcp_fastopen_server_side_available()
    );
}

fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let log_level = matches
        .get_one::<String>("log_level")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level);

    print_report();

    if matches.get_flag("require") {
        uring_probe::ensure_availability().context("io_uring is required but unavailable")?;
        info!("io_uring is available");
    }

    Ok(())
}
