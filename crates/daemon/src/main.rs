// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Colony simulation daemon (colonyd)
//!
//! Runs one node of a simulation: single, master, or worker, selected by
//! config or `--role`. Scenario binaries that carry handler code link
//! against `colony_daemon::lifecycle` directly; bare `colonyd` runs the
//! plumbing with handler-less agents.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;

use colony_core::NodeMode;
use colony_daemon::lifecycle::{self, LaunchConfig};
use colony_engine::ScenarioHooks;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
colonyd - colony simulation node

USAGE:
    colonyd --scene <dir> --config <file> [OPTIONS]

OPTIONS:
    --scene <dir>           Scenario directory (scene_info.json at its root)
    --config <file>         Simulator config JSON
    --overlay <file>        Config overlay merged over --config
    --model-config <file>   Model configuration JSON
    --role <role>           single | master | worker (overrides config)
    --log-dir <dir>         Write logs to a rotating file instead of stderr
    -h, --help              Print help information
    -v, --version           Print version information
";

struct Args {
    launch: LaunchConfig,
    log_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut scene: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut overlay: Option<PathBuf> = None;
    let mut model_config: Option<PathBuf> = None;
    let mut role: Option<NodeMode> = None;
    let mut log_dir: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("missing value for {name}"))
        };
        match arg.as_str() {
            "--scene" => scene = Some(PathBuf::from(value("--scene")?)),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--overlay" => overlay = Some(PathBuf::from(value("--overlay")?)),
            "--model-config" => model_config = Some(PathBuf::from(value("--model-config")?)),
            "--log-dir" => log_dir = Some(PathBuf::from(value("--log-dir")?)),
            "--role" => {
                role = Some(match value("--role")?.as_str() {
                    "single" => NodeMode::Single,
                    "master" => NodeMode::Master,
                    "worker" => NodeMode::Worker,
                    other => return Err(format!("unknown role '{other}'")),
                })
            }
            "--help" | "-h" | "help" => {
                println!("colonyd {}", env!("CARGO_PKG_VERSION"));
                println!("{USAGE}");
                std::process::exit(0);
            }
            "--version" | "-V" | "-v" => {
                println!("colonyd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }

    let scene = scene.ok_or("--scene is required")?;
    let config = config.ok_or("--config is required")?;
    Ok(Args {
        launch: LaunchConfig {
            config_path: config,
            overlay_path: overlay,
            model_config_path: model_config,
            scene_dir: scene,
            mode_override: role,
        },
        log_dir,
    })
}

/// Set up tracing: env-filtered, to stderr or a daily-rotated file.
fn setup_logging(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,colony_net=debug"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "colonyd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    let _log_guard = setup_logging(args.log_dir.as_ref());
    info!(version = env!("CARGO_PKG_VERSION"), "colonyd starting");

    if let Err(error) = lifecycle::run(args.launch, ScenarioHooks::new()).await {
        eprintln!("colonyd failed: {error}");
        std::process::exit(1);
    }
    info!("colonyd exited cleanly");
}
