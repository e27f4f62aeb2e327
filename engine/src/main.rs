//! Rollout - Entry Point
//!
//! Quick deployment service that fans application releases out to Jenkins.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rollout::app::options::{AppOptions, LifecycleOptions, ServerOptions};
use rollout::app::run::run;
use rollout::deploy::orchestrator;
use rollout::filesys::file::File;
use rollout::http::pool::{self, ServerEntry};
use rollout::logs::{init_logging, LogOptions};
use rollout::storage::layout::StorageLayout;
use rollout::storage::settings::Settings;
use rollout::utils::version_info;
use rollout::workers::task_runner;

use anyhow::{bail, Context};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return;
    }

    // Relative paths in the settings resolve against the settings directory
    let config = cli_args.get("config").map(PathBuf::from);
    let layout = match (cli_args.get("base-dir"), config.as_deref().and_then(Path::parent)) {
        (Some(dir), _) => StorageLayout::new(dir),
        (None, Some(dir)) if !dir.as_os_str().is_empty() => StorageLayout::new(dir),
        _ => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings_file = match config {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = match load_settings(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    if cli_args.contains_key("check-config") {
        println!(
            "Settings OK: {} build servers, catalog {}",
            settings.build_servers.len(),
            layout.resolve(&settings.catalog_file).display()
        );
        return;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings.log_to_file.then(|| layout.logs_dir()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let (options, servers) = app_options(layout, settings);

    info!("Running rollout with options: {:?}", options);
    let result = run(version.version, options, servers, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run: {e}");
        std::process::exit(1);
    }
}

async fn load_settings(file: &File) -> anyhow::Result<Settings> {
    let settings: Settings = file
        .read_json()
        .await
        .with_context(|| format!("unable to read settings file {}", file.path().display()))?;

    for server in &settings.build_servers {
        if server.id == 0 {
            bail!("build server \"{}\" must have a non-zero id", server.alias);
        }
    }
    Ok(settings)
}

fn app_options(layout: StorageLayout, settings: Settings) -> (AppOptions, Vec<ServerEntry>) {
    let runner = &settings.runner;
    let max_shutdown_delay = Duration::from_secs(settings.max_shutdown_delay_secs);

    let options = AppOptions {
        lifecycle: LifecycleOptions { max_shutdown_delay },
        layout,
        catalog_file: settings.catalog_file.clone(),
        server: ServerOptions {
            host: settings.server.host.clone(),
            port: settings.server.port,
        },
        pool: pool::Options {
            max_concurrent_requests: runner.max_concurrent_requests,
            request_timeout: Duration::from_secs(runner.request_timeout_secs),
        },
        task_runner: task_runner::Options {
            queue_poll_interval: Duration::from_secs(runner.queue_poll_interval_secs),
            queue_timeout: Duration::from_secs(runner.queue_timeout_secs),
            poll_interval: Duration::from_secs(runner.poll_interval_secs),
            build_timeout: Duration::from_secs(runner.build_timeout_secs),
            max_retries: runner.max_retries,
            backoff: runner.backoff(),
        },
        orchestrator: orchestrator::Options {
            protected_environments: settings.protected_environments.clone(),
            campaign_timeout: settings.campaign_timeout_secs.map(Duration::from_secs),
            // Leave room for the server to drain within the shutdown delay
            stop_wait: max_shutdown_delay / 2,
            ..Default::default()
        },
    };

    let servers = settings
        .build_servers
        .into_iter()
        .map(|server| ServerEntry {
            id: server.id,
            alias: server.alias,
            url: server.url,
            username: server.username,
            api_token: server.api_token,
        })
        .collect();

    (options, servers)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            error!("Failed to install signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
