use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scrobble_bridge_core::AppConfig;
use scrobble_bridge_engine::{scrobble_threshold, Controller, ControllerOptions, LogListener};
use scrobble_bridge_services::{build_roster, BasicEnricher, JsonLinesSource, MemoryStorage, SnapshotSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "scrobble-bridge",
    about = "Now Playing snapshots -> Session Controller -> scrobble services"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay JSON-lines snapshots (stdin by default) through the controller.
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the reporting threshold for a track duration in seconds.
    Threshold { duration_secs: f64 },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Commands::Run { input: None });
    let cfg_path = cli.config.unwrap_or_else(default_config_path);

    match cmd {
        Commands::Config {
            action: ConfigAction::Init,
        } => {
            init_config(&cfg_path)?;
            println!("Initialized config at {}", cfg_path.display());
            Ok(())
        }
        Commands::Threshold { duration_secs } => {
            let cfg = load_or_default(&cfg_path)?;
            let opts = ControllerOptions::from_scrobble_options(&cfg.scrobble);
            match scrobble_threshold(Some(duration_secs), opts.scrobble_percent, opts.max_scrobble) {
                Some(threshold) => println!("{:.1}s", threshold.as_secs_f64()),
                None => println!("ineligible"),
            }
            Ok(())
        }
        Commands::Run { input } => {
            let cfg = load_or_default(&cfg_path)?;
            init_logging(&cfg.log_level);
            run(cfg, cfg_path, input).await
        }
    }
}

async fn run(mut cfg: AppConfig, cfg_path: PathBuf, input: Option<PathBuf>) -> Result<()> {
    let storage = Arc::new(MemoryStorage::new());
    let controller = Controller::new(
        ControllerOptions::from_scrobble_options(&cfg.scrobble),
        Arc::new(BasicEnricher::new()),
        build_roster(&cfg.services),
        storage.clone(),
        Box::new(LogListener),
    );
    controller.set_enabled(cfg.enabled);

    let mut source: Box<dyn SnapshotSource> = match input {
        Some(path) => Box::new(JsonLinesSource::open(&path).await?),
        None => Box::new(JsonLinesSource::stdin()),
    };

    info!(services = ?cfg.services, source = source.name(), "scrobble-bridge started");

    let (reload_tx, mut reload_rx) = mpsc::channel::<()>(4);
    spawn_reload_watchers(
        cfg_path.clone(),
        cfg.intervals.file_watch_poll_ms,
        reload_tx,
    )
    .await?;

    loop {
        tokio::select! {
            next = source.next_snapshot() => {
                match next {
                    Ok(Some(snapshot)) => {
                        // Enrichment may suspend; later snapshots must still get through.
                        let controller = controller.clone();
                        tokio::spawn(async move { controller.on_snapshot(snapshot).await });
                    }
                    Ok(None) => {
                        info!("snapshot source exhausted");
                        break;
                    }
                    Err(err) => {
                        error!(error=%err, "snapshot source failed");
                        break;
                    }
                }
            }
            msg = reload_rx.recv() => {
                if msg.is_some() {
                    match load_or_default(&cfg_path) {
                        Ok(new_cfg) => {
                            if new_cfg.services != cfg.services {
                                warn!("service list changes take effect after restart");
                            }
                            cfg = new_cfg;
                            controller.update_options(ControllerOptions::from_scrobble_options(&cfg.scrobble));
                            controller.set_enabled(cfg.enabled);
                            info!("configuration reloaded");
                        }
                        Err(err) => {
                            error!(error=%err, "failed to reload config");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                break;
            }
        }
    }

    // Let in-flight snapshot tasks settle before reporting.
    tokio::task::yield_now().await;

    let status = serde_json::to_string_pretty(&controller.status())?;
    println!("{status}");
    for queued in storage.queued() {
        println!(
            "queued: {} - {} -> {:?}",
            queued.song.artist().unwrap_or("?"),
            queued.song.track().unwrap_or("?"),
            queued.services.iter().map(|s| s.as_str()).collect::<Vec<_>>()
        );
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("scrobble-bridge").join("config.toml")
}

fn init_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let cfg = AppConfig::default();
    let toml = toml::to_string_pretty(&cfg)?;
    std::fs::write(path, toml)
        .with_context(|| format!("failed to write config file {}", path.display()))?;
    Ok(())
}

fn load_or_default(path: &Path) -> Result<AppConfig> {
    let mut cfg = if !path.exists() {
        AppConfig::default()
    } else {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))?
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn spawn_reload_watchers(path: PathBuf, poll_ms: u64, tx: mpsc::Sender<()>) -> Result<()> {
    let tx_poll = tx.clone();
    tokio::spawn(async move {
        let mut known_mtime = file_mtime(&path);
        let sleep = Duration::from_millis(poll_ms.max(2_000));
        loop {
            tokio::time::sleep(sleep).await;
            let current = file_mtime(&path);
            if current.is_some() && current != known_mtime {
                known_mtime = current;
                let _ = tx_poll.send(()).await;
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let tx_hup = tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sig) = signal(SignalKind::hangup()) {
                while sig.recv().await.is_some() {
                    let _ = tx_hup.send(()).await;
                }
            }
        });
    }

    Ok(())
}

fn file_mtime(path: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(path).ok()?.modified().ok()
}

fn apply_env_overrides(cfg: &mut AppConfig) {
    if let Ok(v) = std::env::var("SCROBBLE_BRIDGE_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.log_level = v;
        }
    }
    if let Ok(v) = std::env::var("SCROBBLE_BRIDGE_PERCENT") {
        if let Ok(parsed) = v.trim().parse::<u8>() {
            cfg.scrobble.percent = parsed.min(100);
        }
    }
    if let Ok(v) = std::env::var("SCROBBLE_BRIDGE_SCROBBLE_PODCASTS") {
        if let Ok(parsed) = v.parse::<bool>() {
            cfg.scrobble.scrobble_podcasts = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{init_config, load_or_default};

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.scrobble.max_scrobble_secs, 240);
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        init_config(&path).unwrap();
        let cfg = load_or_default(&path).unwrap();
        assert_eq!(cfg.services, vec!["lastfm", "listenbrainz"]);
    }

    #[test]
    fn malformed_config_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "enabled = [").unwrap();
        let err = load_or_default(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
