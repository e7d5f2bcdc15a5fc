use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use segdl::config::Settings;
use segdl::core::engine::Engine;
use segdl::core::events::EngineEvent;
use segdl::core::model::{TaskId, TaskStatus};
use segdl::plugins::registry::{DownloadCliConfig, ProtocolRegistry};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn build_cli(registry: &ProtocolRegistry) -> Command {
    let download = Command::new("download")
        .about("Download one or more links")
        .arg(
            Arg::new("links")
                .help("Links to download (http, https, ftp)")
                .action(ArgAction::Append)
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("out_dir")
                .long("out-dir")
                .help("Output directory (default: from settings, else ./downloads)")
                .num_args(1),
        )
        .arg(
            Arg::new("segments")
                .long("segments")
                .help("Segments per download")
                .num_args(1),
        )
        .arg(
            Arg::new("max_concurrent")
                .long("max-concurrent")
                .help("Downloads running at the same time")
                .num_args(1),
        )
        .arg(
            Arg::new("speed_limit")
                .long("speed-limit")
                .help("Global speed cap in bytes per second (0 = unlimited)")
                .num_args(1),
        );

    let download = registry.augment_download_command(download);

    Command::new("segdl")
        .about("Segmented, resumable downloader (HTTP + FTP)")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("Settings file (JSON)")
                .default_value("segdl.json")
                .global(true)
                .num_args(1),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Debug logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(download)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_opt<T: std::str::FromStr>(m: &ArgMatches, key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    m.get_one::<String>(key)
        .map(|s| s.parse::<T>().with_context(|| format!("invalid --{}: {}", key.replace('_', "-"), s)))
        .transpose()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = ProtocolRegistry::with_defaults()?;
    let matches = build_cli(&registry).get_matches();
    init_tracing(matches.get_flag("verbose"));

    match matches.subcommand() {
        Some(("download", m)) => {
            let config_path: PathBuf = m
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("segdl.json"));
            let mut settings = Settings::load(&config_path)?;

            if let Some(dir) = m.get_one::<String>("out_dir") {
                settings.download_dir = dir.into();
            }
            if let Some(n) = parse_opt::<usize>(m, "segments")? {
                settings.segment_count = n;
            }
            if let Some(n) = parse_opt::<usize>(m, "max_concurrent")? {
                settings.max_concurrent_downloads = n;
            }
            if let Some(n) = parse_opt::<u32>(m, "speed_limit")? {
                settings.speed_limit_bps = (n > 0).then_some(n);
            }

            let mut cfg = DownloadCliConfig {
                headers: HashMap::new(),
                options: HashMap::new(),
                driver_ctx: settings.driver_context(),
            };
            registry.apply_download_matches(m, &mut cfg)?;
            let registry = registry.with_context(cfg.driver_ctx.clone());

            let engine = Engine::new(registry, &settings).await?;
            let links: Vec<String> = m
                .get_many::<String>("links")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();

            let ui = spawn_ui(engine.subscribe());
            let ticker = engine.spawn_progress_driver(Duration::from_millis(500));

            let mut ids = vec![];
            for link in links {
                let mut req = engine.request(link.clone());
                req.headers = cfg.headers.clone();
                req.options = cfg.options.clone();
                match engine.add_download(req, true).await {
                    Ok(id) => ids.push(id),
                    Err(e) => tracing::error!(link = %link, error = %e, "cannot add download"),
                }
            }

            tokio::select! {
                _ = engine.wait_until_idle() => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::warn!("interrupted, pausing downloads");
                    engine.pause_all().await;
                }
            }
            ticker.abort();
            ui.abort();

            println!();
            println!("Summary:");
            let mut failed = false;
            for id in ids {
                let Some(t) = engine.task(id) else { continue };
                let total_s = t.total_size.map(fmt_bytes).unwrap_or_else(|| "?".to_string());
                println!(
                    "- {} status={:?} {} / {} segments={} path={}",
                    t.url,
                    t.status,
                    fmt_bytes(t.progress.downloaded_bytes),
                    total_s,
                    t.segments.len(),
                    t.file_path().display(),
                );
                if let Some(e) = &t.error {
                    println!("  error: {}", e);
                }
                failed |= t.status != TaskStatus::Completed;
            }
            if failed {
                std::process::exit(1);
            }
        }
        _ => {}
    }

    Ok(())
}

fn spawn_ui(mut rx: tokio::sync::broadcast::Receiver<EngineEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mp = MultiProgress::new();
        let sty_spin = ProgressStyle::with_template("{spinner:.green} {prefix} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("|/-\\ ");
        let sty_bar = ProgressStyle::with_template(
            "{prefix} {bar:40.cyan/blue} {bytes}/{total_bytes} ({binary_bytes_per_sec}, eta {eta}) {wide_msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());

        let mut bars: HashMap<TaskId, ProgressBar> = HashMap::new();
        loop {
            let evt = match rx.recv().await {
                Ok(e) => e,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            };
            match evt {
                EngineEvent::TaskAdded { task_id, filename, target_path, url } => {
                    let pb = mp.add(ProgressBar::new_spinner());
                    pb.set_style(sty_spin.clone());
                    pb.set_prefix(format!("[{filename}]"));
                    pb.enable_steady_tick(Duration::from_millis(120));
                    pb.set_message(format!("added -> {} ({})", target_path.display(), url));
                    bars.insert(task_id, pb);
                }
                EngineEvent::TaskRemoved { task_id } => {
                    if let Some(pb) = bars.remove(&task_id) {
                        pb.finish_and_clear();
                    }
                }
                EngineEvent::TaskStatusChanged { task_id, new, .. } => {
                    let Some(pb) = bars.get(&task_id) else { continue };
                    match new {
                        TaskStatus::Completed => pb.finish_with_message("done"),
                        TaskStatus::Error => pb.abandon_with_message("failed"),
                        TaskStatus::Canceled => pb.abandon_with_message("canceled"),
                        other => pb.set_message(format!("{:?}", other).to_lowercase()),
                    }
                }
                EngineEvent::Progress { task_id, progress } => {
                    let Some(pb) = bars.get(&task_id) else { continue };
                    if let Some(t) = progress.total_bytes {
                        if pb.length() != Some(t) {
                            pb.set_style(sty_bar.clone());
                            pb.set_length(t);
                        }
                        pb.set_position(progress.downloaded_bytes.min(t));
                        pb.set_message(format!("avg {}/s", fmt_bytes(progress.average_speed_bps)));
                    } else {
                        pb.set_message(format!(
                            "{} | {}/s",
                            fmt_bytes(progress.downloaded_bytes),
                            fmt_bytes(progress.speed_bps)
                        ));
                    }
                }
            }
        }
    })
}

fn fmt_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    let f = n as f64;
    if f >= GB {
        format!("{:.2}GiB", f / GB)
    } else if f >= MB {
        format!("{:.2}MiB", f / MB)
    } else if f >= KB {
        format!("{:.2}KiB", f / KB)
    } else {
        format!("{}B", n)
    }
}
