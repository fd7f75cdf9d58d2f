//! gameinfo-scan - print what the game info cache learns about game paths
//!
//! # Usage
//!
//! ```bash
//! # Title, ID, region and sizes of two installed games
//! gameinfo-scan ~/.local/share/Nethercore/games/puzzle ~/games/racer
//!
//! # Machine-readable output
//! gameinfo-scan --json ~/games/*
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use nethercore_gameinfo::{
    Backend, FileType, GameInfo, GameInfoCache, GameRegion, LocalFileSystem, ManifestParser,
    WantFlags, config,
};

/// Scan game directories through the game info cache
#[derive(Parser)]
#[command(name = "gameinfo-scan")]
#[command(about = "Print metadata and sizes of installed games")]
#[command(version)]
struct Args {
    /// Game directories to scan
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Data directory with saves/, install/ and configs/ (defaults to the
    /// platform data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Number of loader threads (overrides gameinfo.toml)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Also load background images and sounds
    #[arg(long)]
    assets: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    path: PathBuf,
    title: String,
    id: String,
    version: String,
    region: GameRegion,
    identified: bool,
    disc: (i32, i32),
    game_size: u64,
    save_data_size: u64,
    install_data_size: u64,
    save_data_dirs: Vec<PathBuf>,
    has_config: bool,
    icon: bool,
    background: bool,
    sound: bool,
}

impl Summary {
    fn from_info(info: &GameInfo) -> Self {
        let save_data_dirs = info.get_save_data_directories();
        let state = info.lock();
        Self {
            path: info.path().to_path_buf(),
            title: state.title().to_string(),
            id: state.id.clone(),
            version: state.id_version.clone(),
            region: state.region,
            identified: state.file_type != FileType::Unknown,
            disc: (state.disc_number, state.disc_total),
            game_size: state.game_size(),
            save_data_size: state.save_data_size(),
            install_data_size: state.install_data_size(),
            save_data_dirs,
            has_config: state.has_config,
            icon: info.icon_loaded(),
            background: info.background_loaded(),
            sound: info.sound_loaded(),
        }
    }

    fn print(&self) {
        println!("{}", self.path.display());
        println!("  Title:   {}", self.title);
        if !self.identified {
            println!("  (not a recognized game directory)");
            return;
        }
        println!("  ID:      {} v{}", self.id, self.version);
        println!("  Region:  {:?}", self.region);
        if self.disc.1 > 1 {
            println!("  Disc:    {} of {}", self.disc.0, self.disc.1);
        }
        println!("  Size:    {}", format_bytes(self.game_size));
        println!(
            "  Saves:   {} in {} dir(s)",
            format_bytes(self.save_data_size),
            self.save_data_dirs.len()
        );
        println!("  Install: {}", format_bytes(self.install_data_size));
        println!(
            "  Assets:  icon={} background={} sound={} config={}",
            self.icon, self.background, self.sound, self.has_config
        );
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let data_dir = args
        .data_dir
        .or_else(config::data_dir)
        .context("could not determine a data directory; pass --data-dir")?;
    let mut cache_config = config::load();
    if let Some(threads) = args.threads {
        cache_config.worker_threads = threads;
    }

    let backend = Backend::new(
        Arc::new(LocalFileSystem::from_data_dir(&data_dir)),
        Arc::new(ManifestParser),
    );
    let cache = GameInfoCache::new(backend, cache_config).context("failed to start workers")?;

    let mut want = WantFlags::SIZE;
    if args.assets {
        want |= WantFlags::BACKGROUND | WantFlags::SOUND;
    }

    // Queue everything first so the workers run while we wait
    let infos: Vec<_> = args
        .paths
        .iter()
        .map(|path| cache.get_info(None, path, want))
        .collect();

    let summaries: Vec<_> = infos
        .iter()
        .map(|info| {
            cache.wait_until_done(info);
            Summary::from_info(info)
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        for summary in &summaries {
            summary.print();
        }
    }
    Ok(())
}
