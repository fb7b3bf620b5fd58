use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::{Args, Parser, Subcommand};
use glam::Vec3;
use largemap_common::{MapConfig, ObserverId};
use largemap_kernel::LargeMapManager;
use largemap_stream::InMemoryBackend;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "largemap-cli", about = "CLI tool for large-map streaming sessions")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// YAML session config; flags below override its fields
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Tile side length
    #[arg(long, global = true)]
    tile_side: Option<f64>,
    /// Distance within which tiles stay resident
    #[arg(long, global = true)]
    streaming_distance: Option<f64>,
    /// Observer distance from the origin that triggers a rebase
    #[arg(long, global = true)]
    rebase_distance: Option<f64>,
    /// Length the origin snaps to on a rebase
    #[arg(long, global = true)]
    rebase_unit: Option<f64>,
}

impl ConfigArgs {
    fn resolve(&self) -> anyhow::Result<MapConfig> {
        let mut config = match &self.config {
            Some(path) => MapConfig::from_yaml_file(path)?,
            None => MapConfig::default(),
        };
        if let Some(tile_side) = self.tile_side {
            config.tile_side = tile_side;
        }
        if let Some(distance) = self.streaming_distance {
            config.streaming_distance = distance;
        }
        if let Some(distance) = self.rebase_distance {
            config.rebase_distance = distance;
        }
        if let Some(unit) = self.rebase_unit {
            config.rebase_unit = unit;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and crate info
    Info,
    /// Partition an asset manifest into tiles and report the result
    Generate {
        /// Manifest file or directory of manifests
        #[arg(short, long)]
        assets: PathBuf,
    },
    /// Walk observers along +X and report streaming and rebases
    Simulate {
        /// Manifest file or directory of manifests
        #[arg(short, long)]
        assets: Option<PathBuf>,
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "100")]
        ticks: u64,
        /// Observer speed in units per second
        #[arg(short, long, default_value = "500.0")]
        speed: f32,
        /// Number of observers, spaced one tile apart along Y
        #[arg(short, long, default_value = "1")]
        observers: usize,
        /// Seconds per tick
        #[arg(long, default_value = "0.1")]
        dt: f32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("largemap-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: {}", largemap_kernel::crate_info());
            println!("origin: {}", largemap_origin::crate_info());
            println!("stream: {}", largemap_stream::crate_info());
            println!("assets: {}", largemap_assets::crate_info());
            let config = cli.config.resolve()?;
            println!(
                "config: tile_side={}, streaming_distance={}, rebase_distance={}, rebase_unit={}",
                config.tile_side,
                config.streaming_distance,
                config.rebase_distance,
                config.rebase_unit
            );
        }
        Commands::Generate { assets } => {
            let config = cli.config.resolve()?;
            let mut map = LargeMapManager::new(config, InMemoryBackend::new())?;
            let items = map.generate_map(&assets)?;
            let (columns, rows) = map.grid_extent();
            println!(
                "Generated map from {}: items={}, tiles={}, extent={}x{}",
                assets.display(),
                items,
                map.grid().tile_count(),
                columns,
                rows
            );
            let mut tiles: Vec<_> = map.grid().tiles().collect();
            tiles.sort_by_key(|t| t.key());
            for tile in tiles {
                println!("  {}: pending={}", tile.coord(), tile.pending_len());
            }
        }
        Commands::Simulate {
            assets,
            ticks,
            speed,
            observers,
            dt,
        } => {
            let config = cli.config.resolve()?;
            let spacing = config.tile_side as f32;
            let mut map = LargeMapManager::new(config, InMemoryBackend::new())?;
            if let Some(path) = &assets {
                map.generate_map(path)?;
            }

            let entities: Vec<Rc<RefCell<Vec3>>> = (0..observers)
                .map(|i| Rc::new(RefCell::new(Vec3::new(0.0, i as f32 * spacing, 0.0))))
                .collect();
            for entity in &entities {
                map.add_observer(ObserverId::new(), Rc::downgrade(entity));
            }

            tracing::info!(observers, ticks, speed, "simulation starting");
            let mut rebases = 0;
            for _ in 0..ticks {
                for entity in &entities {
                    entity.borrow_mut().x += speed * dt;
                }
                let report = map.tick(dt);
                if let Some(event) = report.rebase {
                    rebases += 1;
                    println!(
                        "tick {}: rebase {} -> {}",
                        report.tick,
                        event.old.coarse(),
                        event.new.coarse()
                    );
                }
                if report.stream.tiles_loaded_this_cycle > 0
                    || report.stream.tiles_unloaded_this_cycle > 0
                {
                    println!(
                        "tick {}: +{} -{} tiles, {} spawned, {} resident",
                        report.tick,
                        report.stream.tiles_loaded_this_cycle,
                        report.stream.tiles_unloaded_this_cycle,
                        report.stream.items_spawned_this_cycle,
                        report.stream.total_resident_tiles
                    );
                }
            }

            let (columns, rows) = map.grid_extent();
            let positions = map.observers().positions();
            println!(
                "Done: elapsed={:.2}s, rebases={}, origin={}, tiles={} ({}x{}), resident={}, spawned={}",
                map.elapsed(),
                rebases,
                map.origin().coarse(),
                map.grid().tile_count(),
                columns,
                rows,
                map.backend().resident_count(),
                map.backend().materialized_total()
            );
            for (entity, absolute) in entities.iter().zip(positions) {
                println!("  observer local={} absolute={}", *entity.borrow(), absolute);
            }
        }
    }

    Ok(())
}
