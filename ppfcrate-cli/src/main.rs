//! ppfcrate CLI - preprocess scenes into PPF patch files
//!
//! Reads a scene manifest, computes the local patches of every fragment of
//! every listed scene and writes them to `<save_dir>/<scene>/`. A failing
//! fragment is logged and skipped; the process only exits non-zero when the
//! configuration or the manifest cannot be used.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use ppfcrate_io::{read_scene_manifest, CloudFormat};
use ppfcrate_pipeline::{open_source, FilePatchStore, PatchPipeline, PatchStore, PipelineConfig, SourceKind};
use rayon::prelude::*;
use std::ops::Add;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "ppfcrate", version)]
#[command(about = "Compute point pair feature patches for every fragment of a scene list", long_about = None)]
struct Cli {
    /// Scene list, one scene name per line
    #[arg(short, long, value_name = "FILE")]
    manifest: PathBuf,

    /// Directory holding one sub-directory per scene
    #[arg(short, long, value_name = "DIR")]
    root: PathBuf,

    /// Path inside each scene directory where fragments live
    #[arg(long, value_name = "DIR")]
    subdir: Option<PathBuf>,

    /// Output directory; patches go to <save_dir>/<scene>/
    #[arg(short, long, value_name = "DIR")]
    save_dir: PathBuf,

    /// TOML configuration file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fragment layout of the scenes
    #[arg(long, value_enum)]
    source: Option<SourceArg>,

    /// Reference points per fragment
    #[arg(long, value_name = "N")]
    num_patches: Option<usize>,

    /// Neighbors per reference point
    #[arg(long, value_name = "N")]
    num_points_per_patch: Option<usize>,

    /// Neighbor search radius
    #[arg(long, value_name = "RADIUS")]
    vicinity: Option<f32>,

    /// Base random seed for reproducible output
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Voxel size for downsampling, 0 disables it
    #[arg(long, value_name = "SIZE")]
    voxel_size: Option<f32>,

    /// File format of the stored reference clouds
    #[arg(long, value_enum)]
    reference_format: Option<FormatArg>,

    /// Recompute fragments whose outputs already exist
    #[arg(long)]
    overwrite: bool,

    /// Worker threads (defaults to the number of cores)
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    Fused,
    Rgbd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Pcd,
    Ply,
}

/// Outcome counts of a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Summary {
    processed: usize,
    skipped: usize,
    failed: usize,
    failed_scenes: usize,
}

impl Add for Summary {
    type Output = Summary;

    fn add(self, other: Summary) -> Summary {
        Summary {
            processed: self.processed + other.processed,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
            failed_scenes: self.failed_scenes + other.failed_scenes,
        }
    }
}

fn init_logger(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if let Err(err) = builder.try_init() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

/// Build the configuration from the optional file and the command-line flags
fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut PipelineConfig, cli: &Cli) {
    if let Some(source) = cli.source {
        config.source = match source {
            SourceArg::Fused => SourceKind::Fused,
            SourceArg::Rgbd => SourceKind::Rgbd,
        };
    }
    if let Some(format) = cli.reference_format {
        config.reference_format = match format {
            FormatArg::Pcd => CloudFormat::Pcd,
            FormatArg::Ply => CloudFormat::Ply,
        };
    }
    if let Some(n) = cli.num_patches {
        config.patch.num_patches = n;
    }
    if let Some(n) = cli.num_points_per_patch {
        config.patch.num_points_per_patch = n;
    }
    if let Some(vicinity) = cli.vicinity {
        config.patch.vicinity = vicinity;
    }
    if let Some(seed) = cli.seed {
        config.patch.seed = Some(seed);
    }
    if let Some(voxel_size) = cli.voxel_size {
        match config.source {
            SourceKind::Fused => config.fused.voxel_size = voxel_size,
            SourceKind::Rgbd => config.rgbd.voxel_size = voxel_size,
        }
    }
}

fn scene_dir(root: &Path, scene: &str, subdir: Option<&Path>) -> PathBuf {
    let dir = root.join(scene);
    match subdir {
        Some(subdir) => dir.join(subdir),
        None => dir,
    }
}

/// Process every fragment of one scene. Failures never escape: they are
/// logged and counted.
fn process_scene(scene: &str, scene_dir: &Path, save_dir: &Path, config: &PipelineConfig, overwrite: bool) -> Summary {
    let failed_scene = Summary {
        failed_scenes: 1,
        ..Summary::default()
    };

    let source = match open_source(scene_dir, config) {
        Ok(source) => source,
        Err(err) => {
            warn!("scene {}: cannot open {}: {}", scene, scene_dir.display(), err);
            return failed_scene;
        }
    };
    let fragment_ids = match source.fragment_ids() {
        Ok(ids) => ids,
        Err(err) => {
            warn!("scene {}: cannot list fragments: {}", scene, err);
            return failed_scene;
        }
    };
    let pipeline = match PatchPipeline::new(source, config.patch.clone()) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            warn!("scene {}: {}", scene, err);
            return failed_scene;
        }
    };

    let store = FilePatchStore::new(save_dir.join(scene), config.reference_format);
    info!("scene {}: {} fragments", scene, fragment_ids.len());

    fragment_ids
        .par_iter()
        .map(|fragment_id| {
            if !overwrite && store.contains(fragment_id) {
                debug!("{}/{} already processed", scene, fragment_id);
                return Summary {
                    skipped: 1,
                    ..Summary::default()
                };
            }

            match pipeline.process_and_store(fragment_id, &store) {
                Ok(_) => Summary {
                    processed: 1,
                    ..Summary::default()
                },
                Err(err) => {
                    warn!("scene {}: {}", scene, err);
                    Summary {
                        failed: 1,
                        ..Summary::default()
                    }
                }
            }
        })
        .reduce(Summary::default, Summary::add)
}

fn run(cli: &Cli) -> Result<Summary> {
    let config = load_config(cli)?;
    let scenes = read_scene_manifest(&cli.manifest)
        .with_context(|| format!("Failed to read manifest {}", cli.manifest.display()))?;

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure the worker pool")?;
    }

    let mut summary = Summary::default();
    for scene in &scenes {
        let start = Instant::now();
        let dir = scene_dir(&cli.root, scene, cli.subdir.as_deref());
        let scene_summary = process_scene(scene, &dir, &cli.save_dir, &config, cli.overwrite);
        debug!("scene {} took {:?}", scene, start.elapsed());
        summary = summary + scene_summary;
    }
    Ok(summary)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(&cli) {
        Ok(summary) => {
            info!(
                "done: {} processed, {} skipped, {} failed, {} scenes unreadable",
                summary.processed, summary.skipped, summary.failed, summary.failed_scenes
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ppfcrate_core::{Point3f, PointCloud};
    use ppfcrate_io::{PlyWriter, PointCloudWriter};
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["ppfcrate", "-m", "scenes.txt", "-r", "data", "-s", "out"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    fn write_grid_fragment(dir: &Path, id: &str) {
        let cloud: PointCloud<Point3f> = (0..900)
            .map(|i| Point3f::new((i % 30) as f32 * 0.02, (i / 30) as f32 * 0.02, 0.0))
            .collect();
        PlyWriter::write_point_cloud(&cloud, dir.join(format!("{}.ply", id))).unwrap();
    }

    fn small_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.patch.num_patches = 8;
        config.patch.num_points_per_patch = 16;
        config.patch.vicinity = 0.1;
        config.patch.seed = Some(5);
        config.fused.voxel_size = 0.0;
        config.fused.aligned = false;
        config
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let cli = parse(&["--source", "rgbd", "--num-patches", "64", "--voxel-size", "0.01", "--seed", "3"]);
        let mut config = PipelineConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.source, SourceKind::Rgbd);
        assert_eq!(config.patch.num_patches, 64);
        assert_eq!(config.patch.seed, Some(3));
        assert_eq!(config.rgbd.voxel_size, 0.01);
        assert_eq!(config.fused.voxel_size, 0.03);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = parse(&["--vicinity", "0"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_scene_dir() {
        assert_eq!(scene_dir(Path::new("data"), "s1", None), PathBuf::from("data/s1"));
        assert_eq!(
            scene_dir(Path::new("data"), "s1", Some(Path::new("fused"))),
            PathBuf::from("data/s1/fused")
        );
    }

    #[test]
    fn test_process_scene_skips_and_continues() {
        let scene = tempdir().unwrap();
        let save = tempdir().unwrap();
        write_grid_fragment(scene.path(), "cloud_bin_0");
        write_grid_fragment(scene.path(), "cloud_bin_1");
        // unreadable fragment
        std::fs::write(scene.path().join("cloud_bin_2.ply"), "not a ply").unwrap();

        let config = small_config();
        let summary = process_scene("s", scene.path(), save.path(), &config, false);
        assert_eq!(
            summary,
            Summary {
                processed: 2,
                failed: 1,
                ..Summary::default()
            }
        );
        assert!(save.path().join("s").join("cloud_bin_0.npy").is_file());
        assert!(save.path().join("s").join("cloud_bin_0.pcd").is_file());
        assert!(save.path().join("s").join("cloud_bin_0.indices.npy").is_file());

        let again = process_scene("s", scene.path(), save.path(), &config, false);
        assert_eq!(again.skipped, 2);
        assert_eq!(again.processed, 0);

        let forced = process_scene("s", scene.path(), save.path(), &config, true);
        assert_eq!(forced.processed, 2);
    }

    #[test]
    fn test_process_scene_missing_directory() {
        let save = tempdir().unwrap();
        let mut config = small_config();
        config.source = SourceKind::Rgbd;

        let summary = process_scene("gone", Path::new("/nonexistent/scene"), save.path(), &config, false);
        assert_eq!(summary.failed_scenes, 1);
    }

    #[test]
    fn test_run_requires_manifest() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("missing.txt");
        let cli = Cli::parse_from([
            "ppfcrate",
            "-m",
            manifest.to_str().unwrap(),
            "-r",
            dir.path().to_str().unwrap(),
            "-s",
            dir.path().to_str().unwrap(),
        ]);
        assert!(run(&cli).is_err());
    }
}
