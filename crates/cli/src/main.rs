//! Landcover CLI - Supervised land-cover classification of multispectral rasters

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use landcover_algorithms::classification::{
    evaluate, format_params, select_families, select_model, Average, ClassifierFamily,
    FamilyReport, FittedPipeline,
};
use landcover_algorithms::config::PipelineConfig;
use landcover_algorithms::features::{
    build_feature_table, discover_bands, train_test_split, BandFile, FeatureTable,
};
use landcover_algorithms::inference::{classify_scene, write_prediction, SceneRaster};
use landcover_core::io::{read_geotiff, read_info};
use landcover_core::vector::PointSet;
use landcover_core::Raster;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "landcover")]
#[command(author, version, about = "Supervised land-cover classification", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON run configuration; missing fields take their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seed for the train/test split (overrides the configuration)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Averaging for precision, recall and F1: binary[:<label>], micro, macro, weighted
    #[arg(long, global = true)]
    average: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Sample band rasters at ground-truth points into a feature table
    Extract {
        /// Ground-truth points (GeoJSON or Shapefile)
        #[arg(short, long)]
        points: PathBuf,
        /// Directory searched recursively for band GeoTIFFs
        #[arg(short, long)]
        bands: PathBuf,
        /// Output JSON table (printed as CSV when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Select and evaluate classifiers on a train/test split
    Train {
        #[arg(short, long)]
        points: PathBuf,
        #[arg(short, long)]
        bands: PathBuf,
        /// Classifier families: svm, knn, random_forest (default: all)
        #[arg(short, long, value_delimiter = ',')]
        family: Vec<String>,
        /// Write the selection reports as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Classify every pixel of a scene
    Classify {
        /// Ground-truth points (GeoJSON or Shapefile)
        #[arg(short, long)]
        points: PathBuf,
        /// Band directory used for training and, by default, as the scene
        #[arg(short, long)]
        bands: PathBuf,
        /// Classifier family to select and apply
        #[arg(short, long, default_value = "knn")]
        model: String,
        /// Scene band directory, if different from the training bands
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Output GeoTIFF (default: `{family}_multi.tif`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.split.seed = Some(seed);
    }
    if let Some(average) = &cli.average {
        config.average = parse_average(average)?;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn parse_average(s: &str) -> Result<Average> {
    let lower = s.trim().to_lowercase();
    if let Some(label) = lower.strip_prefix("binary:") {
        let pos_label = label
            .trim()
            .parse::<i64>()
            .with_context(|| format!("Invalid positive label: {}", label))?;
        return Ok(Average::Binary { pos_label });
    }
    match lower.as_str() {
        "binary" => Ok(Average::Binary { pos_label: 1 }),
        "micro" => Ok(Average::Micro),
        "macro" => Ok(Average::Macro),
        "weighted" => Ok(Average::Weighted),
        _ => anyhow::bail!(
            "Unknown average: {}. Use binary[:<label>], micro, macro, or weighted.",
            s
        ),
    }
}

fn parse_families(names: &[String]) -> Result<Vec<ClassifierFamily>> {
    if names.is_empty() {
        return Ok(ClassifierFamily::ALL.to_vec());
    }
    names
        .iter()
        .map(|name| {
            name.parse::<ClassifierFamily>()
                .map_err(|e| anyhow::anyhow!("{}", e))
        })
        .collect()
}

fn find_bands(dir: &Path) -> Result<Vec<BandFile>> {
    let bands = discover_bands(dir)
        .with_context(|| format!("Failed to find band rasters in {}", dir.display()))?;
    info!(
        "Bands: {}",
        bands.iter().map(|b| b.name.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(bands)
}

fn extract(points: &Path, bands_dir: &Path, config: &PipelineConfig) -> Result<FeatureTable> {
    let pb = spinner("Reading ground truth...");
    let points = PointSet::from_path(points, &config.label_field)
        .with_context(|| format!("Failed to read points {}", points.display()))?;
    pb.finish_and_clear();
    info!("Points: {}", points.len());

    let bands = find_bands(bands_dir)?;
    let pb = spinner("Sampling bands...");
    let table = build_feature_table(&points, &bands, config.statistic)
        .context("Failed to build the feature table")?;
    pb.finish_and_clear();
    info!("Feature table: {} rows x {} columns", table.n_rows(), table.n_columns());
    Ok(table)
}

fn print_report(report: &FamilyReport) {
    let selection = &report.selection;
    let metrics = &report.metrics;
    println!("{}", report.family());
    println!("  Best parameters: {}", format_params(&selection.best_params));
    println!("  Cross-validated accuracy: {:.4}", selection.best_score);
    println!("  Search rounds: {}", selection.rounds.len());
    for round in &selection.rounds {
        println!(
            "    iteration {}: {} candidates on {} rows",
            round.iteration,
            round.scores.len(),
            round.n_resources
        );
    }
    println!("  Test accuracy:  {:.4}", metrics.accuracy);
    println!("  Test precision: {:.4} ({})", metrics.precision, metrics.average);
    println!("  Test recall:    {:.4}", metrics.recall);
    println!("  Test F1:        {:.4}", metrics.f1);
}

fn write_json<T: serde::Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Select `family` on a fresh split and report its held-out metrics
fn select_one(
    points: &Path,
    bands_dir: &Path,
    family: ClassifierFamily,
    config: &PipelineConfig,
) -> Result<FittedPipeline> {
    let table = extract(points, bands_dir, config)?;
    let split = train_test_split(&table, &config.split).context("Failed to split the table")?;
    let grid = config.grid(family)?;

    let pb = spinner(&format!("Selecting {}...", family));
    let selection = select_model(&split.train_view(&table), grid, &config.search)
        .with_context(|| format!("Model selection failed for {}", family))?;
    pb.finish_and_clear();

    let metrics = evaluate(&selection.pipeline, &split.test_view(&table), config.average)
        .with_context(|| format!("Evaluation failed for {}", family))?;
    let report = FamilyReport { selection, metrics };
    print_report(&report);
    Ok(report.selection.pipeline)
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = load_config(&cli)?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let pb = spinner("Reading raster...");
            let tiff = read_info(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let raster: Raster<f64> = read_geotiff(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            pb.finish_and_clear();

            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();
            let t = raster.transform();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Data type: {}", tiff.data_type);
            if let Some(compression) = tiff.compression {
                println!("Compression: {:?}", compression);
            }
            println!(
                "Origin: ({:.6}, {:.6}), pixel size: ({}, {})",
                t.origin_x, t.origin_y, t.pixel_width, t.pixel_height
            );
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(crs) = raster.crs() {
                println!("CRS: {}", crs);
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Extract ──────────────────────────────────────────────────
        Commands::Extract {
            points,
            bands,
            output,
        } => {
            let start = Instant::now();
            let table = extract(&points, &bands, &config)?;
            match output {
                Some(path) => {
                    let body = serde_json::json!({
                        "schema": table.schema(),
                        "columns": table.column_names(),
                        "records": table.records(),
                    });
                    write_json(&body, &path)?;
                    done("Feature table", &path, start.elapsed());
                }
                None => {
                    println!("{}", table.column_names().join(","));
                    for record in table.records() {
                        let values: Vec<String> =
                            record.features.iter().map(|v| v.to_string()).collect();
                        println!("{},{}", record.id, values.join(","));
                    }
                }
            }
        }

        // ── Train ────────────────────────────────────────────────────
        Commands::Train {
            points,
            bands,
            family,
            report,
        } => {
            let families = parse_families(&family)?;
            let table = extract(&points, &bands, &config)?;
            let split =
                train_test_split(&table, &config.split).context("Failed to split the table")?;
            info!("Split: {} train / {} test", split.train().len(), split.test().len());

            let start = Instant::now();
            let pb = spinner("Selecting models...");
            let reports = select_families(
                &split.train_view(&table),
                &split.test_view(&table),
                &families,
                &config.grids,
                &config.search,
                config.average,
            )
            .context("Model selection failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            for r in &reports {
                print_report(r);
            }
            if let Some(path) = &report {
                let summaries: Vec<_> = reports.iter().map(FamilyReport::summary).collect();
                write_json(&summaries, path)?;
                done("Report", path, elapsed);
            }
        }

        // ── Classify ─────────────────────────────────────────────────
        Commands::Classify {
            points,
            bands,
            model,
            scene,
            output,
        } => {
            let family: ClassifierFamily =
                model.parse().map_err(|e| anyhow::anyhow!("{}", e))?;
            let start = Instant::now();
            let fitted = select_one(&points, &bands, family, &config)?;

            let scene_dir = scene.as_deref().unwrap_or(&bands);
            let files = find_bands(scene_dir)?;
            let pb = spinner("Reading scene...");
            let scene = SceneRaster::from_files(&files)
                .with_context(|| format!("Failed to read scene {}", scene_dir.display()))?;
            pb.finish_and_clear();
            let (rows, cols) = scene.shape();
            info!("Scene: {} x {} x {}", cols, rows, scene.n_bands());

            let pb = spinner("Classifying pixels...");
            let prediction = classify_scene(&fitted, &scene, &config.inference)
                .context("Scene classification failed")?;
            pb.finish_and_clear();
            let elapsed = start.elapsed();

            let path = output
                .unwrap_or_else(|| PathBuf::from(format!("{}_multi.tif", fitted.family())));
            let pb = spinner("Writing output...");
            write_prediction(&prediction, &scene.profile(), &path)
                .context("Failed to write output")?;
            pb.finish_and_clear();
            done("Classification", &path, elapsed);
        }
    }

    Ok(())
}
