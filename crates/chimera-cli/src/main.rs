use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use chimera_core::engine::iraf::IrafEngine;
use chimera_core::phot::DetectorOverrides;
use chimera_core::pipeline::{run_photometry, PhotometryConfig};

#[derive(Parser)]
#[command(name = "photometry", about = "CHIMERA aperture photometry pipeline")]
#[command(version)]
struct Cli {
    /// Image cube, comma-separated list of cubes, or @listfile
    image: String,

    /// Coordinate file with the initial centroid guess
    coords: PathBuf,

    /// FWHM of the stellar PSF in pixels
    #[arg(short, long, default_value_t = 6.0)]
    fwhmpsf: f32,

    /// Sky background sigma
    #[arg(short, long, default_value_t = 10.0)]
    sigma: f32,

    /// Photometry aperture radius in pixels (default: curve-of-growth)
    #[arg(short, long)]
    aperture: Option<f64>,

    /// Inner radius of the sky annulus in pixels
    #[arg(short = 'r', long, default_value_t = 14.0)]
    annulus: f32,

    /// Width of the sky annulus in pixels
    #[arg(short, long, default_value_t = 16.0)]
    dannulus: f32,

    /// Base name for diagnostic output files
    #[arg(short, long)]
    output: Option<String>,

    /// Photometric zero point
    #[arg(short, long)]
    zmag: Option<f32>,

    /// Keep per-cube tables, light-curve plots and engine intermediates
    #[arg(long)]
    diagnostic: bool,

    /// Detector parameter file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress messages
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Optional TOML file overriding header-derived detector parameters.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    detector: DetectorOverrides,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = PhotometryConfig::new(cli.image.clone(), &cli.coords);
    config.fwhmpsf = cli.fwhmpsf;
    config.sigma = cli.sigma;
    config.aperture = cli.aperture;
    config.annulus = cli.annulus;
    config.dannulus = cli.dannulus;
    config.output = cli.output.clone();
    config.diagnostic = cli.diagnostic;

    if let Some(path) = &cli.config {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading detector config {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("parsing detector config {}", path.display()))?;
        config.detector = file.detector;
    }
    // The command-line zero point wins over the config file.
    if cli.zmag.is_some() {
        config.detector.zmag = cli.zmag;
    }

    let title = Style::new().cyan().bold();
    if !cli.quiet {
        println!("{}", title.apply_to("CHIMERA Aperture Photometry"));
    }

    let engine = IrafEngine::new();

    let mut bar: Option<ProgressBar> = None;
    let mut current_cube = usize::MAX;
    let output = run_photometry(&config, &engine, |p| {
        if cli.quiet {
            return;
        }
        if p.cube_index != current_cube {
            if let Some(old) = bar.take() {
                old.finish();
            }
            let pb = ProgressBar::new(p.frame_count as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("Cube {msg} [{bar:40}] {pos}/{len}")
                    .expect("static template")
                    .progress_chars("=> "),
            );
            pb.set_message(format!("{}/{}", p.cube_index + 1, p.cube_count));
            bar = Some(pb);
            current_cube = p.cube_index;
        }
        if let Some(pb) = &bar {
            pb.set_position(p.frame_index as u64 + 1);
        }
    })?;
    if let Some(pb) = bar.take() {
        pb.finish();
    }

    if !cli.quiet {
        let label = Style::new().dim();
        let value = Style::new().bold();
        println!();
        println!(
            "  {:<14}{:.1} px",
            label.apply_to("Aperture"),
            output.aperture
        );
        println!(
            "  {:<14}{} cube(s), {} frame(s)",
            label.apply_to("Processed"),
            output.cube_count,
            output.records.len()
        );
        println!(
            "  {:<14}{}",
            label.apply_to("Photometry"),
            value.apply_to(output.table_path.display())
        );
        println!(
            "  {:<14}{}",
            label.apply_to("Cutouts"),
            value.apply_to(output.cutout_path.display())
        );
    }

    Ok(())
}
