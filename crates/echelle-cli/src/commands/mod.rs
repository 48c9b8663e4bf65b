pub mod config;
pub mod fit;
pub mod info;
pub mod match_cmd;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Args;
use echelle_core::aperture::ApertureSet;
use echelle_core::frame::{Fiber, Frame};
use echelle_core::io::image_io::load_frame;
use echelle_core::pipeline::config::PipelineConfig;
use echelle_core::wlcalib::EchelleDispersion;
use tracing::debug;

/// Input frame and session options shared by `fit` and `match`.
#[derive(Args)]
pub struct FrameArgs {
    /// Input frame (16-bit TIFF or PNG, counts)
    pub file: PathBuf,

    /// Bad-pixel mask image (pixel value = mask bits)
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Aperture set of a fiber, as FIBER=PATH (repeatable)
    #[arg(long = "apertures", value_parser = parse_fiber_path, required = true)]
    pub apertures: Vec<(Fiber, PathBuf)>,

    /// Wavelength solution (TOML) used for the brightness profile
    #[arg(long)]
    pub dispersion: Option<PathBuf>,

    /// File identifier (defaults to the input file stem)
    #[arg(long)]
    pub file_id: Option<String>,

    /// Exposure time in seconds
    #[arg(long, default_value = "0")]
    pub exptime: f64,

    /// Observation start, e.g. 2024-03-05T01:00:00
    #[arg(long)]
    pub date: Option<NaiveDateTime>,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Background archive directory (overrides the config)
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// Output file for the corrected frame
    #[arg(short, long, default_value = "corrected.tiff")]
    pub output: PathBuf,

    /// Also save the subtracted background image
    #[arg(long)]
    pub background_out: Option<PathBuf>,
}

impl FrameArgs {
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Invalid pipeline config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(archive) = &self.archive {
            config.archive = Some(archive.clone());
        }
        debug!(
            direction = %config.direction,
            archive = ?config.archive,
            method = %config.background.method,
            "Loaded pipeline config"
        );
        Ok(config)
    }

    /// Load the frame and attach the metadata given on the command line.
    pub fn load_frame(&self, object: &str) -> Result<Frame> {
        let mut frame = load_frame(&self.file, self.mask.as_deref())
            .with_context(|| format!("Failed to load {}", self.file.display()))?;
        frame.metadata.file_id = self.file_id.clone().unwrap_or_else(|| file_stem(&self.file));
        frame.metadata.object = object.to_string();
        frame.metadata.exptime = self.exptime;
        frame.metadata.obs_date = self.date;
        Ok(frame)
    }

    pub fn load_apertures(&self) -> Result<BTreeMap<Fiber, ApertureSet>> {
        let mut sets = BTreeMap::new();
        for (fiber, path) in &self.apertures {
            let set = ApertureSet::load(path)
                .with_context(|| format!("Failed to read apertures {}", path.display()))?;
            sets.insert(*fiber, set);
        }
        Ok(sets)
    }

    pub fn load_dispersion(&self) -> Result<Option<EchelleDispersion>> {
        self.dispersion
            .as_ref()
            .map(|path| {
                EchelleDispersion::load(path)
                    .with_context(|| format!("Failed to read dispersion {}", path.display()))
            })
            .transpose()
    }
}

fn parse_fiber_path(s: &str) -> std::result::Result<(Fiber, PathBuf), String> {
    let (fiber, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected FIBER=PATH, got '{s}'"))?;
    let fiber: Fiber = fiber.parse().map_err(|e| format!("{e}"))?;
    Ok((fiber, PathBuf::from(path)))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string())
}
