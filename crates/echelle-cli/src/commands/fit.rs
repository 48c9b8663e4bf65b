use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use echelle_core::background::{BackgroundConfig, FitMethod, FitScale};
use echelle_core::frame::Fiber;
use echelle_core::io::image_io::save_counts;
use echelle_core::pipeline::ReductionSession;
use echelle_core::wlcalib::WavelengthSolution;

use super::FrameArgs;
use crate::progress::TerminalReporter;
use crate::summary;

#[derive(Args)]
pub struct FitArgs {
    #[command(flatten)]
    pub frame: FrameArgs,

    /// Illuminated fiber
    #[arg(long, default_value = "A")]
    pub fiber: Fiber,

    /// Object observed through the fiber (comb, fp, flat or a star name)
    #[arg(long, default_value = "")]
    pub object: String,

    /// Surface method: poly or interp
    #[arg(long)]
    pub method: Option<FitMethod>,

    /// Fit scale: linear or log
    #[arg(long)]
    pub scale: Option<FitScale>,

    /// Column stride of the node scan
    #[arg(long)]
    pub scan_step: Option<usize>,

    /// Polynomial order along the dispersion axis
    #[arg(long)]
    pub xorder: Option<usize>,

    /// Polynomial order along the cross-dispersion axis
    #[arg(long)]
    pub yorder: Option<usize>,

    /// Do not extrapolate node columns to the frame edges
    #[arg(long)]
    pub no_extend: bool,

    /// Save the measured background model (.bkg)
    #[arg(long)]
    pub model: Option<PathBuf>,
}

pub fn run(args: &FitArgs) -> Result<()> {
    let mut config = args.frame.load_config()?;
    apply_overrides(&mut config.background, args);
    config.background.validate()?;

    let apertures = args.frame.load_apertures()?;
    let dispersion = args.frame.load_dispersion()?;
    let frame = args.frame.load_frame(&args.object)?;

    summary::print_fit_summary(&frame, args.fiber, &config);

    let solution = dispersion.as_ref().map(|d| d as &dyn WavelengthSolution);
    let mut session = ReductionSession::new(config, apertures)
        .with_reporter(Arc::new(TerminalReporter::default()));
    let measured = session.measure_frame(&frame, args.fiber, &args.object, solution)?;

    summary::print_fit_result(&measured);

    save_counts(&measured.corrected.data, &args.frame.output)
        .with_context(|| format!("Failed to write {}", args.frame.output.display()))?;
    println!("Corrected frame saved to {}", args.frame.output.display());

    if let Some(path) = &args.frame.background_out {
        save_counts(measured.model.surface(), path)?;
        println!("Background saved to {}", path.display());
    }
    if let Some(path) = &args.model {
        measured.model.save(path)?;
        println!("Background model saved to {}", path.display());
    }

    Ok(())
}

fn apply_overrides(config: &mut BackgroundConfig, args: &FitArgs) {
    if let Some(method) = args.method {
        config.method = method;
    }
    if let FitMethod::Polynomial(params) = &mut config.method {
        if let Some(xorder) = args.xorder {
            params.xorder = xorder;
        }
        if let Some(yorder) = args.yorder {
            params.yorder = yorder;
        }
    }
    if let Some(scale) = args.scale {
        config.scale = scale;
    }
    if let Some(step) = args.scan_step {
        config.scan_step = step;
    }
    if args.no_extend {
        config.extend = false;
    }
}
