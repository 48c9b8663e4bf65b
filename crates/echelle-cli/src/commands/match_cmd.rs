use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use echelle_core::background::BackgroundLightModel;
use echelle_core::frame::parse_fiber_objects;
use echelle_core::io::image_io::save_counts;
use echelle_core::pipeline::ReductionSession;
use echelle_core::wlcalib::WavelengthSolution;

use super::FrameArgs;
use crate::progress::TerminalReporter;
use crate::summary;

#[derive(Args)]
pub struct MatchArgs {
    #[command(flatten)]
    pub frame: FrameArgs,

    /// Object string with one slot per fiber, e.g. "HD 1234 | Comb"
    #[arg(long)]
    pub object: String,

    /// Backgrounds measured earlier in the session (.bkg, repeatable)
    #[arg(long = "model")]
    pub models: Vec<PathBuf>,
}

pub fn run(args: &MatchArgs) -> Result<()> {
    let config = args.frame.load_config()?;
    let fibers = parse_fiber_objects(&args.object, config.fiber_delimiter);
    if fibers.is_empty() {
        bail!("No illuminated fiber in object '{}'", args.object);
    }

    let apertures = args.frame.load_apertures()?;
    let dispersion = args.frame.load_dispersion()?;
    let frame = args.frame.load_frame(&args.object)?;

    summary::print_match_summary(&frame, &fibers, &config, args.models.len());

    let mut session = ReductionSession::new(config, apertures)
        .with_reporter(Arc::new(TerminalReporter::default()));
    for path in &args.models {
        let model = BackgroundLightModel::load(path)
            .with_context(|| format!("Failed to read background {}", path.display()))?;
        session.add_model(model);
    }

    let solution = dispersion.as_ref().map(|d| d as &dyn WavelengthSolution);
    let matched = session.match_frame(&frame, &fibers, solution)?;

    summary::print_match_result(&matched);

    save_counts(&matched.corrected.data, &args.frame.output)
        .with_context(|| format!("Failed to write {}", args.frame.output.display()))?;
    println!("Corrected frame saved to {}", args.frame.output.display());

    if let Some(path) = &args.frame.background_out {
        save_counts(&matched.background, path)?;
        println!("Background saved to {}", path.display());
    }

    Ok(())
}
