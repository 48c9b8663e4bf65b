use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use echelle_core::background::BackgroundLightModel;

#[derive(Args)]
pub struct InfoArgs {
    /// Background model file (.bkg)
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let model = BackgroundLightModel::load(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let info = &model.info;
    let (h, w) = model.shape();

    println!("File:        {}", args.file.display());
    println!("File ID:     {}", info.file_id);
    println!("Fiber:       {}", info.fiber);
    println!("Object:      {} ({})", info.object, info.object_type);
    println!("Exposure:    {} s", info.exptime);
    if let Some(date) = info.obs_date {
        println!("Observed:    {}", date);
    }
    println!("Dimensions:  {}x{}", w, h);

    let surface = model.surface();
    if !surface.is_empty() {
        let max = surface.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = surface.iter().map(|&v| v as f64).sum::<f64>() / surface.len() as f64;
        println!("Background:  max = {:.2}, mean = {:.2}", max, mean);
    }

    let profile = model.profile();
    println!("\nBrightness profile ({} apertures):", profile.len());
    println!(
        "{:>5}  {:>6}  {:>9}  {:>11}  {:>11}",
        "Aper", "Order", "Position", "Wavelength", "Brightness"
    );
    println!("{}", "-".repeat(50));
    for e in profile.entries() {
        println!(
            "{:>5}  {:>6}  {:>9.2}  {:>11.3}  {:>11.3}",
            e.aperture, e.order, e.position, e.wavelength, e.brightness
        );
    }

    Ok(())
}
