pub mod archive;
pub mod config;
pub mod matcher;
pub mod model;
pub mod nodes;
pub mod profile;
pub mod surface;

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::info;

use crate::aperture::ApertureSet;
use crate::error::{EchelleError, Result};
use crate::frame::{Fiber, Frame};

pub use archive::{ArchiveKey, BackgroundArchive, FileArchive};
pub use config::{BackgroundConfig, FitMethod, FitScale, PolynomialParams};
pub use matcher::{
    compose_background, find_best, find_brightness_scale, match_background, MatchCandidate,
    MatchTarget,
};
pub use model::{BackgroundInfo, BackgroundLightModel, ObjectType};
pub use nodes::{sample_nodes, NodeSet, SamplingParams};
pub use profile::{derive_profile, BrightnessProfile, ProfileEntry};
pub use surface::{fit_surface, IterationStats, SurfaceFit};

/// Nodes and fitted surface of one self-measured background.
#[derive(Clone, Debug)]
pub struct BackgroundFit {
    pub nodes: NodeSet,
    pub fit: SurfaceFit,
}

impl BackgroundFit {
    pub fn surface(&self) -> &Array2<f32> {
        &self.fit.surface
    }
}

/// Measure the background light of `frame` from the inter-order gaps of
/// the given apertures.
pub fn correct_background(
    frame: &Frame,
    apertures: &BTreeMap<Fiber, ApertureSet>,
    config: &BackgroundConfig,
) -> Result<BackgroundFit> {
    correct_background_with_progress(frame, apertures, config, |_| {})
}

/// [`correct_background`] that calls `on_sampled(node_count)` once the
/// nodes are found, before the surface fit starts.
pub fn correct_background_with_progress(
    frame: &Frame,
    apertures: &BTreeMap<Fiber, ApertureSet>,
    config: &BackgroundConfig,
    mut on_sampled: impl FnMut(usize),
) -> Result<BackgroundFit> {
    config.validate()?;
    let nodes = sample_nodes(frame, apertures, &config.sampling())?;
    on_sampled(nodes.len());
    let fit = fit_surface(frame.shape(), &nodes, &config.method, config.scale, None)?;
    info!(
        method = %config.method,
        scale = %config.scale,
        nodes = nodes.len(),
        accepted = fit.accepted_count(),
        "Fitted background light"
    );
    Ok(BackgroundFit { nodes, fit })
}

/// `frame` with `background` subtracted; mask and metadata are kept.
pub fn subtract_background(frame: &Frame, background: &Array2<f32>) -> Result<Frame> {
    if frame.shape() != background.dim() {
        return Err(EchelleError::ShapeMismatch {
            expected: frame.shape(),
            actual: background.dim(),
        });
    }
    Ok(Frame {
        data: &frame.data - background,
        mask: frame.mask.clone(),
        metadata: frame.metadata.clone(),
    })
}
