use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::aperture::ApertureSet;
use crate::background::{
    compose_background, correct_background_with_progress, derive_profile, match_background,
    subtract_background, BackgroundArchive, BackgroundInfo, BackgroundLightModel, FileArchive,
    MatchTarget, ObjectType,
};
use crate::consts::BKG_EXTENSION;
use crate::error::{EchelleError, Result};
use crate::frame::{parse_fiber_objects, Fiber, Frame};
use crate::wlcalib::WavelengthSolution;

use super::config::PipelineConfig;
use super::types::{
    MatchedFrame, MeasuredFrame, NoOpReporter, PipelineStage, ProgressReporter, Reduction,
};

/// Background reduction of the frames of one night.
///
/// Frames illuminating a single fiber measure their own background, which
/// is kept for the rest of the session. Frames illuminating several fibers
/// have no clean inter-order gaps; each fiber gets the best stored
/// background, rescaled to the frame's brightness.
pub struct ReductionSession {
    config: PipelineConfig,
    apertures: BTreeMap<Fiber, ApertureSet>,
    models: Vec<BackgroundLightModel>,
    archive: Option<Box<dyn BackgroundArchive>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl ReductionSession {
    /// Session over the master aperture sets of each fiber. Opens the
    /// configured archive, if any.
    pub fn new(config: PipelineConfig, apertures: BTreeMap<Fiber, ApertureSet>) -> Self {
        let archive = config
            .archive
            .clone()
            .map(|root| Box::new(FileArchive::new(root)) as Box<dyn BackgroundArchive>);
        Self {
            config,
            apertures,
            models: Vec::new(),
            archive,
            reporter: Arc::new(NoOpReporter),
        }
    }

    pub fn with_archive(mut self, archive: Box<dyn BackgroundArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Backgrounds measured so far, in measurement order.
    pub fn models(&self) -> &[BackgroundLightModel] {
        &self.models
    }

    pub fn add_model(&mut self, model: BackgroundLightModel) {
        self.models.push(model);
    }

    fn fiber_apertures(&self, fiber: Fiber) -> Result<&ApertureSet> {
        self.apertures.get(&fiber).ok_or_else(|| {
            EchelleError::InvalidConfig(format!("no apertures for fiber {fiber}"))
        })
    }

    /// Reduce one frame, choosing self-measurement or matching from the
    /// fibers its object string illuminates.
    pub fn reduce_frame(
        &mut self,
        frame: &Frame,
        solution: Option<&dyn WavelengthSolution>,
    ) -> Result<Reduction> {
        let fibers = parse_fiber_objects(&frame.metadata.object, self.config.fiber_delimiter);
        match fibers.as_slice() {
            [] => Err(EchelleError::InvalidConfig(format!(
                "{}: no illuminated fiber in object '{}'",
                frame.metadata.file_id, frame.metadata.object
            ))),
            [(fiber, object)] => self
                .measure_frame(frame, *fiber, object, solution)
                .map(Reduction::Measured),
            _ => self.match_frame(frame, &fibers, solution).map(Reduction::Matched),
        }
    }

    /// Measure the background of a frame with one illuminated fiber,
    /// subtract it and keep the model for later matches.
    ///
    /// The stored profile is measured on the corrected frame, so it holds
    /// the order brightness that produced the measured background.
    pub fn measure_frame(
        &mut self,
        frame: &Frame,
        fiber: Fiber,
        object: &str,
        solution: Option<&dyn WavelengthSolution>,
    ) -> Result<MeasuredFrame> {
        let apertures = self.fiber_apertures(fiber)?;
        let selection: BTreeMap<Fiber, ApertureSet> =
            [(fiber, apertures.clone())].into_iter().collect();

        let reporter = &self.reporter;
        reporter.begin_stage(PipelineStage::Sampling, None);
        let fit = correct_background_with_progress(
            frame,
            &selection,
            &self.config.background,
            |_| {
                reporter.finish_stage();
                reporter.begin_stage(PipelineStage::Fitting, None);
            },
        )?;
        reporter.finish_stage();
        let corrected = subtract_background(frame, fit.surface())?;

        reporter.begin_stage(PipelineStage::Profiling, None);
        let profile = derive_profile(&corrected.data, apertures, solution);
        reporter.finish_stage();

        let meta = &frame.metadata;
        let mut info = BackgroundInfo::new(&meta.file_id, fiber, object);
        info.exptime = meta.exptime;
        info.obs_date = meta.obs_date;
        let model = BackgroundLightModel::new(info, fit.surface().clone(), profile);

        self.write_model(&model)?;
        info!(
            file_id = %meta.file_id,
            fiber = %fiber,
            nodes = fit.nodes.len(),
            "Background measured"
        );

        self.models.push(model.clone());
        Ok(MeasuredFrame {
            corrected,
            fit,
            model,
        })
    }

    /// Correct a multi-fiber frame with matched, rescaled backgrounds.
    /// Fails with `NoBackgroundFound` when any fiber has no candidate.
    pub fn match_frame(
        &self,
        frame: &Frame,
        fibers: &[(Fiber, String)],
        solution: Option<&dyn WavelengthSolution>,
    ) -> Result<MatchedFrame> {
        let meta = &frame.metadata;
        self.reporter
            .begin_stage(PipelineStage::Matching, Some(fibers.len()));

        let mut matches = Vec::with_capacity(fibers.len());
        for (done, (fiber, object)) in fibers.iter().enumerate() {
            let apertures = self.fiber_apertures(*fiber)?;
            let observed = derive_profile(&frame.data, apertures, solution);
            let target = MatchTarget {
                fiber: *fiber,
                object: object.as_str(),
                object_type: ObjectType::classify(object),
                obs_date: meta.obs_date,
                profile: &observed,
                direction: &self.config.direction,
                shape: frame.shape(),
            };

            let found = match_background(&self.models, self.archive.as_deref(), &target)?;
            let Some(candidate) = found else {
                warn!(file_id = %meta.file_id, fiber = %fiber, "No background found");
                return Err(EchelleError::NoBackgroundFound {
                    file_id: meta.file_id.clone(),
                    fiber: *fiber,
                });
            };
            matches.push(candidate);
            self.reporter.advance(done + 1);
        }
        self.reporter.finish_stage();

        let background = compose_background(frame.shape(), &matches)?;
        let corrected = subtract_background(frame, &background)?;
        info!(file_id = %meta.file_id, fibers = matches.len(), "Background matched");
        Ok(MatchedFrame {
            corrected,
            background,
            matches,
        })
    }

    fn write_model(&self, model: &BackgroundLightModel) -> Result<()> {
        let to_session = self.config.session_dir.as_ref();
        let to_archive = self.config.archive.as_ref().filter(|_| self.config.update_archive);
        if to_session.is_none() && to_archive.is_none() {
            return Ok(());
        }

        self.reporter.begin_stage(PipelineStage::Writing, None);
        if let Some(dir) = to_session {
            std::fs::create_dir_all(dir)?;
            let name = format!(
                "{}_{}.{BKG_EXTENSION}",
                model.info.file_id, model.info.fiber
            );
            model.save(&dir.join(name))?;
        }
        if let Some(root) = to_archive {
            FileArchive::new(root).insert(model, &self.config.direction)?;
        }
        self.reporter.finish_stage();
        Ok(())
    }
}
