use chrono::NaiveDateTime;
use ndarray::Array2;
use tracing::{debug, info};

use crate::consts::{EPSILON, MIN_PROFILE_OVERLAP};
use crate::error::{EchelleError, Result};
use crate::frame::Fiber;

use super::archive::{ArchiveKey, BackgroundArchive};
use super::model::{BackgroundLightModel, ObjectType};
use super::profile::BrightnessProfile;

/// The frame and fiber a background is wanted for.
#[derive(Clone, Debug)]
pub struct MatchTarget<'a> {
    pub fiber: Fiber,
    pub object: &'a str,
    pub object_type: ObjectType,
    pub obs_date: Option<NaiveDateTime>,
    /// Brightness profile observed on the frame itself.
    pub profile: &'a BrightnessProfile,
    pub direction: &'a str,
    /// Frame shape `(height, width)`.
    pub shape: (usize, usize),
}

impl MatchTarget<'_> {
    pub fn archive_key(&self) -> ArchiveKey {
        ArchiveKey {
            fiber: self.fiber,
            direction: self.direction.to_string(),
            object_type: self.object_type,
            object: self.object.to_string(),
            shape: self.shape,
        }
    }

    /// Fiber, object type, shape and, for lamps, the object name agree.
    pub fn is_compatible(&self, model: &BackgroundLightModel) -> bool {
        model.info.fiber == self.fiber
            && model.info.object_type == self.object_type
            && model.shape() == self.shape
            && (!self.object_type.is_lamp() || model.info.same_object(self.object))
    }
}

/// A stored background and the factor that brings it to the target's
/// brightness.
#[derive(Clone, Debug)]
pub struct MatchCandidate {
    pub model: BackgroundLightModel,
    pub scale: f64,
}

impl MatchCandidate {
    pub fn scaled_surface(&self) -> Array2<f32> {
        self.model.scaled_surface(self.scale)
    }
}

/// Least-squares factor `s` minimizing `sum (o - s c)^2` over the apertures
/// present in both profiles. `None` with fewer than two shared apertures or
/// a zero candidate profile.
pub fn find_brightness_scale(
    observed: &BrightnessProfile,
    candidate: &BrightnessProfile,
) -> Option<f64> {
    let mut overlap = 0usize;
    let mut sum_oc = 0.0;
    let mut sum_cc = 0.0;
    for entry in observed.entries() {
        let Some(c) = candidate.brightness(entry.aperture) else {
            continue;
        };
        overlap += 1;
        sum_oc += entry.brightness * c;
        sum_cc += c * c;
    }

    if overlap < MIN_PROFILE_OVERLAP || sum_cc < EPSILON {
        return None;
    }
    let scale = sum_oc / sum_cc;
    scale.is_finite().then_some(scale)
}

/// Closest-in-time compatible model of the current session that overlaps
/// the target profile.
pub fn find_in_session<'a>(
    session: &'a [BackgroundLightModel],
    target: &MatchTarget<'_>,
) -> Option<&'a BackgroundLightModel> {
    session
        .iter()
        .filter(|m| target.is_compatible(m))
        .filter(|m| find_brightness_scale(target.profile, m.profile()).is_some())
        .min_by_key(|m| time_distance(target.obs_date, m.info.obs_date))
}

/// Best background for `target`: the session first, then the archive.
pub fn find_best(
    session: &[BackgroundLightModel],
    archive: Option<&dyn BackgroundArchive>,
    target: &MatchTarget<'_>,
) -> Result<Option<BackgroundLightModel>> {
    if let Some(model) = find_in_session(session, target) {
        debug!(file_id = %model.info.file_id, "Matched background from session");
        return Ok(Some(model.clone()));
    }

    let Some(archive) = archive else {
        return Ok(None);
    };
    let Some(model) = archive.lookup(&target.archive_key())? else {
        return Ok(None);
    };
    if find_brightness_scale(target.profile, model.profile()).is_none() {
        debug!(file_id = %model.info.file_id, "Archived background does not overlap target");
        return Ok(None);
    }
    debug!(file_id = %model.info.file_id, "Matched background from archive");
    Ok(Some(model))
}

/// Find the best background and its brightness scale.
pub fn match_background(
    session: &[BackgroundLightModel],
    archive: Option<&dyn BackgroundArchive>,
    target: &MatchTarget<'_>,
) -> Result<Option<MatchCandidate>> {
    let Some(model) = find_best(session, archive, target)? else {
        return Ok(None);
    };
    let Some(scale) = find_brightness_scale(target.profile, model.profile()) else {
        return Ok(None);
    };
    info!(
        fiber = %target.fiber,
        source = %model.info.file_id,
        scale,
        "Matched background"
    );
    Ok(Some(MatchCandidate { model, scale }))
}

/// Sum of the scaled surfaces of every matched fiber.
pub fn compose_background(
    shape: (usize, usize),
    matches: &[MatchCandidate],
) -> Result<Array2<f32>> {
    let mut total = Array2::<f32>::zeros(shape);
    for m in matches {
        if m.model.shape() != shape {
            return Err(EchelleError::ShapeMismatch {
                expected: shape,
                actual: m.model.shape(),
            });
        }
        total += &m.scaled_surface();
    }
    Ok(total)
}

/// Absolute time difference in seconds; unknown dates sort last.
fn time_distance(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> i64 {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).num_seconds().abs(),
        _ => i64::MAX,
    }
}
