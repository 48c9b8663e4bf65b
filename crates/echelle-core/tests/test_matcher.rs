#[allow(dead_code)]
mod common;

use approx::assert_abs_diff_eq;
use chrono::NaiveDateTime;
use tempfile::TempDir;

use echelle_core::background::{
    compose_background, find_best, find_brightness_scale, match_background, ArchiveKey, BackgroundArchive,
    BackgroundLightModel, BrightnessProfile, FileArchive, MatchCandidate, MatchTarget, ObjectType,
};
use echelle_core::error::{EchelleError, Result};
use echelle_core::frame::Fiber;

use common::{date, model};

const SHAPE: (usize, usize) = (8, 10);

fn target<'a>(
    fiber: Fiber,
    object: &'a str,
    profile: &'a BrightnessProfile,
    obs_date: Option<NaiveDateTime>,
) -> MatchTarget<'a> {
    MatchTarget {
        fiber,
        object,
        object_type: ObjectType::classify(object),
        obs_date,
        profile,
        direction: "xr-",
        shape: SHAPE,
    }
}

fn flat_profile(value: f64) -> BrightnessProfile {
    BrightnessProfile::from_brightness(&[(1, value), (2, value), (3, value)])
}

/// In-memory archive returning its first model for the requested fiber.
struct FixedArchive(Vec<BackgroundLightModel>);

impl BackgroundArchive for FixedArchive {
    fn lookup(&self, key: &ArchiveKey) -> Result<Option<BackgroundLightModel>> {
        Ok(self.0.iter().find(|m| m.info.fiber == key.fiber).cloned())
    }
}

// ---------------------------------------------------------------------------
// Session matching
// ---------------------------------------------------------------------------

#[test]
fn test_session_match_scales_surface() {
    let session = vec![model(
        "f1",
        Fiber::B,
        "Comb",
        &[(1, 20.0), (2, 20.0), (3, 20.0)],
        SHAPE,
        4.0,
        Some(date(1, 20)),
    )];
    let observed = flat_profile(10.0);
    let t = target(Fiber::B, "comb", &observed, Some(date(1, 21)));

    let m = match_background(&session, None, &t).unwrap().unwrap();
    assert_eq!(m.model.info.file_id, "f1");
    assert_abs_diff_eq!(m.scale, 0.5, epsilon = 1e-12);
    assert!(m.scaled_surface().iter().all(|&v| v == 2.0));
}

#[test]
fn test_partial_overlap_scale() {
    let dim = BrightnessProfile::from_brightness(&[(1, 10.0), (2, 10.0), (3, 10.0)]);
    let bright = BrightnessProfile::from_brightness(&[(1, 20.0), (2, 20.0), (3, 20.0)]);
    let observed = BrightnessProfile::from_brightness(&[(1, 10.0), (2, 10.0)]);

    let s = find_brightness_scale(&observed, &bright).unwrap();
    assert_abs_diff_eq!(s, 0.5, epsilon = 1e-6);
    let s = find_brightness_scale(&observed, &dim).unwrap();
    assert_abs_diff_eq!(s, 1.0, epsilon = 1e-6);
}

#[test]
fn test_scale_recovers_proportional_profile() {
    let candidate =
        BrightnessProfile::from_brightness(&[(3, 12.0), (4, 31.5), (5, 7.25), (6, 90.0)]);
    let observed =
        BrightnessProfile::from_brightness(&[(4, 31.5 * 2.37), (5, 7.25 * 2.37), (6, 90.0 * 2.37)]);
    let s = find_brightness_scale(&observed, &candidate).unwrap();
    assert_abs_diff_eq!(s, 2.37, epsilon = 1e-6);
}

#[test]
fn test_closest_observation_time_wins() {
    let profile = [(1, 5.0), (2, 5.0)];
    let session = vec![
        model("early", Fiber::A, "HD 1", &profile, SHAPE, 1.0, Some(date(1, 18))),
        model("late", Fiber::A, "HD 1", &profile, SHAPE, 1.0, Some(date(2, 3))),
        model("undated", Fiber::A, "HD 1", &profile, SHAPE, 1.0, None),
    ];
    let observed = flat_profile(5.0);

    let t = target(Fiber::A, "HD 1", &observed, Some(date(2, 1)));
    let best = find_best(&session, None, &t).unwrap().unwrap();
    assert_eq!(best.info.file_id, "late");

    let t = target(Fiber::A, "HD 1", &observed, Some(date(1, 19)));
    let best = find_best(&session, None, &t).unwrap().unwrap();
    assert_eq!(best.info.file_id, "early");
}

#[test]
fn test_incompatible_models_are_skipped() {
    let profile = [(1, 5.0), (2, 5.0)];
    let session = vec![
        model("fiber", Fiber::B, "HD 1", &profile, SHAPE, 1.0, None),
        model("type", Fiber::A, "Comb", &profile, SHAPE, 1.0, None),
        model("shape", Fiber::A, "HD 1", &profile, (8, 11), 1.0, None),
        model("overlap", Fiber::A, "HD 1", &[(7, 5.0), (8, 5.0)], SHAPE, 1.0, None),
    ];
    let observed = flat_profile(5.0);
    let t = target(Fiber::A, "HD 1", &observed, None);
    assert!(match_background(&session, None, &t).unwrap().is_none());
}

#[test]
fn test_lamp_does_not_match_other_lamp() {
    let session = vec![model("fp", Fiber::B, "FP", &[(1, 5.0), (2, 5.0)], SHAPE, 1.0, None)];
    let observed = flat_profile(5.0);
    let t = target(Fiber::B, "Comb", &observed, None);
    assert!(find_best(&session, None, &t).unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Archive fallback
// ---------------------------------------------------------------------------

#[test]
fn test_session_preferred_over_archive() {
    let profile = [(1, 5.0), (2, 5.0)];
    let session = vec![model("session", Fiber::A, "HD 1", &profile, SHAPE, 1.0, None)];
    let archive = FixedArchive(vec![model("archived", Fiber::A, "HD 1", &profile, SHAPE, 1.0, None)]);
    let observed = flat_profile(5.0);
    let t = target(Fiber::A, "HD 1", &observed, None);

    let best = find_best(&session, Some(&archive), &t).unwrap().unwrap();
    assert_eq!(best.info.file_id, "session");
    let best = find_best(&[], Some(&archive), &t).unwrap().unwrap();
    assert_eq!(best.info.file_id, "archived");
}

#[test]
fn test_archive_hit_without_overlap_is_rejected() {
    let archive = FixedArchive(vec![model(
        "archived",
        Fiber::A,
        "HD 1",
        &[(10, 5.0), (11, 5.0)],
        SHAPE,
        1.0,
        None,
    )]);
    let observed = flat_profile(5.0);
    let t = target(Fiber::A, "HD 1", &observed, None);
    assert!(match_background(&[], Some(&archive), &t).unwrap().is_none());
}

#[test]
fn test_file_archive_fallback() {
    let dir = TempDir::new().unwrap();
    let archive = FileArchive::new(dir.path());
    archive
        .insert(
            &model("night1", Fiber::B, "Comb", &[(1, 40.0), (2, 40.0)], SHAPE, 2.0, Some(date(1, 2))),
            "xr-",
        )
        .unwrap();

    let observed = flat_profile(10.0);
    let t = target(Fiber::B, "Comb", &observed, Some(date(3, 2)));
    let m = match_background(&[], Some(&archive), &t).unwrap().unwrap();
    assert_eq!(m.model.info.file_id, "night1");
    assert_abs_diff_eq!(m.scale, 0.25, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

#[test]
fn test_compose_sums_scaled_fibers() {
    let a = MatchCandidate {
        model: model("a", Fiber::A, "HD 1", &[], SHAPE, 2.0, None),
        scale: 1.5,
    };
    let b = MatchCandidate {
        model: model("b", Fiber::B, "Comb", &[], SHAPE, 4.0, None),
        scale: 0.5,
    };
    let total = compose_background(SHAPE, &[a, b]).unwrap();
    assert_eq!(total.dim(), SHAPE);
    assert!(total.iter().all(|&v| v == 5.0));
}

#[test]
fn test_compose_empty_is_zero() {
    let total = compose_background(SHAPE, &[]).unwrap();
    assert!(total.iter().all(|&v| v == 0.0));
}

#[test]
fn test_compose_shape_mismatch() {
    let c = MatchCandidate {
        model: model("a", Fiber::A, "HD 1", &[], (8, 11), 2.0, None),
        scale: 1.0,
    };
    let err = compose_background(SHAPE, &[c]).unwrap_err();
    assert!(matches!(
        err,
        EchelleError::ShapeMismatch {
            expected: (8, 10),
            actual: (8, 11)
        }
    ));
}
