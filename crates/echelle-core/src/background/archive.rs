use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::consts::{ARCHIVE_ENTRY_EXTENSION, BKG_EXTENSION};
use crate::error::Result;
use crate::frame::Fiber;
use crate::io::bkg::write_atomic;

use super::model::{BackgroundLightModel, ObjectType};

/// What a stored background must share with the frame it replaces.
#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveKey {
    pub fiber: Fiber,
    /// Dispersion-direction code of the instrument setup, e.g. `xr-`.
    pub direction: String,
    pub object_type: ObjectType,
    pub object: String,
    /// Frame shape `(height, width)`.
    pub shape: (usize, usize),
}

/// Read access to previously measured backgrounds.
pub trait BackgroundArchive: Send + Sync {
    fn lookup(&self, key: &ArchiveKey) -> Result<Option<BackgroundLightModel>>;
}

/// One stored model in the archive index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub file_id: String,
    pub fiber: Fiber,
    pub direction: String,
    pub object_type: ObjectType,
    pub object: String,
    pub height: usize,
    pub width: usize,
    pub obs_date: Option<NaiveDateTime>,
    /// File name of the `.bkg`, relative to the archive root.
    pub file: String,
}

/// Directory of `.bkg` files, each with a `.toml` index entry beside it.
///
/// Every model owns its own pair of files, so frames archived concurrently
/// never rewrite each other's entries.
#[derive(Clone, Debug)]
pub struct FileArchive {
    root: PathBuf,
}

impl FileArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All index entries, ordered by file name. A missing directory is an
    /// empty archive.
    pub fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.root)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_index_entry(p))
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = fs::read_to_string(&path)?;
            entries.push(toml::from_str(&contents)?);
        }
        Ok(entries)
    }

    /// Store `model` and its index entry. A model with the same file id and
    /// fiber replaces the earlier one.
    pub fn insert(&self, model: &BackgroundLightModel, direction: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let stem = format!("{}_{}", model.info.file_id, model.info.fiber);
        let file = format!("{stem}.{BKG_EXTENSION}");
        let path = self.root.join(&file);
        model.save(&path)?;

        let (height, width) = model.shape();
        let entry = ArchiveEntry {
            file_id: model.info.file_id.clone(),
            fiber: model.info.fiber,
            direction: direction.to_string(),
            object_type: model.info.object_type,
            object: model.info.object.clone(),
            height,
            width,
            obs_date: model.info.obs_date,
            file,
        };
        let index_path = self.root.join(format!("{stem}.{ARCHIVE_ENTRY_EXTENSION}"));
        write_atomic(&index_path, toml::to_string(&entry)?.as_bytes())?;
        info!(path = %path.display(), "Archived background");
        Ok(path)
    }

    /// Best index entry for `key`, see [`select_entry`].
    pub fn find_entry(&self, key: &ArchiveKey) -> Result<Option<ArchiveEntry>> {
        let entries = self.entries()?;
        Ok(select_entry(&entries, key).cloned())
    }
}

impl BackgroundArchive for FileArchive {
    fn lookup(&self, key: &ArchiveKey) -> Result<Option<BackgroundLightModel>> {
        let Some(entry) = self.find_entry(key)? else {
            debug!(fiber = %key.fiber, object = %key.object, "No archived background");
            return Ok(None);
        };
        debug!(file = %entry.file, "Using archived background");
        BackgroundLightModel::load(&self.root.join(&entry.file)).map(Some)
    }
}

fn is_index_entry(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'));
    !hidden
        && path.is_file()
        && path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_ENTRY_EXTENSION)
}

/// Entries sharing fiber, direction, object type and shape with `key`.
/// Exact object names (case-insensitive) are preferred; stars fall back to
/// any star. The most recent observation wins.
pub fn select_entry<'a>(entries: &'a [ArchiveEntry], key: &ArchiveKey) -> Option<&'a ArchiveEntry> {
    let compatible: Vec<&ArchiveEntry> = entries
        .iter()
        .filter(|e| {
            e.fiber == key.fiber
                && e.direction == key.direction
                && e.object_type == key.object_type
                && (e.height, e.width) == key.shape
        })
        .collect();

    let named: Vec<&ArchiveEntry> = compatible
        .iter()
        .copied()
        .filter(|e| e.object.trim().eq_ignore_ascii_case(key.object.trim()))
        .collect();

    let pool = if !named.is_empty() {
        named
    } else if key.object_type == ObjectType::Star {
        compatible
    } else {
        return None;
    };

    pool.into_iter().max_by_key(|e| e.obs_date)
}
