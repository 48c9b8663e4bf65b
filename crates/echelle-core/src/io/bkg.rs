use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::background::model::{BackgroundInfo, BackgroundLightModel};
use crate::background::profile::{BrightnessProfile, ProfileEntry};
use crate::consts::{BKG_FORMAT_VERSION, BKG_MAGIC};
use crate::error::{EchelleError, Result};

/// magic + version, height, width, n_aper, meta_len
const BKG_HEADER_SIZE: usize = 16 + 5 * 4;
/// aperture i32, order i32, position f64, wavelength f64, brightness f64
const PROFILE_ROW_SIZE: usize = 4 + 4 + 3 * 8;

/// Write the `.bkg` layout of `model` to `w`.
pub fn encode(w: &mut impl Write, model: &BackgroundLightModel) -> Result<()> {
    let (h, w_px) = model.shape();
    let meta = toml::to_string(&model.info)?;
    let profile = model.profile().entries();

    w.write_all(BKG_MAGIC)?;
    w.write_u32::<LittleEndian>(BKG_FORMAT_VERSION)?;
    w.write_u32::<LittleEndian>(to_u32(h, "height")?)?;
    w.write_u32::<LittleEndian>(to_u32(w_px, "width")?)?;
    w.write_u32::<LittleEndian>(to_u32(profile.len(), "aperture count")?)?;
    w.write_u32::<LittleEndian>(to_u32(meta.len(), "metadata length")?)?;
    w.write_all(meta.as_bytes())?;

    for e in profile {
        w.write_i32::<LittleEndian>(e.aperture)?;
        w.write_i32::<LittleEndian>(e.order)?;
        w.write_f64::<LittleEndian>(e.position)?;
        w.write_f64::<LittleEndian>(e.wavelength)?;
        w.write_f64::<LittleEndian>(e.brightness)?;
    }

    for &v in model.surface().iter() {
        w.write_f32::<LittleEndian>(v)?;
    }
    Ok(())
}

/// Parse a `.bkg` byte buffer.
pub fn decode(bytes: &[u8]) -> Result<BackgroundLightModel> {
    if bytes.len() < BKG_HEADER_SIZE {
        return Err(EchelleError::InvalidBackgroundFile(
            "file too small for header".into(),
        ));
    }
    if &bytes[..BKG_MAGIC.len()] != BKG_MAGIC {
        return Err(EchelleError::InvalidBackgroundFile(
            "missing ECHELLE-BKGLIGHT magic".into(),
        ));
    }

    let mut cursor = Cursor::new(&bytes[BKG_MAGIC.len()..BKG_HEADER_SIZE]);
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != BKG_FORMAT_VERSION {
        return Err(EchelleError::InvalidBackgroundFile(format!(
            "unsupported version {version}"
        )));
    }
    let h = cursor.read_u32::<LittleEndian>()? as usize;
    let w = cursor.read_u32::<LittleEndian>()? as usize;
    let n_aper = cursor.read_u32::<LittleEndian>()? as usize;
    let meta_len = cursor.read_u32::<LittleEndian>()? as usize;

    let profile_start = BKG_HEADER_SIZE + meta_len;
    let surface_start = n_aper
        .checked_mul(PROFILE_ROW_SIZE)
        .and_then(|n| n.checked_add(profile_start));
    let expected = h
        .checked_mul(w)
        .and_then(|n| n.checked_mul(4))
        .zip(surface_start)
        .and_then(|(n, start)| n.checked_add(start));
    let (Some(surface_start), Some(expected)) = (surface_start, expected) else {
        return Err(EchelleError::InvalidBackgroundFile(
            "header sizes overflow".into(),
        ));
    };
    if bytes.len() != expected {
        return Err(EchelleError::InvalidBackgroundFile(format!(
            "expected {expected} bytes, got {}",
            bytes.len()
        )));
    }

    let meta = std::str::from_utf8(&bytes[BKG_HEADER_SIZE..profile_start]).map_err(|e| {
        EchelleError::InvalidBackgroundFile(format!("metadata is not UTF-8: {e}"))
    })?;
    let info: BackgroundInfo = toml::from_str(meta)?;

    let mut cursor = Cursor::new(&bytes[profile_start..surface_start]);
    let mut entries = Vec::with_capacity(n_aper);
    for _ in 0..n_aper {
        entries.push(ProfileEntry {
            aperture: cursor.read_i32::<LittleEndian>()?,
            order: cursor.read_i32::<LittleEndian>()?,
            position: cursor.read_f64::<LittleEndian>()?,
            wavelength: cursor.read_f64::<LittleEndian>()?,
            brightness: cursor.read_f64::<LittleEndian>()?,
        });
    }

    let mut values = vec![0f32; h * w];
    LittleEndian::read_f32_into(&bytes[surface_start..], &mut values);
    let surface = Array2::from_shape_vec((h, w), values)
        .map_err(|e| EchelleError::InvalidBackgroundFile(e.to_string()))?;

    Ok(BackgroundLightModel::new(
        info,
        surface,
        BrightnessProfile::from_entries(entries),
    ))
}

/// Write `model` to `path` through a sibling temporary file and a rename,
/// so readers never see a partial file.
pub fn write_bkg(path: &Path, model: &BackgroundLightModel) -> Result<()> {
    let tmp = temp_sibling(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = BufWriter::new(file);
        encode(&mut writer, model)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Memory-map and decode a `.bkg` file.
pub fn read_bkg(path: &Path) -> Result<BackgroundLightModel> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    decode(&mmap)
}

/// Write `contents` to `path` atomically (temporary sibling + rename).
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Hidden temporary name next to `path`, unique per process and call so
/// concurrent writers of the same file never share one.
fn temp_sibling(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = NEXT.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}

fn to_u32(v: usize, what: &str) -> Result<u32> {
    u32::try_from(v)
        .map_err(|_| EchelleError::InvalidBackgroundFile(format!("{what} {v} does not fit in u32")))
}
