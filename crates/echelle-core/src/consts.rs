/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Default mask bit marking a saturated/bad pixel.
pub const DEFAULT_BLOCK_MASK: u16 = 4;

/// Default column stride (pixels) of the inter-order node scan.
pub const DEFAULT_SCAN_STEP: usize = 200;

/// Default polynomial order along the dispersion axis.
pub const DEFAULT_XORDER: usize = 2;

/// Default polynomial order along the cross-dispersion axis.
pub const DEFAULT_YORDER: usize = 2;

/// Default maximum number of sigma-clipping rounds.
pub const DEFAULT_MAXITER: usize = 5;

/// Default upper and lower sigma-clipping thresholds.
pub const DEFAULT_CLIP_SIGMA: f64 = 3.0;

/// A new midpoint closer than this fraction of the scan step to the previous
/// accepted midpoint is skipped.
pub const MIDPOINT_SPACING_FRACTION: f64 = 0.6;

/// Half-width of the trough search window, as a fraction of the gap between
/// two adjacent order centers.
pub const MIDPOINT_SEARCH_FRACTION: f64 = 0.25;

/// Degree of the index -> row polynomial used to extend nodes to the frame
/// edges.
pub const EXTENSION_POLY_DEGREE: usize = 3;

/// Minimum number of direct inter-order nodes in a column before the
/// extension polynomial is fitted.
pub const MIN_EXTENSION_NODES: usize = 4;

/// Upper bound on extrapolation steps per direction and column.
pub const MAX_EXTRAPOLATION_STEPS: usize = 4096;

/// Singular values below this (relative) tolerance are treated as zero in
/// least-squares solves.
pub const SVD_EPSILON: f64 = 1e-12;

/// Minimum number of apertures shared by two brightness profiles before a
/// scale factor is fitted.
pub const MIN_PROFILE_OVERLAP: usize = 2;

/// Magic bytes at the start of a persisted background-light file.
pub const BKG_MAGIC: &[u8; 16] = b"ECHELLE-BKGLIGHT";

/// Version of the persisted background-light format.
pub const BKG_FORMAT_VERSION: u32 = 1;

/// Extension of persisted background-light files.
pub const BKG_EXTENSION: &str = "bkg";

/// Extension of the per-model index entries of an on-disk archive.
pub const ARCHIVE_ENTRY_EXTENSION: &str = "toml";
