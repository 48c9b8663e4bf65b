pub mod aperture;
pub mod background;
pub mod consts;
pub mod error;
pub mod filters;
pub mod frame;
pub mod io;
pub mod math;
pub mod pipeline;
pub mod wlcalib;
