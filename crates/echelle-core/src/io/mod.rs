pub mod bkg;
pub mod image_io;
