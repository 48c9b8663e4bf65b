pub mod median;

pub use median::median_filter_3x3;
