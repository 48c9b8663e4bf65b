pub mod poly;
pub mod rbf;
pub mod stats;
