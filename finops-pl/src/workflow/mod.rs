//! Pattern validation workflow

pub mod promotion;
pub mod validation_pass;

pub use validation_pass::ValidationPass;
