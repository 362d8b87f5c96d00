//! Rasterization and the headless re-render path.

pub mod fetch;
pub mod headless;
pub mod raster;
pub mod surface;
