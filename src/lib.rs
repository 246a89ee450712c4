pub mod aggregate;
pub mod alerts;
pub mod api;
pub mod baseline;
pub mod cli;
pub mod error;
pub mod heatmap;
pub mod lifecycle;
pub mod memory;
pub mod model;
pub mod normalize;
pub mod prefs;
pub mod store;
pub mod usage;
