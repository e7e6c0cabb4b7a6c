//! UDP metrics collector that slices samples into fixed time windows and
//! rolls each window up into round-robin databases through `rrdtool`.

pub mod agent;
pub mod config;
pub mod ingest;
pub mod persist;
pub mod resolver;
pub mod rollup;
pub mod slices;
pub mod writer;
