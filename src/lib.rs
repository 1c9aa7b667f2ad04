//! ChromaSky scoring core.
//!
//! Traces where a solar event happens within a local time window, filters a
//! forecast grid to that region and scores every remaining point for sky
//! colour quality in parallel.

pub mod dataset;
pub mod error;
pub mod filter;
pub mod geodesy;
pub mod geojson;
pub mod grid;
pub mod logging;
pub mod pipeline;
pub mod region;
pub mod score;
pub mod solar;
pub mod time;

pub use error::{ChromaError, Result};
