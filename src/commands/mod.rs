//! Commands served by the pipeline

pub mod sync;

pub use sync::{ActionArchitecture, InfoStream, Stage};
