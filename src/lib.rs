// src/lib.rs
pub mod assemble;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod parse;
pub mod runner;
pub mod series;
pub mod sources;
pub mod vocab;

pub use error::{Error, ErrorKind, SourceError, Stage};
pub use model::CountyRecord;
pub use sources::{Registry, SourceId};
