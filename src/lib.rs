#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod pipeline;

pub use error::PipelineError;
