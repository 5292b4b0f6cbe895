//! Batch reports over the AACT clinical-trials database.
//!
//! A run connects to one [`source::TrialSource`], builds the selected
//! [`report`]s and writes static JSON, CSV and HTML artifacts plus a
//! manifest into the output directory.

pub mod category;
pub mod cli;
pub mod config;
pub mod export;
pub mod logging;
pub mod pivot;
pub mod render;
pub mod report;
pub mod source;
pub mod trial;
pub mod window;
