//! Core domain types
//!
//! This module contains the structures shared between the pipeline executor
//! (which drives builds and pushes) and the CLI (which previews and reports).

pub mod event;
pub mod image;
pub mod run;
pub mod semver;
pub mod tag;
pub mod variant;
