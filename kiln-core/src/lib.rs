//! Kiln Core
//!
//! Core types and pure logic for the Kiln image build pipeline.
//!
//! This crate contains:
//! - Domain types: variants, events, tags, images and runs
//! - Variant resolution, tag derivation and the publish gate
//! - The error taxonomy shared by the runner and the CLI
//!
//! Note: Nothing in here touches the container runtime or the registry.
//! Execution lives in `kiln-runner`.

pub mod domain;
pub mod error;
pub mod gate;
pub mod resolver;
pub mod tags;
