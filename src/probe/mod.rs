//! Light probes
//!
//! A [`LightProbeGroup`] lays out a lattice of probes inside a scene node and
//! bakes each one by capturing the scene into a cube map and projecting the
//! result onto third-order spherical harmonics.

mod generator;
mod group;
mod helper;
mod sh;

pub use generator::*;
pub use group::*;
pub use helper::*;
pub use sh::*;

use thiserror::Error;

use crate::capture::CaptureError;

/// Probe group error type
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid probe grid: {0}")]
    InvalidGrid(String),
    #[error("Invalid probe group options: {0}")]
    InvalidOptions(String),
    #[error("Failed to create capture rig: {0}")]
    Rig(#[from] CaptureError),
    #[error("Probe group is not attached to the scene")]
    NotAttached,
    #[error("Probe group is already attached to a scene")]
    AlreadyAttached,
    #[error("Bake incomplete: {failed} failed, {skipped} skipped (first failure at probe {first_failure:?})")]
    BakeIncomplete {
        failed: usize,
        skipped: usize,
        first_failure: Option<usize>,
    },
}

pub type ProbeResult<T> = Result<T, ProbeError>;
