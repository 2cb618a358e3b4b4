//! Command-line frontend for the voxrec dataset pipeline.

pub mod cli;
pub mod create;
pub mod featurizer;
pub mod lengths;
pub mod vocab;
