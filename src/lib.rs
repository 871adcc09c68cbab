//! Simulation harness comparing LD score regression and PCGC estimates of additive,
//! dominance and gene-by-environment heritability across Monte Carlo replicates.

pub mod error;
pub mod logging;
pub mod types;

pub mod config;
pub mod io;
pub mod matrix;
pub mod output;
pub mod parallel;
pub mod qc;
pub mod sampling;

pub mod ascertainment;
pub mod controller;
pub mod genealogy;
pub mod ldsc;
pub mod ldscore;
pub mod pcgc;
pub mod phenotype;
