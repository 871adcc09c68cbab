use anyhow::{Context, Result};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::error::H2SimError;

pub fn liability_threshold(prevalence: f64) -> Result<f64> {
    let norm = Normal::new(0.0, 1.0).context("normal distribution")?;
    Ok(norm.inverse_cdf(1.0 - prevalence))
}

pub fn scale(population_prevalence: f64, study_prevalence: f64, threshold: f64) -> Result<f64> {
    if !(study_prevalence > 0.0 && study_prevalence < 1.0) {
        return Err(H2SimError::DegenerateSample(format!(
            "study prevalence {study_prevalence} leaves no cases or no controls"
        ))
        .into());
    }
    let norm = Normal::new(0.0, 1.0).context("normal distribution")?;
    let k = population_prevalence;
    let denom = study_prevalence * (1.0 - study_prevalence) * norm.pdf(threshold).powi(2);
    let scale = (k * k * (1.0 - k) * (1.0 - k)) / denom;
    if !scale.is_finite() {
        return Err(H2SimError::DegenerateSample(format!(
            "ascertainment scale is not finite (K = {k}, P = {study_prevalence}, T = {threshold})"
        ))
        .into());
    }
    Ok(scale)
}

pub fn scale_for_sample(
    population_prevalence: f64,
    n_cases: usize,
    n: usize,
    threshold: f64,
) -> Result<f64> {
    if n_cases == 0 || n_cases >= n {
        return Err(H2SimError::DegenerateSample(format!(
            "ascertained sample has {n_cases} cases out of {n} individuals"
        ))
        .into());
    }
    let study_prevalence = n_cases as f64 / n as f64;
    scale(population_prevalence, study_prevalence, threshold)
}
