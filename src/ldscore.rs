use anyhow::Result;
use ndarray::Array1;
use rayon::prelude::*;
use tracing::info;

use crate::error::H2SimError;
use crate::matrix::{standardized_additive, standardized_dominance};
use crate::parallel::run_in_pool;
use crate::types::{Genealogy, LdScores};

pub trait LdScoreEstimator {
    fn compute(
        &self,
        genealogy: &Genealogy,
        index: Option<&[usize]>,
        replicate: usize,
    ) -> Result<LdScores>;
}

#[derive(Debug, Clone)]
pub struct WindowedLdScores {
    pub window: usize,
    pub cores: Option<usize>,
}

impl LdScoreEstimator for WindowedLdScores {
    fn compute(
        &self,
        genealogy: &Genealogy,
        index: Option<&[usize]>,
        replicate: usize,
    ) -> Result<LdScores> {
        let all: Vec<usize>;
        let index = match index {
            Some(index) => index,
            None => {
                all = (0..genealogy.n).collect();
                &all
            }
        };
        if index.len() < 3 {
            return Err(H2SimError::DegenerateSample(format!(
                "LD scores need at least 3 individuals, got {}",
                index.len()
            ))
            .into());
        }
        info!(
            "Computing LD scores for replicate {} on {} individuals",
            replicate + 1,
            index.len()
        );

        let (additive, dominance) = run_in_pool(self.cores, "build LD score thread pool", || {
            let additive = coded_panel(genealogy, index, standardized_additive);
            let dominance = coded_panel(genealogy, index, standardized_dominance);
            let l_a = windowed_scores(&additive, genealogy, self.window);
            let l_d = windowed_scores(&dominance, genealogy, self.window);
            (l_a, l_d)
        })?;

        Ok(LdScores {
            additive: Array1::from_vec(additive),
            dominance: Array1::from_vec(dominance),
        })
    }
}

type Coder = fn(ndarray::ArrayView1<u8>, &[usize]) -> Vec<f64>;

fn coded_panel(genealogy: &Genealogy, index: &[usize], coder: Coder) -> Vec<Vec<f32>> {
    (0..genealogy.layout.m_geno_total)
        .into_par_iter()
        .map(|j| {
            coder(genealogy.genotyped.column(j), index)
                .into_iter()
                .map(|v| v as f32)
                .collect()
        })
        .collect()
}

fn windowed_scores(codes: &[Vec<f32>], genealogy: &Genealogy, window: usize) -> Vec<f64> {
    let layout = &genealogy.layout;
    (0..codes.len())
        .into_par_iter()
        .map(|j| {
            let chr = layout.geno_chromosome(j);
            let chr_start = layout.m_geno_start[chr];
            let chr_end = chr_start + layout.m_geno[chr];
            let lo = j.saturating_sub(window).max(chr_start);
            let hi = (j + window + 1).min(chr_end);
            (lo..hi).map(|k| adjusted_r2(&codes[j], &codes[k])).sum()
        })
        .collect()
}

// Unbiased r^2 for n samples.
fn adjusted_r2(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len() as f64;
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let r = dot / n;
    let r2 = r * r;
    r2 - (1.0 - r2) / (n - 2.0)
}
