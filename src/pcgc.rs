use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, s};
use rayon::prelude::*;
use tracing::info;

use crate::config::SimConfig;
use crate::error::H2SimError;
use crate::matrix::{solve_normal_equations, standardize, standardized_additive, standardized_dominance};
use crate::parallel::run_in_pool;
use crate::types::{Genealogy, PcgcRow};

#[derive(Debug, Clone, Copy)]
pub struct PcgcInput<'a> {
    pub replicate: usize,
    pub genealogy: &'a Genealogy,
    pub phenotype: ArrayView1<'a, f64>,
    pub n: usize,
    pub covariates: &'a Array2<f64>,
    pub index: &'a [usize],
    pub m_geno_total: usize,
    pub scale: f64,
}

pub trait PcgcEstimator {
    fn estimate(&self, config: &SimConfig, input: &PcgcInput<'_>) -> Result<PcgcRow>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PairwisePcgc;

const ROW_BLOCK: usize = 256;
const N_KERNELS: usize = 3;

#[derive(Debug, Clone, Default)]
struct NormalEquations {
    xtx: [[f64; N_KERNELS]; N_KERNELS],
    xty: [f64; N_KERNELS],
}

impl NormalEquations {
    fn add(&mut self, row: [f64; N_KERNELS], target: f64) {
        for r in 0..N_KERNELS {
            self.xty[r] += row[r] * target;
            for c in 0..N_KERNELS {
                self.xtx[r][c] += row[r] * row[c];
            }
        }
    }

    fn merge(mut self, other: Self) -> Self {
        for r in 0..N_KERNELS {
            self.xty[r] += other.xty[r];
            for c in 0..N_KERNELS {
                self.xtx[r][c] += other.xtx[r][c];
            }
        }
        self
    }
}

impl PcgcEstimator for PairwisePcgc {
    fn estimate(&self, config: &SimConfig, input: &PcgcInput<'_>) -> Result<PcgcRow> {
        let n_s = input.index.len();
        if n_s < 2 || input.phenotype.len() != n_s {
            return Err(H2SimError::DegenerateSample(format!(
                "PCGC needs a phenotype for each of at least 2 individuals, got {} values for {n_s}",
                input.phenotype.len()
            ))
            .into());
        }
        if input.m_geno_total == 0 {
            return Err(H2SimError::DegenerateSample("no genotyped markers".to_string()).into());
        }
        info!(
            "Running PCGC for replicate {} on {} individuals",
            input.replicate + 1,
            input.n
        );

        let mut y = input.phenotype.to_vec();
        if !standardize(&mut y) {
            return Err(H2SimError::DegenerateSample("PCGC phenotype has zero variance".to_string()).into());
        }
        let mut c: Vec<f64> = if input.covariates.ncols() > 0 {
            input.covariates.column(0).to_vec()
        } else {
            vec![0.0; n_s]
        };
        standardize(&mut c);

        let genotyped = &input.genealogy.genotyped;
        let m = input.m_geno_total as f64;
        let equations = run_in_pool(config.cores, "build PCGC thread pool", || {
            let x = coded_matrix(genotyped, input.index, standardized_additive);
            let d = coded_matrix(genotyped, input.index, standardized_dominance);
            let blocks: Vec<(usize, usize)> = (0..n_s)
                .step_by(ROW_BLOCK)
                .map(|lo| (lo, (lo + ROW_BLOCK).min(n_s)))
                .collect();
            blocks
                .par_iter()
                .map(|&(lo, hi)| {
                    let k_a = x.slice(s![lo..hi, ..]).dot(&x.t()) / m;
                    let k_d = d.slice(s![lo..hi, ..]).dot(&d.t()) / m;
                    let mut acc = NormalEquations::default();
                    for (r, i) in (lo..hi).enumerate() {
                        for j in (i + 1)..n_s {
                            let k = k_a[[r, j]];
                            acc.add([k, k_d[[r, j]], k * c[i] * c[j]], y[i] * y[j]);
                        }
                    }
                    acc
                })
                .reduce(NormalEquations::default, NormalEquations::merge)
        })?;

        let coef = solve_active(&equations)?;
        let row = PcgcRow {
            h2_a: coef[0] * input.scale,
            h2_d: coef[1] * input.scale,
            h2_ac: coef[2] * input.scale,
        };
        info!(
            "PCGC estimates: h2_A {:.4}, h2_D {:.4}, h2_AC {:.4}",
            row.h2_a, row.h2_d, row.h2_ac
        );
        Ok(row)
    }
}

fn solve_active(eq: &NormalEquations) -> Result<[f64; N_KERNELS]> {
    let active: Vec<usize> = (0..N_KERNELS).filter(|&k| eq.xtx[k][k] > 0.0).collect();
    if active.is_empty() {
        return Err(H2SimError::DegenerateSample("all PCGC kinships are zero".to_string()).into());
    }
    let xtx: Vec<Vec<f64>> = active
        .iter()
        .map(|&r| active.iter().map(|&c| eq.xtx[r][c]).collect())
        .collect();
    let xty: Vec<f64> = active.iter().map(|&r| eq.xty[r]).collect();
    let beta = solve_normal_equations(&xtx, &xty)?;
    let mut out = [0.0; N_KERNELS];
    for (&k, b) in active.iter().zip(beta) {
        out[k] = b;
    }
    Ok(out)
}

type Coder = fn(ArrayView1<u8>, &[usize]) -> Vec<f64>;

fn coded_matrix(genotyped: &Array2<u8>, index: &[usize], coder: Coder) -> Array2<f64> {
    let columns: Vec<Array1<f64>> = (0..genotyped.ncols())
        .into_par_iter()
        .map(|j| Array1::from_vec(coder(genotyped.column(j), index)))
        .collect();
    let mut out = Array2::<f64>::zeros((index.len(), genotyped.ncols()));
    for (j, col) in columns.into_iter().enumerate() {
        out.column_mut(j).assign(&col);
    }
    out
}
