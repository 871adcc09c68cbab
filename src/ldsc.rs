use anyhow::Result;
use ndarray::{ArrayView1, ArrayView2};
use tracing::debug;

use crate::error::H2SimError;
use crate::matrix::solve_normal_equations;
use crate::types::HsqEstimate;

pub trait HeritabilityRegressor {
    #[allow(clippy::too_many_arguments)]
    fn fit(
        &self,
        chisq: ArrayView1<f64>,
        ld: ArrayView2<f64>,
        w_ld: ArrayView2<f64>,
        n: ArrayView2<f64>,
        m: ArrayView2<f64>,
        n_blocks: usize,
        intercept: Option<f64>,
    ) -> Result<HsqEstimate>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JackknifeHsq;

impl HeritabilityRegressor for JackknifeHsq {
    fn fit(
        &self,
        chisq: ArrayView1<f64>,
        ld: ArrayView2<f64>,
        w_ld: ArrayView2<f64>,
        n: ArrayView2<f64>,
        m: ArrayView2<f64>,
        n_blocks: usize,
        intercept: Option<f64>,
    ) -> Result<HsqEstimate> {
        let n_snps = chisq.len();
        for (name, dim) in [("ld", ld.dim()), ("w_ld", w_ld.dim()), ("n", n.dim())] {
            if dim != (n_snps, 1) {
                return Err(anyhow::anyhow!(
                    "{name} has shape {dim:?}, expected ({n_snps}, 1)"
                ));
            }
        }
        let m_tot = m
            .iter()
            .next()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("marker count is empty"))?;
        if !(m_tot > 0.0) {
            return Err(anyhow::anyhow!("marker count must be positive, got {m_tot}"));
        }
        if n_blocks < 2 || n_blocks > n_snps {
            return Err(H2SimError::DegenerateSample(format!(
                "{n_blocks} jackknife blocks for {n_snps} markers"
            ))
            .into());
        }

        let chi: Vec<f64> = chisq.to_vec();
        let l2: Vec<f64> = ld.column(0).to_vec();
        let wld: Vec<f64> = w_ld.column(0).to_vec();
        let n_vec: Vec<f64> = n.column(0).to_vec();
        let n_bar = mean(&n_vec);
        if !(n_bar > 0.0) {
            return Err(anyhow::anyhow!("mean sample size must be positive, got {n_bar}"));
        }

        let weights = regression_weights(&chi, &l2, &wld, &n_vec, m_tot, intercept)?;

        let (x, y): (Vec<Vec<f64>>, Vec<f64>) = match intercept {
            None => l2
                .iter()
                .zip(&chi)
                .zip(&weights)
                .map(|((l, c), w)| (vec![l * w, *w], c * w))
                .unzip(),
            Some(fixed) => l2
                .iter()
                .zip(&chi)
                .zip(&weights)
                .map(|((l, c), w)| (vec![l * w], (c - fixed) * w))
                .unzip(),
        };

        let (reg, pseudo_values) = jackknife_regression(&x, &y, n_blocks)?;
        let se = jackknife_se(&pseudo_values);

        let tot = reg[0] / n_bar * m_tot;
        let tot_se = se[0] / n_bar * m_tot;
        let (intercept, intercept_se) = match intercept {
            None => (reg[1], se[1]),
            Some(fixed) => (fixed, f64::NAN),
        };
        debug!("LDSC fit: h2 {tot:.4} ({tot_se:.4}), intercept {intercept:.4}");
        Ok(HsqEstimate {
            tot,
            tot_se,
            intercept,
            intercept_se,
        })
    }
}

fn regression_weights(
    chi: &[f64],
    l2: &[f64],
    wld: &[f64],
    n: &[f64],
    m_tot: f64,
    intercept: Option<f64>,
) -> Result<Vec<f64>> {
    let mean_chi = mean(chi);
    let mean_l2n = mean(&l2.iter().zip(n).map(|(l, n)| l * n).collect::<Vec<_>>());
    let mut tot_agg = (m_tot * (mean_chi - intercept.unwrap_or(1.0))) / mean_l2n;
    if !tot_agg.is_finite() {
        tot_agg = 0.0;
    }
    tot_agg = tot_agg.clamp(0.0, 1.0);

    let mut weights = Vec::with_capacity(chi.len());
    let mut sum_w = 0.0;
    for i in 0..chi.len() {
        let ld = l2[i].max(1.0);
        let w_ld = wld[i].max(1.0);
        let c = tot_agg * n[i] / m_tot;
        let het_w = 1.0 / (2.0 * (1.0 + c * ld).powi(2));
        let oc_w = 1.0 / w_ld;
        let w = (het_w * oc_w).sqrt();
        sum_w += w;
        weights.push(w);
    }
    if sum_w == 0.0 || !sum_w.is_finite() {
        return Err(anyhow::anyhow!("sum of weights is {sum_w}"));
    }
    for w in weights.iter_mut() {
        *w /= sum_w;
    }
    Ok(weights)
}

fn jackknife_regression(
    x: &[Vec<f64>],
    y: &[f64],
    n_blocks: usize,
) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let p = x.first().map(|row| row.len()).unwrap_or(0);
    let bounds = block_bounds(y.len(), n_blocks);
    let mut xty_blocks = vec![vec![0.0; p]; n_blocks];
    let mut xtx_blocks = vec![vec![vec![0.0; p]; p]; n_blocks];

    for (b, (start, end)) in bounds.iter().enumerate() {
        for i in *start..*end {
            for r in 0..p {
                xty_blocks[b][r] += x[i][r] * y[i];
                for c in 0..p {
                    xtx_blocks[b][r][c] += x[i][r] * x[i][c];
                }
            }
        }
    }

    let mut xty = vec![0.0; p];
    let mut xtx = vec![vec![0.0; p]; p];
    for b in 0..n_blocks {
        for r in 0..p {
            xty[r] += xty_blocks[b][r];
            for c in 0..p {
                xtx[r][c] += xtx_blocks[b][r][c];
            }
        }
    }

    let reg = solve_normal_equations(&xtx, &xty)?;

    let blocks = n_blocks as f64;
    let mut pseudo_values = Vec::with_capacity(n_blocks);
    for b in 0..n_blocks {
        let xty_del: Vec<f64> = (0..p).map(|r| xty[r] - xty_blocks[b][r]).collect();
        let xtx_del: Vec<Vec<f64>> = (0..p)
            .map(|r| (0..p).map(|c| xtx[r][c] - xtx_blocks[b][r][c]).collect())
            .collect();
        let del = solve_normal_equations(&xtx_del, &xty_del)?;
        let pseudo = (0..p)
            .map(|r| blocks * reg[r] - (blocks - 1.0) * del[r])
            .collect();
        pseudo_values.push(pseudo);
    }

    Ok((reg, pseudo_values))
}

fn jackknife_se(pseudo_values: &[Vec<f64>]) -> Vec<f64> {
    let n = pseudo_values.len() as f64;
    let p = pseudo_values.first().map(|v| v.len()).unwrap_or(0);
    let denom = (n - 1.0).max(1.0);
    (0..p)
        .map(|r| {
            let mean = pseudo_values.iter().map(|v| v[r]).sum::<f64>() / n;
            let ss = pseudo_values
                .iter()
                .map(|v| (v[r] - mean).powi(2))
                .sum::<f64>();
            (ss / denom / n).sqrt()
        })
        .collect()
}

fn block_bounds(n_snps: usize, n_blocks: usize) -> Vec<(usize, usize)> {
    let separators: Vec<usize> = (0..=n_blocks)
        .map(|i| ((i as f64) * (n_snps as f64) / (n_blocks as f64)).floor() as usize)
        .map(|s| s.min(n_snps))
        .collect();
    separators.windows(2).map(|w| (w[0], w[1])).collect()
}

fn mean(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0.0;
    for v in values {
        if v.is_finite() {
            sum += v;
            count += 1.0;
        }
    }
    if count == 0.0 { f64::NAN } else { sum / count }
}
