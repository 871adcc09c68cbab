use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::Solve;

pub fn standardized_additive(column: ArrayView1<u8>, index: &[usize]) -> Vec<f64> {
    let mut values: Vec<f64> = index.iter().map(|&i| f64::from(column[i])).collect();
    standardize(&mut values);
    values
}

pub fn standardized_dominance(column: ArrayView1<u8>, index: &[usize]) -> Vec<f64> {
    if index.is_empty() {
        return Vec::new();
    }
    let p = index.iter().map(|&i| f64::from(column[i])).sum::<f64>() / (2.0 * index.len() as f64);
    let q = 1.0 - p;
    let codes = [-2.0 * p * p, 2.0 * p * q, -2.0 * q * q];
    let mut values: Vec<f64> = index
        .iter()
        .map(|&i| codes[usize::from(column[i].min(2))])
        .collect();
    standardize(&mut values);
    values
}

pub fn standardize(values: &mut [f64]) -> bool {
    if values.is_empty() {
        return false;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if var <= 0.0 || !var.is_finite() {
        values.iter_mut().for_each(|v| *v = 0.0);
        return false;
    }
    let sd = var.sqrt();
    values.iter_mut().for_each(|v| *v = (*v - mean) / sd);
    true
}

pub fn standardize_array(values: &Array1<f64>) -> Option<Array1<f64>> {
    let mut out = values.to_vec();
    standardize(&mut out).then(|| Array1::from_vec(out))
}

pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>() / a.len() as f64
}

pub fn solve_normal_equations(xtx: &[Vec<f64>], xty: &[f64]) -> Result<Vec<f64>> {
    let p = xty.len();
    if xtx.len() != p || xtx.iter().any(|row| row.len() != p) {
        return Err(anyhow::anyhow!("normal equations are not {p}x{p}"));
    }
    let mut data = Vec::with_capacity(p * p);
    for row in xtx {
        data.extend_from_slice(row);
    }
    let a = Array2::from_shape_vec((p, p), data).context("xtx shape")?;
    let b = Array1::from_vec(xty.to_vec());
    let beta = a
        .solve_into(b)
        .context("Singular matrix in regression")?;
    if beta.iter().any(|v| !v.is_finite()) {
        return Err(anyhow::anyhow!("Singular matrix in regression"));
    }
    Ok(beta.to_vec())
}
