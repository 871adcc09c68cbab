use rand::Rng;
use rand::seq::index;

use crate::error::{H2SimError, Result};

pub fn subsample<R: Rng + ?Sized>(universe: &[usize], prop: f64, rng: &mut R) -> Result<Vec<usize>> {
    let n_keep = (universe.len() as f64 * prop).floor() as usize;
    if n_keep == 0 {
        return Err(H2SimError::DegenerateSample(format!(
            "LD score sampling proportion {prop} of {} individuals selects nobody",
            universe.len()
        )));
    }
    let n_keep = n_keep.min(universe.len());
    Ok(index::sample(rng, universe.len(), n_keep)
        .into_iter()
        .map(|i| universe[i])
        .collect())
}

