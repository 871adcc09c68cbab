use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Normal};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::ascertainment::liability_threshold;
use crate::config::SimConfig;
use crate::error::H2SimError;
use crate::matrix::{correlation, standardize, standardized_additive, standardized_dominance};
use crate::types::{AssociationStats, CaseControlSample, Genealogy, Phenotypes};

pub trait PhenotypeSimulator {
    fn simulate(
        &self,
        config: &SimConfig,
        genealogy: &Genealogy,
        rng: &mut StdRng,
    ) -> Result<Phenotypes>;

    fn derive_chisq(
        &self,
        config: &SimConfig,
        genealogy: &Genealogy,
        phenotypes: &Phenotypes,
        rng: &mut StdRng,
    ) -> Result<AssociationStats>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiabilityModel;

#[derive(Debug, Clone, Copy)]
enum Component {
    Additive,
    Dominance,
    AdditiveByCovariate,
}

impl PhenotypeSimulator for LiabilityModel {
    fn simulate(
        &self,
        config: &SimConfig,
        genealogy: &Genealogy,
        rng: &mut StdRng,
    ) -> Result<Phenotypes> {
        let pheno = &config.phenotype;
        let n = genealogy.n;
        let m_total = genealogy.layout.m_total;
        if m_total == 0 || n == 0 {
            return Err(H2SimError::DegenerateSample(format!(
                "cannot simulate phenotypes for {n} individuals and {m_total} markers"
            ))
            .into());
        }
        let n_causal = (((m_total as f64) * pheno.p_causal).floor() as usize).clamp(1, m_total);

        let covariate: Vec<f64> = if pheno.c_bool {
            let coin = Bernoulli::new(pheno.c_bool_p).context("boolean covariate")?;
            (0..n).map(|_| f64::from(u8::from(coin.sample(rng)))).collect()
        } else {
            (0..n).map(|_| rng.sample::<f64, _>(rand_distr::StandardNormal)).collect()
        };
        let mut c_std = covariate.clone();
        standardize(&mut c_std);

        let additive_sites = index::sample(rng, m_total, n_causal).into_vec();
        let (dominance_sites, gxe_sites) = if pheno.same_causal_sites {
            (additive_sites.clone(), additive_sites.clone())
        } else {
            (
                index::sample(rng, m_total, n_causal).into_vec(),
                index::sample(rng, m_total, n_causal).into_vec(),
            )
        };

        let mut effects = Vec::with_capacity(3 * n_causal);
        for (component, h2, sites) in [
            (Component::Additive, pheno.h2_a, &additive_sites),
            (Component::Dominance, pheno.effective_h2_d(), &dominance_sites),
            (Component::AdditiveByCovariate, pheno.effective_h2_ac(), &gxe_sites),
        ] {
            if h2 <= 0.0 {
                continue;
            }
            let beta = Normal::new(0.0, (h2 / n_causal as f64).sqrt())
                .context("effect size distribution")?;
            effects.extend(sites.iter().map(|&j| (component, j, beta.sample(rng))));
        }

        let everyone: Vec<usize> = (0..n).collect();
        let genetic = effects
            .par_iter()
            .fold(
                || Array1::<f64>::zeros(n),
                |mut acc, &(component, j, beta)| {
                    let column = genealogy.genotypes.column(j);
                    match component {
                        Component::Additive => {
                            let x = standardized_additive(column, &everyone);
                            acc.iter_mut().zip(&x).for_each(|(a, v)| *a += beta * v);
                        }
                        Component::Dominance => {
                            let d = standardized_dominance(column, &everyone);
                            acc.iter_mut().zip(&d).for_each(|(a, v)| *a += beta * v);
                        }
                        Component::AdditiveByCovariate => {
                            let x = standardized_additive(column, &everyone);
                            acc.iter_mut()
                                .zip(x.iter().zip(&c_std))
                                .for_each(|(a, (v, c))| *a += beta * v * c);
                        }
                    }
                    acc
                },
            )
            .reduce(|| Array1::<f64>::zeros(n), |a, b| a + b);

        let mut y = genetic;
        if pheno.include_pop_strat {
            let clade = Normal::new(0.0, pheno.s2.sqrt()).context("population mean distribution")?;
            let means: Vec<f64> = (0..genealogy.n_pops).map(|_| clade.sample(rng)).collect();
            y.iter_mut()
                .zip(&genealogy.populations)
                .for_each(|(v, &p)| *v += means[p]);
        }
        let noise_var = pheno.noise_variance().max(0.0);
        if noise_var > 0.0 {
            let noise = Normal::new(0.0, noise_var.sqrt()).context("noise distribution")?;
            y.iter_mut().for_each(|v| *v += noise.sample(rng));
        }

        let covariates = Array2::from_shape_vec((n, 1), covariate).context("covariate matrix")?;
        Ok(Phenotypes { y, covariates })
    }

    fn derive_chisq(
        &self,
        config: &SimConfig,
        genealogy: &Genealogy,
        phenotypes: &Phenotypes,
        rng: &mut StdRng,
    ) -> Result<AssociationStats> {
        let mut liability = phenotypes.y.to_vec();
        if !standardize(&mut liability) {
            return Err(H2SimError::DegenerateSample("phenotype has zero variance".to_string()).into());
        }

        let (index, response, case_control) = if config.case_control {
            let (index, sample) = ascertain(config, &liability, rng)?;
            let response = sample.phenotype.to_vec();
            (index, response, Some(sample))
        } else {
            ((0..genealogy.n).collect::<Vec<_>>(), liability, None)
        };

        let mut y = response;
        if !standardize(&mut y) {
            return Err(H2SimError::DegenerateSample(
                "analysed phenotype has zero variance".to_string(),
            )
            .into());
        }

        let covariates = phenotypes.covariates.select(Axis(0), &index);
        let mut c_std: Vec<f64> = if covariates.ncols() > 0 {
            covariates.column(0).to_vec()
        } else {
            vec![0.0; index.len()]
        };
        if !standardize(&mut c_std) {
            warn!("Environmental covariate is constant in the analysed sample");
        }

        let n = index.len();
        let stats: Vec<(f64, f64, f64)> = (0..genealogy.layout.m_geno_total)
            .into_par_iter()
            .map(|j| {
                let column = genealogy.genotyped.column(j);
                let x = standardized_additive(column, &index);
                let d = standardized_dominance(column, &index);
                let mut xc: Vec<f64> = x.iter().zip(&c_std).map(|(a, c)| a * c).collect();
                standardize(&mut xc);
                let nf = n as f64;
                (
                    nf * correlation(&x, &y).powi(2),
                    nf * correlation(&d, &y).powi(2),
                    nf * correlation(&xc, &y).powi(2),
                )
            })
            .collect();

        let mut chisq_a = Vec::with_capacity(stats.len());
        let mut chisq_d = Vec::with_capacity(stats.len());
        let mut chisq_ac = Vec::with_capacity(stats.len());
        for (a, d, ac) in stats {
            chisq_a.push(a);
            chisq_d.push(d);
            chisq_ac.push(ac);
        }
        info!(
            "Association statistics on {n} individuals: mean chi^2 A {:.4}, D {:.4}, AC {:.4}",
            mean(&chisq_a),
            mean(&chisq_d),
            mean(&chisq_ac)
        );

        Ok(AssociationStats {
            chisq_a: Array1::from_vec(chisq_a),
            chisq_d: Array1::from_vec(chisq_d),
            chisq_ac: Array1::from_vec(chisq_ac),
            n,
            covariates,
            index,
            case_control,
        })
    }
}

fn ascertain(
    config: &SimConfig,
    liability: &[f64],
    rng: &mut StdRng,
) -> Result<(Vec<usize>, CaseControlSample)> {
    let asc = &config.ascertainment;
    let threshold = liability_threshold(asc.prevalence)?;
    let (cases, controls): (Vec<usize>, Vec<usize>) =
        (0..liability.len()).partition(|&i| liability[i] > threshold);

    let n_cases = asc.n_cases.min(cases.len());
    if n_cases < asc.n_cases {
        warn!(
            "Only {} individuals exceed the liability threshold; {} cases requested",
            cases.len(),
            asc.n_cases
        );
    }
    let p = asc.study_prevalence();
    let wanted_controls = ((n_cases as f64) * (1.0 - p) / p).round() as usize;
    let n_controls = wanted_controls.min(controls.len());
    if n_controls < wanted_controls {
        warn!(
            "Only {} controls available; {} requested",
            controls.len(),
            wanted_controls
        );
    }
    if n_cases == 0 || n_controls == 0 {
        return Err(H2SimError::DegenerateSample(format!(
            "ascertained sample has {n_cases} cases and {n_controls} controls"
        ))
        .into());
    }

    let mut chosen: Vec<(usize, f64)> = index::sample(rng, cases.len(), n_cases)
        .into_iter()
        .map(|i| (cases[i], 1.0))
        .chain(
            index::sample(rng, controls.len(), n_controls)
                .into_iter()
                .map(|i| (controls[i], 0.0)),
        )
        .collect();
    chosen.sort_unstable_by_key(|&(i, _)| i);

    info!(
        "Ascertained {n_cases} cases and {n_controls} controls (liability threshold {threshold:.4})"
    );
    let index = chosen.iter().map(|&(i, _)| i).collect();
    let phenotype = chosen.iter().map(|&(_, status)| status).collect();
    Ok((
        index,
        CaseControlSample {
            phenotype,
            n_cases,
            threshold,
        },
    ))
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
