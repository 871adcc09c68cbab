use anyhow::{Context, Result};
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::ascertainment::scale_for_sample;
use crate::config::{InterceptMode, SimConfig};
use crate::error::H2SimError;
use crate::genealogy::GenealogyProvider;
use crate::io::write_genealogy;
use crate::ldscore::LdScoreEstimator;
use crate::ldsc::HeritabilityRegressor;
use crate::matrix::standardize_array;
use crate::output::{replicate_path, write_ldscores, write_phenotypes};
use crate::pcgc::{PcgcEstimator, PcgcInput};
use crate::phenotype::PhenotypeSimulator;
use crate::sampling::subsample;
use crate::types::{AssociationStats, Genealogy, HsqEstimate, LdScores, LdscRow, SimulationResults};

#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub genealogy: &'a dyn GenealogyProvider,
    pub ld_scores: &'a dyn LdScoreEstimator,
    pub phenotypes: &'a dyn PhenotypeSimulator,
    pub ldsc: &'a dyn HeritabilityRegressor,
    pub pcgc: &'a dyn PcgcEstimator,
}

#[derive(Debug)]
struct GeneticState {
    genealogy: Genealogy,
    ld_scores: Option<LdScores>,
}

#[derive(Debug, Clone, Copy)]
struct ComponentFits {
    a: HsqEstimate,
    d: HsqEstimate,
    ac: HsqEstimate,
}

pub struct ReplicateController<'a> {
    config: &'a SimConfig,
    intercept: InterceptMode,
    collaborators: Collaborators<'a>,
    rng: StdRng,
}

impl<'a> ReplicateController<'a> {
    pub fn new(config: &'a SimConfig, collaborators: Collaborators<'a>) -> Result<Self> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, collaborators, rng)
    }

    pub fn with_rng(
        config: &'a SimConfig,
        collaborators: Collaborators<'a>,
        rng: StdRng,
    ) -> Result<Self> {
        config.validate()?;
        let intercept = config.intercept_mode()?;
        Ok(Self {
            config,
            intercept,
            collaborators,
            rng,
        })
    }

    pub fn run(mut self) -> Result<SimulationResults> {
        let mut results = SimulationResults::zeros(self.config.n_sims);
        let mut cached: Option<GeneticState> = None;
        for sim in 0..self.config.n_sims {
            info!("Replicate {}/{}", sim + 1, self.config.n_sims);
            // With fix_genetics the replicate-0 background serves every later replicate.
            let state = match cached.take() {
                Some(state) if self.config.fix_genetics => state,
                _ => self
                    .refresh_genetics(sim)
                    .with_context(|| format!("replicate {}", sim + 1))?,
            };
            self.run_replicate(sim, &state, &mut results)
                .with_context(|| format!("replicate {}", sim + 1))?;
            cached = Some(state);
        }
        Ok(results)
    }

    fn run_replicate(
        &mut self,
        sim: usize,
        state: &GeneticState,
        results: &mut SimulationResults,
    ) -> Result<()> {
        let config = self.config;
        let genealogy = &state.genealogy;

        let phenotypes = self
            .collaborators
            .phenotypes
            .simulate(config, genealogy, &mut self.rng)?;
        info!("Evaluated phenotypes.");
        if config.output.write_pheno {
            write_phenotypes(
                &phenotypes,
                genealogy,
                &replicate_path(&config.output.out, sim, "pheno"),
            )?;
        }

        if !config.ldsc && !config.pcgc {
            return Ok(());
        }

        let stats = self
            .collaborators
            .phenotypes
            .derive_chisq(config, genealogy, &phenotypes, &mut self.rng)?;
        let scale = self.ascertainment_scale(&stats)?;

        if config.ldsc {
            let within_sample = if config.case_control && config.ldscore_within_sample {
                let index = self.ldscore_index(&stats.index)?;
                Some(self.compute_ldscores(genealogy, Some(&index), sim)?)
            } else {
                None
            };
            let ld_scores = within_sample
                .as_ref()
                .or(state.ld_scores.as_ref())
                .ok_or_else(|| anyhow::anyhow!("no LD scores available for regression"))?;

            info!("Running LD score regressions.");
            let fits = self.regress(genealogy, &stats, ld_scores)?;
            if let Some(primary) = fits.first() {
                results.ldsc[sim] = LdscRow::from_estimates(&primary.a, &primary.d, &primary.ac, scale);
            }
            if self.intercept.records_constrained_table()
                && let Some(constrained) = fits.get(1)
            {
                results.ldsc_constrained[sim] =
                    LdscRow::from_estimates(&constrained.a, &constrained.d, &constrained.ac, scale);
            }
        }

        if config.pcgc {
            let phenotype = match &stats.case_control {
                Some(cc) => standardize_array(&cc.phenotype).ok_or_else(|| {
                    H2SimError::DegenerateSample(
                        "case-control phenotype has zero variance".to_string(),
                    )
                })?,
                None => phenotypes.y.clone(),
            };
            let input = PcgcInput {
                replicate: sim,
                genealogy,
                phenotype: phenotype.view(),
                n: stats.n,
                covariates: &stats.covariates,
                index: &stats.index,
                m_geno_total: genealogy.layout.m_geno_total,
                scale,
            };
            results.pcgc[sim] = self.collaborators.pcgc.estimate(config, &input)?;
        }

        Ok(())
    }

    fn refresh_genetics(&mut self, sim: usize) -> Result<GeneticState> {
        let config = self.config;
        let provider = self.collaborators.genealogy;
        let genealogy = match &config.genealogy.load {
            Some(path) => provider.load(path)?,
            None => {
                let genealogy = provider.simulate(&config.genealogy, &mut self.rng)?;
                if config.output.dump_genealogy {
                    write_genealogy(
                        &genealogy,
                        &replicate_path(&config.output.out, sim, "geno.gz"),
                    )?;
                }
                genealogy
            }
        };

        let ld_scores = if config.needs_population_ldscores() {
            let index = match config.ldscore_sampling_prop {
                None => None,
                Some(_) => {
                    let everyone: Vec<usize> = (0..genealogy.n).collect();
                    Some(self.ldscore_index(&everyone)?)
                }
            };
            Some(self.compute_ldscores(&genealogy, index.as_deref(), sim)?)
        } else {
            None
        };

        Ok(GeneticState {
            genealogy,
            ld_scores,
        })
    }

    fn ldscore_index(&mut self, universe: &[usize]) -> Result<Vec<usize>> {
        match self.config.ldscore_sampling_prop {
            None => Ok(universe.to_vec()),
            Some(prop) => {
                info!(
                    "Using a subset of individuals to determine LD scores - LD score sampling proportion: {prop}"
                );
                Ok(subsample(universe, prop, &mut self.rng)?)
            }
        }
    }

    fn compute_ldscores(
        &self,
        genealogy: &Genealogy,
        index: Option<&[usize]>,
        sim: usize,
    ) -> Result<LdScores> {
        let scores = self.collaborators.ld_scores.compute(genealogy, index, sim)?;
        if self.config.output.write_l2 {
            write_ldscores(
                &scores,
                genealogy,
                &replicate_path(&self.config.output.out, sim, "l2"),
            )?;
        }
        Ok(scores)
    }

    fn ascertainment_scale(&self, stats: &AssociationStats) -> Result<f64> {
        if !self.config.case_control {
            return Ok(1.0);
        }
        let cc = stats.case_control.as_ref().ok_or_else(|| {
            anyhow::anyhow!("case-control run but no ascertained sample was derived")
        })?;
        let scale = scale_for_sample(
            self.config.ascertainment.prevalence,
            cc.n_cases,
            stats.n,
            cc.threshold,
        )?;
        info!(
            "Study prevalence {:.4}, ascertainment scale {scale:.4}",
            cc.n_cases as f64 / stats.n as f64
        );
        Ok(scale)
    }

    fn regress(
        &self,
        genealogy: &Genealogy,
        stats: &AssociationStats,
        ld_scores: &LdScores,
    ) -> Result<Vec<ComponentFits>> {
        let m_geno_total = genealogy.layout.m_geno_total;
        if ld_scores.len() != m_geno_total || stats.chisq_a.len() != m_geno_total {
            return Err(anyhow::anyhow!(
                "{} LD scores and {} statistics for {m_geno_total} genotyped markers",
                ld_scores.len(),
                stats.chisq_a.len()
            ));
        }
        let n_col = Array2::from_elem((m_geno_total, 1), stats.n as f64);
        let m_cell = Array2::from_elem((1, 1), m_geno_total as f64);
        let n_blocks = m_geno_total.min(self.config.n_blocks);
        let regressor = self.collaborators.ldsc;

        self.intercept
            .constraints()
            .iter()
            .map(|&intercept| -> Result<ComponentFits> {
                let a = regressor.fit(
                    stats.chisq_a.view(),
                    ld_scores.additive_column(),
                    ld_scores.additive_column(),
                    n_col.view(),
                    m_cell.view(),
                    n_blocks,
                    intercept,
                )?;
                let d = regressor.fit(
                    stats.chisq_d.view(),
                    ld_scores.dominance_column(),
                    ld_scores.dominance_column(),
                    n_col.view(),
                    m_cell.view(),
                    n_blocks,
                    intercept,
                )?;
                let ac = regressor.fit(
                    stats.chisq_ac.view(),
                    ld_scores.additive_column(),
                    ld_scores.additive_column(),
                    n_col.view(),
                    m_cell.view(),
                    n_blocks,
                    intercept,
                )?;
                Ok(ComponentFits { a, d, ac })
            })
            .collect()
    }
}

pub fn run(config: &SimConfig, collaborators: Collaborators<'_>) -> Result<SimulationResults> {
    ReplicateController::new(config, collaborators)?.run()
}
