use std::path::PathBuf;

use tracing::warn;

use crate::error::{H2SimError, Result};
use crate::qc::{check_non_negative, check_open_unit, check_positive_count, check_proportion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptMode {
    Free,
    FreeAndConstrained,
    Constrained,
}

const FREE: [Option<f64>; 1] = [None];
const FREE_AND_CONSTRAINED: [Option<f64>; 2] = [None, Some(1.0)];
const CONSTRAINED: [Option<f64>; 1] = [Some(1.0)];

impl InterceptMode {
    pub fn from_flags(no_intercept: bool, free_and_no_intercept: bool) -> Result<Self> {
        match (no_intercept, free_and_no_intercept) {
            (false, false) => Ok(Self::Free),
            (false, true) => Ok(Self::FreeAndConstrained),
            (true, false) => Ok(Self::Constrained),
            (true, true) => Err(H2SimError::InvalidArgument(
                "no_intercept and free_and_no_intercept cannot both be set".to_string(),
            )),
        }
    }

    pub fn constraints(self) -> &'static [Option<f64>] {
        match self {
            Self::Free => &FREE,
            Self::FreeAndConstrained => &FREE_AND_CONSTRAINED,
            Self::Constrained => &CONSTRAINED,
        }
    }

    pub fn records_constrained_table(self) -> bool {
        matches!(self, Self::FreeAndConstrained)
    }
}

#[derive(Debug, Clone)]
pub struct GenealogyConfig {
    pub n: usize,
    pub n_chr: usize,
    pub n_snps: usize,
    pub m: f64,
    pub ne: f64,
    pub rec: f64,
    pub maf: f64,
    pub geno_prop: Option<f64>,
    pub n_pops: usize,
    pub fst: f64,
    pub prop_main: f64,
    pub n_founders: usize,
    pub load: Option<PathBuf>,
}

impl Default for GenealogyConfig {
    fn default() -> Self {
        Self {
            n: 40_000,
            n_chr: 1,
            n_snps: 1_000,
            m: 1_000_000.0,
            ne: 10_000.0,
            rec: 2e-8,
            maf: 0.05,
            geno_prop: None,
            n_pops: 1,
            fst: 0.01,
            prop_main: 0.75,
            n_founders: 50,
            load: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhenotypeConfig {
    pub h2_a: f64,
    pub h2_d: f64,
    pub h2_ac: f64,
    pub dominance: bool,
    pub gxe: bool,
    pub p_causal: f64,
    pub same_causal_sites: bool,
    pub c_bool: bool,
    pub c_bool_p: f64,
    pub include_pop_strat: bool,
    pub s2: f64,
}

impl Default for PhenotypeConfig {
    fn default() -> Self {
        Self {
            h2_a: 0.3,
            h2_d: 0.1,
            h2_ac: 0.2,
            dominance: false,
            gxe: false,
            p_causal: 1.0,
            same_causal_sites: false,
            c_bool: false,
            c_bool_p: 0.5,
            include_pop_strat: false,
            s2: 0.1,
        }
    }
}

impl PhenotypeConfig {
    pub fn effective_h2_d(&self) -> f64 {
        if self.dominance { self.h2_d } else { 0.0 }
    }

    pub fn effective_h2_ac(&self) -> f64 {
        if self.gxe { self.h2_ac } else { 0.0 }
    }

    pub fn effective_s2(&self) -> f64 {
        if self.include_pop_strat { self.s2 } else { 0.0 }
    }

    pub fn noise_variance(&self) -> f64 {
        1.0 - self.h2_a - self.effective_h2_d() - self.effective_h2_ac() - self.effective_s2()
    }
}

#[derive(Debug, Clone)]
pub struct AscertainmentConfig {
    pub prevalence: f64,
    pub n_cases: usize,
    pub sample_prevalence: Option<f64>,
}

impl Default for AscertainmentConfig {
    fn default() -> Self {
        Self {
            prevalence: 0.1,
            n_cases: 1_000,
            sample_prevalence: None,
        }
    }
}

impl AscertainmentConfig {
    pub fn study_prevalence(&self) -> f64 {
        self.sample_prevalence.unwrap_or(self.prevalence)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    pub out: PathBuf,
    pub write_l2: bool,
    pub write_pheno: bool,
    pub dump_genealogy: bool,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub n_sims: usize,
    pub ldsc: bool,
    pub pcgc: bool,
    pub case_control: bool,
    pub free_and_no_intercept: bool,
    pub no_intercept: bool,
    pub fix_genetics: bool,
    pub ldscore_within_sample: bool,
    pub ldscore_sampling_prop: Option<f64>,
    pub n_blocks: usize,
    pub ld_wind_snps: usize,
    pub ascertainment: AscertainmentConfig,
    pub genealogy: GenealogyConfig,
    pub phenotype: PhenotypeConfig,
    pub output: OutputConfig,
    pub seed: Option<u64>,
    pub cores: Option<usize>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            n_sims: 1,
            ldsc: false,
            pcgc: false,
            case_control: false,
            free_and_no_intercept: false,
            no_intercept: false,
            fix_genetics: false,
            ldscore_within_sample: false,
            ldscore_sampling_prop: None,
            n_blocks: 200,
            ld_wind_snps: 1_000,
            ascertainment: AscertainmentConfig::default(),
            genealogy: GenealogyConfig::default(),
            phenotype: PhenotypeConfig::default(),
            output: OutputConfig {
                out: PathBuf::from("h2sim"),
                ..OutputConfig::default()
            },
            seed: None,
            cores: None,
        }
    }
}

impl SimConfig {
    pub fn intercept_mode(&self) -> Result<InterceptMode> {
        InterceptMode::from_flags(self.no_intercept, self.free_and_no_intercept)
    }

    pub fn needs_population_ldscores(&self) -> bool {
        self.ldsc && !(self.ldscore_within_sample && self.case_control)
    }

    pub fn validate(&self) -> Result<()> {
        self.intercept_mode()?;

        if self.n_blocks < 2 {
            return Err(H2SimError::InvalidArgument(format!(
                "n_blocks should be at least 2, got {}",
                self.n_blocks
            )));
        }
        check_positive_count(self.ld_wind_snps, "ld_wind_snps")?;
        if let Some(prop) = self.ldscore_sampling_prop {
            check_proportion(prop, "ldscore_sampling_prop")?;
        }
        if self.ldscore_within_sample && !self.case_control {
            warn!("ldscore_within_sample has no effect without case_control");
        }
        if let Some(cores) = self.cores {
            check_positive_count(cores, "cores")?;
        }

        if self.case_control {
            let asc = &self.ascertainment;
            check_open_unit(asc.prevalence, "prevalence")?;
            check_open_unit(asc.study_prevalence(), "sample_prevalence")?;
            check_positive_count(asc.n_cases, "n_cases")?;
        }

        let geno = &self.genealogy;
        check_positive_count(geno.n, "n")?;
        check_positive_count(geno.n_chr, "n_chr")?;
        check_positive_count(geno.n_snps, "n_snps")?;
        check_positive_count(geno.n_pops, "n_pops")?;
        check_positive_count(geno.n_founders, "n_founders")?;
        check_non_negative(geno.m, "m")?;
        check_non_negative(geno.ne, "Ne")?;
        check_non_negative(geno.rec, "rec")?;
        check_non_negative(geno.maf, "maf")?;
        if geno.maf >= 0.5 {
            return Err(H2SimError::InvalidArgument(format!(
                "maf should be below 0.5, got {}",
                geno.maf
            )));
        }
        check_open_unit(geno.fst, "fst")?;
        check_open_unit(geno.prop_main, "prop_main")?;
        if let Some(prop) = geno.geno_prop {
            check_proportion(prop, "geno_prop")?;
        }

        let pheno = &self.phenotype;
        check_non_negative(pheno.h2_a, "h2_A")?;
        check_non_negative(pheno.h2_d, "h2_D")?;
        check_non_negative(pheno.h2_ac, "h2_AC")?;
        check_non_negative(pheno.s2, "s2")?;
        check_proportion(pheno.p_causal, "p_causal")?;
        check_open_unit(pheno.c_bool_p, "c_bool_p")?;
        if pheno.noise_variance() < 0.0 {
            return Err(H2SimError::InvalidArgument(format!(
                "Variance components sum to more than 1 (residual variance {:.3})",
                pheno.noise_variance()
            )));
        }
        Ok(())
    }
}
