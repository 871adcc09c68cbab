use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::H2SimError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerLayout {
    pub m: Vec<usize>,
    pub m_start: Vec<usize>,
    pub m_total: usize,
    pub m_geno: Vec<usize>,
    pub m_geno_start: Vec<usize>,
    pub m_geno_total: usize,
}

impl MarkerLayout {
    pub fn new(m: Vec<usize>, genotyped: &[usize]) -> Result<Self> {
        let m_start = offsets(&m);
        let m_total = m.iter().sum();
        let mut m_geno = vec![0usize; m.len()];
        let mut prev = None;
        for &col in genotyped {
            if col >= m_total {
                return Err(anyhow::anyhow!(
                    "genotyped marker {col} is outside the {m_total} simulated markers"
                ));
            }
            if prev.is_some_and(|p| p >= col) {
                return Err(anyhow::anyhow!("genotyped marker indices must be strictly increasing"));
            }
            prev = Some(col);
            let chr = m_start.partition_point(|&start| start <= col) - 1;
            m_geno[chr] += 1;
        }
        let m_geno_start = offsets(&m_geno);
        Ok(Self {
            m,
            m_start,
            m_total,
            m_geno_start,
            m_geno_total: genotyped.len(),
            m_geno,
        })
    }

    pub fn n_chr(&self) -> usize {
        self.m.len()
    }

    pub fn geno_chromosome(&self, marker: usize) -> usize {
        self.m_geno_start.partition_point(|&start| start <= marker) - 1
    }
}

fn offsets(counts: &[usize]) -> Vec<usize> {
    let mut acc = 0usize;
    counts
        .iter()
        .map(|c| {
            let start = acc;
            acc += c;
            start
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Genealogy {
    pub genotypes: Array2<u8>,
    pub genotyped: Array2<u8>,
    pub genotyped_index: Vec<usize>,
    pub populations: Vec<usize>,
    pub layout: MarkerLayout,
    pub n: usize,
    pub n_pops: usize,
}

impl Genealogy {
    pub fn from_parts(
        genotypes: Array2<u8>,
        chromosome_sizes: Vec<usize>,
        genotyped_index: Vec<usize>,
        populations: Vec<usize>,
        n_pops: usize,
    ) -> Result<Self> {
        let layout = MarkerLayout::new(chromosome_sizes, &genotyped_index)?;
        if layout.m_geno_total == 0 {
            return Err(H2SimError::DegenerateSample(format!(
                "genealogy has {} markers and none genotyped",
                layout.m_total
            ))
            .into());
        }
        let n = genotypes.nrows();
        if genotypes.ncols() != layout.m_total {
            return Err(anyhow::anyhow!(
                "genotype matrix has {} columns but the layout describes {} markers",
                genotypes.ncols(),
                layout.m_total
            ));
        }
        if populations.len() != n {
            return Err(anyhow::anyhow!(
                "{} population labels for {n} individuals",
                populations.len()
            ));
        }
        if let Some(&bad) = populations.iter().find(|&&p| p >= n_pops) {
            return Err(anyhow::anyhow!(
                "population label {bad} out of range for {n_pops} populations"
            ));
        }
        let genotyped = genotypes.select(Axis(1), &genotyped_index);
        Ok(Self {
            genotypes,
            genotyped,
            genotyped_index,
            populations,
            layout,
            n,
            n_pops,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LdScores {
    pub additive: Array1<f64>,
    pub dominance: Array1<f64>,
}

impl LdScores {
    pub fn len(&self) -> usize {
        self.additive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.additive.is_empty()
    }

    pub fn additive_column(&self) -> ArrayView2<'_, f64> {
        self.additive.view().insert_axis(Axis(1))
    }

    pub fn dominance_column(&self) -> ArrayView2<'_, f64> {
        self.dominance.view().insert_axis(Axis(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phenotypes {
    pub y: Array1<f64>,
    pub covariates: Array2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseControlSample {
    pub phenotype: Array1<f64>,
    pub n_cases: usize,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssociationStats {
    pub chisq_a: Array1<f64>,
    pub chisq_d: Array1<f64>,
    pub chisq_ac: Array1<f64>,
    pub n: usize,
    pub covariates: Array2<f64>,
    pub index: Vec<usize>,
    pub case_control: Option<CaseControlSample>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsqEstimate {
    pub tot: f64,
    pub tot_se: f64,
    pub intercept: f64,
    pub intercept_se: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LdscRow {
    pub h2_a: f64,
    pub int_a: f64,
    pub h2_d: f64,
    pub int_d: f64,
    pub h2_ac: f64,
    pub int_ac: f64,
}

impl LdscRow {
    // Intercepts stay on the observed scale.
    pub fn from_estimates(a: &HsqEstimate, d: &HsqEstimate, ac: &HsqEstimate, scale: f64) -> Self {
        Self {
            h2_a: a.tot * scale,
            int_a: a.intercept,
            h2_d: d.tot * scale,
            int_d: d.intercept,
            h2_ac: ac.tot * scale,
            int_ac: ac.intercept,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PcgcRow {
    pub h2_a: f64,
    pub h2_d: f64,
    pub h2_ac: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResults {
    pub ldsc: Vec<LdscRow>,
    pub pcgc: Vec<PcgcRow>,
    pub ldsc_constrained: Vec<LdscRow>,
}

impl SimulationResults {
    pub fn zeros(n_sims: usize) -> Self {
        Self {
            ldsc: vec![LdscRow::default(); n_sims],
            pcgc: vec![PcgcRow::default(); n_sims],
            ldsc_constrained: vec![LdscRow::default(); n_sims],
        }
    }

    pub fn n_sims(&self) -> usize {
        self.ldsc.len()
    }
}
