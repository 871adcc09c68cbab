use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView2, Axis, concatenate};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::GenealogyConfig;
use crate::io::read_genealogy;
use crate::types::Genealogy;

pub trait GenealogyProvider {
    fn simulate(&self, config: &GenealogyConfig, rng: &mut StdRng) -> Result<Genealogy>;

    fn load(&self, path: &Path) -> Result<Genealogy>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MosaicSimulator;

impl GenealogyProvider for MosaicSimulator {
    fn simulate(&self, config: &GenealogyConfig, rng: &mut StdRng) -> Result<Genealogy> {
        let populations = assign_populations(config);
        let spacing = config.m / config.n_snps as f64;
        let switch_prob =
            1.0 - (-4.0 * config.ne * config.rec * spacing / config.n_founders as f64).exp();
        debug!("Founder switch probability between adjacent markers: {switch_prob:.3e}");

        let mut blocks = Vec::with_capacity(config.n_chr);
        let mut chromosome_sizes = Vec::with_capacity(config.n_chr);
        for chr in 0..config.n_chr {
            let block = simulate_chromosome(config, &populations, switch_prob, rng)
                .with_context(|| format!("simulate chromosome {}", chr + 1))?;
            let block = maf_filter(block, config.maf);
            info!(
                "Chromosome {}: {} of {} markers pass the MAF filter ({})",
                chr + 1,
                block.ncols(),
                config.n_snps,
                config.maf
            );
            chromosome_sizes.push(block.ncols());
            blocks.push(block);
        }

        let m_total: usize = chromosome_sizes.iter().sum();
        if m_total == 0 {
            return Err(anyhow::anyhow!(
                "no simulated marker passed the MAF filter of {}",
                config.maf
            ));
        }
        let views: Vec<ArrayView2<u8>> = blocks.iter().map(|b| b.view()).collect();
        let genotypes = concatenate(Axis(1), &views).context("join chromosomes")?;

        let genotyped = choose_genotyped(&chromosome_sizes, config.geno_prop, rng);
        if genotyped.is_empty() {
            return Err(anyhow::anyhow!(
                "genotyped proportion {:?} of {m_total} markers leaves no genotyped marker",
                config.geno_prop
            ));
        }
        info!(
            "Simulated {} individuals in {} population(s): {} markers, {} genotyped",
            config.n,
            config.n_pops,
            m_total,
            genotyped.len()
        );
        Genealogy::from_parts(genotypes, chromosome_sizes, genotyped, populations, config.n_pops)
    }

    fn load(&self, path: &Path) -> Result<Genealogy> {
        let genealogy =
            read_genealogy(path).with_context(|| format!("load genealogy {}", path.display()))?;
        info!(
            "Loaded {} individuals and {} markers from {}",
            genealogy.n,
            genealogy.layout.m_total,
            path.display()
        );
        Ok(genealogy)
    }
}

fn assign_populations(config: &GenealogyConfig) -> Vec<usize> {
    if config.n_pops == 1 {
        return vec![0; config.n];
    }
    let n_main = ((config.n as f64) * config.prop_main).round() as usize;
    let n_main = n_main.min(config.n);
    let rest = config.n - n_main;
    let others = config.n_pops - 1;
    let mut labels = vec![0usize; n_main];
    for k in 0..others {
        let size = rest / others + usize::from(k < rest % others);
        labels.extend(std::iter::repeat_n(k + 1, size));
    }
    labels
}

fn simulate_chromosome(
    config: &GenealogyConfig,
    populations: &[usize],
    switch_prob: f64,
    rng: &mut StdRng,
) -> Result<Array2<u8>> {
    let n_snps = config.n_snps;
    let ancestral: Vec<f64> = (0..n_snps).map(|_| rng.gen_range(0.02..0.98)).collect();

    let mut founders = Vec::with_capacity(config.n_pops);
    for _ in 0..config.n_pops {
        let freqs = population_frequencies(&ancestral, config, rng)?;
        let panel = Array2::from_shape_fn((config.n_founders, n_snps), |(_, j)| {
            u8::from(rng.gen_bool(freqs[j]))
        });
        founders.push(panel);
    }

    let seeds: Vec<u64> = (0..populations.len()).map(|_| rng.r#gen()).collect();
    let rows: Vec<Vec<u8>> = populations
        .par_iter()
        .zip(seeds.par_iter())
        .map(|(&pop, &seed)| {
            let mut local = StdRng::seed_from_u64(seed);
            let panel = &founders[pop];
            let first = copy_haplotype(panel, switch_prob, &mut local);
            let second = copy_haplotype(panel, switch_prob, &mut local);
            first.iter().zip(&second).map(|(a, b)| a + b).collect()
        })
        .collect();

    let flat: Vec<u8> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((populations.len(), n_snps), flat).context("genotype matrix shape")
}

fn population_frequencies(
    ancestral: &[f64],
    config: &GenealogyConfig,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    if config.n_pops == 1 {
        return Ok(ancestral.to_vec());
    }
    let f = config.fst;
    ancestral
        .iter()
        .map(|&p| {
            let beta = Beta::new(p * (1.0 - f) / f, (1.0 - p) * (1.0 - f) / f)
                .map_err(|e| anyhow::anyhow!("Balding-Nichols draw for p = {p}: {e}"))?;
            Ok(beta.sample(rng).clamp(0.0, 1.0))
        })
        .collect()
}

fn copy_haplotype(panel: &Array2<u8>, switch_prob: f64, rng: &mut StdRng) -> Vec<u8> {
    let n_founders = panel.nrows();
    let mut founder = rng.gen_range(0..n_founders);
    (0..panel.ncols())
        .map(|j| {
            if j > 0 && rng.gen_bool(switch_prob.clamp(0.0, 1.0)) {
                founder = rng.gen_range(0..n_founders);
            }
            panel[[founder, j]]
        })
        .collect()
}

fn maf_filter(block: Array2<u8>, maf: f64) -> Array2<u8> {
    let n = block.nrows() as f64;
    let keep: Vec<usize> = block
        .axis_iter(Axis(1))
        .enumerate()
        .filter_map(|(j, col)| {
            let freq = col.iter().map(|&g| f64::from(g)).sum::<f64>() / (2.0 * n);
            let minor = freq.min(1.0 - freq);
            (minor > 0.0 && minor >= maf).then_some(j)
        })
        .collect();
    block.select(Axis(1), &keep)
}

fn choose_genotyped(chromosome_sizes: &[usize], geno_prop: Option<f64>, rng: &mut StdRng) -> Vec<usize> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for &size in chromosome_sizes {
        match geno_prop {
            None => out.extend(start..start + size),
            Some(prop) => {
                let n_keep = ((size as f64) * prop).floor() as usize;
                let mut picked: Vec<usize> = index::sample(rng, size, n_keep.min(size))
                    .into_iter()
                    .map(|j| start + j)
                    .collect();
                picked.sort_unstable();
                out.extend(picked);
            }
        }
        start += size;
    }
    out
}
