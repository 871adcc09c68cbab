use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use crate::types::{Genealogy, LdScores, LdscRow, PcgcRow, Phenotypes, SimulationResults};

pub fn replicate_path(prefix: &Path, replicate: usize, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.sim{}.{suffix}", prefix.display(), replicate + 1))
}

pub fn ldsc_frame(rows: &[LdscRow]) -> Result<DataFrame> {
    let df = df!(
        "h2_A" => rows.iter().map(|r| r.h2_a).collect::<Vec<_>>(),
        "int_A" => rows.iter().map(|r| r.int_a).collect::<Vec<_>>(),
        "h2_D" => rows.iter().map(|r| r.h2_d).collect::<Vec<_>>(),
        "int_D" => rows.iter().map(|r| r.int_d).collect::<Vec<_>>(),
        "h2_AC" => rows.iter().map(|r| r.h2_ac).collect::<Vec<_>>(),
        "int_AC" => rows.iter().map(|r| r.int_ac).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

pub fn pcgc_frame(rows: &[PcgcRow]) -> Result<DataFrame> {
    let df = df!(
        "h2_A" => rows.iter().map(|r| r.h2_a).collect::<Vec<_>>(),
        "h2_D" => rows.iter().map(|r| r.h2_d).collect::<Vec<_>>(),
        "h2_AC" => rows.iter().map(|r| r.h2_ac).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

pub fn write_results(
    results: &SimulationResults,
    prefix: &Path,
    constrained: bool,
    pcgc: bool,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let path = PathBuf::from(format!("{}.h2", prefix.display()));
    write_table(&mut ldsc_frame(&results.ldsc)?, &path, Some(3))?;
    written.push(path);

    if constrained {
        let path = PathBuf::from(format!("{}.int.h2", prefix.display()));
        write_table(&mut ldsc_frame(&results.ldsc_constrained)?, &path, Some(3))?;
        written.push(path);
    }
    if pcgc {
        let path = PathBuf::from(format!("{}.pcgc", prefix.display()));
        write_table(&mut pcgc_frame(&results.pcgc)?, &path, Some(3))?;
        written.push(path);
    }
    Ok(written)
}

pub fn write_ldscores(scores: &LdScores, genealogy: &Genealogy, path: &Path) -> Result<()> {
    let layout = &genealogy.layout;
    let chr: Vec<u32> = (0..scores.len())
        .map(|j| layout.geno_chromosome(j) as u32 + 1)
        .collect();
    let snp: Vec<u64> = genealogy.genotyped_index.iter().map(|&j| j as u64).collect();
    let mut df = df!(
        "CHR" => chr,
        "SNP" => snp,
        "L2_A" => scores.additive.to_vec(),
        "L2_D" => scores.dominance.to_vec(),
    )?;
    write_table(&mut df, path, None)
}

pub fn write_phenotypes(phenotypes: &Phenotypes, genealogy: &Genealogy, path: &Path) -> Result<()> {
    let iid: Vec<u64> = (1..=phenotypes.y.len() as u64).collect();
    let pop: Vec<u32> = genealogy.populations.iter().map(|&p| p as u32).collect();
    let covariate: Vec<f64> = if phenotypes.covariates.ncols() > 0 {
        phenotypes.covariates.column(0).to_vec()
    } else {
        vec![f64::NAN; phenotypes.y.len()]
    };
    let mut df = df!(
        "IID" => iid,
        "POP" => pop,
        "PHENO" => phenotypes.y.to_vec(),
        "C" => covariate,
    )?;
    write_table(&mut df, path, None)
}

fn write_table(df: &mut DataFrame, path: &Path, precision: Option<usize>) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .with_float_precision(precision)
        .finish(df)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
