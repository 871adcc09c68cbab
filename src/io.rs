use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ndarray::Array2;

use crate::types::Genealogy;

const GENEALOGY_MAGIC: &str = "#h2sim-genealogy v1";

pub fn write_genealogy(genealogy: &Genealogy, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut writer = BufWriter::new(encoder);

    writeln!(writer, "{GENEALOGY_MAGIC}")?;
    writeln!(writer, "n_pops\t{}", genealogy.n_pops)?;
    writeln!(writer, "chromosomes\t{}", join(&genealogy.layout.m))?;
    writeln!(writer, "genotyped\t{}", join(&genealogy.genotyped_index))?;
    writeln!(writer, "populations\t{}", join(&genealogy.populations))?;
    for row in genealogy.genotypes.rows() {
        let line: String = row.iter().map(|&g| char::from(b'0' + g.min(9))).collect();
        writeln!(writer, "{line}")?;
    }

    let encoder = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("flush {}: {}", path.display(), e.error()))?;
    encoder.finish()?;
    Ok(())
}

pub fn read_genealogy(path: &Path) -> Result<Genealogy> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut lines = BufReader::new(GzDecoder::new(file)).lines();
    let mut next_line = |what: &str| -> Result<String> {
        lines
            .next()
            .transpose()?
            .ok_or_else(|| anyhow::anyhow!("{} ended before the {what} line", path.display()))
    };

    let magic = next_line("header")?;
    if magic.trim() != GENEALOGY_MAGIC {
        return Err(anyhow::anyhow!(
            "{} is not an h2sim genealogy file",
            path.display()
        ));
    }
    let n_pops = parse_field(&next_line("n_pops")?, "n_pops")?
        .first()
        .copied()
        .ok_or_else(|| anyhow::anyhow!("n_pops line is empty"))?;
    let chromosomes = parse_field(&next_line("chromosomes")?, "chromosomes")?;
    let genotyped = parse_field(&next_line("genotyped")?, "genotyped")?;
    let populations = parse_field(&next_line("populations")?, "populations")?;

    let m_total: usize = chromosomes.iter().sum();
    let n = populations.len();
    let mut flat = Vec::with_capacity(n * m_total);
    for i in 0..n {
        let line = next_line("genotype")?;
        let row = line.trim_end();
        if row.len() != m_total {
            return Err(anyhow::anyhow!(
                "individual {} has {} genotypes, expected {m_total}",
                i + 1,
                row.len()
            ));
        }
        for b in row.bytes() {
            if !(b'0'..=b'2').contains(&b) {
                return Err(anyhow::anyhow!(
                    "invalid genotype '{}' for individual {}",
                    char::from(b),
                    i + 1
                ));
            }
            flat.push(b - b'0');
        }
    }
    let genotypes = Array2::from_shape_vec((n, m_total), flat).context("genotype matrix shape")?;
    Genealogy::from_parts(genotypes, chromosomes, genotyped, populations, n_pops)
}

fn join(values: &[usize]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_field(line: &str, name: &str) -> Result<Vec<usize>> {
    let (key, rest) = line.split_once('\t').unwrap_or((line.trim(), ""));
    if key != name {
        return Err(anyhow::anyhow!("expected '{name}' line, found '{key}'"));
    }
    rest.split_whitespace()
        .map(|tok| {
            tok.parse::<usize>()
                .with_context(|| format!("parse {name} value '{tok}'"))
        })
        .collect()
}
