use std::fs::{self, File};
use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::tempdir;

use h2sim::config::GenealogyConfig;
use h2sim::genealogy::{GenealogyProvider, MosaicSimulator};
use h2sim::io::{read_genealogy, write_genealogy};
use h2sim::logging::sec_to_str;
use h2sim::output::{replicate_path, write_ldscores, write_phenotypes, write_results};
use h2sim::types::{Genealogy, LdScores, LdscRow, PcgcRow, Phenotypes, SimulationResults};

fn fixture() -> Genealogy {
    let genotypes = Array2::from_shape_fn((4, 5), |(i, j)| ((i + j) % 3) as u8);
    Genealogy::from_parts(genotypes, vec![3, 2], vec![0, 2, 4], vec![0, 0, 1, 1], 2)
        .expect("genealogy")
}

#[test]
fn dumped_genealogy_loads_back() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("run.sim1.geno.gz");
    let mut rng = StdRng::seed_from_u64(3);
    let cfg = GenealogyConfig {
        n: 30,
        n_chr: 2,
        n_snps: 40,
        ..GenealogyConfig::default()
    };
    let genealogy = MosaicSimulator.simulate(&cfg, &mut rng).expect("simulate");

    write_genealogy(&genealogy, &path).expect("write");
    let loaded = MosaicSimulator.load(&path).expect("load");
    assert_eq!(loaded, genealogy);
}

#[test]
fn genealogy_reader_rejects_foreign_files() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("plain.txt");
    fs::write(&path, "not gzip").expect("write");
    assert!(read_genealogy(&path).is_err());
}

#[test]
fn layout_tracks_genotyped_chromosomes() {
    let genealogy = fixture();
    let layout = &genealogy.layout;
    assert_eq!(layout.m_total, 5);
    assert_eq!(layout.m_geno, vec![2, 1]);
    assert_eq!(layout.m_geno_start, vec![0, 2]);
    assert_eq!(layout.geno_chromosome(2), 1);
    assert_eq!(genealogy.genotyped.column(1), genealogy.genotypes.column(2));
}

#[test]
fn result_tables_have_headers_and_three_decimals() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run");
    let mut results = SimulationResults::zeros(2);
    results.ldsc[0] = LdscRow {
        h2_a: 0.123456,
        int_a: 1.0,
        ..LdscRow::default()
    };
    results.pcgc[1] = PcgcRow {
        h2_a: 0.5,
        h2_d: 0.25,
        h2_ac: 0.0,
    };

    let written = write_results(&results, &prefix, false, true).expect("write results");
    assert_eq!(written.len(), 2);
    assert!(!dir.path().join("run.int.h2").exists());

    let h2 = fs::read_to_string(dir.path().join("run.h2")).expect("read h2");
    let lines: Vec<&str> = h2.lines().collect();
    assert_eq!(lines[0], "h2_A\tint_A\th2_D\tint_D\th2_AC\tint_AC");
    assert_eq!(lines[1], "0.123\t1.000\t0.000\t0.000\t0.000\t0.000");
    assert_eq!(lines.len(), 3);

    let pcgc = fs::read_to_string(dir.path().join("run.pcgc")).expect("read pcgc");
    let lines: Vec<&str> = pcgc.lines().collect();
    assert_eq!(lines[0], "h2_A\th2_D\th2_AC");
    assert_eq!(lines[2], "0.500\t0.250\t0.000");
}

#[test]
fn constrained_table_written_on_request() {
    let dir = tempdir().expect("tempdir");
    let prefix = dir.path().join("run");
    let written =
        write_results(&SimulationResults::zeros(1), &prefix, true, false).expect("write results");
    assert_eq!(written, vec![dir.path().join("run.h2"), dir.path().join("run.int.h2")]);
}

#[test]
fn per_replicate_files() {
    let dir = tempdir().expect("tempdir");
    let genealogy = fixture();
    let prefix = dir.path().join("run");

    let l2_path = replicate_path(&prefix, 0, "l2");
    assert_eq!(l2_path, dir.path().join("run.sim1.l2"));
    let scores = LdScores {
        additive: Array1::from_vec(vec![1.5, 2.0, 1.0]),
        dominance: Array1::from_vec(vec![1.0, 1.0, 1.0]),
    };
    write_ldscores(&scores, &genealogy, &l2_path).expect("write l2");
    let l2 = fs::read_to_string(&l2_path).expect("read l2");
    let lines: Vec<&str> = l2.lines().collect();
    assert_eq!(lines[0], "CHR\tSNP\tL2_A\tL2_D");
    assert!(lines[3].starts_with("2\t4\t"));

    let pheno_path = replicate_path(&prefix, 1, "pheno");
    let phenotypes = Phenotypes {
        y: Array1::from_vec(vec![0.1, -0.2, 0.3, 0.4]),
        covariates: Array2::zeros((4, 1)),
    };
    write_phenotypes(&phenotypes, &genealogy, &pheno_path).expect("write pheno");
    let pheno = fs::read_to_string(&pheno_path).expect("read pheno");
    assert_eq!(pheno.lines().count(), 5);
    assert!(pheno.lines().nth(3).expect("row").starts_with("3\t1\t"));
}

#[test]
fn elapsed_time_formatting() {
    assert_eq!(sec_to_str(5.0), "5.00s");
    assert_eq!(sec_to_str(65.5), "1m 5.50s");
    assert_eq!(sec_to_str(3725.0), "1h 2m 5.00s");
}

#[test]
fn genealogy_reader_rejects_an_empty_panel() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("empty.geno.gz");
    let mut encoder = GzEncoder::new(File::create(&path).expect("create"), Compression::default());
    write!(
        encoder,
        "#h2sim-genealogy v1\nn_pops\t1\nchromosomes\t0\ngenotyped\t\npopulations\t0 0\n\n\n"
    )
    .expect("write");
    encoder.finish().expect("finish");

    let err = read_genealogy(&path).expect_err("empty panel");
    assert!(matches!(
        err.downcast_ref::<h2sim::error::H2SimError>(),
        Some(h2sim::error::H2SimError::DegenerateSample(_))
    ));
}
