use std::collections::HashSet;

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use statrs::distribution::{Continuous, Normal};

use h2sim::ascertainment::{liability_threshold, scale, scale_for_sample};
use h2sim::config::{GenealogyConfig, InterceptMode, SimConfig};
use h2sim::error::H2SimError;
use h2sim::genealogy::{GenealogyProvider, MosaicSimulator};
use h2sim::ldsc::{HeritabilityRegressor, JackknifeHsq};
use h2sim::ldscore::{LdScoreEstimator, WindowedLdScores};
use h2sim::matrix::solve_normal_equations;
use h2sim::pcgc::{PairwisePcgc, PcgcEstimator, PcgcInput};
use h2sim::phenotype::{LiabilityModel, PhenotypeSimulator};
use h2sim::sampling::subsample;
use h2sim::types::{Genealogy, MarkerLayout};

fn small_genealogy_config() -> GenealogyConfig {
    GenealogyConfig {
        n: 120,
        n_chr: 2,
        n_snps: 60,
        maf: 0.05,
        ..GenealogyConfig::default()
    }
}

#[test]
fn threshold_and_equal_prevalence_scale() {
    let t = liability_threshold(0.5).expect("threshold");
    assert!(t.abs() < 1e-9);

    let k = 0.1;
    let t = liability_threshold(k).expect("threshold");
    assert!((t - 1.2815515655446004).abs() < 1e-6);
    let phi = Normal::new(0.0, 1.0).expect("normal").pdf(t);
    let expected = k * (1.0 - k) / (phi * phi);
    let got = scale(k, k, t).expect("scale");
    assert!((got - expected).abs() < 1e-9 * expected);
}

#[test]
fn sample_without_cases_or_controls_is_degenerate() {
    let t = liability_threshold(0.1).expect("threshold");
    for (cases, n) in [(0, 100), (100, 100)] {
        let err = scale_for_sample(0.1, cases, n, t).expect_err("degenerate sample");
        assert!(matches!(
            err.downcast_ref::<H2SimError>(),
            Some(H2SimError::DegenerateSample(_))
        ));
    }
}

#[test]
fn subsample_is_unique_and_sized() {
    let universe: Vec<usize> = (100..200).collect();
    let mut rng = StdRng::seed_from_u64(1);
    let picked = subsample(&universe, 0.5, &mut rng).expect("subsample");
    assert_eq!(picked.len(), 50);
    let unique: HashSet<usize> = picked.iter().copied().collect();
    assert_eq!(unique.len(), 50);
    assert!(picked.iter().all(|i| universe.contains(i)));

    let err = subsample(&universe, 0.001, &mut rng).expect_err("empty draw");
    assert!(matches!(err, H2SimError::DegenerateSample(_)));
}

#[test]
fn intercept_modes() {
    assert_eq!(
        InterceptMode::from_flags(false, false).expect("mode").constraints(),
        &[None::<f64>]
    );
    assert_eq!(
        InterceptMode::from_flags(false, true).expect("mode").constraints(),
        &[None::<f64>, Some(1.0)]
    );
    assert_eq!(
        InterceptMode::from_flags(true, false).expect("mode").constraints(),
        &[Some(1.0)]
    );
    assert!(InterceptMode::from_flags(true, true).is_err());
}

#[test]
fn validation_rejects_bad_settings() {
    SimConfig::default().validate().expect("defaults are valid");

    let mut cfg = SimConfig::default();
    cfg.phenotype.dominance = true;
    cfg.phenotype.gxe = true;
    cfg.phenotype.h2_a = 0.6;
    cfg.phenotype.h2_d = 0.3;
    assert!(matches!(cfg.validate(), Err(H2SimError::InvalidArgument(_))));

    let cfg = SimConfig {
        case_control: true,
        ascertainment: h2sim::config::AscertainmentConfig {
            prevalence: 1.0,
            ..Default::default()
        },
        ..SimConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = SimConfig {
        n_blocks: 1,
        ..SimConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn singular_normal_equations() {
    let err = solve_normal_equations(&[vec![1.0, 2.0], vec![2.0, 4.0]], &[1.0, 2.0])
        .expect_err("singular");
    assert!(err.to_string().contains("Singular matrix"));

    let beta = solve_normal_equations(&[vec![2.0, 1.0], vec![1.0, 3.0]], &[3.0, 5.0])
        .expect("solve");
    assert!((beta[0] - 0.8).abs() < 1e-12);
    assert!((beta[1] - 1.4).abs() < 1e-12);
}

fn noiseless_chisq(m: usize, n: f64, h2: f64) -> (Array1<f64>, Array2<f64>) {
    let l2 = Array2::from_shape_fn((m, 1), |(i, _)| 1.0 + (i % 17) as f64);
    let chisq = l2.column(0).mapv(|l| 1.0 + n * h2 / m as f64 * l);
    (chisq, l2)
}

#[test]
fn ldsc_recovers_noiseless_heritability() {
    let m = 200;
    let (chisq, l2) = noiseless_chisq(m, 1000.0, 0.4);
    let n = Array2::from_elem((m, 1), 1000.0);
    let m_cell = Array2::from_elem((1, 1), m as f64);

    let free = JackknifeHsq
        .fit(chisq.view(), l2.view(), l2.view(), n.view(), m_cell.view(), 20, None)
        .expect("free fit");
    assert!((free.tot - 0.4).abs() < 1e-6, "h2 = {}", free.tot);
    assert!((free.intercept - 1.0).abs() < 1e-6);
    assert!(free.tot_se < 1e-6);

    let fixed = JackknifeHsq
        .fit(chisq.view(), l2.view(), l2.view(), n.view(), m_cell.view(), 20, Some(1.0))
        .expect("constrained fit");
    assert!((fixed.tot - 0.4).abs() < 1e-6);
    assert_eq!(fixed.intercept, 1.0);
    assert!(fixed.intercept_se.is_nan());
}

#[test]
fn ldsc_rejects_more_blocks_than_markers() {
    let (chisq, l2) = noiseless_chisq(10, 1000.0, 0.4);
    let n = Array2::from_elem((10, 1), 1000.0);
    let m_cell = Array2::from_elem((1, 1), 10.0);
    let err = JackknifeHsq
        .fit(chisq.view(), l2.view(), l2.view(), n.view(), m_cell.view(), 11, None)
        .expect_err("too many blocks");
    assert!(matches!(
        err.downcast_ref::<H2SimError>(),
        Some(H2SimError::DegenerateSample(_))
    ));
}

#[test]
fn ldscores_count_duplicated_and_orthogonal_markers() {
    let column_a = [0u8, 1, 2, 0, 1, 2];
    let column_b = [0u8, 0, 0, 2, 2, 2];
    let genotypes = Array2::from_shape_fn((6, 3), |(i, j)| match j {
        0 | 1 => column_a[i],
        _ => column_b[i],
    });
    let genealogy =
        Genealogy::from_parts(genotypes, vec![3], vec![0, 1, 2], vec![0; 6], 1).expect("genealogy");

    let scores = WindowedLdScores {
        window: 10,
        cores: Some(1),
    }
    .compute(&genealogy, None, 0)
    .expect("ld scores");
    assert_eq!(scores.len(), 3);
    assert!((scores.additive[0] - 1.75).abs() < 1e-5, "{}", scores.additive[0]);
    assert!((scores.additive[2] - 0.5).abs() < 1e-5, "{}", scores.additive[2]);
}

#[test]
fn ldscore_window_stops_at_chromosome_boundaries() {
    let column = [0u8, 1, 2, 0, 1, 2];
    let genotypes = Array2::from_shape_fn((6, 4), |(i, _)| column[i]);
    let genealogy = Genealogy::from_parts(genotypes, vec![2, 2], vec![0, 1, 2, 3], vec![0; 6], 1)
        .expect("genealogy");
    let scores = WindowedLdScores {
        window: 10,
        cores: None,
    }
    .compute(&genealogy, None, 0)
    .expect("ld scores");
    for l2 in scores.additive.iter() {
        assert!((l2 - 2.0).abs() < 1e-5);
    }
}

#[test]
fn mosaic_genealogy_is_consistent() {
    let cfg = GenealogyConfig {
        geno_prop: Some(0.5),
        n_pops: 2,
        ..small_genealogy_config()
    };
    let mut rng = StdRng::seed_from_u64(11);
    let genealogy = MosaicSimulator.simulate(&cfg, &mut rng).expect("simulate");

    assert_eq!(genealogy.n, 120);
    assert_eq!(genealogy.genotypes.ncols(), genealogy.layout.m_total);
    assert_eq!(genealogy.genotyped.ncols(), genealogy.layout.m_geno_total);
    assert!(genealogy.layout.m_geno_total <= genealogy.layout.m_total);
    assert!(genealogy.genotypes.iter().all(|&g| g <= 2));
    assert_eq!(genealogy.populations.iter().filter(|&&p| p == 0).count(), 90);
}

#[test]
fn liability_model_end_to_end_estimators() {
    let mut rng = StdRng::seed_from_u64(5);
    let cfg = SimConfig {
        ldsc: true,
        pcgc: true,
        genealogy: small_genealogy_config(),
        seed: Some(5),
        ..SimConfig::default()
    };
    let genealogy = MosaicSimulator
        .simulate(&cfg.genealogy, &mut rng)
        .expect("simulate");
    let phenotypes = LiabilityModel
        .simulate(&cfg, &genealogy, &mut rng)
        .expect("phenotypes");
    assert_eq!(phenotypes.y.len(), 120);
    assert_eq!(phenotypes.covariates.dim(), (120, 1));

    let stats = LiabilityModel
        .derive_chisq(&cfg, &genealogy, &phenotypes, &mut rng)
        .expect("chisq");
    assert_eq!(stats.chisq_a.len(), genealogy.layout.m_geno_total);
    assert!(stats.chisq_a.iter().all(|c| c.is_finite() && *c >= 0.0));
    assert!(stats.case_control.is_none());

    let input = PcgcInput {
        replicate: 0,
        genealogy: &genealogy,
        phenotype: phenotypes.y.view(),
        n: stats.n,
        covariates: &stats.covariates,
        index: &stats.index,
        m_geno_total: genealogy.layout.m_geno_total,
        scale: 1.0,
    };
    let row = PairwisePcgc.estimate(&cfg, &input).expect("pcgc");
    assert!(row.h2_a.is_finite());
    assert!(row.h2_d.is_finite());
}

#[test]
fn case_control_sample_matches_study_prevalence() {
    let mut rng = StdRng::seed_from_u64(9);
    let mut cfg = SimConfig {
        ldsc: true,
        case_control: true,
        genealogy: GenealogyConfig {
            n: 400,
            ..small_genealogy_config()
        },
        ..SimConfig::default()
    };
    cfg.ascertainment.prevalence = 0.2;
    cfg.ascertainment.n_cases = 40;
    cfg.ascertainment.sample_prevalence = Some(0.5);

    let genealogy = MosaicSimulator
        .simulate(&cfg.genealogy, &mut rng)
        .expect("simulate");
    let phenotypes = LiabilityModel
        .simulate(&cfg, &genealogy, &mut rng)
        .expect("phenotypes");
    let stats = LiabilityModel
        .derive_chisq(&cfg, &genealogy, &phenotypes, &mut rng)
        .expect("chisq");

    let sample = stats.case_control.expect("case-control sample");
    assert_eq!(sample.n_cases, 40);
    assert_eq!(stats.n, 80);
    assert_eq!(sample.phenotype.sum(), 40.0);
    assert!(stats.index.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn three_kernel_normal_equations() {
    let xtx = vec![
        vec![4.0, 1.0, 0.5],
        vec![1.0, 3.0, 0.25],
        vec![0.5, 0.25, 2.0],
    ];
    let truth = [0.3, -0.1, 0.2];
    let xty: Vec<f64> = xtx
        .iter()
        .map(|row| row.iter().zip(&truth).map(|(a, b)| a * b).sum())
        .collect();
    let beta = solve_normal_equations(&xtx, &xty).expect("solve");
    for (b, t) in beta.iter().zip(truth) {
        assert!((b - t).abs() < 1e-10);
    }
    assert!(solve_normal_equations(&xtx, &[1.0, 2.0]).is_err());
}

#[test]
fn genealogy_without_genotyped_markers_is_degenerate() {
    let err = Genealogy::from_parts(Array2::zeros((5, 0)), vec![0], vec![], vec![0; 5], 1)
        .expect_err("empty panel");
    assert!(matches!(
        err.downcast_ref::<H2SimError>(),
        Some(H2SimError::DegenerateSample(_))
    ));

    let err = Genealogy::from_parts(Array2::zeros((5, 3)), vec![3], vec![], vec![0; 5], 1)
        .expect_err("nothing genotyped");
    assert!(matches!(
        err.downcast_ref::<H2SimError>(),
        Some(H2SimError::DegenerateSample(_))
    ));
}

#[test]
fn phenotypes_need_markers() {
    let genealogy = Genealogy {
        genotypes: Array2::zeros((5, 0)),
        genotyped: Array2::zeros((5, 0)),
        genotyped_index: Vec::new(),
        populations: vec![0; 5],
        layout: MarkerLayout::new(vec![0], &[]).expect("layout"),
        n: 5,
        n_pops: 1,
    };
    let mut rng = StdRng::seed_from_u64(2);
    let err = LiabilityModel
        .simulate(&SimConfig::default(), &genealogy, &mut rng)
        .expect_err("no markers");
    assert!(matches!(
        err.downcast_ref::<H2SimError>(),
        Some(H2SimError::DegenerateSample(_))
    ));
}
