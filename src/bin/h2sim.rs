use std::fs::File;
use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use clap::{Args, Parser, Subcommand};

use h2sim::ascertainment::{liability_threshold, scale};
use h2sim::config::{
    AscertainmentConfig, GenealogyConfig, OutputConfig, PhenotypeConfig, SimConfig,
};
use h2sim::controller::{Collaborators, run};
use h2sim::genealogy::MosaicSimulator;
use h2sim::ldsc::JackknifeHsq;
use h2sim::ldscore::WindowedLdScores;
use h2sim::logging::{init_tracing, log_line, sec_to_str, warn_line};
use h2sim::output::write_results;
use h2sim::pcgc::PairwisePcgc;
use h2sim::phenotype::LiabilityModel;

#[derive(Parser)]
#[command(name = "h2sim")]
#[command(
    about = "Compare LD score regression and PCGC heritability estimates on simulated data",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Simulate(SimulateArgs),
    Scale {
        #[arg(long, default_value_t = 0.1)]
        prevalence: f64,
        #[arg(long)]
        sample_prevalence: Option<f64>,
    },
}

#[derive(Args)]
struct SimulateArgs {
    #[arg(long, default_value = "h2sim")]
    out: PathBuf,
    #[arg(long, default_value_t = 1)]
    n_sims: usize,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    cores: Option<usize>,

    // Estimators
    #[arg(long)]
    ldsc: bool,
    #[arg(long)]
    pcgc: bool,
    #[arg(long)]
    no_intercept: bool,
    #[arg(long)]
    free_and_no_intercept: bool,
    #[arg(long, default_value_t = 200)]
    n_blocks: usize,
    #[arg(long, default_value_t = 1000)]
    ld_wind_snps: usize,
    #[arg(long)]
    ldscore_sampling_prop: Option<f64>,
    #[arg(long)]
    ldscore_within_sample: bool,
    #[arg(long)]
    fix_genetics: bool,

    // Case-control ascertainment
    #[arg(long)]
    case_control: bool,
    #[arg(long, default_value_t = 0.1)]
    prevalence: f64,
    #[arg(long, default_value_t = 1000)]
    n_cases: usize,
    #[arg(long)]
    sample_prevalence: Option<f64>,

    // Genealogy
    #[arg(long, default_value_t = 40000)]
    n: usize,
    #[arg(long, default_value_t = 1)]
    n_chr: usize,
    #[arg(long, default_value_t = 1000)]
    n_snps: usize,
    #[arg(long, default_value_t = 1_000_000.0)]
    m: f64,
    #[arg(long = "Ne", default_value_t = 10000.0)]
    ne: f64,
    #[arg(long, default_value_t = 2e-8)]
    rec: f64,
    #[arg(long, default_value_t = 0.05)]
    maf: f64,
    #[arg(long)]
    geno_prop: Option<f64>,
    #[arg(long, default_value_t = 1)]
    n_pops: usize,
    #[arg(long, default_value_t = 0.01)]
    fst: f64,
    #[arg(long, default_value_t = 0.75)]
    prop_main: f64,
    #[arg(long, default_value_t = 50)]
    n_founders: usize,
    #[arg(long)]
    load_genealogy: Option<PathBuf>,

    // Phenotype
    #[arg(long = "h2_A", default_value_t = 0.3)]
    h2_a: f64,
    #[arg(long = "h2_D", default_value_t = 0.1)]
    h2_d: f64,
    #[arg(long = "h2_AC", default_value_t = 0.2)]
    h2_ac: f64,
    #[arg(long)]
    dominance: bool,
    #[arg(long)]
    gxe: bool,
    #[arg(long, default_value_t = 1.0)]
    p_causal: f64,
    #[arg(long)]
    same_causal_sites: bool,
    #[arg(long)]
    c_bool: bool,
    #[arg(long, default_value_t = 0.5)]
    c_bool_p: f64,
    #[arg(long)]
    include_pop_strat: bool,
    #[arg(long, default_value_t = 0.1)]
    s2: f64,

    // Per-replicate output
    #[arg(long)]
    write_l2: bool,
    #[arg(long)]
    write_pheno: bool,
    #[arg(long)]
    dump_genealogy: bool,
}

impl SimulateArgs {
    fn into_config(self) -> SimConfig {
        SimConfig {
            n_sims: self.n_sims,
            ldsc: self.ldsc,
            pcgc: self.pcgc,
            case_control: self.case_control,
            free_and_no_intercept: self.free_and_no_intercept,
            no_intercept: self.no_intercept,
            fix_genetics: self.fix_genetics,
            ldscore_within_sample: self.ldscore_within_sample,
            ldscore_sampling_prop: self.ldscore_sampling_prop,
            n_blocks: self.n_blocks,
            ld_wind_snps: self.ld_wind_snps,
            ascertainment: AscertainmentConfig {
                prevalence: self.prevalence,
                n_cases: self.n_cases,
                sample_prevalence: self.sample_prevalence,
            },
            genealogy: GenealogyConfig {
                n: self.n,
                n_chr: self.n_chr,
                n_snps: self.n_snps,
                m: self.m,
                ne: self.ne,
                rec: self.rec,
                maf: self.maf,
                geno_prop: self.geno_prop,
                n_pops: self.n_pops,
                fst: self.fst,
                prop_main: self.prop_main,
                n_founders: self.n_founders,
                load: self.load_genealogy,
            },
            phenotype: PhenotypeConfig {
                h2_a: self.h2_a,
                h2_d: self.h2_d,
                h2_ac: self.h2_ac,
                dominance: self.dominance,
                gxe: self.gxe,
                p_causal: self.p_causal,
                same_causal_sites: self.same_causal_sites,
                c_bool: self.c_bool,
                c_bool_p: self.c_bool_p,
                include_pop_strat: self.include_pop_strat,
                s2: self.s2,
            },
            output: OutputConfig {
                out: self.out,
                write_l2: self.write_l2,
                write_pheno: self.write_pheno,
                dump_genealogy: self.dump_genealogy,
            },
            seed: self.seed,
            cores: self.cores,
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate(args) => simulate(args.into_config())?,
        Command::Scale {
            prevalence,
            sample_prevalence,
        } => {
            let threshold = liability_threshold(prevalence)?;
            let study = sample_prevalence.unwrap_or(prevalence);
            let value = scale(prevalence, study, threshold)?;
            println!("threshold\t{threshold:.6}");
            println!("scale\t{value:.6}");
        }
    }

    Ok(())
}

fn simulate(config: SimConfig) -> anyhow::Result<()> {
    let log_path = format!("{}.h2sim.log", config.output.out.display());
    let mut log = File::create(&log_path)?;
    log_line(&mut log, &call_header(), true)?;
    log_line(
        &mut log,
        &format!("Beginning analysis at {:?}", SystemTime::now()),
        true,
    )?;
    let start = Instant::now();

    let genealogy = MosaicSimulator;
    let ld_scores = WindowedLdScores {
        window: config.ld_wind_snps,
        cores: config.cores,
    };
    let phenotypes = LiabilityModel;
    let ldsc = JackknifeHsq;
    let pcgc = PairwisePcgc;
    let collaborators = Collaborators {
        genealogy: &genealogy,
        ld_scores: &ld_scores,
        phenotypes: &phenotypes,
        ldsc: &ldsc,
        pcgc: &pcgc,
    };

    let outcome = run(&config, collaborators).and_then(|results| {
        write_results(
            &results,
            &config.output.out,
            config.free_and_no_intercept,
            config.pcgc,
        )
    });
    match &outcome {
        Ok(paths) => {
            for path in paths {
                log_line(&mut log, &format!("Wrote {}", path.display()), true)?;
            }
        }
        Err(err) => warn_line(&mut log, &format!("Analysis failed: {err:#}"))?,
    }

    log_line(
        &mut log,
        &format!("Analysis finished at {:?}", SystemTime::now()),
        true,
    )?;
    log_line(
        &mut log,
        &format!(
            "Total time elapsed: {}",
            sec_to_str(start.elapsed().as_secs_f64())
        ),
        true,
    )?;
    outcome.map(|_| ())
}

fn call_header() -> String {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut header = String::from("Call: \n./h2sim");
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            header.push_str(" \\\n");
            header.push_str(arg);
        } else {
            header.push(' ');
            header.push_str(arg);
        }
    }
    header.push('\n');
    header
}
