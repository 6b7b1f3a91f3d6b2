use clap::Parser;
use lowrank_bope::{
    generate_principal_axes, make_controlled_coeffs, render_table, summarize, BopeConfig,
    BopeExperiment, ExperimentLog, LinearUtil, ReportConfig, SyntheticProblem,
};
use ndarray::s;
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Outcome dimension
    #[arg(long, default_value_t = 20)]
    outcome_dim: usize,
    /// Rank of the synthetic outcome subspace: 1, 2 or 4
    #[arg(short, long, default_value_t = 2)]
    rank: usize,
    /// Share of the utility coefficients outside of the outcome subspace, in [0, 1]
    #[arg(short, long, default_value_t = 0.2)]
    alpha: f64,
    /// Number of trials
    #[arg(short, long, default_value_t = 2)]
    trials: u64,
    /// Comma separated subspace methods
    #[arg(short, long, default_value = "st,pca,pcr,true_proj")]
    methods: String,
    /// Comma separated preference exploration strategies
    #[arg(short, long, default_value = "EUBO-zeta,Random-f")]
    strategies: String,
    /// Checkpoint directory
    #[arg(short, long)]
    outdir: Option<String>,
}

fn scaling_factors(rank: usize) -> anyhow::Result<Vec<f64>> {
    match rank {
        1 => Ok(vec![2.]),
        2 => Ok(vec![2., 1.]),
        4 => Ok(vec![4., 2., 2., 1.]),
        _ => anyhow::bail!("rank should be 1, 2 or 4, got {rank}"),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let methods: Vec<&str> = args.methods.split(',').map(str::trim).collect();
    let strategies: Vec<&str> = args.strategies.split(',').map(str::trim).collect();
    let scales = scaling_factors(args.rank)?;

    let mut log = ExperimentLog::new();
    for trial in 0..args.trials {
        // full basis, the problem only varies along the first `rank` axes
        let full_axes = generate_principal_axes(args.outcome_dim, args.outcome_dim, trial)?;
        let true_axes = full_axes.slice(s![..args.rank, ..]).to_owned();
        let problem = SyntheticProblem::builder(1, true_axes)
            .scaling_factors(&scales)
            .noise_std(0.1)
            .seed(trial)
            .build()?;
        let mut rng = Xoshiro256Plus::seed_from_u64(trial);
        let beta = make_controlled_coeffs(&full_axes, args.rank, args.alpha, &mut rng)?;
        let util = LinearUtil::new(beta);

        let config = BopeConfig::new()
            .outer_iterations(3)
            .comps_per_iteration(12)
            .n_check_post_mean(4)
            .seed(trial)
            .output_dir(args.outdir.as_ref());
        let experiment = BopeExperiment::new(&problem, &util, &methods, &strategies, config)?;
        println!("Trial {trial}: running {} x {} pipelines", methods.len(), strategies.len());
        log.merge(experiment.run()?);
    }

    for record in log.records().filter(|r| !r.is_completed()) {
        println!(
            "{} / {} failed on trial {}: {:?}",
            record.method, record.strategy, record.trial, record.status
        );
    }
    println!("{}", render_table(&summarize(&log, &ReportConfig::default())));
    Ok(())
}
