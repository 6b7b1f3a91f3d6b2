use lowrank_bope::{
    generate_principal_axes, make_controlled_coeffs, summarize, BopeConfig, BopeExperiment,
    Checkpointer, LinearUtil, PeStrategy, ReportConfig, SyntheticProblem,
};
use lowrank_models::JointTrainConfig;
use lowrank_subspace::{AutoencoderConfig, MethodSettings, SubspaceMethod};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn small_config() -> BopeConfig {
    BopeConfig::new()
        .initial_design(8)
        .initial_comps(4)
        .outer_iterations(1)
        .comps_per_iteration(10)
        .n_check_post_mean(2)
        .n_test(20)
        .n_design_candidates(32)
        .model_n_start(1)
        .seed(3)
}

fn setup() -> (SyntheticProblem, LinearUtil) {
    let axes = generate_principal_axes(10, 10, 0).unwrap();
    let problem = SyntheticProblem::builder(1, axes.slice(ndarray::s![..2, ..]).to_owned())
        .scaling_factors(&[2., 1.])
        .noise_std(0.1)
        .seed(1)
        .build()
        .unwrap();
    let mut rng = Xoshiro256Plus::seed_from_u64(0);
    let beta = make_controlled_coeffs(&axes, 2, 0.2, &mut rng).unwrap();
    (problem, LinearUtil::new(beta))
}

#[test]
fn test_bope_loop_with_random_comparisons() {
    let (problem, util) = setup();
    let experiment =
        BopeExperiment::new(&problem, &util, &["st", "pca"], &["Random-f"], small_config())
            .unwrap();
    let log = experiment.run().unwrap();

    assert_eq!(log.len(), 2);
    for method in ["st", "pca"] {
        let record = log.get(3, method, "Random-f").unwrap();
        assert!(record.is_completed(), "{method}: {:?}", record.status);
        assert_eq!(record.iterations.len(), 1);
        assert_eq!(record.iterations[0].n_comps, 14);
        assert_eq!(record.within_session.len(), 5);
        assert!(record
            .within_session
            .windows(2)
            .all(|w| w[0].best_util_so_far <= w[1].best_util_so_far));
    }
    let rows = summarize(&log, &ReportConfig::default());
    assert_eq!(rows.len(), 10);
}

#[test]
fn test_sequential_run_is_checkpointed() {
    let (problem, util) = setup();
    let dir = std::env::temp_dir().join("lowrank_bope_loop_checkpoint");
    let _ = std::fs::remove_dir_all(&dir);
    let config = small_config()
        .comps_per_iteration(4)
        .parallel(false)
        .output_dir(Some(&dir));
    let experiment = BopeExperiment::new(&problem, &util, &["st"], &["Random-f"], config).unwrap();
    let log = experiment.run().unwrap();

    let checkpointer = Checkpointer::new(&dir);
    assert_eq!(checkpointer.load_log().unwrap(), Some(log.clone()));
    let record = checkpointer.load_run(3, "st", "Random-f").unwrap();
    assert_eq!(Some(&record), log.get(3, "st", "Random-f"));
    let samples = checkpointer.load_samples(3, "st", "Random-f").unwrap();
    assert_eq!(samples.len(), 9);
}

#[test]
fn test_every_method_and_strategy_completes() {
    let (problem, util) = setup();
    let settings = MethodSettings {
        autoencoder: AutoencoderConfig {
            latent_dim: 2,
            pretrain_epochs: 50,
            lr: 1e-2,
        },
        ..MethodSettings::default()
    };
    let config = small_config()
        .comps_per_iteration(4)
        .settings(settings)
        .joint(JointTrainConfig::new().epochs(20));
    let methods = SubspaceMethod::NAMES;
    let strategies = PeStrategy::NAMES;
    let experiment = BopeExperiment::new(&problem, &util, &methods, &strategies, config).unwrap();
    let log = experiment.run().unwrap();

    assert_eq!(log.len(), methods.len() * strategies.len());
    for method in methods {
        for strategy in strategies {
            let record = log.get(3, method, strategy).unwrap();
            assert!(record.is_completed(), "{method}/{strategy}: {:?}", record.status);
            assert_eq!(record.iterations.len(), 1);
            assert_eq!(record.iterations[0].n_comps, 8);
            assert_eq!(record.within_session.len(), 2);
            assert!(record
                .within_session
                .windows(2)
                .all(|w| w[0].best_util_so_far <= w[1].best_util_so_far));
            let iteration = &record.iterations[0];
            assert!(iteration.recovery_error.is_some());
            assert_eq!(iteration.joint_converged.is_some(), method == "autoencoder");
        }
    }

    // subspaces containing the truth are at distance 0 from it
    for method in ["st", "true_proj"] {
        let iteration = &log.get(3, method, "Random-f").unwrap().iterations[0];
        assert!(iteration.recovery_error.unwrap() < 1e-8, "{method}");
        assert!(iteration.grassmannian.unwrap() < 1e-6, "{method}");
    }
}
