#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use foldguard::{
    CorrelationScorer, CrossValidator, CvConfig, Evaluation, FoldStatus, FoldStrategy,
    LearnerSpec, NearestNeighbors, NoiseDatasetBuilder, SelectionMode,
    evaluate_with_presplit_selection,
    io::load_tsv,
};

#[derive(Parser)]
#[command(
    name = "foldguard",
    version,
    about = "Cross-validated error estimates with feature selection confined to each training fold",
    long_about = "Estimates the out-of-fold misclassification rate of a top-M feature selection \
                  followed by a classifier, recomputing the selection inside every training fold."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-validate a TSV dataset with a 'label' column
    Evaluate(EvaluateArgs),

    /// Compare leak-free and leaky estimates on pure-noise data
    Demo(DemoArgs),

    /// Print the effective configuration as TOML
    Config(OverrideArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyCli {
    Stratified,
    Shuffled,
}

#[derive(Clone, Copy, ValueEnum)]
enum LearnerCli {
    Logistic,
    Knn,
}

#[derive(Args)]
struct OverrideArgs {
    /// TOML configuration file; flags below override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of folds (K)
    #[arg(long, value_name = "K")]
    folds: Option<usize>,

    /// Number of top-ranked features kept per fold (M)
    #[arg(long, value_name = "M")]
    top_features: Option<usize>,

    /// Seed for the fold assignment
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum)]
    strategy: Option<StrategyCli>,

    #[arg(long, value_enum)]
    learner: Option<LearnerCli>,

    /// Neighbour count for the knn learner
    #[arg(long, value_name = "K")]
    neighbors: Option<usize>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Path to a tab-separated file with a 'label' column and numeric features
    data: PathBuf,

    #[command(flatten)]
    overrides: OverrideArgs,

    /// Also report the biased estimate from selecting features before splitting
    #[arg(long)]
    leaky: bool,
}

#[derive(Args)]
struct DemoArgs {
    #[arg(long, default_value = "100")]
    samples: usize,

    #[arg(long, default_value = "10000")]
    features: usize,

    /// Seed for the synthetic data
    #[arg(long, default_value = "0")]
    data_seed: u64,

    #[command(flatten)]
    overrides: OverrideArgs,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Some(Commands::Evaluate(args)) => run_evaluate(args),
        Some(Commands::Demo(args)) => run_demo(args),
        Some(Commands::Config(args)) => run_config(args),
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn resolve_config(args: &OverrideArgs) -> Result<CvConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => CvConfig::load(path)?,
        None => CvConfig::default(),
    };
    if let Some(folds) = args.folds {
        config.folds = folds;
    }
    if let Some(top) = args.top_features {
        config.top_features = top;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = match strategy {
            StrategyCli::Stratified => FoldStrategy::Stratified,
            StrategyCli::Shuffled => FoldStrategy::Shuffled,
        };
    }
    // Switching kind starts from that learner's defaults; naming the
    // configured kind keeps the file's parameters.
    config.learner = match (args.learner, config.learner) {
        (Some(LearnerCli::Logistic), LearnerSpec::NearestNeighbors { .. }) => {
            LearnerSpec::default()
        }
        (Some(LearnerCli::Knn), LearnerSpec::Logistic { .. }) => {
            LearnerSpec::from(NearestNeighbors::default())
        }
        (_, current) => current,
    };
    if let Some(k) = args.neighbors {
        match &mut config.learner {
            LearnerSpec::NearestNeighbors { k: current } => *current = k,
            LearnerSpec::Logistic { .. } => {
                return Err("--neighbors applies only to the knn learner".into());
            }
        }
    }
    config.validate()?;
    Ok(config)
}

fn run_evaluate(args: EvaluateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args.overrides)?;
    let loaded = load_tsv(&args.data)?;
    let validator = CrossValidator::new(&config);

    let honest = validator.evaluate(&loaded.dataset, &CorrelationScorer, &config.learner)?;
    print_report(&honest, &loaded.feature_names);

    if args.leaky {
        let leaky = evaluate_with_presplit_selection(
            &validator,
            &loaded.dataset,
            &CorrelationScorer,
            &config.learner,
        )?;
        println!();
        print_report(&leaky, &loaded.feature_names);
    }
    Ok(())
}

fn run_demo(args: DemoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args.overrides)?;
    println!(
        "Generating {} samples x {} random binary features (data seed {}).",
        args.samples, args.features, args.data_seed
    );
    let data = NoiseDatasetBuilder::new(args.samples, args.features)
        .seed(args.data_seed)
        .build()?;
    let validator = CrossValidator::new(&config);

    let honest = validator.evaluate(&data, &CorrelationScorer, &config.learner)?;
    let leaky =
        evaluate_with_presplit_selection(&validator, &data, &CorrelationScorer, &config.learner)?;

    println!();
    println!("{:<34} {:>10}", "procedure", "mean error");
    println!("{:<34} {:>10.4}", "selection within each fold", honest.mean_error());
    println!("{:<34} {:>10.4}", "selection before splitting (leaky)", leaky.mean_error());
    println!();
    println!("The labels are coin flips, so any honest estimate should sit near 0.5.");
    Ok(())
}

fn run_config(args: OverrideArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_report(evaluation: &Evaluation, feature_names: &[String]) {
    let heading = match evaluation.selection() {
        SelectionMode::WithinFold => "Feature selection within each training fold",
        SelectionMode::Presplit => "Feature selection on the full dataset (optimistically biased)",
    };
    println!("{heading}");
    println!("{:>4}  {:>6}  {:>6}  {:>10}  features", "fold", "train", "test", "error");
    for fold in evaluation.folds() {
        let error = match fold.status {
            FoldStatus::Scored { error } => format!("{error:.4}"),
            FoldStatus::Degenerate { label } => format!("degen({label})"),
        };
        let names: Vec<&str> = fold
            .selected_features
            .iter()
            .map(|&i| feature_names.get(i).map(String::as_str).unwrap_or("?"))
            .collect();
        println!(
            "{:>4}  {:>6}  {:>6}  {:>10}  {}",
            fold.fold,
            fold.train_size,
            fold.test_size,
            error,
            names.join(", ")
        );
    }
    println!("mean error: {:.4}", evaluation.mean_error());
    let degenerate = evaluation.degenerate_folds();
    if !degenerate.is_empty() {
        println!("degenerate folds (excluded from the mean): {degenerate:?}");
    }
}
