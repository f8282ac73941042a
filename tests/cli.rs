use std::fs;
use std::process::{Command, Output};

use tempfile::tempdir;

fn foldguard(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_foldguard"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run foldguard cli")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn demo_reports_both_estimates() {
    let output = foldguard(&["demo", "--samples", "60", "--features", "200"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("selection within each fold"), "{text}");
    assert!(text.contains("selection before splitting (leaky)"), "{text}");
}

#[test]
fn config_prints_overridden_values() {
    let output = foldguard(&["config", "--folds", "3", "--seed", "9"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("folds = 3"), "{text}");
    assert!(text.contains("seed = 9"), "{text}");
    assert!(text.contains("kind = \"logistic\""), "{text}");
}

#[test]
fn naming_the_configured_learner_keeps_its_parameters() {
    let tmp = tempdir().expect("temporary directory");

    let logistic = tmp.path().join("logistic.toml");
    fs::write(&logistic, "[learner]\nkind = \"logistic\"\nl2 = 0.5\n").expect("write config");
    let output = foldguard(&[
        "config",
        "--config",
        logistic.to_str().expect("path str"),
        "--learner",
        "logistic",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("l2 = 0.5"), "{}", stdout(&output));

    let knn = tmp.path().join("knn.toml");
    fs::write(&knn, "[learner]\nkind = \"nearest_neighbors\"\nk = 5\n").expect("write config");
    let knn_path = knn.to_str().expect("path str");
    let output = foldguard(&["config", "--config", knn_path, "--learner", "knn"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("k = 5"), "{}", stdout(&output));

    let output = foldguard(&["config", "--config", knn_path, "--neighbors", "3"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("k = 3"), "{}", stdout(&output));
}

#[test]
fn switching_learner_kind_uses_its_defaults() {
    let output = foldguard(&["config", "--learner", "knn", "--neighbors", "4"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("kind = \"nearest_neighbors\""), "{text}");
    assert!(text.contains("k = 4"), "{text}");

    let output = foldguard(&["config", "--neighbors", "4"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error: --neighbors"), "{}", stderr(&output));
}

#[test]
fn evaluate_reads_a_tsv_file() {
    let tmp = tempdir().expect("temporary directory");
    let data_path = tmp.path().join("data.tsv");

    let mut data = String::from("label\tsignal\tnoise_a\tnoise_b\n");
    for i in 0..20 {
        let label = i % 2;
        let noise_a = (i * 7 % 11) as f64 / 10.0;
        let noise_b = (i * 3 % 5) as f64;
        data.push_str(&format!("{label}\t{label}.0\t{noise_a}\t{noise_b}\n"));
    }
    fs::write(&data_path, data).expect("write training data");

    let output = foldguard(&[
        "evaluate",
        data_path.to_str().expect("path str"),
        "--folds",
        "4",
        "--top-features",
        "1",
        "--leaky",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Feature selection within each training fold"), "{text}");
    assert!(text.contains("optimistically biased"), "{text}");
    assert!(text.contains("signal"), "{text}");
    assert!(text.contains("mean error: 0.0000"), "{text}");
}

#[test]
fn invalid_fold_count_exits_with_an_error() {
    let output = foldguard(&["config", "--folds", "1"]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.lines().any(|l| l.starts_with("Error:")), "{err}");
    assert!(stdout(&output).is_empty());
}
