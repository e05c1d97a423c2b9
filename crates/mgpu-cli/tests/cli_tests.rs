//! End-to-end runs of the `mgpu` binary on the host reference backend.

use assert_cmd::Command;
use predicates::prelude::*;

/// Binary with a scrubbed environment so `MGPU_*` and `RUST_LOG` from the
/// caller cannot leak in.
fn mgpu() -> Command {
    let mut cmd = Command::cargo_bin("mgpu").unwrap();
    cmd.env_clear().env("USER", "tester");
    cmd
}

fn stdout_lines(cmd: &mut Command) -> Vec<String> {
    let out = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(out).unwrap().lines().map(str::to_string).collect()
}

fn assert_summary(line: &str, name: &str) {
    let prefix = format!("# {name}: total = ");
    let secs = line
        .strip_prefix(&prefix)
        .and_then(|rest| rest.strip_suffix('s'))
        .unwrap_or_else(|| panic!("unexpected summary line: {line}"));
    let (_, decimals) = secs.split_once('.').expect("fractional seconds");
    assert_eq!(decimals.len(), 6, "{line}");
    assert!(secs.parse::<f64>().unwrap() >= 0.0);
}

#[test]
fn help_works() {
    mgpu()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--num-images").and(predicate::str::contains("--height")));
}

#[test]
fn version_works() {
    mgpu().arg("--version").assert().success();
}

#[test]
fn reports_identity_config_and_both_strategies() {
    let lines = stdout_lines(mgpu().args([
        "--backend",
        "reference",
        "--reference-devices",
        "2",
        "-n",
        "2",
        "-w",
        "8",
        "-h",
        "4",
        "--seed",
        "1",
    ]));

    assert_eq!(lines.len(), 4, "{lines:?}");
    assert!(lines[0].starts_with("## tester@"), "{}", lines[0]);
    assert_eq!(lines[1], "# Computing <nlm> for 2 images of size 8x4");
    assert_summary(&lines[2], "Copy");
    assert_summary(&lines[3], "Pass-through");
}

#[test]
fn unspecified_count_scales_with_devices() {
    let lines = stdout_lines(mgpu().args([
        "--backend",
        "reference",
        "--reference-devices",
        "3",
        "-w",
        "2",
        "-h",
        "2",
    ]));
    assert_eq!(lines[1], "# Computing <nlm> for 48 images of size 2x2");
}

#[test]
fn negative_count_means_unspecified() {
    let lines = stdout_lines(mgpu().args(["--backend", "reference", "-n", "-1", "-w", "2", "-h", "2"]));
    assert_eq!(lines[1], "# Computing <nlm> for 16 images of size 2x2");
}

#[test]
fn malformed_number_exits_with_one() {
    mgpu()
        .args(["-n", "lots"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Option parsing failed"));
}

#[test]
fn unknown_flag_exits_with_one() {
    mgpu()
        .arg("--no-such-flag")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Option parsing failed"));
}

#[test]
fn zero_images_exit_with_one_before_any_output() {
    mgpu()
        .args(["--backend", "reference", "-n", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn missing_kernel_file_is_a_setup_failure() {
    mgpu()
        .args([
            "--backend",
            "reference",
            "-n",
            "1",
            "-w",
            "2",
            "-h",
            "2",
            "--kernel",
            "/nonexistent/nlm.cl",
            "--log-format",
            "compact",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Benchmark failed"));
}

#[test]
fn invalid_local_size_is_an_option_failure() {
    mgpu()
        .args(["--backend", "reference", "-w", "10", "-h", "10", "--local-size", "4x4"])
        .assert()
        .code(1);
}

#[test]
fn config_file_then_env_then_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mgpu.toml");
    std::fs::write(&path, "backend = \"reference\"\nnum_images = 1\nwidth = 4\nheight = 4\n").unwrap();

    let lines = stdout_lines(
        mgpu()
            .env("MGPU_HEIGHT", "6")
            .arg("--config")
            .arg(&path)
            .args(["-w", "2"]),
    );
    assert_eq!(lines[1], "# Computing <nlm> for 1 images of size 2x6");
}

#[test]
fn print_config_shows_effective_values() {
    mgpu()
        .env("MGPU_SEED", "12")
        .args(["--print-config", "-w", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("width = 16").and(predicate::str::contains("seed = 12")));
}

#[test]
fn invalid_env_override_exits_with_one() {
    mgpu()
        .env("MGPU_WIDTH", "wide")
        .args(["--backend", "reference"])
        .assert()
        .code(1);
}

#[cfg(not(feature = "opencl-runtime"))]
#[test]
fn opencl_backend_unavailable_without_feature() {
    mgpu()
        .args(["--backend", "opencl", "-n", "1", "-w", "2", "-h", "2"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
}
