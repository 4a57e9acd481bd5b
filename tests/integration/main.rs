//! Integration tests for cachepipe

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const BUILD_LOG: &str = "\
Loading cache: 100% |###########| Time: 0:00:01
Sstate summary: Wanted 200 Found 180 Missed 20 Current 0 (90% match, 0% complete)
NOTE: Executing Tasks
NOTE: Tasks Summary: Attempted 3000 tasks of which 2700 didn't need to be rerun and all succeeded.
";

    fn cachepipe(config: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("cachepipe");
        cmd.env("CACHEPIPE_PLAIN", "1")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(config);
        cmd
    }

    fn write_log(dir: &TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("build.log");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("cachepipe")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache validation pipeline"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("cachepipe")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cachepipe"));
    }

    #[test]
    fn config_path_honors_flag() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("custom.toml");
        cachepipe(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_prints_defaults() {
        let temp = TempDir::new().unwrap();
        cachepipe(&temp.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[remote]"))
            .stdout(predicate::str::contains("core-image-minimal"));
    }

    #[test]
    fn config_init_then_show() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("cfg/config.toml");

        cachepipe(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(config.exists());

        cachepipe(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[build\ntarget = ").unwrap();

        cachepipe(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn analyze_text_output() {
        let temp = TempDir::new().unwrap();
        let log = write_log(&temp, BUILD_LOG);

        cachepipe(&temp.path().join("none.toml"))
            .arg("analyze")
            .arg(&log)
            .args(["--minutes", "12"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Hit rate:   90.0%"))
            .stdout(predicate::str::contains("Effectiveness:  Excellent"))
            .stdout(predicate::str::contains("YES"));
    }

    #[test]
    fn analyze_json_output() {
        let temp = TempDir::new().unwrap();
        let log = write_log(&temp, BUILD_LOG);

        let output = cachepipe(&temp.path().join("none.toml"))
            .arg("analyze")
            .arg(&log)
            .args(["--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["metrics"]["tasks_wanted"], 200);
        assert_eq!(json["metrics"]["tasks_skipped_from_cache"], 2700);
        assert_eq!(json["metrics"]["tasks_executed"], 300);
        assert!(json.get("verdict").is_none());
    }

    #[test]
    fn analyze_reports_missing_summaries() {
        let temp = TempDir::new().unwrap();
        let log = write_log(&temp, "nothing useful here\n");

        cachepipe(&temp.path().join("none.toml"))
            .arg("analyze")
            .arg(&log)
            .assert()
            .success()
            .stdout(predicate::str::contains("no sstate summary line"))
            .stdout(predicate::str::contains("Hit rate:   0.0%"));
    }

    #[test]
    fn analyze_missing_log_fails() {
        let temp = TempDir::new().unwrap();
        cachepipe(&temp.path().join("none.toml"))
            .args(["analyze", "/nonexistent/build.log"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading build log"));
    }

    #[test]
    fn run_without_runtime_stops_at_prereq() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[prereq]\ncheck_remote = false\nmin_free_gb = 0.0\n").unwrap();
        let results = temp.path().join("out/results.json");

        cachepipe(&config)
            .arg("run")
            .arg("--workspace")
            .arg(temp.path().join("ws"))
            .args(["--runtime", "/nonexistent/docker"])
            .arg("--results")
            .arg(&results)
            .assert()
            .failure()
            .stdout(predicate::str::contains("BUILD CACHE VALIDATION REPORT"))
            .stdout(predicate::str::contains("Stages passed: 0/5"))
            .stderr(predicate::str::contains("Prerequisite check failed"))
            .stderr(predicate::str::contains("cachepipe check"));

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&results).unwrap()).unwrap();
        assert_eq!(saved["prereq"]["succeeded"], false);
        assert!(saved.get("fetch").is_none());
    }

    #[test]
    fn check_without_runtime_fails() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[prereq]\ncheck_remote = false\nmin_free_gb = 0.0\n").unwrap();

        cachepipe(&config)
            .args(["check", "--runtime", "/nonexistent/docker"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("not found"))
            .stderr(predicate::str::contains("Prerequisite check failed"));
    }

    #[test]
    fn bench_help_lists_iterations() {
        cargo_bin_cmd!("cachepipe")
            .args(["bench", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--iterations"))
            .stdout(predicate::str::contains("--targets"));
    }

    #[test]
    fn bench_without_runtime_fails() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[prereq]\nmin_free_gb = 0.0\n").unwrap();

        cachepipe(&config)
            .arg("bench")
            .arg("--workspace")
            .arg(temp.path().join("ws"))
            .args(["--runtime", "/nonexistent/docker", "--iterations", "2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Prerequisite check failed"))
            .stderr(predicate::str::contains("not found"));
    }
}
