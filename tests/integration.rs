use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gls_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gls"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let records = [
        r#"{"slug":"bgh-2021-06-01-viii-zr-1-21","court_name":"Bundesgerichtshof","legal_area":"Mietrecht","file_number":"VIII ZR 1/21","ecli":"ECLI:DE:BGH:2021:010621UVIIIZR1.21.0","date":"2021-06-01","content":"<h2>Leitsatz</h2><p>Eine Kündigung wegen Eigenbedarf setzt ernsthafte Nutzungsabsicht voraus.</p><h2>Gründe</h2><p>Der Vermieter beruft sich auf § 573 BGB.</p>","citations":["ECLI:DE:BGH:2015:VIIIZR2.14"]}"#,
        r#"{"slug":"bgh-2015-viii-zr-2-14","court_name":"Bundesgerichtshof","legal_area":"Mietrecht","file_number":"VIII ZR 2/14","ecli":"ECLI:DE:BGH:2015:VIIIZR2.14","date":"12.03.2015","content":"Eigenbedarf des Vermieters bei Wohnraummiete."}"#,
        r#"{"slug":"bag-2019-5-azr-3-18","court_name":"Bundesarbeitsgericht","legal_area":"Arbeitsrecht","file_number":"5 AZR 3/18","date":"2019","content":"Vergütung von Überstunden im Arbeitsverhältnis."}"#,
        "this line is not json",
    ];
    let data_path = root.join("cases.jsonl");
    fs::write(&data_path, records.join("\n")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/gls.sqlite"

[search]
default_page_size = 10

[logging]
level = "warn"
"#,
        root.display()
    );

    let config_path = config_dir.join("gls.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gls(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gls_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gls binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn imported_env() -> (TempDir, PathBuf) {
    let (tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_gls(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let data = tmp.path().join("cases.jsonl");
    let (_, stderr, ok) = run_gls(&config, &["import", data.to_str().unwrap()]);
    assert!(ok, "import failed: {}", stderr);
    (tmp, config)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run_gls(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/gls.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    assert!(run_gls(&config, &["init"]).2);
    let (_, stderr, ok) = run_gls(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_search_requires_init() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, ok) = run_gls(&config, &["search", "Eigenbedarf"]);
    assert!(!ok);
    assert!(stderr.contains("gls init"));
}

#[test]
fn test_import_reports_skipped_lines() {
    let (tmp, config) = setup_test_env();
    assert!(run_gls(&config, &["init"]).2);
    let data = tmp.path().join("cases.jsonl");
    let (stdout, stderr, ok) = run_gls(&config, &["import", data.to_str().unwrap()]);
    assert!(ok, "import failed: {}", stderr);
    assert!(stdout.contains("upserted cases: 3"));
    assert!(stdout.contains("skipped: 1"));
    assert!(stdout.contains("line 4"));
}

#[test]
fn test_search_json() {
    let (_tmp, config) = imported_env();
    let (stdout, stderr, ok) = run_gls(&config, &["--json", "search", "Eigenbedarf"]);
    assert!(ok, "search failed: {}", stderr);

    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["total"], 2);
    assert_eq!(v["from_cache"], false);
    let matches = v["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    for m in matches {
        assert!(m["snippet"].as_str().unwrap().contains("<mark>"));
        assert!(m["case"]["url"]
            .as_str()
            .unwrap()
            .starts_with("https://de.openlegaldata.io/case/"));
    }
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config) = imported_env();
    let (a, _, _) = run_gls(&config, &["search", "Eigenbedarf Vermieter"]);
    let (b, _, _) = run_gls(&config, &["search", "Eigenbedarf Vermieter"]);
    let strip = |s: &str| s.lines().filter(|l| !l.contains(" ms")).collect::<Vec<_>>().join("\n");
    assert_eq!(strip(&a), strip(&b));
}

#[test]
fn test_search_filter_browse() {
    let (_tmp, config) = imported_env();
    let (stdout, stderr, ok) = run_gls(
        &config,
        &["--json", "search", "", "--filter", "legal_area=Arbeitsrecht"],
    );
    assert!(ok, "search failed: {}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["total"], 1);
    assert_eq!(v["matches"][0]["case"]["slug"], "bag-2019-5-azr-3-18");
}

#[test]
fn test_search_no_results() {
    let (_tmp, config) = imported_env();
    let (stdout, _, ok) = run_gls(&config, &["search", "Steuerhinterziehung"]);
    assert!(ok);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_rejects_bad_filter() {
    let (_tmp, config) = imported_env();
    let (_, stderr, ok) = run_gls(&config, &["search", "x", "--filter", "year_from=1700"]);
    assert!(!ok);
    assert!(stderr.contains("year_from"));

    let (_, stderr, ok) = run_gls(&config, &["search", "x", "--filter", "judge=Meier"]);
    assert!(!ok);
    assert!(stderr.contains("unknown filter"));
}

#[test]
fn test_get_by_slug_and_id() {
    let (_tmp, config) = imported_env();
    let (stdout, stderr, ok) = run_gls(&config, &["get", "bgh-2021-06-01-viii-zr-1-21"]);
    assert!(ok, "get failed: {}", stderr);
    assert!(stdout.contains("VIII ZR 1/21"));
    assert!(stdout.contains("--- Leitsatz ---"));
    assert!(stdout.contains("ernsthafte Nutzungsabsicht"));

    let (stdout, _, ok) = run_gls(&config, &["--json", "get", "3"]);
    assert!(ok);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["court_level"], "federal");
    assert_eq!(v["year"], 2019);
}

#[test]
fn test_get_missing_case() {
    let (_tmp, config) = imported_env();
    let (_, stderr, ok) = run_gls(&config, &["get", "99"]);
    assert!(!ok);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_related_via_citation() {
    let (_tmp, config) = imported_env();
    let (stdout, stderr, ok) = run_gls(&config, &["--json", "related", "1", "--limit", "5"]);
    assert!(ok, "related failed: {}", stderr);
    let links: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let links = links.as_array().unwrap();
    let cited = links.iter().find(|l| l["target_id"] == 2).unwrap();
    assert_eq!(cited["basis"]["direct_citation"], true);
    assert!(links.iter().all(|l| l["target_id"] != 1));
}

#[test]
fn test_suggest_stats_optimize() {
    let (_tmp, config) = imported_env();

    let (stdout, _, ok) = run_gls(&config, &["suggest", "VIII"]);
    assert!(ok);
    assert!(stdout.contains("VIII ZR 1/21"));
    assert!(stdout.contains("VIII ZR 2/14"));

    let (stdout, stderr, ok) = run_gls(&config, &["--json", "stats"]);
    assert!(ok, "stats failed: {}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["corpus"]["total_cases"], 3);
    assert_eq!(v["corpus"]["quality"]["with_ecli"], 2);

    let (stdout, stderr, ok) = run_gls(&config, &["optimize"]);
    assert!(ok, "optimize failed: {}", stderr);
    assert!(stdout.contains("ok"));
}
