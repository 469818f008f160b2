#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct Workspace {
    project: TempDir,
    home: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            project: TempDir::new().unwrap(),
            home: TempDir::new().unwrap(),
        }
    }

    fn bare(&self) -> Command {
        let mut cmd = Command::cargo_bin("stylist").unwrap();
        cmd.current_dir(self.project.path())
            .env("STYLIST_WORKING_DIR", self.project.path())
            .env("HOME", self.home.path())
            .env_remove("RUST_LOG");
        cmd
    }

    fn stylist(&self) -> Command {
        let mut cmd = self.bare();
        cmd.args(["--project-name", "checkout"]);
        cmd
    }

    fn init(&self) {
        self.stylist()
            .args(["project", "init", "--prefix", "acme-", "--stage", "prod", "--stage", "staging"])
            .assert()
            .success();
    }

    /// Initialise with parameters kept in `.stylist/parameters/`.
    fn init_local(&self) {
        self.stylist()
            .args([
                "project",
                "init",
                "--prefix",
                "acme-",
                "--stage",
                "prod",
                "--stage",
                "staging",
                "--config-provider",
                "local",
            ])
            .assert()
            .success();
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.stylist().args(args).arg("--json").output().unwrap();
        assert!(
            output.status.success(),
            "{}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.project.path().join(rel)).unwrap()
    }
}

// ---------------------------------------------------------------------------
// stylist project
// ---------------------------------------------------------------------------

#[test]
fn init_creates_settings_and_selects_local() {
    let ws = Workspace::new();
    ws.init();

    assert!(ws.project.path().join(".stylist/config.yml").is_file());
    assert_eq!(ws.read(".stylist/environment"), "local");
    let config = ws.read(".stylist/config.yml");
    assert!(config.contains("prefix: acme-"));
    assert!(config.contains("staging"));
    assert!(ws.read(".gitignore").contains(".stylist/environment"));
}

#[test]
fn init_twice_fails() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["project", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialised"));
}

#[test]
fn project_info_json() {
    let ws = Workspace::new();
    ws.init();
    let output = ws
        .stylist()
        .args(["project", "info", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["name"], "checkout");
    assert_eq!(info["namespace"], "service:checkout");
    assert_eq!(info["profile"], "local");
    assert_eq!(info["initialised"], true);
}

#[test]
fn blank_project_name_is_rejected() {
    let ws = Workspace::new();
    ws.init();
    ws.bare()
        .args(["--project-name", "  ", "project", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("project name must not be empty"));
}

#[test]
fn invalid_settings_abort() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.project.path().join(".stylist")).unwrap();
    std::fs::write(
        ws.project.path().join(".stylist/config.yml"),
        "stylist:\n  stages: [prod, prod]\n",
    )
    .unwrap();
    ws.stylist()
        .arg("commands")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid settings"));
}

// ---------------------------------------------------------------------------
// stylist commands
// ---------------------------------------------------------------------------

#[test]
fn uninitialised_project_has_core_commands_only() {
    let ws = Workspace::new();
    ws.stylist()
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("profile"))
        .stdout(predicate::str::contains("config").not());

    ws.stylist()
        .args(["config", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown command 'config'"));
}

#[test]
fn docker_commands_appear_after_setup() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["docker", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown command 'docker'"));

    ws.stylist()
        .args(["features", "add", "docker", "--base-image", "python:3.12-slim"])
        .assert()
        .success();
    assert!(ws.read("Dockerfile").starts_with("FROM python:3.12-slim"));
    std::fs::write(ws.project.path().join("Dockerfile.worker"), "FROM scratch").unwrap();

    ws.stylist()
        .args(["commands", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"docker\""))
        .stdout(predicate::str::contains("\"terraform\"").not());

    let output = ws.stylist().args(["docker", "list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let images: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(images[0]["name"], "checkout");
    assert_eq!(images[1]["name"], "checkout-worker");
}

#[test]
fn docker_push_needs_a_repository() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["features", "add", "docker"])
        .assert()
        .success();
    ws.stylist()
        .args(["docker", "push", "--tag", "1.4.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("docker.repository is not set"));
}

#[test]
fn adding_installed_feature_fails_without_changes() {
    let ws = Workspace::new();
    ws.init();
    std::fs::write(ws.project.path().join("Dockerfile"), "FROM custom").unwrap();
    ws.stylist()
        .args(["features", "add", "docker"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already enabled"));
    assert_eq!(ws.read("Dockerfile"), "FROM custom");
}

#[test]
fn terraform_setup_writes_provider() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["features", "add", "terraform"])
        .assert()
        .success();
    assert!(ws.read("terraform/provider.tf").contains("aws_profile"));
    ws.stylist()
        .arg("commands")
        .assert()
        .success()
        .stdout(predicate::str::contains("terraform"));
}

#[test]
fn unknown_feature_is_reported() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["features", "add", "lambda"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("feature not found: lambda"));
}

// ---------------------------------------------------------------------------
// stylist profile
// ---------------------------------------------------------------------------

#[test]
fn profile_select_and_list() {
    let ws = Workspace::new();
    ws.init();

    ws.stylist()
        .args(["profile", "select", "prod"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected profile: prod"));
    assert_eq!(ws.read(".stylist/environment"), "prod");

    ws.stylist()
        .args(["profile", "selected"])
        .assert()
        .success()
        .stdout("prod\n");

    let output = ws.stylist().args(["profile", "list", "--json"]).output().unwrap();
    let profiles: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = profiles
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["prod", "staging", "local"]);
    assert_eq!(profiles[0]["active"], true);
}

#[test]
fn selecting_undeclared_profile_fails() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["profile", "select", "qa"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown profile 'qa'"));
    assert_eq!(ws.read(".stylist/environment"), "local");
}

#[test]
fn profile_flag_overrides_for_one_invocation() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["--profile", "staging", "profile", "selected"])
        .assert()
        .success()
        .stdout("staging\n");
    assert_eq!(ws.read(".stylist/environment"), "local");
}

// ---------------------------------------------------------------------------
// stylist config (local provider)
// ---------------------------------------------------------------------------

#[test]
fn config_round_trip_in_local_files() {
    let ws = Workspace::new();
    ws.init_local();
    assert!(ws.read(".gitignore").contains(".stylist/parameters/"));

    ws.stylist()
        .args(["--profile", "prod", "config", "write", "db_host", "p.db", "--no-encrypt"])
        .assert()
        .success();
    ws.stylist()
        .args(["--profile", "prod", "config", "write", "db_password", "hunter2"])
        .assert()
        .success();

    let raw = ws.read(".stylist/parameters/prod.json");
    assert!(raw.contains("p.db"));
    assert!(!raw.contains("hunter2"));

    let dumped = ws.json(&["--profile", "prod", "config", "dump"]);
    assert_eq!(dumped["SERVICE_CHECKOUT_DB_HOST"], "p.db");
    assert_eq!(dumped["SERVICE_CHECKOUT_DB_PASSWORD"], "hunter2");
}

#[test]
fn config_sync_with_defaults_mirrors_the_source() {
    let ws = Workspace::new();
    ws.init_local();
    for (profile, args) in [
        ("prod", vec!["db_host", "p.db", "--no-encrypt"]),
        ("prod", vec!["db_password", "hunter2"]),
        ("staging", vec!["db_host", "s.db", "--no-encrypt"]),
        ("staging", vec!["legacy_flag", "1", "--no-encrypt"]),
    ] {
        ws.stylist()
            .args(["--profile", profile, "config", "write"])
            .args(args)
            .assert()
            .success();
    }

    ws.stylist()
        .args(["config", "sync", "prod", "--destination", "staging", "--defaults", "--yes"])
        .assert()
        .success();

    let listed = ws.json(&["--profile", "staging", "config", "list"]);
    let kinds: Vec<(&str, &str, &str)> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|p| {
            (
                p["name"].as_str().unwrap(),
                p["kind"].as_str().unwrap(),
                p["value"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("/service/checkout/db_host", "plain", "s.db"),
            ("/service/checkout/db_password", "secret", "hunter2"),
        ]
    );
    assert!(!ws.read(".stylist/parameters/staging.json").contains("hunter2"));
}

// ---------------------------------------------------------------------------
// stylist terraform
// ---------------------------------------------------------------------------

#[test]
fn sync_vars_keeps_maps_intact_and_drops_extra_variables() {
    let ws = Workspace::new();
    ws.init();
    ws.stylist()
        .args(["features", "add", "terraform"])
        .assert()
        .success();
    std::fs::write(
        ws.project.path().join("terraform/env.prod.tfvars"),
        "instance_count = 3\ntags = {\n  team = \"core\"\n  tier = \"web\"\n}\n",
    )
    .unwrap();
    std::fs::write(
        ws.project.path().join("terraform/env.staging.tfvars"),
        "instance_count = 1\nlegacy_flag = true\n",
    )
    .unwrap();

    let result = ws.json(&[
        "terraform",
        "sync-vars",
        "prod",
        "--destination",
        "staging",
        "--defaults",
        "--yes",
    ]);
    assert_eq!(result["changes"], 2);

    let staging = ws.read("terraform/env.staging.tfvars");
    assert_eq!(staging.matches('{').count(), staging.matches('}').count());
    assert!(staging
        .lines()
        .any(|l| l.starts_with("instance_count") && l.trim_end().ends_with('1')));
    assert!(staging.contains("team") && staging.contains("\"core\""));
    assert!(!staging.contains("legacy_flag"));

    let again = ws.json(&[
        "terraform",
        "sync-vars",
        "prod",
        "--destination",
        "staging",
        "--defaults",
        "--yes",
    ]);
    assert_eq!(again["changes"], 0);
}
