use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const STYLIST_DIR: &str = ".stylist";
pub const CONFIG_FILENAME: &str = "config.yml";
pub const ENVIRONMENT_FILE: &str = ".stylist/environment";

/// Parameter files of the `local` config provider, one per stage.
pub const PARAMETERS_DIR: &str = ".stylist/parameters";

pub const SYSTEM_CONFIG_DIR: &str = "/etc/stylist";

pub const TERRAFORM_DIR: &str = "terraform";
pub const TERRAFORM_UPDATE_MARKER: &str = ".tfupdate";
pub const TERRAFORM_STATE_DIR: &str = "terraform.tfstate.d";

pub const DOCKERFILE: &str = "Dockerfile";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn stylist_dir(root: &Path) -> PathBuf {
    root.join(STYLIST_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    stylist_dir(root).join(CONFIG_FILENAME)
}

pub fn environment_path(root: &Path) -> PathBuf {
    root.join(ENVIRONMENT_FILE)
}

pub fn system_config_path() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILENAME)
}

/// `~/.stylist/config.yml`, or `None` when no home directory can be found.
pub fn user_config_path() -> Option<PathBuf> {
    home::home_dir().map(|h| h.join(STYLIST_DIR).join(CONFIG_FILENAME))
}

pub fn terraform_dir(root: &Path) -> PathBuf {
    root.join(TERRAFORM_DIR)
}

pub fn tfvars_path(root: &Path, profile: &str) -> PathBuf {
    terraform_dir(root).join(format!("env.{profile}.tfvars"))
}

pub fn parameters_path(root: &Path, stage: &str) -> PathBuf {
    root.join(PARAMETERS_DIR).join(format!("{stage}.json"))
}

pub fn dockerfile_path(root: &Path) -> PathBuf {
    root.join(DOCKERFILE)
}

/// A project is initialised once its `.stylist/` directory exists.
pub fn is_initialised(root: &Path) -> bool {
    stylist_dir(root).is_dir()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn tfvars_path_is_per_profile() {
        let root = Path::new("/work");
        assert_eq!(
            tfvars_path(root, "prod"),
            PathBuf::from("/work/terraform/env.prod.tfvars")
        );
    }

    #[test]
    fn initialised_tracks_stylist_dir() {
        let dir = TempDir::new().unwrap();
        assert!(!is_initialised(dir.path()));
        std::fs::create_dir_all(stylist_dir(dir.path())).unwrap();
        assert!(is_initialised(dir.path()));
    }
}
