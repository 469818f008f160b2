//! Docker image builds for the project's Dockerfiles.

use crate::error::{Result, StylistError};
use crate::paths;
use crate::runner::{run_checked, CommandRunner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const DEFAULT_BASE_IMAGE: &str = "python:3-stretch";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DockerOptions {
    #[serde(default)]
    pub base_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DockerImage {
    pub name: String,
    pub dockerfile: PathBuf,
}

pub fn dockerfile_template(base_image: &str) -> String {
    format!(
        "FROM {base_image}\n\
         \n\
         WORKDIR /app\n\
         COPY . /app\n\
         \n\
         RUN if [ -f requirements.txt ]; then pip install -r requirements.txt; fi\n\
         \n\
         CMD [\"python\", \"-m\", \"app\"]\n"
    )
}

pub struct DockerService {
    root: PathBuf,
    project_name: String,
    repository: Option<String>,
    runner: Rc<dyn CommandRunner>,
}

impl DockerService {
    pub fn new(
        root: &Path,
        project_name: &str,
        repository: Option<&str>,
        runner: Rc<dyn CommandRunner>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            project_name: project_name.to_string(),
            repository: repository.map(|r| r.trim_end_matches('/').to_string()),
            runner,
        }
    }

    /// Registry images are pushed to, if one is configured.
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// `Dockerfile` maps to the project name, `Dockerfile.<variant>` to
    /// `<project>-<variant>`. Sorted by image name.
    pub fn list_images(&self) -> Result<Vec<DockerImage>> {
        let mut images = Vec::new();
        if !self.root.is_dir() {
            return Ok(images);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(rest) = file_name.strip_prefix(paths::DOCKERFILE) else {
                continue;
            };
            if !entry.file_type()?.is_file() {
                continue;
            }
            let variant = rest.trim_matches(|c| c == '.' || c == '-');
            let name = if variant.is_empty() {
                self.project_name.clone()
            } else {
                format!("{}-{variant}", self.project_name)
            };
            images.push(DockerImage {
                name,
                dockerfile: entry.path(),
            });
        }
        images.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(images)
    }

    fn find_image(&self, image: Option<&str>) -> Result<DockerImage> {
        let wanted = image.unwrap_or(&self.project_name);
        let images = self.list_images()?;
        images
            .iter()
            .find(|i| i.name == wanted)
            .cloned()
            .ok_or_else(|| StylistError::UnknownImage {
                name: wanted.to_string(),
                available: images
                    .iter()
                    .map(|i| i.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Build `image` (the project's main image when `None`) tagged
    /// `<name>:latest`, and `<name>:<tag>` when a tag is given. Returns the
    /// most specific tag.
    pub fn build(
        &self,
        image: Option<&str>,
        build_args: &BTreeMap<String, String>,
        tag: Option<&str>,
    ) -> Result<String> {
        let found = self.find_image(image)?;

        let latest = format!("{}:latest", found.name);
        let mut argv = vec![
            "docker".to_string(),
            "build".to_string(),
            "-f".to_string(),
            found.dockerfile.display().to_string(),
            "-t".to_string(),
            latest.clone(),
        ];
        let tag = match tag.filter(|t| *t != "latest") {
            Some(t) => {
                let tagged = format!("{}:{t}", found.name);
                argv.push("-t".to_string());
                argv.push(tagged.clone());
                tagged
            }
            None => latest,
        };
        for (k, v) in build_args {
            argv.push("--build-arg".to_string());
            argv.push(format!("{k}={v}"));
        }
        argv.push(self.root.display().to_string());

        run_checked(self.runner.as_ref(), &argv, &self.root, &BTreeMap::new())?;
        Ok(tag)
    }

    /// Tag the local `<name>:<tag>` for the configured registry and push it.
    /// Returns the pushed reference.
    pub fn push(&self, image: Option<&str>, tag: &str) -> Result<String> {
        let repository = self.repository.as_deref().ok_or_else(|| {
            StylistError::InvalidSettings(
                "stylist.providers.docker.repository is not set".to_string(),
            )
        })?;
        let found = self.find_image(image)?;
        let local = format!("{}:{tag}", found.name);
        let remote = format!("{repository}/{local}");

        for argv in [
            vec!["docker".to_string(), "tag".to_string(), local, remote.clone()],
            vec!["docker".to_string(), "push".to_string(), remote.clone()],
        ] {
            run_checked(self.runner.as_ref(), &argv, &self.root, &BTreeMap::new())?;
        }
        tracing::info!(image = %remote, "pushed image");
        Ok(remote)
    }
}
