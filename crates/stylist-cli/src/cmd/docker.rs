use crate::output::{parse_kv, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stylist_core::container::Docker;
use stylist_core::Project;

#[derive(Subcommand)]
pub enum DockerSubcommand {
    /// List the images defined by Dockerfile and Dockerfile.<variant>
    List,

    /// Build an image tagged <image>:latest
    Build {
        /// Image name (default: the project's main image)
        image: Option<String>,
        /// Build argument, KEY=VALUE (repeatable)
        #[arg(long = "build-arg", value_parser = parse_kv)]
        build_args: Vec<(String, String)>,
        /// Extra tag applied next to `latest`
        #[arg(long)]
        tag: Option<String>,
    },

    /// Push a built image to stylist.providers.docker.repository
    Push {
        /// Image name (default: the project's main image)
        image: Option<String>,
        #[arg(long, default_value = "latest")]
        tag: String,
    },
}

pub fn run(project: &Project, subcmd: DockerSubcommand, json: bool) -> anyhow::Result<()> {
    let docker = project.container().get::<Docker>()?;
    match subcmd {
        DockerSubcommand::List => {
            let images = docker.list_images()?;
            if json {
                return print_json(&images);
            }
            let rows = images
                .into_iter()
                .map(|i| vec![i.name, i.dockerfile.display().to_string()])
                .collect();
            print_table(&["IMAGE", "DOCKERFILE"], rows);
            Ok(())
        }
        DockerSubcommand::Build {
            image,
            build_args,
            tag,
        } => {
            let tag = docker
                .build(
                    image.as_deref(),
                    &build_args.into_iter().collect(),
                    tag.as_deref(),
                )
                .context("docker build failed")?;
            if json {
                print_json(&serde_json::json!({ "tag": tag, "repository": docker.repository() }))
            } else {
                println!("Built {tag}");
                Ok(())
            }
        }
        DockerSubcommand::Push { image, tag } => {
            let pushed = docker
                .push(image.as_deref(), &tag)
                .context("docker push failed")?;
            if json {
                print_json(&serde_json::json!({ "pushed": pushed }))
            } else {
                println!("Pushed {pushed}");
                Ok(())
            }
        }
    }
}
