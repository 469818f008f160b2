use crate::output::{print_json, print_table};
use serde::Serialize;

const TOOLS: &[&str] = &[
    "aws",
    "terraform",
    "docker",
    "git",
    "yoyo-migrate",
    "serverless",
];

#[derive(Serialize)]
struct ToolStatus {
    tool: &'static str,
    path: Option<String>,
}

pub fn run(json: bool) -> anyhow::Result<()> {
    let statuses: Vec<ToolStatus> = TOOLS
        .iter()
        .map(|&tool| ToolStatus {
            tool,
            path: which::which(tool).ok().map(|p| p.display().to_string()),
        })
        .collect();

    if json {
        print_json(&statuses)?;
    } else {
        let rows = statuses
            .iter()
            .map(|s| {
                vec![
                    s.tool.to_string(),
                    if s.path.is_some() { "ok" } else { "missing" }.to_string(),
                    s.path.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["TOOL", "STATUS", "PATH"], rows);
    }

    let missing: Vec<&str> = statuses
        .iter()
        .filter(|s| s.path.is_none())
        .map(|s| s.tool)
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("missing tools: {}", missing.join(", "));
    }
    Ok(())
}
