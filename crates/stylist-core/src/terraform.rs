//! Terraform plan/apply with per-profile workspaces and variable files.

use crate::error::{Result, StylistError};
use crate::io::atomic_write;
use crate::paths;
use crate::profile::LOCAL_PROFILE;
use crate::runner::{run_checked, CommandRunner};
use crate::store::SessionProvider;
use chrono::Utc;
use hcl::{Attribute, Body, Expression};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Seconds between automatic `terraform init -upgrade` runs.
const MODULE_UPDATE_INTERVAL: i64 = 3600;

pub const PROVIDER_TEMPLATE: &str = r#"provider "aws" {
  region  = var.context["aws_region"]
  profile = var.context["aws_profile"]
}

variable "context" {
  type    = map(string)
  default = {}
}
"#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformOptions {
    /// Directory holding extra `.tf` templates copied on setup.
    #[serde(default)]
    pub templates: Option<PathBuf>,
}

/// Values injected as the `context` variable on every plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanContext {
    pub aws_account_id: String,
    pub aws_profile: String,
    pub aws_region: String,
    pub environment: String,
    pub project_name: String,
}

impl PlanContext {
    fn as_var(&self) -> String {
        format!(
            "context={{aws_account_id=\"{}\", aws_profile=\"{}\", aws_region=\"{}\", environment=\"{}\", project_name=\"{}\"}}",
            self.aws_account_id, self.aws_profile, self.aws_region, self.environment, self.project_name
        )
    }
}

fn hcl_error(err: hcl::Error) -> StylistError {
    StylistError::Terraform(format!("invalid tfvars: {err}"))
}

/// Parse a single HCL expression, e.g. `"p.db"` or `{ team = "core" }`.
fn parse_expression(text: &str) -> Result<Expression> {
    let body = hcl::parse(&format!("value = {text}\n")).map_err(hcl_error)?;
    let mut attributes = body.into_attributes();
    match (attributes.next(), attributes.next()) {
        (Some(attr), None) => Ok(attr.expr),
        _ => Err(StylistError::Terraform(format!(
            "not a single expression: {text}"
        ))),
    }
}

fn format_expression(expr: &Expression) -> Result<String> {
    hcl::format::to_string(expr).map_err(hcl_error)
}

/// Parse a tfvars file into `name -> expression text`. Values keep their
/// literal form (quotes, maps, lists) so they are written back unchanged.
pub fn parse_tfvars(content: &str) -> Result<BTreeMap<String, String>> {
    let body = hcl::parse(content).map_err(hcl_error)?;
    body.attributes()
        .map(|attr| Ok((attr.key().to_string(), format_expression(attr.expr())?)))
        .collect()
}

pub fn render_tfvars(vars: &BTreeMap<String, String>) -> Result<String> {
    let mut body = Body::builder();
    for (key, value) in vars {
        body = body.add_attribute(Attribute::new(key.as_str(), parse_expression(value)?));
    }
    hcl::format::to_string(&body.build()).map_err(hcl_error)
}

/// Quote a bare value as a string literal. Literal expressions (strings,
/// numbers, bools, lists, maps) are kept; anything else becomes a string.
pub fn to_tfvar_literal(value: &str) -> String {
    match parse_expression(value) {
        Ok(
            expr @ (Expression::Null
            | Expression::Bool(_)
            | Expression::Number(_)
            | Expression::String(_)
            | Expression::Array(_)
            | Expression::Object(_)
            | Expression::TemplateExpr(_)),
        ) => format_expression(&expr).unwrap_or_else(|_| value.to_string()),
        _ => format_expression(&Expression::String(value.to_string()))
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()).to_string()),
    }
}

/// Create `terraform/` with the provider template plus any `.tf` files
/// from `templates`. Fails if the directory exists.
pub fn setup(root: &Path, templates: Option<&Path>) -> Result<()> {
    let dir = paths::terraform_dir(root);
    if dir.exists() {
        return Err(StylistError::FeatureAlreadyEnabled("terraform".to_string()));
    }
    std::fs::create_dir_all(&dir)?;
    atomic_write(&dir.join("provider.tf"), PROVIDER_TEMPLATE.as_bytes())?;
    if let Some(templates) = templates {
        for entry in std::fs::read_dir(templates)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "tf") {
                std::fs::copy(&path, dir.join(entry.file_name()))?;
            }
        }
    }
    Ok(())
}

pub struct TerraformService {
    root: PathBuf,
    profile: String,
    project_name: String,
    sessions: Rc<dyn SessionProvider>,
    runner: Rc<dyn CommandRunner>,
}

impl TerraformService {
    pub fn new(
        root: &Path,
        profile: &str,
        project_name: &str,
        sessions: Rc<dyn SessionProvider>,
        runner: Rc<dyn CommandRunner>,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            profile: profile.to_string(),
            project_name: project_name.to_string(),
            sessions,
            runner,
        }
    }

    /// Resolve account and region for the active profile's credentials.
    pub fn plan_context(&self) -> Result<PlanContext> {
        let session = self.sessions.session(&self.profile)?;
        let aws_region = session.region().ok_or_else(|| {
            StylistError::Terraform(format!(
                "no AWS region configured for profile '{}'",
                session.profile()
            ))
        })?;
        Ok(PlanContext {
            aws_account_id: session.account_id()?,
            aws_profile: session.profile().to_string(),
            aws_region,
            environment: self.profile.clone(),
            project_name: self.project_name.clone(),
        })
    }

    pub fn terraform_dir(&self) -> PathBuf {
        paths::terraform_dir(&self.root)
    }

    pub fn vars_file(&self, profile: &str) -> PathBuf {
        paths::tfvars_path(&self.root, profile)
    }

    /// Run `terraform plan` for the active profile. With `save` the plan is
    /// written to a temp file whose path is returned.
    pub fn plan(&self, save: bool, force_update: bool) -> Result<Option<PathBuf>> {
        self.ensure_workspace()?;
        let context = self.plan_context()?;
        self.update_modules(force_update)?;
        atomic_write(
            &self.terraform_dir().join("provider.tf"),
            PROVIDER_TEMPLATE.as_bytes(),
        )?;

        let mut args = vec!["plan".to_string()];
        let vars_file = self.vars_file(&self.profile);
        if vars_file.is_file() {
            args.push("-var-file".to_string());
            args.push(vars_file.display().to_string());
        }
        args.push("-var".to_string());
        args.push(context.as_var());

        let output = if save {
            let file = tempfile::Builder::new().prefix("tf-plan.").tempfile()?;
            let (_, path) = file.keep().map_err(|e| e.error)?;
            args.push(format!("-out={}", path.display()));
            Some(path)
        } else {
            None
        };

        self.exec(&args)?;
        Ok(output)
    }

    pub fn apply(&self, plan: &Path) -> Result<()> {
        self.ensure_workspace()?;
        self.exec(&["apply".to_string(), plan.display().to_string()])
    }

    pub fn read_vars(&self, profile: &str) -> Result<BTreeMap<String, String>> {
        let path = self.vars_file(profile);
        if !path.is_file() {
            return Ok(BTreeMap::new());
        }
        parse_tfvars(&std::fs::read_to_string(path)?)
    }

    pub fn write_vars(&self, profile: &str, vars: &BTreeMap<String, String>) -> Result<()> {
        atomic_write(&self.vars_file(profile), render_tfvars(vars)?.as_bytes())
    }

    /// Variables of `source`. A missing file is an error here since there is
    /// nothing to sync from.
    pub fn source_vars(&self, source: &str) -> Result<BTreeMap<String, String>> {
        if !self.vars_file(source).is_file() {
            return Err(StylistError::Terraform(format!(
                "missing tfvars file for source profile: {source}"
            )));
        }
        self.read_vars(source)
    }

    fn ensure_workspace(&self) -> Result<()> {
        let profile = &self.profile;
        if profile == LOCAL_PROFILE {
            return Err(StylistError::Terraform(
                "terraform cannot be used with the local profile".to_string(),
            ));
        }
        let state_dir = self
            .terraform_dir()
            .join(paths::TERRAFORM_STATE_DIR)
            .join(profile);
        if !state_dir.is_dir() {
            self.exec(&["workspace".to_string(), "new".to_string(), profile.clone()])?;
        }
        self.exec(&["workspace".to_string(), "select".to_string(), profile.clone()])
    }

    fn update_modules(&self, force: bool) -> Result<()> {
        let marker = self.terraform_dir().join(paths::TERRAFORM_UPDATE_MARKER);
        let now = Utc::now().timestamp();
        let last = std::fs::read_to_string(&marker)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0);
        if force || last < now - MODULE_UPDATE_INTERVAL {
            self.exec(&["init".to_string(), "-upgrade".to_string()])?;
            atomic_write(&marker, now.to_string().as_bytes())?;
        }
        Ok(())
    }

    fn exec(&self, args: &[String]) -> Result<()> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("terraform".to_string());
        argv.extend_from_slice(args);
        run_checked(
            self.runner.as_ref(),
            &argv,
            &self.terraform_dir(),
            &BTreeMap::new(),
        )
    }
}
