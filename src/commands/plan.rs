use anyhow::Result;
use console::style;
use serde::Serialize;
use std::path::Path;

use pgfixture::config::{Config, DatabaseDefinition};
use pgfixture::resources::{DirectoryStore, ResourceStore, discover_scripts};
use pgfixture::selector::{select_scripts, unresolved_inclusions};

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq)]
pub enum PlanFormat {
    #[default]
    Text,
    Json,
}

/// The deployment sequence a fixture would apply
#[derive(Debug, Serialize)]
pub struct DeploymentPlan {
    pub namespace: String,
    pub discovered: usize,
    pub scripts: Vec<PlannedScript>,
    pub unresolved: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlannedScript {
    pub name: String,
    pub source: String,
    pub lines: usize,
}

pub fn build_plan(store: &dyn ResourceStore, definition: &DatabaseDefinition) -> Result<DeploymentPlan> {
    let scripts = discover_scripts(store, &definition.resource_namespace);
    let inclusions = definition.ordered_resources.as_slice();
    let ordered = select_scripts(&scripts, inclusions, definition.selection_policy())?;

    Ok(DeploymentPlan {
        namespace: definition.resource_namespace.clone(),
        discovered: scripts.len(),
        scripts: ordered
            .iter()
            .map(|script| PlannedScript {
                name: script.name().to_string(),
                source: script.source_name().to_string(),
                lines: script.content().lines().count(),
            })
            .collect(),
        unresolved: unresolved_inclusions(&scripts, inclusions),
    })
}

pub fn render_plan_text(plan: &DeploymentPlan) -> String {
    let mut out = format!(
        "{} {} ({} of {} discovered scripts)\n",
        style("Deployment plan for").bold(),
        style(&plan.namespace).bold(),
        plan.scripts.len(),
        plan.discovered
    );

    if plan.scripts.is_empty() {
        out.push_str("  (nothing to deploy)\n");
    }
    for script in &plan.scripts {
        out.push_str(&format!(
            "  {} {}\n",
            script.name,
            style(format!("[{} lines]", script.lines)).dim()
        ));
    }

    if !plan.unresolved.is_empty() {
        out.push_str(&format!("\n{}\n", style("Unresolved inclusions:").yellow()));
        for name in &plan.unresolved {
            out.push_str(&format!("  {}\n", name));
        }
    }

    out
}

pub fn cmd_plan(config: &Config, root_dir: &Path, format: PlanFormat) -> Result<()> {
    let store = DirectoryStore::new(root_dir.join(&config.resource_dir));
    let plan = build_plan(&store, &config.definition)?;

    match format {
        PlanFormat::Text => print!("{}", render_plan_text(&plan)),
        PlanFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
    }

    Ok(())
}
