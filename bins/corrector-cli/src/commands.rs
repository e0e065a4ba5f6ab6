// CLI commands: local grading and block-program inspection
use anyhow::{bail, Context, Result};
use corrector_common::blocks::BlockProgram;
use corrector_common::types::{Exercise, Submission};
use corrector_engine::blocks::{compiler, xml};
use corrector_engine::GraderConfig;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<GraderConfig> {
    match path {
        Some(path) => GraderConfig::load(path)?.apply_env(),
        None => GraderConfig::load_default(),
    }
}

/// Load a block program from Blockly XML (`.xml`) or JSON.
pub fn load_program(path: &Path) -> Result<BlockProgram> {
    let is_xml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false);
    if !is_xml {
        return read_json(path);
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    xml::parse_program(&content).with_context(|| format!("Failed to import {}", path.display()))
}

/// Grade and print the outcome. Returns whether the submission passed.
pub async fn grade_submission(
    exercise_path: &Path,
    submission_path: &Path,
    config_path: Option<&Path>,
    pretty: bool,
) -> Result<bool> {
    let config = load_config(config_path)?;
    let exercise: Exercise = read_json(exercise_path)?;
    let submission: Submission = read_json(submission_path)?;

    let outcome = corrector_engine::grade(&exercise, &submission, &config).await;

    let rendered = if pretty {
        serde_json::to_string_pretty(&outcome)?
    } else {
        serde_json::to_string(&outcome)?
    };
    println!("{}", rendered);

    Ok(outcome.passed())
}

pub fn compile_program(path: &Path) -> Result<()> {
    let program = load_program(path)?;
    if program.is_empty() {
        bail!("{} contains no blocks", path.display());
    }
    let compiled = compiler::compile(&program)
        .with_context(|| format!("Failed to compile {}", path.display()))?;
    print!("{}", compiled.source);
    Ok(())
}
