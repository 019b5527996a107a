use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_executor::Observation;
use action_flow::save_workflow;
use anyhow::{bail, Context, Result};
use clap::Args;
use pattern_detector::{ObservationLog, PatternCandidate, PatternDetector};
use tracing::info;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct DetectArgs {
    /// Recorded observations, one JSON object per line
    pub file: PathBuf,

    /// Promote the longest candidate into a workflow
    #[arg(long)]
    pub promote: bool,

    /// Name of the promoted workflow
    #[arg(long, default_value = "detected-workflow")]
    pub name: String,

    /// Write the promoted workflow here (.json/.yaml) instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

pub async fn cmd_detect(args: DetectArgs, ctx: &CliContext) -> Result<()> {
    let observations = read_observations(&args.file)?;
    let config = ctx.config().detector.clone();
    let log = Arc::new(ObservationLog::new(config.window_size));
    let detector = PatternDetector::new(config, log.clone())?;

    for observation in observations {
        log.append(observation);
        for candidate in detector.scan() {
            print_candidate(&candidate);
        }
    }

    let candidates = detector.candidates();
    info!(candidates = candidates.len(), "Detection finished");
    if candidates.is_empty() {
        println!("No repeated patterns found");
    }
    if !args.promote {
        return Ok(());
    }

    let Some(longest) = candidates.first() else {
        bail!("nothing to promote");
    };
    let promoted = detector.confirm(&longest.sequence, &args.name)?;
    match &args.out {
        Some(path) => {
            save_workflow(&promoted.workflow, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved workflow '{}' to {}", promoted.workflow.name, path.display());
        }
        None => println!("{}", serde_yaml::to_string(&promoted.workflow)?),
    }

    let mut names: Vec<_> = promoted.bindings.iter().collect();
    names.sort();
    println!("Sample bindings (latest occurrence):");
    for (name, value) in names {
        println!("  {} = {}", name, value);
    }
    Ok(())
}

fn read_observations(path: &Path) -> Result<Vec<Observation>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid observation", path.display(), index + 1))
        })
        .collect()
}

fn print_candidate(candidate: &PatternCandidate) {
    println!(
        "Pattern ({} actions, seen {}x): {}",
        candidate.len(),
        candidate.occurrence_count,
        candidate.describe()
    );
}
