use clap::Subcommand;

use super::config::ConfigArgs;
use super::detect::DetectArgs;
use super::workflow::WorkflowArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Manage the engine configuration
    Config(ConfigArgs),

    /// Inspect workflow documents
    Workflow(WorkflowArgs),

    /// Find repeated action sequences in recorded observations
    Detect(DetectArgs),
}
