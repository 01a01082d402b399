use super::{BatchCommand, Executor, ExecutorError, JobHandle};
use tracing::info;

/// Logs what would be submitted and keeps a record of it
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor {
    submitted: Vec<BatchCommand>,
}

impl DryRunExecutor {
    pub fn submitted(&self) -> &[BatchCommand] {
        &self.submitted
    }
}

impl Executor for DryRunExecutor {
    fn submit(&mut self, command: &BatchCommand) -> Result<JobHandle, ExecutorError> {
        info!("Would run: {}", command.render("sbatch"));
        self.submitted.push(command.clone());

        Ok(JobHandle::DryRun)
    }
}
