use super::transaction::UpgradeTransaction;
use crate::core::{DbError, Result, SchemaVersion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A data transformation run while the store is being opened at a version.
pub type StepFn = Arc<dyn Fn(&mut UpgradeTransaction<'_>) -> Result<()> + Send + Sync>;

/// The data transformation that produces `version` from `version - 1`.
#[derive(Clone)]
pub struct MigrationStep {
    pub version: SchemaVersion,
    pub description: String,
    action: StepFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

impl MigrationStep {
    pub fn new<F>(version: SchemaVersion, description: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut UpgradeTransaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            version,
            description: description.into(),
            action: Arc::new(action),
        }
    }

    pub fn apply(&self, tx: &mut UpgradeTransaction<'_>) -> Result<()> {
        (self.action)(tx)
    }
}

/// Sparse table of migration steps up to a target version.
///
/// Versions without an entry only change structure (or nothing at all).
#[derive(Debug, Clone)]
pub struct MigrationTable {
    target_version: SchemaVersion,
    steps: BTreeMap<SchemaVersion, MigrationStep>,
}

impl MigrationTable {
    /// Creates an empty table for a target version.
    pub fn new(target_version: SchemaVersion) -> Self {
        Self {
            target_version,
            steps: BTreeMap::new(),
        }
    }

    pub fn target_version(&self) -> SchemaVersion {
        self.target_version
    }

    /// Registered steps in version order.
    pub fn steps(&self) -> impl Iterator<Item = &MigrationStep> {
        self.steps.values()
    }

    pub fn registered_versions(&self) -> Vec<SchemaVersion> {
        self.steps.keys().copied().collect()
    }

    pub fn step(&self, version: SchemaVersion) -> Option<&MigrationStep> {
        self.steps.get(&version)
    }

    /// Adds a step, rejecting out-of-range and duplicate versions.
    pub fn add_step(&mut self, step: MigrationStep) -> Result<()> {
        if step.version == 0 || step.version > self.target_version {
            return Err(DbError::ExecutionError(format!(
                "Migration step for version {} is outside 1..={}",
                step.version, self.target_version
            )));
        }
        if self.steps.contains_key(&step.version) {
            return Err(DbError::ExecutionError(format!(
                "Duplicate migration step for version {}",
                step.version
            )));
        }
        self.steps.insert(step.version, step);
        Ok(())
    }

    /// Fluent builder method to add a step.
    pub fn with_step(mut self, step: MigrationStep) -> Result<Self> {
        self.add_step(step)?;
        Ok(self)
    }

    /// Helper to register a closure as the step for `version`.
    pub fn add_fn_step<F>(
        &mut self,
        version: SchemaVersion,
        description: impl Into<String>,
        action: F,
    ) -> Result<()>
    where
        F: Fn(&mut UpgradeTransaction<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.add_step(MigrationStep::new(version, description, action))
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_version == 0 {
            return Err(DbError::ExecutionError(
                "Target schema version must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Steps that run when moving from `from` (exclusive) to `to` (inclusive).
    pub fn steps_between(&self, from: SchemaVersion, to: SchemaVersion) -> Vec<&MigrationStep> {
        if from >= to {
            return Vec::new();
        }
        self.steps.range(from + 1..=to).map(|(_, step)| step).collect()
    }
}
