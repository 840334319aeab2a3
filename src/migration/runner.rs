use super::plan::MigrationTable;
use super::steps::wallet_migrations;
use super::transaction::UpgradeTransaction;
use crate::connection::config::DEFAULT_CHECKPOINT_THRESHOLD;
use crate::connection::{StoreConfig, StoreConnection};
use crate::core::{DbError, Result, SchemaVersion};
use crate::middleware::MiddlewareChain;
use crate::schema::{SchemaHistory, wallet_schema_history};
use crate::storage::{StorageEngine, StoreImage};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// What `initialize` did to bring the store to its target version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// Version found before opening; `None` for a fresh store
    pub installed_version: Option<SchemaVersion>,
    pub target_version: SchemaVersion,
    /// Intermediate versions the store was reopened at, in order
    pub opened_versions: Vec<SchemaVersion>,
    /// Versions whose data step ran, in order
    pub executed_steps: Vec<SchemaVersion>,
}

impl InitReport {
    pub fn is_fresh(&self) -> bool {
        self.installed_version.is_none()
    }

    pub fn upgraded(&self) -> bool {
        !self.opened_versions.is_empty()
    }
}

/// An initialized store and the report of how it got there.
pub struct ReadyStore {
    pub connection: StoreConnection,
    pub report: InitReport,
}

/// Installed and target version of a store, without opening it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub name: String,
    pub installed_version: Option<SchemaVersion>,
    pub target_version: SchemaVersion,
    /// `(version, description)` of every step the next `initialize` would run
    pub pending_steps: Vec<(SchemaVersion, String)>,
}

impl MigrationStatus {
    pub fn is_current(&self) -> bool {
        self.installed_version == Some(self.target_version)
    }
}

/// Opens a named store at the target version, upgrading it step by step.
pub struct MigrationRunner {
    engine: Arc<dyn StorageEngine>,
    name: String,
    history: SchemaHistory,
    migrations: MigrationTable,
    middleware: MiddlewareChain,
    checkpoint_threshold: usize,
}

impl MigrationRunner {
    /// A runner with no declared tables and no steps, targeting version 1.
    pub fn new(engine: Arc<dyn StorageEngine>, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
            history: SchemaHistory::new(),
            migrations: MigrationTable::new(1),
            middleware: MiddlewareChain::new(),
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
        }
    }

    /// The wallet store: its schema history, its steps and the middleware
    /// implied by `config`.
    pub fn for_wallet(engine: Arc<dyn StorageEngine>, config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(engine, config.name.clone())
            .with_schema_history(wallet_schema_history())
            .with_migrations(wallet_migrations()?)
            .with_middleware(config.middleware())
            .with_checkpoint_threshold(config.checkpoint_threshold))
    }

    pub fn with_schema_history(mut self, history: SchemaHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_migrations(mut self, migrations: MigrationTable) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn with_middleware(mut self, middleware: MiddlewareChain) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn with_checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_version(&self) -> SchemaVersion {
        self.migrations.target_version()
    }

    pub fn migrations(&self) -> &MigrationTable {
        &self.migrations
    }

    /// Reports what `initialize` would do, without writing anything.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let target = self.target_version();
        let installed = self.engine.installed_version(&self.name).await?;
        let pending_steps = match installed {
            Some(from) => self
                .migrations
                .steps_between(from, target)
                .into_iter()
                .map(|step| (step.version, step.description.clone()))
                .collect(),
            None => Vec::new(),
        };
        Ok(MigrationStatus {
            name: self.name.clone(),
            installed_version: installed,
            target_version: target,
            pending_steps,
        })
    }

    /// Brings the store to the target version and returns an open connection.
    ///
    /// A fresh store is created directly at the target version. An older one
    /// is reopened at every intermediate version, running the step registered
    /// for it; each version is committed before the next begins. A store
    /// newer than the target is rejected without being touched.
    pub async fn initialize(self) -> Result<ReadyStore> {
        let target = self.target_version();
        let span = info_span!("migration.initialize", database = %self.name, target_version = target);
        let result = self.initialize_inner(target).instrument(span.clone()).await;
        if let Err(err) = &result {
            span.in_scope(|| event!(Level::ERROR, error = %err, "store initialization failed"));
        }
        result
    }

    async fn initialize_inner(self, target: SchemaVersion) -> Result<ReadyStore> {
        self.migrations.validate()?;
        self.history.validate(target)?;

        let installed = self.engine.installed_version(&self.name).await?;
        event!(Level::INFO, installed = ?installed, "detected installed version");

        let mut report = InitReport {
            installed_version: installed,
            target_version: target,
            opened_versions: Vec::new(),
            executed_steps: Vec::new(),
        };

        let image = match installed {
            Some(installed) if installed > target => {
                return Err(DbError::VersionRegression { installed, target });
            }
            None => self.create(target).await?,
            Some(installed) if installed == target => self.open_current(target).await?,
            Some(installed) => self.upgrade(installed, target, &mut report).await?,
        };

        event!(
            Level::INFO,
            version = image.version(),
            steps = report.executed_steps.len(),
            "store ready"
        );
        let connection = StoreConnection::new(self.engine, image, self.middleware, self.checkpoint_threshold);
        Ok(ReadyStore { connection, report })
    }

    async fn create(&self, target: SchemaVersion) -> Result<StoreImage> {
        let image = self
            .history
            .schema_at(target)
            .and_then(|schema| StoreImage::create(&self.name, target, &schema))
            .map_err(|e| DbError::store_open(target, e))?;
        self.engine
            .commit_version(&image)
            .await
            .map_err(|e| DbError::store_open(target, e))?;
        event!(Level::INFO, tables = image.table_names().len(), "created store");
        Ok(image)
    }

    async fn open_current(&self, target: SchemaVersion) -> Result<StoreImage> {
        let mut image = self.load(target).await?;
        // Declarations may change without a version bump during development.
        let schema = self
            .history
            .schema_at(target)
            .map_err(|e| DbError::store_open(target, e))?;
        image
            .apply_schema(&schema)
            .map_err(|e| DbError::store_open(target, e))?;
        Ok(image)
    }

    async fn load(&self, version: SchemaVersion) -> Result<StoreImage> {
        self.engine
            .load(&self.name)
            .await
            .map_err(|e| DbError::store_open(version, e))?
            .ok_or_else(|| {
                DbError::store_open(
                    version,
                    DbError::ExecutionError(format!("No committed image for '{}'", self.name)),
                )
            })
    }

    async fn upgrade(
        &self,
        from: SchemaVersion,
        target: SchemaVersion,
        report: &mut InitReport,
    ) -> Result<StoreImage> {
        let mut image = self.load(from).await?;
        if image.version() != from {
            return Err(DbError::store_open(
                from,
                DbError::ExecutionError(format!(
                    "Catalog reports version {} but the committed image is at {}",
                    from,
                    image.version()
                )),
            ));
        }

        event!(Level::INFO, from, target_version = target, "upgrading store");
        for next in from + 1..=target {
            let span = info_span!("migration.upgrade", version = next);
            self.upgrade_one(&mut image, next, report).instrument(span).await?;
        }
        Ok(image)
    }

    /// Stages version `next` on a copy of `image` and commits it. On failure
    /// `image` still holds the last committed version.
    async fn upgrade_one(&self, image: &mut StoreImage, next: SchemaVersion, report: &mut InitReport) -> Result<()> {
        let mut staged = image.clone();

        let schema = self
            .history
            .schema_at(next)
            .map_err(|e| DbError::store_open(next, e))?;
        staged
            .apply_schema(&schema)
            .map_err(|e| DbError::store_open(next, e))?;
        report.opened_versions.push(next);

        if let Some(step) = self.migrations.step(next) {
            event!(Level::INFO, step = %step.description, "running migration step");
            let mut tx = UpgradeTransaction::new(&mut staged, &self.middleware, next);
            step.apply(&mut tx)
                .map_err(|e| DbError::step_execution(next, e))?;
            event!(Level::DEBUG, writes = tx.writes(), "migration step finished");
            report.executed_steps.push(next);
        }

        staged.set_version(next);
        self.engine
            .commit_version(&staged)
            .await
            .map_err(|e| DbError::store_open(next, e))?;
        event!(Level::INFO, "committed version");

        *image = staged;
        Ok(())
    }
}
