use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error(
        "Installed schema version {installed} is newer than target version {target}; refusing to open"
    )]
    VersionRegression { installed: u32, target: u32 },

    #[error("Failed to open store at version {version}: {source}")]
    StoreOpen {
        version: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("Migration step for version {version} failed: {source}")]
    StepExecution {
        version: u32,
        #[source]
        source: Box<DbError>,
    },
}

impl DbError {
    pub fn store_open(version: u32, source: DbError) -> Self {
        Self::StoreOpen {
            version,
            source: Box::new(source),
        }
    }

    pub fn step_execution(version: u32, source: DbError) -> Self {
        Self::StepExecution {
            version,
            source: Box::new(source),
        }
    }

    /// True for errors that mean the store must not be used until the binary is updated.
    pub fn is_version_regression(&self) -> bool {
        matches!(self, Self::VersionRegression { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
