use thiserror::Error;

/// Errors that can occur while answering a question or ingesting schemas.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding provider error: {0}")]
    Embedding(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Vector index error: {0}")]
    Index(String),

    /// Wraps an embedding or index failure that happened during retrieval.
    #[error("Schema retrieval failed: {0}")]
    Retrieval(#[source] Box<RagError>),

    /// The generated SQL broke the read-only policy. Carries every violation found.
    #[error("Generated SQL is invalid: {}", errors.join("; "))]
    PolicyViolation {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No relevant tables found for the question")]
    NoRelevantTables,

    #[error("The model response did not contain a SQL statement")]
    NoSqlGenerated { raw_output: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Wrap an error raised inside the retrieval step.
    pub fn retrieval(inner: RagError) -> Self {
        match inner {
            already @ RagError::Retrieval(_) => already,
            other => RagError::Retrieval(Box::new(other)),
        }
    }
}

impl From<lancedb::Error> for RagError {
    fn from(e: lancedb::Error) -> Self {
        RagError::Index(e.to_string())
    }
}
