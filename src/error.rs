use thiserror::Error;

/// pginfo errors
#[derive(Error, Debug)]
pub enum InfoError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Cannot execute SQL '{statement}': {message}")]
    Query { statement: String, message: String },

    #[error("Failed to decode result of '{statement}': {message}")]
    Decode { statement: String, message: String },

    #[error("Passed input '{value}' for '{field}' is potentially dangerous")]
    InputRejected { field: String, value: String },

    #[error("Invalid filter pattern '{pattern}': {message}")]
    Filter { pattern: String, message: String },

    #[error("Failed to render report: {0}")]
    Render(String),

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
