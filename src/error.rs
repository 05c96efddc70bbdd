use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Dataset '{dataset}' is missing expected columns: {missing:?}")]
    MissingColumns {
        dataset: String,
        missing: Vec<String>,
    },

    #[error("Dataset '{dataset}' is unavailable: primary failed ({primary}); secondary failed ({secondary})")]
    DataUnavailable {
        dataset: String,
        primary: String,
        secondary: String,
    },

    #[error("Source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    #[error("Dataset '{dataset}' row {row}: cannot parse column '{column}' value '{value}'")]
    StrictParse {
        dataset: String,
        row: usize,
        column: String,
        value: String,
    },

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid filter selection: {0}")]
    InvalidSelection(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DashboardError {
    /// True for failures that take down a whole dataset request (schema drift
    /// or both sources unavailable), as opposed to caller mistakes.
    pub fn is_dataset_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingColumns { .. } | Self::DataUnavailable { .. } | Self::StrictParse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DashboardError>;
