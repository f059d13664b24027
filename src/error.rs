use uuid::Uuid;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The data source could not be reached or does not know the model.
    #[error("Data access error for model {model_id}: {message}")]
    DataAccess {
        model_id: String,
        message: String,
    },

    /// A request could not be resolved against the model schema.
    #[error("Reconciliation error for model {model_id}: {message}")]
    Reconciliation {
        model_id: String,
        message: String,
    },

    #[error("No calculator found for metric {metric_name}")]
    CalculatorNotFound {
        metric_name: String,
    },

    /// Wrong accessor used on a metric value carrier.
    #[error("Invalid access: {0}")]
    InvalidAccess(String),

    #[error("Calculation of {metric_name} for request {request_id} failed: {message}")]
    Calculation {
        metric_name: String,
        request_id: Uuid,
        message: String,
    },

    #[error("Registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("Configuration error for {parameter}: {message}")]
    Configuration {
        message: String,
        parameter: String,
    },
}

impl SchedulerError {
    pub(crate) fn data_access(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulerError::DataAccess {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    pub(crate) fn reconciliation(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        SchedulerError::Reconciliation {
            model_id: model_id.into(),
            message: message.into(),
        }
    }
}

/// Extension trait for error classification
pub(crate) trait ErrorExt {
    fn is_recoverable(&self) -> bool;
}

impl ErrorExt for SchedulerError {
    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SchedulerError::DataAccess { .. }
                | SchedulerError::CalculatorNotFound { .. }
                | SchedulerError::Calculation { .. }
        )
    }
}
