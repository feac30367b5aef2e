use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No data returned for {0}")]
    NoData(String),

    #[error("Stop loss cannot be equal to entry price")]
    InvalidStopLoss,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Order failed: {0}")]
    OrderFailure(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),
}

impl EngineError {
    /// Transient failures are worth one retry at the call site; everything
    /// else is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Connectivity(_))
    }
}
