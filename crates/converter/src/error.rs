/// Errors from the converter client.
#[derive(Debug, thiserror::Error)]
pub enum ConverterError {
    /// The converter rejected the submission or could not be reached.
    /// `status` is `None` when no HTTP response was received.
    #[error("{message}")]
    Delegation { status: Option<u16>, message: String },

    /// A status poll failed in a way that may succeed on a later attempt.
    #[error("Status poll failed: {0}")]
    TransientPoll(String),

    /// The artifact download failed.
    #[error("Download failed: {message}")]
    Download { status: Option<u16>, message: String },
}

impl ConverterError {
    /// Upstream HTTP status, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConverterError::Delegation { status, .. } | ConverterError::Download { status, .. } => {
                *status
            }
            ConverterError::TransientPoll(_) => None,
        }
    }
}
