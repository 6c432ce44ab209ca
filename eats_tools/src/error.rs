use thiserror::Error;

#[derive(Debug, Error)]
pub enum EatsApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl EatsApiError {
    /// A transient failure is worth retrying with backoff. Client-side errors (4xx) are permanent and must be
    /// surfaced to the caller instead.
    pub fn is_transient(&self) -> bool {
        match self {
            EatsApiError::QueryError { status, .. } => *status >= 500,
            EatsApiError::RestResponseError(_) | EatsApiError::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(EatsApiError::QueryError { status: 503, message: "unavailable".into() }.is_transient());
        assert!(EatsApiError::Timeout("10s elapsed".into()).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!EatsApiError::QueryError { status: 401, message: "bad credentials".into() }.is_transient());
        assert!(!EatsApiError::JsonError("eof".into()).is_transient());
    }
}
