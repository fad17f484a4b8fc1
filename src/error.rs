use thiserror::Error;

/// Failures raised by the backend adapters.
///
/// Read operations never surface these to callers: the router logs them and
/// substitutes an empty contribution for the affected group. Deletion treats
/// any error as overall failure. "No data" is never an error anywhere; it is
/// a missing map entry, a `None`, or an empty list.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("configuration: {0}")]
    Config(String),
    #[error("relational query failed: {0}")]
    Sql(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected document response: {0}")]
    Response(String),
}
