//! Error types for the WCS client.

use reqwest::StatusCode;
use thiserror::Error;

use crate::util::{redact_url, retriable_status};
use crate::xml::parse_exception_report;

/// Everything that can go wrong while talking to the service or reshaping its data.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or rejected credentials, or a malformed token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Unreadable or incomplete local configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no WCS service matches dataset={dataset}, area={area}, accuracy={accuracy}")]
    NoMatchingService {
        dataset: String,
        area: String,
        accuracy: String,
    },

    #[error("several WCS services match dataset={dataset}, area={area}: specify one of accuracies {candidates}")]
    AmbiguousService {
        dataset: String,
        area: String,
        candidates: String,
    },

    /// Title or run time not present in the capabilities table.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    /// A point or bounding box falls outside the model domain.
    #[error("outside the model domain: {0}")]
    OutsideDomain(String),

    /// An operation was called before the session state it depends on was set.
    #[error("{0}")]
    NotReady(&'static str),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status} for url ({url}): {detail}")]
    Http {
        status: u16,
        url: String,
        detail: String,
    },

    /// The service answered with an OWS `ExceptionReport`.
    #[error("service exception {code}: {text}")]
    ServiceException { code: String, text: String },

    /// The document parsed but lacks the expected elements (not populated yet).
    #[error("incomplete document: {0}")]
    IncompleteDocument(String),

    #[error("XML parse error: {0}")]
    Xml(String),

    /// The delivered payload is not a single-band georeferenced raster.
    #[error("invalid raster: {0}")]
    Raster(String),

    #[error("{what}: giving up after {trials} trial(s): {last}")]
    RetriesExhausted {
        what: String,
        trials: usize,
        #[source]
        last: Box<Error>,
    },

    #[error("no run time of '{title}' covers the next {horizon} hour(s)")]
    HorizonUnavailable { title: String, horizon: usize },

    #[error("raster for {time} has {found}, expected {expected}")]
    ShapeMismatch {
        time: String,
        expected: String,
        found: String,
    },

    #[error("no raster could be fetched for the requested times")]
    EmptyGrid,

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Whether another trial of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::IncompleteDocument(_) | Error::Raster(_) => true,
            Error::Http { status, .. } => retriable_status(*status),
            _ => false,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl From<tiff::TiffError> for Error {
    fn from(err: tiff::TiffError) -> Self {
        Self::Raster(err.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maps a non-success HTTP answer to an error with remediation hints.
pub(crate) fn status_error(status: StatusCode, url: &str, body: &str) -> Error {
    let url = redact_url(url);
    let detail = match parse_exception_report(body) {
        Some((code, text)) => format!("{}: {}", code, text),
        None => body.trim().chars().take(300).collect(),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Error::Authentication(format!(
            "HTTP {} for url ({}).\n- Check the username/password in your credentials file\n- Tokens expire: fetch a new one instead of reusing an old `METEOFR_TOKEN`\n\nServer message: {}",
            status.as_u16(),
            url,
            detail
        ));
    }

    if status == StatusCode::NOT_FOUND {
        return Error::Http {
            status: status.as_u16(),
            url,
            detail: format!(
                "endpoint not found; the product may have been retired or the coverage id is stale (call update()). Server message: {}",
                detail
            ),
        };
    }

    Error::Http {
        status: status.as_u16(),
        url,
        detail,
    }
}
