use std::fmt;

use hyper::StatusCode;
use serde_json::json;
use tracing::debug;

use crate::identity;

#[derive(Debug, PartialEq)]
pub enum Error {
    Initialization(String),
    Execution(String),
    Internal(String),
    Identity(identity::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Initialization(err) | Error::Execution(err) => write!(f, "{err}"),
            Error::Internal(err) => write!(f, "Internal Server Error: {err}"),
            Error::Identity(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<identity::Error> for Error {
    fn from(error: identity::Error) -> Self {
        Error::Identity(error)
    }
}

impl From<prometheus::Error> for Error {
    fn from(error: prometheus::Error) -> Self {
        debug!("Metrics error: {error}");
        Error::Internal(format!("Unable to gather metrics: {error}"))
    }
}

impl From<hyper::http::Error> for Error {
    fn from(error: hyper::http::Error) -> Self {
        debug!("Response build error: {error}");
        Error::Internal(format!("Unable to build response: {error}"))
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Initialization(_) | Error::Execution(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::Identity(error) => error.status_code(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Error::Initialization(_) | Error::Execution(_) | Error::Internal(_) => "internal",
            Error::Identity(error) => error.kind(),
        }
    }

    pub fn as_json(&self, request_id: Option<&String>) -> serde_json::Value {
        let message = self.to_string();

        if let Some(request_id) = request_id {
            json!({
                "error": self.kind(),
                "message": message,
                "request_id": request_id,
            })
        } else {
            json!({
                "error": self.kind(),
                "message": message,
            })
        }
    }
}
