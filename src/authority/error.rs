use hyper::StatusCode;
use std::fmt;
use tracing::debug;

#[derive(Debug)]
pub enum Error {
    Configuration(String),
    Transport(String),
    Status(StatusCode),
    Decode(String),
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(s) => write!(f, "authority client configuration error: {s}"),
            Error::Transport(s) => write!(f, "authority request failed: {s}"),
            Error::Status(status) => write!(f, "authority answered with HTTP {status}"),
            Error::Decode(s) => write!(f, "cannot decode authority response: {s}"),
            Error::Timeout => write!(f, "authority request timed out"),
        }
    }
}

impl std::error::Error for Error {}

impl From<hyper::http::Error> for Error {
    fn from(error: hyper::http::Error) -> Self {
        debug!("Hyper HTTP error: {:?}", error);
        Error::Transport(error.to_string())
    }
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Self {
        debug!("Hyper error: {:?}", error);
        Error::Transport(error.to_string())
    }
}

impl From<hyper_util::client::legacy::Error> for Error {
    fn from(error: hyper_util::client::legacy::Error) -> Self {
        debug!("HTTP client error: {:?}", error);
        Error::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        debug!("Serde JSON error: {:?}", error);
        Error::Decode(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Configuration(error.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(error: rustls::Error) -> Self {
        Error::Configuration(format!("TLS error: {error}"))
    }
}

impl From<rustls_pki_types::pem::Error> for Error {
    fn from(error: rustls_pki_types::pem::Error) -> Self {
        Error::Configuration(format!("PEM error: {error}"))
    }
}
