use crate::authority;
use hyper::StatusCode;
use std::fmt;
use tracing::debug;

/// What an impersonation request tried to override.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpersonationKind {
    User,
    Group,
}

impl fmt::Display for ImpersonationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpersonationKind::User => write!(f, "user"),
            ImpersonationKind::Group => write!(f, "group"),
        }
    }
}

/// Reasons an identity resolution fails.
///
/// Every variant is terminal for the request it was raised for: the resolver never returns an
/// identity together with an error.
#[derive(Debug, PartialEq)]
pub enum Error {
    NoCredentials,
    MissingPeerCertificate,
    MalformedCertificate(String),
    MissingUsernameClaim(String),
    MissingGroupsClaim,
    ClaimTypeError { claim: String },
    TokenRejected(String),
    TokenReviewFailed(String),
    TokenReviewDenied(String),
    EmptyUsername,
    InvalidImpersonationHeader(String),
    ImpersonationDenied {
        kind: ImpersonationKind,
        actor: String,
        target: String,
    },
    BackendUnavailable(String),
    Cancelled,
    DeadlineExceeded,
}

impl Error {
    /// Stable machine-readable name, used in response bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoCredentials => "no_credentials",
            Error::MissingPeerCertificate => "missing_peer_certificate",
            Error::MalformedCertificate(_) => "malformed_certificate",
            Error::MissingUsernameClaim(_) => "missing_username_claim",
            Error::MissingGroupsClaim => "missing_groups_claim",
            Error::ClaimTypeError { .. } => "claim_type_error",
            Error::TokenRejected(_) => "token_rejected",
            Error::TokenReviewFailed(_) => "token_review_failed",
            Error::TokenReviewDenied(_) => "token_review_denied",
            Error::EmptyUsername => "empty_username",
            Error::InvalidImpersonationHeader(_) => "invalid_impersonation_header",
            Error::ImpersonationDenied { .. } => "impersonation_denied",
            Error::BackendUnavailable(_) => "backend_unavailable",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded => "deadline_exceeded",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NoCredentials
            | Error::MissingPeerCertificate
            | Error::MalformedCertificate(_)
            | Error::MissingUsernameClaim(_)
            | Error::MissingGroupsClaim
            | Error::ClaimTypeError { .. }
            | Error::TokenRejected(_)
            | Error::TokenReviewDenied(_)
            | Error::EmptyUsername => StatusCode::UNAUTHORIZED,
            Error::InvalidImpersonationHeader(_) => StatusCode::BAD_REQUEST,
            Error::ImpersonationDenied { .. } => StatusCode::FORBIDDEN,
            Error::TokenReviewFailed(_) | Error::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoCredentials => write!(f, "unauthenticated requests are not supported"),
            Error::MissingPeerCertificate => write!(f, "no provided peer certificates"),
            Error::MalformedCertificate(s) => write!(f, "malformed client certificate: {s}"),
            Error::MissingUsernameClaim(claim) => {
                write!(f, "missing or invalid username claim '{claim}' in token")
            }
            Error::MissingGroupsClaim => write!(f, "missing groups claim in token"),
            Error::ClaimTypeError { claim } => write!(f, "unexpected type for claim '{claim}'"),
            Error::TokenRejected(s) => write!(f, "token rejected: {s}"),
            Error::TokenReviewFailed(s) => write!(f, "cannot create token review: {s}"),
            Error::TokenReviewDenied(s) => write!(f, "cannot verify the token: {s}"),
            Error::EmptyUsername => write!(f, "credentials resolved to an empty username"),
            Error::InvalidImpersonationHeader(s) => {
                write!(f, "invalid impersonation header: {s}")
            }
            Error::ImpersonationDenied {
                kind,
                actor,
                target,
            } => write!(
                f,
                "the current user {actor} cannot impersonate the {kind} {target}"
            ),
            Error::BackendUnavailable(s) => write!(f, "access review unavailable: {s}"),
            Error::Cancelled => write!(f, "request cancelled"),
            Error::DeadlineExceeded => write!(f, "request deadline exceeded"),
        }
    }
}

impl std::error::Error for Error {}

impl From<authority::Error> for Error {
    fn from(error: authority::Error) -> Self {
        debug!("Access review error: {error}");
        Error::BackendUnavailable(error.to_string())
    }
}
