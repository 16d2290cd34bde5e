//! Error classification
//!
//! Decides whether a failed transport call is worth repeating. Rules, in
//! priority order:
//!
//! 1. never accepted by the control plane → retryable
//! 2. known "not found / already deleted" code → not found
//! 3. known "rate exceeded / busy / conflict" code → retryable
//! 4. anything else → fatal
//!
//! A code matches a list entry when it is equal to the entry or when its short
//! code (the part before the first `.`) is.

use crate::transport::TransportError;
use thiserror::Error;

/// Codes that identify a target which no longer exists
pub const DEFAULT_NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "InvalidParameter.LBIdNotFound",
    "InvalidParameter.ClusterNotFound",
    "InvalidParameterValue.DealNameNotFound",
    "InternalError.ClusterNotFound",
    "FailedOperation.ClusterNotFound",
];

/// Codes for throttling, busy resources and concurrent modification
pub const DEFAULT_RETRYABLE_CODES: &[&str] = &[
    "RequestLimitExceeded",
    "ResourceInUse",
    "ResourceBusy",
    "ResourceUnavailable",
    "InvalidParameter.ActionInProgress",
    "OperationDenied.InstanceStatusLimitOpError",
];

/// Short code of errors raised by the client before the control plane saw the request
const CLIENT_ERROR: &str = "ClientError";

/// Classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Transient; repeat until the deadline
    Retryable,
    /// Permanent; surface to the caller
    Fatal,
    /// The target is gone; clear local state
    NotFound,
}

impl ErrorClass {
    /// Whether the retry controller must stop on this class
    pub const fn stops_retry(self) -> bool {
        !matches!(self, ErrorClass::Retryable)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Retryable => write!(f, "retryable"),
            ErrorClass::Fatal => write!(f, "fatal"),
            ErrorClass::NotFound => write!(f, "not found"),
        }
    }
}

/// A transport error tagged with exactly one class
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{class} error: {source}")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub source: TransportError,
}

/// Code-list based classifier
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    retryable: Vec<String>,
    not_found: Vec<String>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            retryable: DEFAULT_RETRYABLE_CODES.iter().map(|c| c.to_string()).collect(),
            not_found: DEFAULT_NOT_FOUND_CODES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl ErrorClassifier {
    /// Classifier with the default code lists
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with empty code lists; only rule 1 and rule 4 apply
    pub fn empty() -> Self {
        Self {
            retryable: Vec::new(),
            not_found: Vec::new(),
        }
    }

    /// Add codes to the retryable list
    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Add codes to the not-found list
    pub fn with_not_found_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.not_found.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Class of `err` under the configured lists
    pub fn class_of(&self, err: &TransportError) -> ErrorClass {
        self.class_with(err, &[])
    }

    /// Class of `err`, additionally treating `extra_retryable` codes as transient
    ///
    /// Extra codes never override a not-found match.
    pub fn class_with(&self, err: &TransportError, extra_retryable: &[&str]) -> ErrorClass {
        match err {
            TransportError::Network(_) => ErrorClass::Retryable,
            TransportError::Http { status, .. } if is_transient_status(*status) => {
                ErrorClass::Retryable
            }
            TransportError::Api { code, .. } => {
                if short_code(code) == CLIENT_ERROR {
                    ErrorClass::Retryable
                } else if code_matches(code, &self.not_found) {
                    ErrorClass::NotFound
                } else if code_matches(code, &self.retryable)
                    || code_matches(code, extra_retryable)
                {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Fatal
                }
            }
            TransportError::Http { .. }
            | TransportError::InvalidRequest(_)
            | TransportError::Decode(_) => ErrorClass::Fatal,
        }
    }

    /// Tag `err` with its class
    pub fn classify(&self, err: TransportError) -> ClassifiedError {
        self.classify_with(err, &[])
    }

    /// Tag `err` with its class, with per-call extra retryable codes
    pub fn classify_with(&self, err: TransportError, extra_retryable: &[&str]) -> ClassifiedError {
        let class = self.class_with(&err, extra_retryable);
        ClassifiedError { class, source: err }
    }
}

fn short_code(code: &str) -> &str {
    code.split_once('.').map_or(code, |(short, _)| short)
}

fn code_matches<S: AsRef<str>>(code: &str, list: &[S]) -> bool {
    let short = short_code(code);
    list.iter()
        .any(|entry| entry.as_ref() == code || entry.as_ref() == short)
}

/// Statuses a gateway or load balancer answers with when the request did not land
const fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500..=599)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(code: &str) -> TransportError {
        TransportError::api(code, "boom")
    }

    #[test]
    fn test_network_failures_are_retryable() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.class_of(&TransportError::Network("reset".into())),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("ClientError.NetworkError")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("ClientError.HttpStatusCodeError")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&TransportError::Http {
                status: 503,
                body: String::new()
            }),
            ErrorClass::Retryable
        );
    }

    #[test]
    fn test_not_found_codes() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.class_of(&api("ResourceNotFound.InstanceNotFound")),
            ErrorClass::NotFound
        );
        assert_eq!(
            classifier.class_of(&api("InvalidParameterValue.DealNameNotFound")),
            ErrorClass::NotFound
        );
        // the full code is listed, the short code is not
        assert_eq!(
            classifier.class_of(&api("InvalidParameterValue.Other")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_not_found_wins_over_extra_retryable() {
        let classifier = ErrorClassifier::new();
        let err = api("InternalError.ClusterNotFound");
        assert_eq!(
            classifier.class_with(&err, &["InternalError"]),
            ErrorClass::NotFound
        );
        assert_eq!(
            classifier.class_with(&api("InternalError.DbError"), &["InternalError"]),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("InternalError.DbError")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_retryable_codes_match_short_code() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.class_of(&api("RequestLimitExceeded")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("ResourceInUse.Locked")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("InvalidParameter.ActionInProgress")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("InvalidParameter.Malformed")),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_permanent_failures_are_fatal() {
        let classifier = ErrorClassifier::new();
        assert_eq!(
            classifier.class_of(&api("AuthFailure.UnauthorizedOperation")),
            ErrorClass::Fatal
        );
        assert_eq!(
            classifier.class_of(&TransportError::Decode("missing field".into())),
            ErrorClass::Fatal
        );
        assert_eq!(
            classifier.class_of(&TransportError::Http {
                status: 403,
                body: String::new()
            }),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = ErrorClassifier::new();
        for code in [
            "ResourceBusy",
            "ResourceNotFound",
            "UnsupportedOperation",
            "ClientError.NetworkError",
        ] {
            let first = classifier.classify(api(code));
            let second = classifier.classify(api(code));
            assert_eq!(first, second, "code {code}");
        }
    }

    #[test]
    fn test_custom_lists() {
        let classifier = ErrorClassifier::empty()
            .with_retryable_codes(["FailedOperation"])
            .with_not_found_codes(["InvalidInstanceId.NotFound"]);
        assert_eq!(
            classifier.class_of(&api("FailedOperation.Timeout")),
            ErrorClass::Retryable
        );
        assert_eq!(
            classifier.class_of(&api("InvalidInstanceId.NotFound")),
            ErrorClass::NotFound
        );
        assert_eq!(classifier.class_of(&api("ResourceBusy")), ErrorClass::Fatal);
        assert!(ErrorClass::NotFound.stops_retry());
        assert!(!ErrorClass::Retryable.stops_retry());
    }
}
