//! Error taxonomy for Azure Blob Storage client operations.

use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Azure Storage service error codes the client knows how to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // General errors
    AuthenticationFailed,
    AuthorizationFailure,
    AuthorizationPermissionMismatch,
    AuthorizationProtocolMismatch,
    AuthorizationResourceTypeMismatch,
    ConditionNotMet,
    InvalidHeaderValue,
    InvalidInput,
    InvalidQueryParameterValue,
    InvalidRange,
    InvalidResourceName,
    InvalidXmlDocument,
    MissingRequiredHeader,
    ResourceAlreadyExists,
    ResourceNotFound,
    ServerBusy,
    InternalError,
    OperationTimedOut,

    // Container and blob errors
    BlobAlreadyExists,
    BlobNotFound,
    BlobUsesCustomerSpecifiedEncryption,
    BlobDoesNotUseCustomerSpecifiedEncryption,
    ContainerAlreadyExists,
    ContainerBeingDeleted,
    ContainerNotFound,
    InvalidBlobType,
    InvalidBlockId,
    InvalidBlockList,
    InvalidPageRange,
    CannotVerifyCopySource,
    AppendPositionConditionNotMet,
    MaxBlobSizeConditionNotMet,
    SnapshotsPresent,

    // Encryption errors
    InvalidEncryptionAlgorithm,
    EncryptionScopeMismatch,
    RequestProhibitedByEncryptionScope,

    // Lease errors
    LeaseAlreadyBroken,
    LeaseAlreadyPresent,
    LeaseIdMismatchWithBlobOperation,
    LeaseIdMismatchWithContainerOperation,
    LeaseIdMismatchWithLeaseOperation,
    LeaseIdMissing,
    LeaseIsBreakingAndCannotBeAcquired,
    LeaseIsBreakingAndCannotBeChanged,
    LeaseIsBrokenAndCannotBeRenewed,
    LeaseLost,
    LeaseNotPresentWithBlobOperation,
    LeaseNotPresentWithContainerOperation,
    LeaseNotPresentWithLeaseOperation,
}

impl ErrorCode {
    /// Every known code, used for string lookup.
    const ALL: &'static [ErrorCode] = &[
        ErrorCode::AuthenticationFailed,
        ErrorCode::AuthorizationFailure,
        ErrorCode::AuthorizationPermissionMismatch,
        ErrorCode::AuthorizationProtocolMismatch,
        ErrorCode::AuthorizationResourceTypeMismatch,
        ErrorCode::ConditionNotMet,
        ErrorCode::InvalidHeaderValue,
        ErrorCode::InvalidInput,
        ErrorCode::InvalidQueryParameterValue,
        ErrorCode::InvalidRange,
        ErrorCode::InvalidResourceName,
        ErrorCode::InvalidXmlDocument,
        ErrorCode::MissingRequiredHeader,
        ErrorCode::ResourceAlreadyExists,
        ErrorCode::ResourceNotFound,
        ErrorCode::ServerBusy,
        ErrorCode::InternalError,
        ErrorCode::OperationTimedOut,
        ErrorCode::BlobAlreadyExists,
        ErrorCode::BlobNotFound,
        ErrorCode::BlobUsesCustomerSpecifiedEncryption,
        ErrorCode::BlobDoesNotUseCustomerSpecifiedEncryption,
        ErrorCode::ContainerAlreadyExists,
        ErrorCode::ContainerBeingDeleted,
        ErrorCode::ContainerNotFound,
        ErrorCode::InvalidBlobType,
        ErrorCode::InvalidBlockId,
        ErrorCode::InvalidBlockList,
        ErrorCode::InvalidPageRange,
        ErrorCode::CannotVerifyCopySource,
        ErrorCode::AppendPositionConditionNotMet,
        ErrorCode::MaxBlobSizeConditionNotMet,
        ErrorCode::SnapshotsPresent,
        ErrorCode::InvalidEncryptionAlgorithm,
        ErrorCode::EncryptionScopeMismatch,
        ErrorCode::RequestProhibitedByEncryptionScope,
        ErrorCode::LeaseAlreadyBroken,
        ErrorCode::LeaseAlreadyPresent,
        ErrorCode::LeaseIdMismatchWithBlobOperation,
        ErrorCode::LeaseIdMismatchWithContainerOperation,
        ErrorCode::LeaseIdMismatchWithLeaseOperation,
        ErrorCode::LeaseIdMissing,
        ErrorCode::LeaseIsBreakingAndCannotBeAcquired,
        ErrorCode::LeaseIsBreakingAndCannotBeChanged,
        ErrorCode::LeaseIsBrokenAndCannotBeRenewed,
        ErrorCode::LeaseLost,
        ErrorCode::LeaseNotPresentWithBlobOperation,
        ErrorCode::LeaseNotPresentWithContainerOperation,
        ErrorCode::LeaseNotPresentWithLeaseOperation,
    ];

    /// Returns the wire representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => "AuthenticationFailed",
            ErrorCode::AuthorizationFailure => "AuthorizationFailure",
            ErrorCode::AuthorizationPermissionMismatch => "AuthorizationPermissionMismatch",
            ErrorCode::AuthorizationProtocolMismatch => "AuthorizationProtocolMismatch",
            ErrorCode::AuthorizationResourceTypeMismatch => "AuthorizationResourceTypeMismatch",
            ErrorCode::ConditionNotMet => "ConditionNotMet",
            ErrorCode::InvalidHeaderValue => "InvalidHeaderValue",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::InvalidQueryParameterValue => "InvalidQueryParameterValue",
            ErrorCode::InvalidRange => "InvalidRange",
            ErrorCode::InvalidResourceName => "InvalidResourceName",
            ErrorCode::InvalidXmlDocument => "InvalidXmlDocument",
            ErrorCode::MissingRequiredHeader => "MissingRequiredHeader",
            ErrorCode::ResourceAlreadyExists => "ResourceAlreadyExists",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::ServerBusy => "ServerBusy",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::OperationTimedOut => "OperationTimedOut",
            ErrorCode::BlobAlreadyExists => "BlobAlreadyExists",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::BlobUsesCustomerSpecifiedEncryption => {
                "BlobUsesCustomerSpecifiedEncryption"
            }
            ErrorCode::BlobDoesNotUseCustomerSpecifiedEncryption => {
                "BlobDoesNotUseCustomerSpecifiedEncryption"
            }
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerBeingDeleted => "ContainerBeingDeleted",
            ErrorCode::ContainerNotFound => "ContainerNotFound",
            ErrorCode::InvalidBlobType => "InvalidBlobType",
            ErrorCode::InvalidBlockId => "InvalidBlockId",
            ErrorCode::InvalidBlockList => "InvalidBlockList",
            ErrorCode::InvalidPageRange => "InvalidPageRange",
            ErrorCode::CannotVerifyCopySource => "CannotVerifyCopySource",
            ErrorCode::AppendPositionConditionNotMet => "AppendPositionConditionNotMet",
            ErrorCode::MaxBlobSizeConditionNotMet => "MaxBlobSizeConditionNotMet",
            ErrorCode::SnapshotsPresent => "SnapshotsPresent",
            ErrorCode::InvalidEncryptionAlgorithm => "InvalidEncryptionAlgorithm",
            ErrorCode::EncryptionScopeMismatch => "EncryptionScopeMismatch",
            ErrorCode::RequestProhibitedByEncryptionScope => "RequestProhibitedByEncryptionScope",
            ErrorCode::LeaseAlreadyBroken => "LeaseAlreadyBroken",
            ErrorCode::LeaseAlreadyPresent => "LeaseAlreadyPresent",
            ErrorCode::LeaseIdMismatchWithBlobOperation => "LeaseIdMismatchWithBlobOperation",
            ErrorCode::LeaseIdMismatchWithContainerOperation => {
                "LeaseIdMismatchWithContainerOperation"
            }
            ErrorCode::LeaseIdMismatchWithLeaseOperation => "LeaseIdMismatchWithLeaseOperation",
            ErrorCode::LeaseIdMissing => "LeaseIdMissing",
            ErrorCode::LeaseIsBreakingAndCannotBeAcquired => "LeaseIsBreakingAndCannotBeAcquired",
            ErrorCode::LeaseIsBreakingAndCannotBeChanged => "LeaseIsBreakingAndCannotBeChanged",
            ErrorCode::LeaseIsBrokenAndCannotBeRenewed => "LeaseIsBrokenAndCannotBeRenewed",
            ErrorCode::LeaseLost => "LeaseLost",
            ErrorCode::LeaseNotPresentWithBlobOperation => "LeaseNotPresentWithBlobOperation",
            ErrorCode::LeaseNotPresentWithContainerOperation => {
                "LeaseNotPresentWithContainerOperation"
            }
            ErrorCode::LeaseNotPresentWithLeaseOperation => "LeaseNotPresentWithLeaseOperation",
        }
    }

    /// Looks up a code by its wire representation.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == code)
    }

    /// Returns the HTTP status the service pairs with this code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidHeaderValue
            | ErrorCode::InvalidInput
            | ErrorCode::InvalidQueryParameterValue
            | ErrorCode::InvalidResourceName
            | ErrorCode::InvalidXmlDocument
            | ErrorCode::MissingRequiredHeader
            | ErrorCode::InvalidBlobType
            | ErrorCode::InvalidBlockId
            | ErrorCode::InvalidBlockList
            | ErrorCode::InvalidPageRange
            | ErrorCode::InvalidEncryptionAlgorithm => StatusCode::BAD_REQUEST,

            ErrorCode::AuthenticationFailed => StatusCode::FORBIDDEN,

            ErrorCode::AuthorizationFailure
            | ErrorCode::AuthorizationPermissionMismatch
            | ErrorCode::AuthorizationProtocolMismatch
            | ErrorCode::AuthorizationResourceTypeMismatch
            | ErrorCode::RequestProhibitedByEncryptionScope => StatusCode::FORBIDDEN,

            ErrorCode::BlobNotFound | ErrorCode::ContainerNotFound | ErrorCode::ResourceNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::BlobAlreadyExists
            | ErrorCode::BlobUsesCustomerSpecifiedEncryption
            | ErrorCode::BlobDoesNotUseCustomerSpecifiedEncryption
            | ErrorCode::ContainerAlreadyExists
            | ErrorCode::ContainerBeingDeleted
            | ErrorCode::EncryptionScopeMismatch
            | ErrorCode::LeaseAlreadyBroken
            | ErrorCode::LeaseAlreadyPresent
            | ErrorCode::LeaseIdMismatchWithBlobOperation
            | ErrorCode::LeaseIdMismatchWithContainerOperation
            | ErrorCode::LeaseIdMismatchWithLeaseOperation
            | ErrorCode::LeaseIsBreakingAndCannotBeAcquired
            | ErrorCode::LeaseIsBreakingAndCannotBeChanged
            | ErrorCode::LeaseIsBrokenAndCannotBeRenewed
            | ErrorCode::LeaseLost
            | ErrorCode::LeaseNotPresentWithBlobOperation
            | ErrorCode::LeaseNotPresentWithContainerOperation
            | ErrorCode::LeaseNotPresentWithLeaseOperation
            | ErrorCode::ResourceAlreadyExists
            | ErrorCode::SnapshotsPresent => StatusCode::CONFLICT,

            ErrorCode::AppendPositionConditionNotMet
            | ErrorCode::ConditionNotMet
            | ErrorCode::LeaseIdMissing
            | ErrorCode::MaxBlobSizeConditionNotMet
            | ErrorCode::CannotVerifyCopySource => StatusCode::PRECONDITION_FAILED,

            ErrorCode::InvalidRange => StatusCode::RANGE_NOT_SATISFIABLE,

            ErrorCode::InternalError | ErrorCode::OperationTimedOut => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the client-side classification of this code.
    ///
    /// Lease id mismatches are precondition failures even though the service
    /// reports them with 409; every other lease code is a state conflict.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::LeaseIdMismatchWithBlobOperation
            | ErrorCode::LeaseIdMismatchWithContainerOperation
            | ErrorCode::LeaseIdMismatchWithLeaseOperation
            | ErrorCode::LeaseIdMissing
            | ErrorCode::ConditionNotMet
            | ErrorCode::AppendPositionConditionNotMet
            | ErrorCode::MaxBlobSizeConditionNotMet => ErrorKind::PreconditionFailed,
            other => ErrorKind::from_status(other.status_code()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input detected before any request was sent.
    InvalidArgument,
    /// ETag or lease-id mismatch reported by the service.
    PreconditionFailed,
    /// Resource already exists or the lease state disallows the transition.
    Conflict,
    NotFound,
    Unauthorized,
    Forbidden,
    /// Transport failure the transport marked as safe to retry.
    RetryableTransport,
    /// Transport failure that must not be retried.
    Transport,
    /// A response body could not be decoded.
    Deserialize,
    /// Any other service-reported failure.
    Service,
}

impl ErrorKind {
    /// Classifies an HTTP status for codes the client does not recognize.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::PRECONDITION_FAILED => ErrorKind::PreconditionFailed,
            StatusCode::CONFLICT => ErrorKind::Conflict,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => ErrorKind::Forbidden,
            _ => ErrorKind::Service,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::PreconditionFailed => "PreconditionFailed",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::RetryableTransport => "RetryableTransportError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Deserialize => "DeserializeError",
            ErrorKind::Service => "StorageError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage error with classification, service code and message.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct StorageError {
    pub kind: ErrorKind,
    /// HTTP status, present for service-reported failures.
    pub status: Option<StatusCode>,
    /// Raw service error code (`x-ms-error-code`), kept verbatim.
    pub code: Option<String>,
    pub message: String,
    pub request_id: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// Creates an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
            request_id: None,
            source: None,
        }
    }

    /// Creates a service-shaped error for a known code.
    pub fn from_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: code.kind(),
            status: Some(code.status_code()),
            code: Some(code.as_str().to_string()),
            message: message.into(),
            request_id: None,
            source: None,
        }
    }

    /// Creates an error for client-detected malformed input.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    /// Creates an error for an undecodable response body.
    pub fn deserialize(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::new(ErrorKind::Deserialize, message).with_source(source)
    }

    /// Creates a transport failure, marked retryable or not by the transport.
    pub fn transport(
        message: impl Into<String>,
        retryable: bool,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let kind = if retryable {
            ErrorKind::RetryableTransport
        } else {
            ErrorKind::Transport
        };
        Self::new(kind, message).with_source(source)
    }

    /// Creates a service failure from the HTTP status and the service code.
    pub fn service(
        status: StatusCode,
        code: Option<String>,
        message: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        let kind = code
            .as_deref()
            .and_then(ErrorCode::from_code)
            .map(|c| c.kind())
            .unwrap_or_else(|| ErrorKind::from_status(status));
        Self {
            kind,
            status: Some(status),
            code,
            message: message.into(),
            request_id,
            source: None,
        }
    }

    /// Attaches an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the service code if the client recognizes it.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.code.as_deref().and_then(ErrorCode::from_code)
    }

    /// Returns whether the transport marked this failure as retryable.
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::RetryableTransport
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
