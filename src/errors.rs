//! Error types for dynamodb-encryption.
//!
//! AWS SDK errors are mapped with typed `SdkError` variant matching, no string
//! parsing of debug output. Errors from collaborators propagate unchanged:
//! this layer never retries and never returns partial results.

use aws_sdk_dynamodb::error::SdkError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid provider, key material or client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Table schema could not be resolved. Never defaulted to "no keys".
    #[error("table info unavailable for '{table}': {reason}")]
    TableInfoUnavailable { table: String, reason: String },

    /// Malformed request, detected before any remote call.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Signature missing or not matching the item.
    #[error("item integrity check failed: {0}")]
    ItemIntegrity(String),

    #[error("no such attribute: {0}")]
    MissingAttribute(String),

    #[error("{0}")]
    ResourceNotFound(String),

    #[error("{0}")]
    ResourceInUse(String),

    #[error("the condition expression evaluated to false")]
    ConditionalCheckFailed,

    #[error("{0}")]
    Throughput(String),

    #[error("{0}")]
    AccessDenied(String),

    #[error("{0}")]
    Credentials(String),

    #[error("{0}")]
    Connection(String),

    #[error("{0}")]
    Service(String),
}

/// AWS service type for error context.
#[derive(Debug, Clone, Copy)]
pub enum AwsService {
    DynamoDB,
    Kms,
}

impl AwsService {
    fn name(&self) -> &'static str {
        match self {
            AwsService::DynamoDB => "DynamoDB",
            AwsService::Kms => "KMS",
        }
    }
}

/// Map non-service `SdkError` variants (dispatch failures, timeouts, etc.).
///
/// Returns `None` for `ServiceError`, which needs the service error code.
fn map_outer_sdk_error<E, R>(err: &SdkError<E, R>, service: AwsService) -> Option<Error>
where
    E: std::fmt::Debug,
    R: std::fmt::Debug,
{
    match err {
        SdkError::DispatchFailure(dispatch) => {
            let msg = if dispatch.is_timeout() {
                format!("Connection timed out to {}.", service.name())
            } else if dispatch.is_io() {
                format!("Connection failed to {} (I/O error).", service.name())
            } else {
                format!("Connection failed to {}.", service.name())
            };
            Some(Error::Connection(msg))
        }
        SdkError::TimeoutError(_) => Some(Error::Connection(format!(
            "Connection timed out to {}.",
            service.name()
        ))),
        SdkError::ConstructionFailure(err) => {
            let msg = format!("{:?}", err);
            if msg.contains("credentials") || msg.contains("Credentials") {
                Some(Error::Credentials(
                    "No AWS credentials found. Configure credentials via environment variables, \
                    an AWS profile, or an IAM role."
                        .to_string(),
                ))
            } else {
                Some(Error::Service(format!("Failed to build request: {}", msg)))
            }
        }
        SdkError::ResponseError(err) => Some(Error::Service(format!(
            "Invalid response from {}: {:?}",
            service.name(),
            err
        ))),
        SdkError::ServiceError(_) => None,
        _ => Some(Error::Service(format!(
            "Unknown error from {}: {:?}",
            service.name(),
            err
        ))),
    }
}

/// Map error codes shared by DynamoDB and KMS.
fn map_common_service_code(
    code: Option<&str>,
    message: Option<&str>,
    service: AwsService,
) -> Option<Error> {
    match code? {
        "UnrecognizedClientException" => Some(Error::Credentials(
            "Invalid AWS credentials. Check your access key and secret.".to_string(),
        )),
        "ExpiredTokenException" | "ExpiredToken" => Some(Error::Credentials(
            "AWS credentials have expired. Refresh your session token.".to_string(),
        )),
        "AccessDeniedException" | "AccessDenied" => Some(Error::AccessDenied(format!(
            "Access denied to {}: {}",
            service.name(),
            message.unwrap_or("Check your IAM permissions.")
        ))),
        "ProvisionedThroughputExceededException"
        | "LimitExceededException"
        | "RequestLimitExceeded"
        | "ThrottlingException" => Some(Error::Throughput(format!(
            "{} request rate too high.",
            service.name()
        ))),
        _ => None,
    }
}

fn map_dynamodb_code(
    code: Option<&str>,
    message: Option<&str>,
    display: &str,
    table: Option<&str>,
) -> Error {
    if let Some(err) = map_common_service_code(code, message, AwsService::DynamoDB) {
        return err;
    }

    match code {
        Some("ResourceNotFoundException") => Error::ResourceNotFound(match table {
            Some(t) => format!("Table '{}' not found", t),
            None => "Resource not found".to_string(),
        }),
        Some("ResourceInUseException") => Error::ResourceInUse(match table {
            Some(t) => format!("Table '{}' is in use", t),
            None => "Resource already in use".to_string(),
        }),
        Some("ValidationException") => Error::Validation(message.unwrap_or(display).to_string()),
        Some("ConditionalCheckFailedException") => Error::ConditionalCheckFailed,
        _ => Error::Service(message.unwrap_or(display).to_string()),
    }
}

/// Map DynamoDB SDK errors using typed `SdkError` variants.
pub fn map_sdk_error<E, R>(err: SdkError<E, R>, table: Option<&str>) -> Error
where
    E: aws_sdk_dynamodb::error::ProvideErrorMetadata + std::fmt::Debug + std::fmt::Display,
    R: std::fmt::Debug,
{
    if let Some(mapped) = map_outer_sdk_error(&err, AwsService::DynamoDB) {
        return mapped;
    }

    if let Some(service_err) = err.as_service_error() {
        let meta = aws_sdk_dynamodb::error::ProvideErrorMetadata::meta(service_err);
        let display = service_err.to_string();
        return map_dynamodb_code(meta.code(), meta.message(), &display, table);
    }

    Error::Service(format!("Unexpected DynamoDB error: {:?}", err))
}

/// Map KMS SDK errors. Key problems surface as encryption or decryption
/// errors depending on the direction of the call.
pub fn map_kms_error<E, R>(err: aws_sdk_kms::error::SdkError<E, R>, decrypting: bool) -> Error
where
    E: aws_sdk_kms::error::ProvideErrorMetadata + std::fmt::Debug + std::fmt::Display,
    R: std::fmt::Debug,
{
    if let Some(mapped) = map_outer_sdk_error(&err, AwsService::Kms) {
        return mapped;
    }

    let wrap = |msg: String| {
        if decrypting {
            Error::Decryption(msg)
        } else {
            Error::Encryption(msg)
        }
    };

    if let Some(service_err) = err.as_service_error() {
        let meta = aws_sdk_kms::error::ProvideErrorMetadata::meta(service_err);
        let code = meta.code();
        let message = meta.message();

        if let Some(mapped) = map_common_service_code(code, message, AwsService::Kms) {
            return mapped;
        }

        return match code {
            Some("NotFoundException") => wrap("KMS key not found.".to_string()),
            Some("DisabledException") => wrap("KMS key is disabled.".to_string()),
            Some("InvalidKeyUsageException") => {
                wrap("KMS key cannot be used for this operation.".to_string())
            }
            Some("KeyUnavailableException") => wrap("KMS key is not available.".to_string()),
            Some("InvalidCiphertextException") => {
                Error::Decryption("Invalid wrapped data key. Data may be corrupted.".to_string())
            }
            Some("IncorrectKeyException") => {
                Error::Decryption("Wrong KMS key used for decryption.".to_string())
            }
            _ => wrap(format!(
                "KMS operation failed: {}",
                message
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| service_err.to_string())
            )),
        };
    }

    Error::Service(format!("Unexpected KMS error: {:?}", err))
}
