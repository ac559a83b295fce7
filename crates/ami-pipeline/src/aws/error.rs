//! AWS error classification and handling
//!
//! Provides typed errors for AWS SDK operations using the `.code()` method
//! instead of string matching on Debug format.

use thiserror::Error;

/// AWS error categories used for control-flow decisions
#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// Resource was not found
    #[error("Resource not found: {resource_type} '{resource_id}'")]
    NotFound {
        resource_type: &'static str,
        resource_id: String,
    },

    /// Caller lacks permission (including a role that cannot be assumed)
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// The resource is busy with another operation (e.g. an update in progress)
    #[error("Resource in use: {message}")]
    Conflict { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled)
    }

    /// Check if the target resource is busy with another operation
    pub fn is_conflict(&self) -> bool {
        matches!(self, AwsError::Conflict { .. })
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            AwsError::AccessDenied { .. } => suggestion_for_code("AccessDenied"),
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidAMIID.NotFound",
    "InvalidAMIID.Unavailable",
    "InvalidInstanceID.NotFound",
    "InvalidLaunchTemplateId.NotFound",
    "InvalidLaunchTemplateId.VersionNotFound",
    "ParameterNotFound",
    "ResourceNotFoundException",
    "NotFound",
];

/// Known AWS error codes for authorization failures
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "AuthorizationError",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyUpdates",
];

/// Known AWS error codes for a resource busy with another operation
const CONFLICT_CODES: &[&str] = &["ResourceInUseException"];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound {
            resource_type: "resource",
            resource_id: message,
        },
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if CONFLICT_CODES.contains(&c) => AwsError::Conflict { message },
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an error from an anyhow::Error.
///
/// Walks the error chain looking first for an already classified
/// [`AwsError`], then for the SDK operation errors the pipelines surface
/// through `.context()`. Falls back to string matching on the Debug
/// representation if no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_ec2::error::ProvideErrorMetadata;

    macro_rules! classify_sdk {
        ($cause:expr, $sdk:ident, $op:ident :: $err:ident) => {
            if let Some(e) = $cause
                .downcast_ref::<$sdk::error::SdkError<$sdk::operation::$op::$err>>()
            {
                return classify_aws_error(e.code(), e.message());
            }
        };
    }

    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<AwsError>() {
            return e.clone();
        }
        classify_sdk!(cause, aws_sdk_ec2, create_image::CreateImageError);
        classify_sdk!(cause, aws_sdk_ec2, copy_image::CopyImageError);
        classify_sdk!(cause, aws_sdk_ec2, modify_image_attribute::ModifyImageAttributeError);
        classify_sdk!(
            cause,
            aws_sdk_ec2,
            describe_launch_template_versions::DescribeLaunchTemplateVersionsError
        );
        classify_sdk!(
            cause,
            aws_sdk_ec2,
            create_launch_template_version::CreateLaunchTemplateVersionError
        );
        classify_sdk!(cause, aws_sdk_ssm, put_parameter::PutParameterError);
        classify_sdk!(cause, aws_sdk_sts, assume_role::AssumeRoleError);
        classify_sdk!(cause, aws_sdk_eks, list_nodegroups::ListNodegroupsError);
        classify_sdk!(cause, aws_sdk_eks, describe_nodegroup::DescribeNodegroupError);
        classify_sdk!(cause, aws_sdk_sns, publish::PublishError);
    }

    // Fallback: extract error code from debug string representation
    let debug_str = format!("{:?}", error);
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&error.to_string()));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    let known = NOT_FOUND_CODES
        .iter()
        .chain(ACCESS_DENIED_CODES)
        .chain(THROTTLING_CODES)
        .chain(CONFLICT_CODES)
        // bare "NotFound" matches too much arbitrary text
        .filter(|code| code.len() > "NotFound".len());
    for code in known {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from `code: Some("...")` pattern
    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "AccessDenied",
        "Check that the target role exists and trusts the calling account.",
    ),
    (
        "UnauthorizedOperation",
        "The calling role is missing an EC2 permission for this step.",
    ),
    (
        "InvalidAMIID.NotFound",
        "The image may not have propagated yet, or was deregistered.",
    ),
    (
        "ParameterNotFound",
        "Run the promotion pipeline first so the discovery key exists.",
    ),
    (
        "ResourceInUseException",
        "Another update is already running on this node group.",
    ),
    (
        "TooManyUpdates",
        "Parameter Store is throttling writes to this key. Retry later.",
    ),
];

/// Get a user-friendly suggestion for a known error code.
fn suggestion_for_code(code: &str) -> Option<String> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| (*s).to_string())
}
