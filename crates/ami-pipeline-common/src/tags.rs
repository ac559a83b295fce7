//! AWS resource tag keys for pipeline-created images
//!
//! Images and snapshots created by the promotion pipeline carry these tags
//! so they can be told apart from images built by other means.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `ami-pipeline:tool` | Static identifier ("ami-pipeline") |
//! | `ami-pipeline:source-instance` | Instance the image was built from |
//! | `ami-pipeline:created-at` | RFC 3339 creation timestamp |

/// Tag key for tool identification
pub const TAG_TOOL: &str = "ami-pipeline:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "ami-pipeline";

/// Tag key for the instance an image was built from
pub const TAG_SOURCE_INSTANCE: &str = "ami-pipeline:source-instance";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "ami-pipeline:created-at";

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

/// Helper to parse creation timestamp from tags
pub fn parse_created_at(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Standard tag pairs for an image built from `source_instance`.
pub fn image_tags(
    source_instance: &str,
    created_at: chrono::DateTime<chrono::Utc>,
) -> Vec<(&'static str, String)> {
    vec![
        (TAG_TOOL, TAG_TOOL_VALUE.to_string()),
        (TAG_SOURCE_INSTANCE, source_instance.to_string()),
        (TAG_CREATED_AT, format_created_at(created_at)),
    ]
}
