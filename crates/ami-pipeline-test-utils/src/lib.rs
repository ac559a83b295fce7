//! Shared test utilities for ami-pipeline
//!
//! Helpers for the credentialed integration tests, which are marked
//! `#[ignore]` and only run against a real AWS account.

use chrono::Utc;

/// Get the AWS region for tests.
///
/// Checks environment variables in order:
/// 1. AWS_REGION
/// 2. AWS_DEFAULT_REGION
/// 3. Falls back to ap-south-1
pub fn get_test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "ap-south-1".to_string())
}

/// Generate a unique run ID for test resources.
///
/// Format: `test-{timestamp_ms}-{counter}`, unique even when tests start
/// simultaneously within one process.
pub fn test_run_id() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

/// Discovery-store key that is guaranteed not to exist.
///
/// ```
/// use ami_pipeline_test_utils::missing_parameter_name;
///
/// assert!(missing_parameter_name().starts_with("/ami-pipeline-test/"));
/// ```
pub fn missing_parameter_name() -> String {
    format!("/ami-pipeline-test/{}/does-not-exist", test_run_id())
}
