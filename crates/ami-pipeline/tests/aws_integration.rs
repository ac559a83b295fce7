//! AWS integration tests - actually call AWS APIs
//!
//! These tests are read-only and marked `#[ignore]`. Run them with:
//! ```
//! AWS_PROFILE=your_profile cargo test --test aws_integration -- --ignored
//! ```

use ami_pipeline::aws::{
    AwsContext, ClientFactory, CrossAccountExecutor, Ec2Client, RegionClients, SsmClient,
    classify_anyhow_error, get_current_account_id,
};
use ami_pipeline_common::defaults::PATCH_SESSION_NAME;
use ami_pipeline_test_utils::{get_test_region, missing_parameter_name};

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_caller_account_lookup() {
    let ctx = AwsContext::new(&get_test_region()).await;
    let account = get_current_account_id(ctx.sdk_config())
        .await
        .expect("AWS credentials required - set AWS_PROFILE or AWS_ACCESS_KEY_ID");

    assert_eq!(account.len(), 12, "unexpected account id: {account}");
    assert!(account.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_missing_parameter_is_not_found() {
    let ctx = AwsContext::new(&get_test_region()).await;
    let ssm = SsmClient::from_context(&ctx);

    let err = ssm
        .get_parameter(&missing_parameter_name())
        .await
        .expect_err("parameter should not exist");
    assert!(
        classify_anyhow_error(&err).is_not_found(),
        "expected not found, got: {err:#}"
    );
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_own_account_resolves_without_role() {
    let region = get_test_region();
    let executor = CrossAccountExecutor::new(&region, PATCH_SESSION_NAME).await;
    let account = executor
        .caller_account()
        .expect("caller account should be known")
        .to_string();

    // A role that cannot exist: resolving must not try to assume it
    let clients = executor
        .resolve(&account, Some("ami-pipeline-test-nonexistent-role"), &region)
        .await
        .expect("own account should use ambient credentials");
    assert_eq!(clients.region(), region);
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn test_unknown_image_has_no_state() {
    let ec2 = Ec2Client::new(&get_test_region())
        .await
        .expect("AWS credentials required");

    let state = ec2
        .describe_image_state("ami-00000000000000000")
        .await
        .expect("describe should succeed for a missing image");
    assert_eq!(state, None);
}
