//! # Server Endpoint Tests
//!
//! Health check and routing behaviour that does not involve the catalog tool.

mod common;

use anyhow::Result;
use common::TestApp;
use tagstream_test_utils::{ScriptedLauncher, SCENARIO_CATALOG};

#[tokio::test]
async fn test_health_check_endpoint() -> Result<()> {
    // Arrange
    let app = TestApp::spawn(ScriptedLauncher::new(SCENARIO_CATALOG)).await?;

    // Act
    let response = app
        .client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("Failed to execute request to /health");

    // Assert
    assert!(response.status().is_success());
    assert_eq!("OK", response.text().await?);
    assert_eq!(app.probe.launches(), 0);

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_not_found() -> Result<()> {
    let app = TestApp::spawn(ScriptedLauncher::new(SCENARIO_CATALOG)).await?;

    let response = app
        .client
        .get(format!("{}/tags/EXIF", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(404, response.status().as_u16());
    Ok(())
}

#[tokio::test]
async fn test_tags_rejects_other_methods() -> Result<()> {
    let app = TestApp::spawn(ScriptedLauncher::new(SCENARIO_CATALOG)).await?;

    let response = app
        .client
        .post(format!("{}/tags", app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(405, response.status().as_u16());
    assert_eq!(app.probe.launches(), 0);
    Ok(())
}
