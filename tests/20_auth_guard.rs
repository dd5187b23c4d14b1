mod common;

use anyhow::Result;
use reqwest::StatusCode;
use uuid::Uuid;

use atlas_api::auth::{generate_jwt, Claims};

fn bearer_token() -> String {
    generate_jwt(&Claims::new(Uuid::new_v4(), "tester".to_string())).expect("token")
}

#[tokio::test]
async fn protected_routes_reject_missing_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/api/auth/whoami", server.base_url)).send().await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let payload = res.json::<serde_json::Value>().await?;
    assert_eq!(payload["code"], "UNAUTHORIZED");

    Ok(())
}

#[tokio::test]
async fn protected_routes_reject_garbage_token() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .header("Authorization", "Bearer not.a.token")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn whoami_returns_token_identity() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/auth/whoami", server.base_url))
        .header("Authorization", format!("Bearer {}", bearer_token()))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let payload = res.json::<serde_json::Value>().await?;
    assert_eq!(payload["data"]["username"], "tester");

    Ok(())
}

#[tokio::test]
async fn unknown_entity_is_not_found() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/api/widgets/{}", server.base_url, Uuid::new_v4()))
        .header("Authorization", format!("Bearer {}", bearer_token()))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let payload = res.json::<serde_json::Value>().await?;
    assert_eq!(payload["code"], "NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn empty_payload_is_rejected_before_persistence() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/api/users", server.base_url))
        .header("Authorization", format!("Bearer {}", bearer_token()))
        .json(&serde_json::json!({}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let payload = res.json::<serde_json::Value>().await?;
    assert_eq!(payload["code"], "BAD_REQUEST");

    Ok(())
}

#[tokio::test]
async fn malformed_record_id_is_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .patch(format!("{}/api/users/not-a-uuid", server.base_url))
        .header("Authorization", format!("Bearer {}", bearer_token()))
        .json(&serde_json::json!({"firstname": "A"}))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    Ok(())
}
