//! Tests for the auth module

use super::*;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::io::Write;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TEST_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/test_rsa_key.pem");
const TEST_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/test_rsa_pub.pem");

fn service_account(token_uri: String) -> ServiceAccountKey {
    ServiceAccountKey {
        client_email: "loader@test-project.iam.gserviceaccount.com".to_string(),
        private_key: TEST_PRIVATE_KEY.to_string(),
        token_uri,
        project_id: Some("test-project".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[tokio::test]
async fn test_static_access_token_is_bearer() {
    let auth = GoogleAuthenticator::new(GoogleCredentials::AccessToken("ya29.static".into()));

    let req = reqwest::Client::new().get("https://example.com/api");
    let built = auth.apply(req).await.unwrap().build().unwrap();

    assert_eq!(
        built.headers().get("Authorization").unwrap(),
        "Bearer ya29.static"
    );
}

#[tokio::test]
async fn test_service_account_exchanges_signed_jwt() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.exchanged",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let token_uri = format!("{}/token", mock_server.uri());
    let auth = GoogleAuthenticator::new(GoogleCredentials::ServiceAccount(service_account(
        token_uri.clone(),
    )));

    assert_eq!(auth.access_token().await.unwrap(), "ya29.exchanged");

    let requests = mock_server.received_requests().await.unwrap();
    let assertion = url::form_urlencoded::parse(&requests[0].body)
        .find(|(k, _)| k == "assertion")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    let decoded = decode::<Claims>(
        &assertion,
        &DecodingKey::from_rsa_pem(TEST_PUBLIC_KEY.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap();

    assert_eq!(
        decoded.claims.iss,
        "loader@test-project.iam.gserviceaccount.com"
    );
    assert_eq!(decoded.claims.scope, BIGQUERY_SCOPE);
    assert_eq!(decoded.claims.aud, token_uri);
    assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);
}

#[tokio::test]
async fn test_token_is_cached_until_cleared() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.cached",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let auth = GoogleAuthenticator::new(GoogleCredentials::ServiceAccount(service_account(
        format!("{}/token", mock_server.uri()),
    )));

    assert_eq!(auth.access_token().await.unwrap(), "ya29.cached");
    assert_eq!(auth.access_token().await.unwrap(), "ya29.cached");

    auth.clear_cache().await;
    assert_eq!(auth.access_token().await.unwrap(), "ya29.cached");
}

#[tokio::test]
async fn test_short_lived_token_is_refreshed() {
    let mock_server = MockServer::start().await;

    // Inside the 30 second expiry buffer, so every call exchanges again
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.short",
            "expires_in": 5
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let auth = GoogleAuthenticator::new(GoogleCredentials::ServiceAccount(service_account(
        format!("{}/token", mock_server.uri()),
    )));

    auth.access_token().await.unwrap();
    auth.access_token().await.unwrap();
}

#[tokio::test]
async fn test_token_exchange_failure_is_auth_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .mount(&mock_server)
        .await;

    let auth = GoogleAuthenticator::new(GoogleCredentials::ServiceAccount(service_account(
        format!("{}/token", mock_server.uri()),
    )));

    let err = auth.access_token().await.unwrap_err();
    assert!(matches!(err, crate::Error::Auth { .. }));
    assert!(err.to_string().contains("400"));
    assert!(err.to_string().contains("invalid_grant"));
}

#[tokio::test]
async fn test_invalid_private_key_is_auth_error() {
    let mut key = service_account("http://127.0.0.1:1/token".to_string());
    key.private_key = "not a key".to_string();
    let auth = GoogleAuthenticator::new(GoogleCredentials::ServiceAccount(key));

    let err = auth.access_token().await.unwrap_err();
    assert!(err.to_string().contains("Invalid private key"));
}

#[test]
fn test_from_key_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let contents = serde_json::json!({
        "type": "service_account",
        "project_id": "test-project",
        "client_email": "loader@test-project.iam.gserviceaccount.com",
        "private_key": TEST_PRIVATE_KEY,
        "token_uri": "https://oauth2.googleapis.com/token"
    });
    file.write_all(contents.to_string().as_bytes()).unwrap();

    let auth = GoogleAuthenticator::from_key_file(file.path().to_str().unwrap()).unwrap();
    match auth.credentials() {
        GoogleCredentials::ServiceAccount(key) => {
            assert_eq!(key.project_id.as_deref(), Some("test-project"));
            assert_eq!(key.token_uri, GOOGLE_TOKEN_URI);
        }
        GoogleCredentials::AccessToken(_) => panic!("expected a service account"),
    }
}

#[test]
fn test_from_key_file_missing() {
    let err = GoogleAuthenticator::from_key_file("/nonexistent/key.json").unwrap_err();
    assert!(matches!(err, crate::Error::FileNotFound { .. }));
}

#[test]
fn test_from_key_file_malformed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"client_email\": 1}").unwrap();

    let err = GoogleAuthenticator::from_key_file(file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("Invalid service account key"));
}
