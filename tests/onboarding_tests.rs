mod common;

use common::*;
use serde_json::json;
use whatsapp_onboarding_rs::{complete_onboarding, discover, Error, OnboardingParams};
use wiremock::{
    matchers::{bearer_token, body_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn params(waba_id: Option<&str>, phone_number_id: Option<&str>) -> OnboardingParams {
    OnboardingParams {
        waba_id: waba_id.map(str::to_owned),
        phone_number_id: phone_number_id.map(str::to_owned),
    }
}

async fn mock_code_exchange(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v23.0/oauth/access_token"))
        .and(query_param("client_id", APP_ID))
        .and(query_param("client_secret", APP_SECRET))
        .and(query_param("code", AUTH_CODE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": ACCESS_TOKEN, "token_type": "bearer"
        })))
        .mount(mock_server)
        .await;
}

async fn mock_subscribe(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{WABA_ID}/subscribed_apps")))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(mock_server)
        .await;
}

async fn mock_register(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{PHONE_ID}/register")))
        .and(bearer_token(ACCESS_TOKEN))
        .and(body_json(json!({
            "messaging_product": "whatsapp",
            "pin": PIN
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn full_onboarding_with_supplied_assets() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    mock_code_exchange(&mock_server).await;
    mock_subscribe(&mock_server).await;
    mock_register(&mock_server).await;

    // Act
    let result = complete_onboarding(
        &graph,
        &config,
        AUTH_CODE,
        params(Some(WABA_ID), Some(PHONE_ID)),
    )
    .await;

    // Assert
    let onboarded = result.unwrap();
    assert_eq!(onboarded.token.access_token(), ACCESS_TOKEN);
    assert_eq!(onboarded.waba_id, WABA_ID);
    assert_eq!(onboarded.phone_number_id, PHONE_ID);
}

#[tokio::test]
async fn onboarding_discovers_missing_assets() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    mock_code_exchange(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/v23.0/me"))
        .and(query_param("fields", "id"))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": BUSINESS_ID})))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v23.0/{BUSINESS_ID}/owned_whatsapp_business_accounts"
        )))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": WABA_ID}, {"id": "some-other-waba"}]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v23.0/{WABA_ID}/phone_numbers")))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": PHONE_ID, "display_phone_number": "+1 555-0100"}]
        })))
        .mount(&mock_server)
        .await;

    mock_subscribe(&mock_server).await;
    mock_register(&mock_server).await;

    // Act
    let result = complete_onboarding(&graph, &config, AUTH_CODE, params(None, None)).await;

    // Assert
    let onboarded = result.unwrap();
    assert_eq!(onboarded.waba_id, WABA_ID);
    assert_eq!(onboarded.phone_number_id, PHONE_ID);
}

#[tokio::test]
async fn onboarding_falls_back_to_configured_defaults() {
    // Arrange
    let mock_server = MockServer::start().await;
    let mut config = test_config(&mock_server.uri());
    config.default_waba_id = Some(WABA_ID.into());
    config.default_phone_number_id = Some(PHONE_ID.into());
    let graph = test_client(&config);

    mock_code_exchange(&mock_server).await;
    mock_subscribe(&mock_server).await;
    mock_register(&mock_server).await;

    // Act
    let result = complete_onboarding(&graph, &config, AUTH_CODE, params(None, None)).await;

    // Assert
    let onboarded = result.unwrap();
    assert_eq!(onboarded.waba_id, WABA_ID);
    assert_eq!(onboarded.phone_number_id, PHONE_ID);
}

#[tokio::test]
async fn empty_code_makes_no_upstream_calls() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    // Act
    let result = complete_onboarding(
        &graph,
        &config,
        "  ",
        params(Some(WABA_ID), Some(PHONE_ID)),
    )
    .await;

    // Assert
    assert!(matches!(result, Err(Error::MissingParameter("code"))));
    assert!(mock_server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_subscription_aborts_before_registration() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    mock_code_exchange(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{WABA_ID}/subscribed_apps")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "(#200) Permissions error",
                "type": "OAuthException",
                "code": 200
            }
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{PHONE_ID}/register")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(0)
        .mount(&mock_server)
        .await;

    // Act
    let result = complete_onboarding(
        &graph,
        &config,
        AUTH_CODE,
        params(Some(WABA_ID), Some(PHONE_ID)),
    )
    .await;

    // Assert
    match result {
        Err(Error::UpstreamRejected { error, .. }) => {
            assert_eq!(error.code, 200);
        }
        other => panic!("expected an upstream rejection, got {other:?}"),
    }
    mock_server.verify().await;
}

#[tokio::test]
async fn subscription_success_false_is_a_rejection() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    mock_code_exchange(&mock_server).await;

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{WABA_ID}/subscribed_apps")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
        .mount(&mock_server)
        .await;

    // Act
    let result = complete_onboarding(
        &graph,
        &config,
        AUTH_CODE,
        params(Some(WABA_ID), Some(PHONE_ID)),
    )
    .await;

    // Assert
    assert!(matches!(result, Err(Error::UpstreamRejected { .. })));
}

#[tokio::test]
async fn repeated_subscription_is_accepted() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{WABA_ID}/subscribed_apps")))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(2)
        .mount(&mock_server)
        .await;

    // Act
    graph.subscribe_app(ACCESS_TOKEN, WABA_ID).await.unwrap();
    graph.subscribe_app(ACCESS_TOKEN, WABA_ID).await.unwrap();

    // Assert
    mock_server.verify().await;
}

#[tokio::test]
async fn business_without_wabas_is_not_found() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    mock_code_exchange(&mock_server).await;

    Mock::given(method("GET"))
        .and(path("/v23.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": BUSINESS_ID})))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v23.0/{BUSINESS_ID}/owned_whatsapp_business_accounts"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    // Act
    let result = complete_onboarding(&graph, &config, AUTH_CODE, params(None, None)).await;

    // Assert
    assert!(matches!(result, Err(Error::ResolutionNotFound("WABA"))));
}

#[tokio::test]
async fn token_response_without_access_token_is_a_rejection() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    Mock::given(method("GET"))
        .and(path("/v23.0/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "bearer"})))
        .mount(&mock_server)
        .await;

    // Act
    let result = complete_onboarding(
        &graph,
        &config,
        AUTH_CODE,
        params(Some(WABA_ID), Some(PHONE_ID)),
    )
    .await;

    // Assert
    assert!(matches!(result, Err(Error::UpstreamRejected { .. })));
}

#[tokio::test]
async fn slow_upstream_surfaces_as_timeout() {
    // Arrange
    let mock_server = MockServer::start().await;
    let mut config = test_config(&mock_server.uri());
    config.request_timeout = std::time::Duration::from_millis(200);
    let graph = test_client(&config);

    Mock::given(method("GET"))
        .and(path("/v23.0/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": ACCESS_TOKEN}))
                .set_delay(std::time::Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    // Act
    let result = graph.exchange_code(AUTH_CODE).await;

    // Assert
    match result {
        Err(err @ Error::UpstreamTimeout(_)) => {
            assert_eq!(err.status(), axum::http::StatusCode::GATEWAY_TIMEOUT);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn discovery_resolves_the_full_asset_chain() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    Mock::given(method("GET"))
        .and(path("/v23.0/me"))
        .and(query_param("fields", "id"))
        .and(bearer_token(ACCESS_TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": BUSINESS_ID})))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v23.0/{BUSINESS_ID}/owned_whatsapp_business_accounts"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": WABA_ID}]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v23.0/{WABA_ID}/phone_numbers")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": PHONE_ID}]
        })))
        .mount(&mock_server)
        .await;

    // Act
    let discovery = discover(&graph, ACCESS_TOKEN).await.unwrap();

    // Assert
    assert_eq!(discovery.business_id, BUSINESS_ID);
    assert_eq!(discovery.waba_id, WABA_ID);
    assert_eq!(discovery.phone_number_id, PHONE_ID);
}

#[tokio::test]
async fn discovery_on_a_waba_without_phones_is_not_found() {
    // Arrange
    let mock_server = MockServer::start().await;
    let config = test_config(&mock_server.uri());
    let graph = test_client(&config);

    Mock::given(method("GET"))
        .and(path("/v23.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": BUSINESS_ID})))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v23.0/{BUSINESS_ID}/owned_whatsapp_business_accounts"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": WABA_ID}]
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/v23.0/{WABA_ID}/phone_numbers")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    // Act
    let result = discover(&graph, ACCESS_TOKEN).await;

    // Assert
    assert!(matches!(
        result,
        Err(Error::ResolutionNotFound("phone number"))
    ));
}
