//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::Router;
use whatsapp_onboarding_rs::{
    server::{router, AppState},
    Config, GraphClient,
};

pub const APP_ID: &str = "1234567890";
pub const APP_SECRET: &str = "super-secret-app-secret";
pub const BUSINESS_ID: &str = "9876543210";
pub const WABA_ID: &str = "111222333444555";
pub const PHONE_ID: &str = "666777888999000";
pub const ACCESS_TOKEN: &str = "test-business-token";
pub const AUTH_CODE: &str = "test-auth-code";
pub const PIN: &str = "123456";
pub const VERIFY_TOKEN: &str = "test-verify-token";
pub const SUCCESS_URL: &str = "https://business.example.com/done";

/// A config pointed at a mock Graph API.
pub fn test_config(graph_base_url: &str) -> Config {
    Config {
        app_id: APP_ID.into(),
        app_secret: APP_SECRET.into(),
        api_version: "23.0".into(),
        redirect_uri: None,
        default_waba_id: None,
        default_phone_number_id: None,
        phone_pin: PIN.into(),
        verify_token: VERIFY_TOKEN.into(),
        success_url: SUCCESS_URL.into(),
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        graph_base_url: graph_base_url.trim_end_matches('/').into(),
        request_timeout: Duration::from_secs(5),
        log_file: None,
    }
}

pub fn test_client(config: &Config) -> GraphClient {
    GraphClient::new(config).unwrap()
}

/// A full service router backed by a mock Graph API.
pub fn test_app(graph_base_url: &str) -> Router {
    test_app_with(test_config(graph_base_url))
}

pub fn test_app_with(config: Config) -> Router {
    let graph = test_client(&config);
    router(Arc::new(AppState { config, graph }))
}
