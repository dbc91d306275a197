//! Graph API client.
//!
//! A thin, typed client over the handful of Graph API calls onboarding
//! needs: the OAuth code exchange, webhook subscription, phone registration,
//! and the asset-discovery reads. Error mapping is uniform: transport
//! failures become [`Error::Upstream`] / [`Error::UpstreamTimeout`], and any
//! answer Meta itself rejects becomes [`Error::UpstreamRejected`] with the
//! parsed error envelope attached.

use std::{fmt, str::FromStr};

use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::{
    config::Config,
    error::{Error, GraphError},
};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Client for the subset of the Graph API used during onboarding.
///
/// Holds the app credentials so the code exchange can authenticate itself;
/// every other call authenticates with the caller-supplied business token
/// instead.
#[derive(Clone, Debug)]
pub struct GraphClient {
    http: HttpClient,
    base_url: String,
    api_version: String,
    app_id: String,
    app_secret: String,
    redirect_uri: Option<String>,
}

impl GraphClient {
    /// Builds a client from the service configuration.
    ///
    /// The outbound timeout applies to every request made through this
    /// client; a slow Graph API surfaces as [`Error::UpstreamTimeout`]
    /// rather than hanging a handler.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.graph_base_url.trim_end_matches('/').to_owned(),
            api_version: config.api_version.trim_start_matches('v').to_owned(),
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    /// `{base}/v{version}/{path}`
    fn url(&self, path: &str) -> String {
        format!("{}/v{}/{}", self.base_url, self.api_version, path)
    }

    /// Exchanges an embedded-signup authorization code for a business
    /// access token.
    pub async fn exchange_code(&self, code: &str) -> Result<Token, Error> {
        let request = AccessTokenRequest {
            client_id: &self.app_id,
            client_secret: &self.app_secret,
            code,
            redirect_uri: self.redirect_uri.as_deref(),
        };

        debug!("exchanging authorization code at oauth/access_token");
        self.json_call(
            self.http
                .get(self.url("oauth/access_token"))
                .query(&request),
        )
        .await
    }

    /// Subscribes the app to the WABA's webhook events.
    ///
    /// Safe to repeat: Meta treats an existing subscription as success.
    pub async fn subscribe_app(&self, access_token: &str, waba_id: &str) -> Result<(), Error> {
        debug!(waba_id, "subscribing app to WABA webhook events");
        self.unit_call(
            self.http
                .post(self.url(&format!("{waba_id}/subscribed_apps")))
                .bearer_auth(access_token),
        )
        .await
    }

    /// Registers the phone number for Cloud API messaging with the
    /// two-step verification PIN.
    pub async fn register_phone(
        &self,
        access_token: &str,
        phone_number_id: &str,
        pin: &str,
    ) -> Result<(), Error> {
        let request = RegisterPhoneRequest::from_pin(pin);

        debug!(phone_number_id, "registering phone number");
        self.unit_call(
            self.http
                .post(self.url(&format!("{phone_number_id}/register")))
                .bearer_auth(access_token)
                .json(&request),
        )
        .await
    }

    /// Resolves the business identity behind an access token.
    pub async fn business_id(&self, access_token: &str) -> Result<String, Error> {
        let node: IdOnly = self
            .json_call(
                self.http
                    .get(self.url("me"))
                    .query(&[("fields", "id")])
                    .bearer_auth(access_token),
            )
            .await?;
        Ok(node.id)
    }

    /// First WABA owned by the business, if it owns any.
    pub async fn first_owned_waba(
        &self,
        access_token: &str,
        business_id: &str,
    ) -> Result<Option<String>, Error> {
        let page: Page<IdOnly> = self
            .json_call(
                self.http
                    .get(self.url(&format!(
                        "{business_id}/owned_whatsapp_business_accounts"
                    )))
                    .bearer_auth(access_token),
            )
            .await?;
        Ok(page.data.into_iter().next().map(|node| node.id))
    }

    /// First phone number attached to the WABA, if it has any.
    pub async fn first_phone_number(
        &self,
        access_token: &str,
        waba_id: &str,
    ) -> Result<Option<String>, Error> {
        let page: Page<IdOnly> = self
            .json_call(
                self.http
                    .get(self.url(&format!("{waba_id}/phone_numbers")))
                    .bearer_auth(access_token),
            )
            .await?;
        Ok(page.data.into_iter().next().map(|node| node.id))
    }

    /// Sends a request and deserializes a successful body into `T`.
    async fn json_call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, Error> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(rejected(status, &body));
        }

        serde_json::from_slice(&body).map_err(|err| Error::UpstreamRejected {
            status,
            error: GraphError::raw(format!(
                "unparseable response body ({err}): {}",
                String::from_utf8_lossy(&body)
            )),
        })
    }

    /// Sends a request whose only interesting answer is `{"success": true}`.
    ///
    /// A well-formed `success: false` body is a rejection even under a 2xx
    /// status.
    async fn unit_call(&self, request: RequestBuilder) -> Result<(), Error> {
        let response: SuccessStatus = self.json_call(request).await?;
        if response.success {
            Ok(())
        } else {
            Err(Error::UpstreamRejected {
                status: StatusCode::OK,
                error: GraphError::raw("the Graph API reported success: false"),
            })
        }
    }
}

/// Maps a non-success response body to [`Error::UpstreamRejected`],
/// preferring Meta's `{"error": {...}}` envelope when the body carries one.
fn rejected(status: StatusCode, body: &[u8]) -> Error {
    #[derive(Deserialize)]
    struct Envelope {
        error: GraphError,
    }

    let error = match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) => envelope.error,
        Err(_) => GraphError::raw(String::from_utf8_lossy(body).into_owned()),
    };

    Error::UpstreamRejected { status, error }
}

/// An access token issued by the Graph API.
///
/// The token value never appears in `Debug` output; route it to a response
/// deliberately via [`Token::access_token`] or [`Token::into_access_token`].
#[derive(Deserialize, Clone)]
pub struct Token {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_str_opt")]
    expires_in: Option<i64>,
}

impl Token {
    /// The raw bearer token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Consumes the wrapper, yielding the raw bearer token.
    pub fn into_access_token(self) -> String {
        self.access_token
    }

    /// The token type as reported by Meta, usually `bearer`.
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// Seconds until expiry, when Meta reports one. Absent for
    /// non-expiring business tokens.
    pub fn expires_in(&self) -> Option<i64> {
        self.expires_in
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
}

#[derive(Serialize)]
struct RegisterPhoneRequest<'a> {
    messaging_product: &'static str,
    pin: &'a str,
}

impl<'a> RegisterPhoneRequest<'a> {
    fn from_pin(pin: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            pin,
        }
    }
}

#[derive(Deserialize, Debug)]
struct SuccessStatus {
    success: bool,
}

#[derive(Deserialize, Debug, Default)]
struct IdOnly {
    id: String,
}

/// One page of a Graph API edge listing. Paging cursors are ignored;
/// discovery only ever wants the first entry.
#[derive(Deserialize, Debug)]
struct Page<T> {
    #[serde(default)]
    data: Vec<T>,
}

/// Deserializes a value Meta sometimes sends as a bare number and sometimes
/// as a string.
fn deserialize_str_opt<'de, T, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<T>, D::Error>
where
    T: FromStr + Deserialize<'de>,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawOr<T> {
        Raw(String),
        Tee(T),
    }

    match <Option<RawOr<T>>>::deserialize(deserializer)? {
        Some(RawOr::Raw(s)) => T::from_str(&s)
            .map(Some)
            .map_err(|err| <D::Error as serde::de::Error>::custom(format!("parsing value: {err}"))),
        Some(RawOr::Tee(n)) => Ok(Some(n)),
        None => Ok(None),
    }
}
