//! Service configuration.
//!
//! All settings come from the process environment (optionally seeded from a
//! `.env` file). Secrets stay inside [`Config`] after loading; nothing here
//! logs them.

use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{bail, Context};

/// Graph API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "23.0";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.facebook.com";
const DEFAULT_SUCCESS_URL: &str = "https://business.facebook.com/wa/manage/home/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Runtime configuration for the onboarding service.
///
/// Everything the request path needs is an explicit field here; handlers
/// never read the process environment.
#[derive(Clone, Debug)]
pub struct Config {
    /// Meta app (client) id used for the OAuth code exchange.
    pub app_id: String,
    /// Meta app secret. Also keys the webhook payload signature check.
    pub app_secret: String,
    /// Graph API version, without the leading `v`.
    pub api_version: String,
    /// `redirect_uri` to echo during the code exchange, when the embedded
    /// signup flow was configured with one.
    pub redirect_uri: Option<String>,
    /// WABA to subscribe when the callback does not name one.
    pub default_waba_id: Option<String>,
    /// Phone number to register when the callback does not name one.
    pub default_phone_number_id: Option<String>,
    /// Two-step verification PIN sent with phone registration.
    pub phone_pin: String,
    /// Shared secret echoed back during the webhook handshake.
    pub verify_token: String,
    /// Where the browser lands after a successful onboarding run.
    pub success_url: String,
    /// Socket address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Base URL of the Graph API, without a trailing slash.
    pub graph_base_url: String,
    /// Upper bound on each outbound Graph API call.
    pub request_timeout: Duration,
    /// Optional log file appended to alongside stdout.
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from the environment, reading `.env` first if one
    /// is present.
    ///
    /// Fails fast on missing required settings so a misconfigured deployment
    /// never reaches the first onboarding callback.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr = var("WA_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_owned())
            .parse()
            .context("WA_LISTEN_ADDR must be a valid socket address")?;

        let request_timeout = match var("WA_REQUEST_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .context("WA_REQUEST_TIMEOUT_SECS must be a positive integer")?,
            ),
            None => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        Ok(Self {
            app_id: required("WA_APP_ID")?,
            app_secret: required("WA_APP_SECRET")?,
            api_version: var("WA_API_VERSION")
                .map(|v| v.trim_start_matches('v').to_owned())
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_owned()),
            redirect_uri: var("WA_REDIRECT_URI"),
            default_waba_id: var("WA_DEFAULT_WABA_ID"),
            default_phone_number_id: var("WA_DEFAULT_PHONE_NUMBER_ID"),
            phone_pin: required("WA_PHONE_PIN")?,
            verify_token: required("WA_VERIFY_TOKEN")?,
            success_url: var("WA_SUCCESS_URL").unwrap_or_else(|| DEFAULT_SUCCESS_URL.to_owned()),
            listen_addr,
            graph_base_url: var("WA_GRAPH_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_owned()),
            request_timeout,
            log_file: var("WA_LOG_FILE").map(PathBuf::from),
        })
    }
}

/// Reads an environment variable, treating unset and empty the same.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn required(name: &str) -> anyhow::Result<String> {
    match var(name) {
        Some(value) => Ok(value),
        None => bail!("required environment variable {name} is not set"),
    }
}
