//! # whatsapp-onboarding-rs 🦀
//!
//! An HTTP service for **WhatsApp Business Platform embedded signup**.
//! It turns the browser redirect at the end of the signup flow into a fully
//! onboarded business: the authorization code is exchanged for a business
//! access token, the WhatsApp Business Account (WABA) is subscribed to the
//! app's webhook events, and the phone number is registered for Cloud API
//! messaging with the configured PIN.
//!
//! ## What's inside
//!
//! - 🔑 **Code exchange** against `oauth/access_token`
//! - 📬 **Webhook subscription** via `{waba}/subscribed_apps`
//! - 📱 **Phone registration** via `{phone}/register`
//! - 🔍 **Asset discovery** when the callback names no WABA or phone
//! - ✅ **Webhook verification** handshake and signed event intake
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::sync::Arc;
//! use whatsapp_onboarding_rs::{server, Config, GraphClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let graph = GraphClient::new(&config)?;
//!     let state = Arc::new(server::AppState { config, graph });
//!     server::serve(state).await?;
//!     Ok(())
//! }
//! ```
//!
//! The binary in `src/main.rs` does exactly this, plus tracing setup.

pub mod config;
pub mod error;
pub mod graph;
pub mod onboarding;
pub mod server;

pub use config::Config;
pub use error::{Error, GraphError};
pub use graph::{GraphClient, Token};
pub use onboarding::{complete_onboarding, discover, Discovery, Onboarded, OnboardingParams};
