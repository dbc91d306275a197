//! Onboarding pipeline.
//!
//! The embedded-signup callback drives a fixed sequence: exchange the
//! authorization code for a business token, subscribe the WABA to webhook
//! events, register the phone number. Each step short-circuits the run on
//! failure; in particular, a phone is never registered under a WABA whose
//! subscription did not go through.

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::Error,
    graph::{GraphClient, Token},
};

/// Per-request overrides for the assets to onboard.
///
/// Anything left `None` falls back to the configured defaults, and failing
/// those, to asset discovery against the token's business.
#[derive(Clone, Debug, Default)]
pub struct OnboardingParams {
    pub waba_id: Option<String>,
    pub phone_number_id: Option<String>,
}

/// The outcome of a completed onboarding run.
#[derive(Debug)]
pub struct Onboarded {
    /// The business access token obtained from the code exchange.
    pub token: Token,
    /// The WABA that was subscribed.
    pub waba_id: String,
    /// The phone number that was registered.
    pub phone_number_id: String,
}

/// Assets resolved by walking the business graph from a token alone.
#[derive(Serialize, Debug)]
pub struct Discovery {
    pub business_id: String,
    pub waba_id: String,
    pub phone_number_id: String,
}

/// Runs the full onboarding sequence for one authorization code.
///
/// Asset resolution order is request parameters, then configured defaults,
/// then discovery. Discovery resolving nothing is a
/// [`Error::ResolutionNotFound`]; the caller's business simply has no such
/// asset yet.
pub async fn complete_onboarding(
    graph: &GraphClient,
    config: &Config,
    code: &str,
    params: OnboardingParams,
) -> Result<Onboarded, Error> {
    if code.trim().is_empty() {
        return Err(Error::MissingParameter("code"));
    }

    info!("exchanging authorization code for a business token");
    let token = graph.exchange_code(code).await?;
    let access_token = token.access_token();

    let waba_id = match params.waba_id.or_else(|| config.default_waba_id.clone()) {
        Some(id) => id,
        None => {
            info!("no WABA supplied, discovering one from the token's business");
            let business_id = graph.business_id(access_token).await?;
            graph
                .first_owned_waba(access_token, &business_id)
                .await?
                .ok_or(Error::ResolutionNotFound("WABA"))?
        }
    };

    info!(%waba_id, "subscribing app to WABA webhook events");
    if let Err(err) = graph.subscribe_app(access_token, &waba_id).await {
        // Without a live subscription this onboarding is useless; stop
        // before touching the phone.
        warn!(%waba_id, "webhook subscription failed, aborting onboarding");
        return Err(err);
    }

    let phone_number_id = match params
        .phone_number_id
        .or_else(|| config.default_phone_number_id.clone())
    {
        Some(id) => id,
        None => {
            info!(%waba_id, "no phone number supplied, picking the WABA's first");
            graph
                .first_phone_number(access_token, &waba_id)
                .await?
                .ok_or(Error::ResolutionNotFound("phone number"))?
        }
    };

    info!(%phone_number_id, "registering phone number for Cloud API messaging");
    graph
        .register_phone(access_token, &phone_number_id, &config.phone_pin)
        .await?;

    info!(%waba_id, %phone_number_id, "onboarding complete");
    Ok(Onboarded {
        token,
        waba_id,
        phone_number_id,
    })
}

/// Walks the business graph from an access token: business identity, first
/// owned WABA, first phone number on that WABA.
pub async fn discover(graph: &GraphClient, access_token: &str) -> Result<Discovery, Error> {
    let business_id = graph.business_id(access_token).await?;
    let waba_id = graph
        .first_owned_waba(access_token, &business_id)
        .await?
        .ok_or(Error::ResolutionNotFound("WABA"))?;
    let phone_number_id = graph
        .first_phone_number(access_token, &waba_id)
        .await?
        .ok_or(Error::ResolutionNotFound("phone number"))?;

    Ok(Discovery {
        business_id,
        waba_id,
        phone_number_id,
    })
}
