//! GoodWe SEMS Portal API.

use std::time::Duration;

use reqwest::{
    Client,
    StatusCode,
    Url,
    header::{ACCEPT, HeaderMap, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prelude::*;

pub const LOGIN_URL: &str = "https://www.semsportal.com/api/v2/Common/CrossLogin";

const PLANT_DETAILS_PATH: &str = "/v2/PowerStation/GetMonitorDetailByPowerstationId";

const TIMEOUT: Duration = Duration::from_secs(30);

/// SEMS authenticates with a JSON document in a custom `token` header.
const TOKEN_HEADER: &str = "token";

/// The `token` header value before logging in.
const ANONYMOUS_TOKEN: &str = r#"{"version":"","client":"ios","language":"en"}"#;

/// Query response `msg` of a successful call. Anything else means the token has gone stale.
const SUCCESS_MESSAGE: &str = "success";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to call the login endpoint")]
    Transport(#[source] reqwest::Error),

    #[error("login rejected with {0}")]
    Rejected(StatusCode),

    #[error("login response carries no token ({})", .message.as_deref().unwrap_or("no message"))]
    MissingToken { message: Option<String> },

    #[error("login token cannot be sent in a header")]
    InvalidToken,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("out of token renewal retries")]
    OutOfRetries,

    #[error("failed to log in")]
    Auth(#[from] AuthError),

    #[error("failed to query the plant details")]
    Transport(#[source] reqwest::Error),
}

pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Logged-in session.
struct Session {
    /// Login response data together with the API base URL, serialized.
    token: HeaderValue,

    /// Regional API base URL assigned at login.
    api_base: String,
}

pub struct Api {
    client: Client,
    login_url: Url,
    credentials: Credentials,
    session: Option<Session>,
}

impl Api {
    pub fn new(login_url: Url, credentials: Credentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .user_agent("sems-influx")
            .default_headers(headers)
            .timeout(TIMEOUT)
            .build()?;
        Ok(Self { client, login_url, credentials, session: None })
    }

    #[must_use]
    pub const fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }

    /// Log in and replace the current session, if any.
    ///
    /// On failure, the API stays logged out.
    pub async fn login(&mut self) -> Result<(), AuthError> {
        self.session = None;
        self.session = Some(self.authenticate().await?);
        Ok(())
    }

    /// Fetch the plant details document.
    ///
    /// A failed query is treated as an expired token: the API logs in again and retries the query.
    /// That makes at most `max_renewals + 1` queries, with a login before each retry.
    /// Zero `max_renewals` fails without touching the network.
    #[instrument(skip_all, fields(plant_id = plant_id))]
    pub async fn get_plant_details(&mut self, plant_id: &str, max_renewals: u32) -> Result<Value, FetchError> {
        if max_renewals == 0 {
            warn!("no token renewals allowed");
            return Err(FetchError::OutOfRetries);
        }
        debug!(is_logged_in = self.is_logged_in(), "fetching the plant details…");
        let mut n_renewals_left = max_renewals;
        loop {
            let session = match self.session.take() {
                Some(session) => session,
                None => self.authenticate().await?,
            };
            match self.query(&session, plant_id).await {
                Ok(Some(document)) => {
                    self.session = Some(session);
                    return Ok(document);
                }
                Ok(None) => {
                    if n_renewals_left == 0 {
                        warn!("out of token renewals, giving up for now");
                        return Err(FetchError::OutOfRetries);
                    }
                    n_renewals_left -= 1;
                    info!(n_renewals_left, "renewing the token…");
                }
                Err(error) => {
                    self.session = Some(session);
                    return Err(error);
                }
            }
        }
    }

    #[instrument(skip_all, fields(username = self.credentials.username.as_str()))]
    async fn authenticate(&self) -> Result<Session, AuthError> {
        #[derive(Serialize)]
        struct LoginRequest<'a> {
            #[serde(rename = "account")]
            username: &'a str,

            #[serde(rename = "pwd")]
            password: &'a str,
        }

        #[derive(Deserialize)]
        struct LoginResponse {
            #[serde(rename = "msg")]
            message: Option<String>,

            data: Option<Map<String, Value>>,

            #[serde(rename = "api")]
            api_base: Option<String>,
        }

        info!("logging in…");
        let response = self
            .client
            .post(self.login_url.clone())
            .header(TOKEN_HEADER, ANONYMOUS_TOKEN)
            .json(&LoginRequest {
                username: &self.credentials.username,
                password: &self.credentials.password,
            })
            .send()
            .await
            .map_err(AuthError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(status));
        }
        let response: LoginResponse = response.json().await.map_err(AuthError::Transport)?;
        let (Some(mut token), Some(api_base)) = (response.data, response.api_base) else {
            return Err(AuthError::MissingToken { message: response.message });
        };
        token.insert("api".to_owned(), Value::String(api_base.clone()));
        let token = HeaderValue::from_str(&Value::Object(token).to_string())
            .map_err(|_| AuthError::InvalidToken)?;
        info!(api_base = api_base.as_str(), "logged in");
        Ok(Session { token, api_base })
    }

    /// Query the plant details, [`None`] when the server refuses to answer.
    #[instrument(skip_all, level = Level::DEBUG)]
    async fn query(&self, session: &Session, plant_id: &str) -> Result<Option<Value>, FetchError> {
        #[derive(Serialize)]
        struct PlantDetailsRequest<'a> {
            #[serde(rename = "powerStationId")]
            plant_id: &'a str,
        }

        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "msg")]
            message: Option<String>,

            data: Option<Value>,
        }

        let url = format!("{}{PLANT_DETAILS_PATH}", session.api_base.trim_end_matches('/'));
        debug!(url = url.as_str(), "querying…");
        let envelope: Envelope = self
            .client
            .post(url)
            .header(TOKEN_HEADER, session.token.clone())
            .json(&PlantDetailsRequest { plant_id })
            .send()
            .await
            .map_err(FetchError::Transport)?
            .json()
            .await
            .map_err(FetchError::Transport)?;
        match envelope {
            Envelope { message: Some(message), data: Some(document) } if message == SUCCESS_MESSAGE => {
                Ok(Some(document))
            }
            Envelope { message, .. } => {
                warn!(?message, "query failed");
                Ok(None)
            }
        }
    }
}
