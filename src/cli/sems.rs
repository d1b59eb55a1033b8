use clap::Parser;
use reqwest::Url;

use crate::{
    api::sems::{Api, Credentials, LOGIN_URL},
    prelude::*,
};

#[derive(Parser)]
pub struct SemsArgs {
    /// SEMS Portal account, a visitor account is enough.
    #[clap(long = "sems-username", env = "SEMS_USERNAME")]
    pub username: String,

    #[clap(long = "sems-password", env = "SEMS_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Power station ID, as seen in the SEMS Portal URL.
    #[clap(long = "sems-plant-id", env = "SEMS_PLANT_ID")]
    pub plant_id: String,

    #[clap(long = "sems-login-url", env = "SEMS_LOGIN_URL", default_value = LOGIN_URL)]
    pub login_url: Url,

    /// How many times to log in again when the plant query fails.
    #[clap(long = "sems-max-token-retries", env = "SEMS_MAX_TOKEN_RETRIES", default_value = "2")]
    pub max_token_retries: u32,
}

impl SemsArgs {
    pub fn new_client(&self) -> Result<Api> {
        let credentials = Credentials { username: self.username.clone(), password: self.password.clone() };
        Api::new(self.login_url.clone(), credentials)
    }
}
