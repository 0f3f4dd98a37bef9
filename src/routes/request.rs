use serde::Deserialize;

use crate::normalization;

/// A request for a confirmation code.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(deserialize_with = "normalization::deserialize_username")]
    pub(crate) username: String,

    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub(crate) email: String,
}

/// A request to exchange a confirmation code for an access token.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    #[serde(deserialize_with = "normalization::deserialize_username")]
    pub(crate) username: String,

    pub(crate) confirmation_code: String,
}
