use std::sync::Arc;
use std::time::Duration;

use log::Logger;

use crate::db::Db;
use crate::mailer::Mailer;
use crate::urls::Urls;

/// Everything a request handler needs, cheap to clone into each route.
#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub mailer: Arc<dyn Mailer>,
    pub urls: Arc<Urls>,
    pub config: Arc<Config>,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        mailer: Arc<dyn Mailer>,
        urls: Arc<Urls>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            mailer,
            urls,
            config: Arc::new(config),
        }
    }
}

/// How long an access token stays valid unless configured otherwise.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a confirmation code can be exchanged unless configured otherwise.
pub const DEFAULT_CODE_LIFETIME: Duration = Duration::from_secs(3 * 24 * 60 * 60);

#[derive(Clone, Debug)]
pub struct Config {
    /// The reserved username that addresses the current user's record.
    pub(crate) profile_keyword: String,
    token_lifetime: Duration,
    code_lifetime: Duration,
}

impl Config {
    pub fn new(profile_keyword: impl Into<String>) -> Self {
        Self {
            profile_keyword: profile_keyword.into(),
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            code_lifetime: DEFAULT_CODE_LIFETIME,
        }
    }

    pub fn with_token_lifetime(self, token_lifetime: Duration) -> Self {
        Self { token_lifetime, ..self }
    }

    pub fn with_code_lifetime(self, code_lifetime: Duration) -> Self {
        Self { code_lifetime, ..self }
    }

    pub fn profile_keyword(&self) -> &str {
        &self.profile_keyword
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    pub fn code_lifetime(&self) -> Duration {
        self.code_lifetime
    }
}
