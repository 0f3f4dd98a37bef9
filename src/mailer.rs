use std::sync::{Arc, RwLock};

use futures::future::{BoxFuture, FutureExt};
use log::{info, Logger};
use uuid::Uuid;

use crate::errors::BackendError;
use crate::user::User;

/// Delivers confirmation codes to users.
pub trait Mailer: Send + Sync {
    fn send_confirmation_code(&self, user: &User, code: &Uuid)
        -> BoxFuture<Result<(), BackendError>>;
}

/// A mailer that writes each code to the log instead of sending it.
pub struct LogMailer {
    logger: Arc<Logger>,
}

impl LogMailer {
    pub fn new(logger: Arc<Logger>) -> Self {
        LogMailer { logger }
    }
}

impl Mailer for LogMailer {
    fn send_confirmation_code(
        &self,
        user: &User,
        code: &Uuid,
    ) -> BoxFuture<Result<(), BackendError>> {
        info!(self.logger, "Confirmation code issued"; "username" => user.username(), "email" => user.email(), "code" => %code);

        futures::future::ready(Ok(())).boxed()
    }
}

/// A mailer that keeps every message, for tests.
#[derive(Default)]
pub struct Outbox {
    sent: RwLock<Vec<(String, Uuid)>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent code sent to `email`.
    pub fn latest_code(&self, email: &str) -> Option<Uuid> {
        self.sent
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| *code)
    }

    pub fn len(&self) -> usize {
        self.sent
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Mailer for Outbox {
    fn send_confirmation_code(
        &self,
        user: &User,
        code: &Uuid,
    ) -> BoxFuture<Result<(), BackendError>> {
        self.sent
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((user.email().to_owned(), *code));

        futures::future::ready(Ok(())).boxed()
    }
}
