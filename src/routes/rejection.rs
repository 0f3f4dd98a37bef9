use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;
use crate::user::Id;
use crate::validation::ValidationErrors;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            context: self.context.clone(),
            message: format!("{}", self.error),
            errors: self.error.validation_errors().cloned(),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) errors: Option<ValidationErrors>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Comment { title: Id, review: Id, comment: Id },
    Comments { title: Id, review: Id },
    Label { kind: &'static str, slug: String },
    Labels { kind: &'static str },
    Review { title: Id, review: Id },
    Reviews { title: Id },
    Signup { username: String },
    Title { title: Id },
    Token { username: String },
    User { username: String },
    Credentials {},
    Profile {},
    Titles {},
    Users {},
}

impl Context {
    pub fn comment(title: Id, review: Id, comment: Id) -> Context {
        Context::Comment {
            title,
            review,
            comment,
        }
    }

    pub fn comments(title: Id, review: Id) -> Context {
        Context::Comments { title, review }
    }

    pub fn credentials() -> Context {
        Context::Credentials {}
    }

    pub fn label(kind: &'static str, slug: String) -> Context {
        Context::Label { kind, slug }
    }

    pub fn labels(kind: &'static str) -> Context {
        Context::Labels { kind }
    }

    pub fn profile() -> Context {
        Context::Profile {}
    }

    pub fn review(title: Id, review: Id) -> Context {
        Context::Review { title, review }
    }

    pub fn reviews(title: Id) -> Context {
        Context::Reviews { title }
    }

    pub fn signup(username: String) -> Context {
        Context::Signup { username }
    }

    pub fn title(title: Id) -> Context {
        Context::Title { title }
    }

    pub fn titles() -> Context {
        Context::Titles {}
    }

    pub fn token(username: String) -> Context {
        Context::Token { username }
    }

    pub fn user(username: String) -> Context {
        Context::User { username }
    }

    pub fn users() -> Context {
        Context::Users {}
    }
}
