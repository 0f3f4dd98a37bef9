use std::sync::Arc;

use log::{error, warn, Logger};
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, WithStatus};
use warp::Filter;

use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod rejection;
mod request;
mod response;

pub use internal::*;

/// How a request identifies its sender.
#[derive(Clone, Debug, PartialEq)]
pub enum Credentials {
    Anonymous,
    Bearer(Uuid),
}

/// Parses an `Authorization` header of the form `Bearer <token>`.
pub fn parse_credentials(header: Option<&str>) -> Result<Credentials, BackendError> {
    let header = match header {
        Some(header) => header.trim(),
        None => return Ok(Credentials::Anonymous),
    };

    let (scheme, token) = header
        .split_once(' ')
        .ok_or(BackendError::MalformedCredentials)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BackendError::MalformedCredentials);
    }

    Uuid::parse_str(token.trim())
        .map(Credentials::Bearer)
        .map_err(|_| BackendError::MalformedCredentials)
}

/// Extracts the request's [`Credentials`].
pub fn credentials() -> impl Filter<Extract = (Credentials,), Error = reject::Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(|header: Option<String>| {
        futures::future::ready(parse_credentials(header.as_deref()).map_err(|e| {
            reject::Rejection::from(rejection::Rejection::new(
                rejection::Context::credentials(),
                e,
            ))
        }))
    })
}

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            warn!(logger, "Request rejected"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status));
    }

    if let Some(e) = rej.find::<warp::filters::body::BodyDeserializeError>() {
        warn!(logger, "Malformed body"; "message" => %e);

        return Ok(with_status(
            json(&serde_json::json!({ "message": e.to_string() })),
            StatusCode::BAD_REQUEST,
        ));
    }

    if let Some(e) = rej.find::<reject::InvalidQuery>() {
        warn!(logger, "Malformed query"; "message" => %e);

        return Ok(with_status(
            json(&serde_json::json!({ "message": e.to_string() })),
            StatusCode::BAD_REQUEST,
        ));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        ValidationFailed(..) | ConflictUnique { .. } | UnknownSlug { .. } => {
            StatusCode::BAD_REQUEST
        }
        NotAuthenticated | InvalidToken { .. } | MalformedCredentials => StatusCode::UNAUTHORIZED,
        Forbidden => StatusCode::FORBIDDEN,
        NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use std::convert::Infallible;
    use std::sync::Arc;

    use warp::body::json;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, patch, path as p, path::param as par, post, query};

    use super::{credentials, format_rejection, handlers};
    use crate::catalog::{LabelKind, SearchQuery, TitleFilter};
    use crate::environment::Environment;
    use crate::user::Id;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p("api"))
                .and(p("v1"));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .map(|reply: Box<dyn Reply>| reply)
                .boxed()
        }
    );
}

    fn kind(kind: LabelKind) -> impl Filter<Extract = (LabelKind,), Error = Infallible> + Clone {
        warp::any().map(move || kind)
    }

    route!(make_signup_route => signup, rt; p("auth"), p("signup"), end(), post(), json());
    route!(make_token_route => token, rt; p("auth"), p("token"), end(), post(), json());

    route!(make_users_list_route => users_list, rt; p("users"), end(), g(), credentials(), query::<SearchQuery>());
    route!(make_users_create_route => users_create, rt; p("users"), end(), post(), credentials(), json());
    route!(make_user_retrieve_route => user_retrieve, rt; p("users"), par::<String>(), end(), g(), credentials());
    route!(make_user_update_route => user_update, rt; p("users"), par::<String>(), end(), patch(), credentials(), json());
    route!(make_user_delete_route => user_delete, rt; p("users"), par::<String>(), end(), delete(), credentials());

    route!(make_categories_list_route => labels_list, rt; p("categories"), end(), g(), kind(LabelKind::Category), credentials(), query::<SearchQuery>());
    route!(make_categories_create_route => label_create, rt; p("categories"), end(), post(), kind(LabelKind::Category), credentials(), json());
    route!(make_category_delete_route => label_delete, rt; p("categories"), par::<String>(), end(), delete(), kind(LabelKind::Category), credentials());
    route!(make_genres_list_route => labels_list, rt; p("genres"), end(), g(), kind(LabelKind::Genre), credentials(), query::<SearchQuery>());
    route!(make_genres_create_route => label_create, rt; p("genres"), end(), post(), kind(LabelKind::Genre), credentials(), json());
    route!(make_genre_delete_route => label_delete, rt; p("genres"), par::<String>(), end(), delete(), kind(LabelKind::Genre), credentials());

    route!(make_titles_list_route => titles_list, rt; p("titles"), end(), g(), credentials(), query::<TitleFilter>());
    route!(make_titles_create_route => title_create, rt; p("titles"), end(), post(), credentials(), json());
    route!(make_title_retrieve_route => title_retrieve, rt; p("titles"), par::<Id>(), end(), g(), credentials());
    route!(make_title_update_route => title_update, rt; p("titles"), par::<Id>(), end(), patch(), credentials(), json());
    route!(make_title_delete_route => title_delete, rt; p("titles"), par::<Id>(), end(), delete(), credentials());

    route!(make_reviews_list_route => reviews_list, rt; p("titles"), par::<Id>(), p("reviews"), end(), g(), credentials());
    route!(make_reviews_create_route => review_create, rt; p("titles"), par::<Id>(), p("reviews"), end(), post(), credentials(), json());
    route!(make_review_retrieve_route => review_retrieve, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), end(), g(), credentials());
    route!(make_review_update_route => review_update, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), end(), patch(), credentials(), json());
    route!(make_review_delete_route => review_delete, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), end(), delete(), credentials());

    route!(make_comments_list_route => comments_list, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), p("comments"), end(), g(), credentials());
    route!(make_comments_create_route => comment_create, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), p("comments"), end(), post(), credentials(), json());
    route!(make_comment_retrieve_route => comment_retrieve, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), p("comments"), par::<Id>(), end(), g(), credentials());
    route!(make_comment_update_route => comment_update, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), p("comments"), par::<Id>(), end(), patch(), credentials(), json());
    route!(make_comment_delete_route => comment_delete, rt; p("titles"), par::<Id>(), p("reviews"), par::<Id>(), p("comments"), par::<Id>(), end(), delete(), credentials());

    // the profile keyword is only known at runtime, so these can't use `route!`
    pub fn make_profile_retrieve_route(environment: Environment) -> Route {
        let keyword = environment.config.profile_keyword().to_owned();

        warp::any()
            .map(move || environment.clone())
            .and(p("api"))
            .and(p("v1"))
            .and(p("users"))
            .and(p(keyword))
            .and(end())
            .and(g())
            .and(credentials())
            .and_then(handlers::profile_retrieve)
            .map(|reply: Box<dyn Reply>| reply)
            .boxed()
    }

    pub fn make_profile_update_route(environment: Environment) -> Route {
        let keyword = environment.config.profile_keyword().to_owned();

        warp::any()
            .map(move || environment.clone())
            .and(p("api"))
            .and(p("v1"))
            .and(p("users"))
            .and(p(keyword))
            .and(end())
            .and(patch())
            .and(credentials())
            .and(json())
            .and_then(handlers::profile_update)
            .map(|reply: Box<dyn Reply>| reply)
            .boxed()
    }

    /// Every API route, with rejections rendered as JSON.
    pub fn make_api(
        environment: Environment,
    ) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
        let logger = environment.logger.clone();

        make_signup_route(environment.clone())
            .or(make_token_route(environment.clone()))
            .unify()
            .or(make_users_list_route(environment.clone()))
            .unify()
            .or(make_users_create_route(environment.clone()))
            .unify()
            // the profile routes must come before the per-user ones
            .or(make_profile_retrieve_route(environment.clone()))
            .unify()
            .or(make_profile_update_route(environment.clone()))
            .unify()
            .or(make_user_retrieve_route(environment.clone()))
            .unify()
            .or(make_user_update_route(environment.clone()))
            .unify()
            .or(make_user_delete_route(environment.clone()))
            .unify()
            .or(make_categories_list_route(environment.clone()))
            .unify()
            .or(make_categories_create_route(environment.clone()))
            .unify()
            .or(make_category_delete_route(environment.clone()))
            .unify()
            .or(make_genres_list_route(environment.clone()))
            .unify()
            .or(make_genres_create_route(environment.clone()))
            .unify()
            .or(make_genre_delete_route(environment.clone()))
            .unify()
            .or(make_titles_list_route(environment.clone()))
            .unify()
            .or(make_titles_create_route(environment.clone()))
            .unify()
            .or(make_title_retrieve_route(environment.clone()))
            .unify()
            .or(make_title_update_route(environment.clone()))
            .unify()
            .or(make_title_delete_route(environment.clone()))
            .unify()
            .or(make_reviews_list_route(environment.clone()))
            .unify()
            .or(make_reviews_create_route(environment.clone()))
            .unify()
            .or(make_review_retrieve_route(environment.clone()))
            .unify()
            .or(make_review_update_route(environment.clone()))
            .unify()
            .or(make_review_delete_route(environment.clone()))
            .unify()
            .or(make_comments_list_route(environment.clone()))
            .unify()
            .or(make_comments_create_route(environment.clone()))
            .unify()
            .or(make_comment_retrieve_route(environment.clone()))
            .unify()
            .or(make_comment_update_route(environment.clone()))
            .unify()
            .or(make_comment_delete_route(environment))
            .unify()
            .recover(move |r| format_rejection(Arc::clone(&logger), r))
    }
}
