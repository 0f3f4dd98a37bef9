use std::time::{Duration, Instant};

use log::{debug, info};
use uuid::Uuid;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::authorization::{authorize, decide, Action, ResourceKind, Target};
use crate::catalog::{Label, LabelKind, SearchQuery, TitleChanges, TitleDraft, TitleFilter, TitleView};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::review::{Comment, CommentChanges, CommentDraft, Review, ReviewChanges, ReviewDraft};
use crate::routes::{
    rejection::{Context, Rejection},
    request::{SignupRequest, TokenRequest},
    response::SuccessResponse,
    Credentials,
};
use crate::user::{Actor, Id, NewUser, User, UserChanges};
use crate::validation::{self, ValidationErrors};

const SERVER_TIMING_HEADER: &str = "server-timing";
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($body:tt)*) => {{
        let start = Instant::now();

        let result = { $($body)* };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    }};
}

pub async fn signup(environment: Environment, request: SignupRequest) -> RouteResult {
    timed! {
        let SignupRequest { username, email } = request;
        let error_handler = |e: BackendError| Rejection::new(Context::signup(username.clone()), e);
        let db = &environment.db;

        let existing = db.retrieve_user(&username).await.map_err(error_handler)?;

        // signing up again with the same pair just issues a new code
        let user = match existing {
            Some(user) if user.email() == email => user,
            _ => {
                let new_user = NewUser::signup(&username, &email);
                new_user
                    .validate(environment.config.profile_keyword())
                    .map_err(BackendError::from)
                    .map_err(error_handler)?;

                db.create_user(new_user)
                    .await
                    .map_err(BackendError::conflict_as_validation)
                    .map_err(error_handler)?
            }
        };

        let code = Uuid::new_v4();
        db.store_confirmation_code(user.id(), &code)
            .await
            .map_err(error_handler)?;
        environment
            .mailer
            .send_confirmation_code(&user, &code)
            .await
            .map_err(error_handler)?;

        info!(environment.logger, "Issued confirmation code"; "username" => user.username());

        json(&SuccessResponse::Signup {
            username: user.username().to_owned(),
            email: user.email().to_owned(),
        })
    }
}

pub async fn token(environment: Environment, request: TokenRequest) -> RouteResult {
    timed! {
        let TokenRequest { username, confirmation_code } = request;
        let error_handler = |e: BackendError| Rejection::new(Context::token(username.clone()), e);
        let db = &environment.db;

        let user = db
            .retrieve_user(&username)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| BackendError::not_found("user", &username))
            .map_err(error_handler)?;

        let invalid_code = || {
            BackendError::from(ValidationErrors::single(
                "confirmation_code",
                "invalid confirmation code",
            ))
        };

        let code = Uuid::parse_str(confirmation_code.trim())
            .map_err(|_| invalid_code())
            .map_err(error_handler)?;

        if !db
            .consume_confirmation_code(user.id(), &code, environment.config.code_lifetime())
            .await
            .map_err(error_handler)?
        {
            return Err(error_handler(invalid_code()).into());
        }

        let token = db
            .create_access_token(user.id(), environment.config.token_lifetime())
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Issued access token"; "username" => user.username());

        json(&SuccessResponse::Token { token })
    }
}

pub async fn users_list(
    environment: Environment,
    credentials: Credentials,
    query: SearchQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::users(), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::User)).map_err(error_handler)?;

        let users = environment
            .db
            .list_users(query.search)
            .await
            .map_err(error_handler)?;

        json(&users)
    }
}

pub async fn users_create(
    environment: Environment,
    credentials: Credentials,
    new_user: NewUser,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::users(), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Create, &Target::of(ResourceKind::User)).map_err(error_handler)?;

        new_user
            .validate(environment.config.profile_keyword())
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let user = environment
            .db
            .create_user(new_user)
            .await
            .map_err(BackendError::conflict_as_validation)
            .map_err(error_handler)?;

        info!(environment.logger, "Created user"; "username" => user.username(), "role" => %user.role());

        with_header(
            with_status(json(&user), StatusCode::CREATED),
            "location",
            environment.urls.user(user.username()).as_str(),
        )
    }
}

pub async fn user_retrieve(
    environment: Environment,
    username: String,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::user(username.clone()), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::User)).map_err(error_handler)?;

        let user = find_user(&environment, &username).await.map_err(error_handler)?;

        json(&user)
    }
}

pub async fn user_update(
    environment: Environment,
    username: String,
    credentials: Credentials,
    changes: UserChanges,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::user(username.clone()), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Update, &Target::of(ResourceKind::User)).map_err(error_handler)?;

        if changes.touches_role() {
            authorize(&actor, Action::Update, &Target::of(ResourceKind::Role))
                .map_err(error_handler)?;
        }

        let user = find_user(&environment, &username).await.map_err(error_handler)?;
        let user = update_user(&environment, user.id(), changes)
            .await
            .map_err(error_handler)?;

        json(&user)
    }
}

pub async fn user_delete(
    environment: Environment,
    username: String,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::user(username.clone()), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Delete, &Target::of(ResourceKind::User)).map_err(error_handler)?;

        let user = find_user(&environment, &username).await.map_err(error_handler)?;
        environment
            .db
            .delete_user(user.id())
            .await
            .map_err(error_handler)?;

        info!(environment.logger, "Deleted user"; "username" => &username);

        StatusCode::NO_CONTENT
    }
}

pub async fn profile_retrieve(environment: Environment, credentials: Credentials) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::profile(), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        let user = own_profile(&actor, Action::Read).map_err(error_handler)?;

        json(user)
    }
}

pub async fn profile_update(
    environment: Environment,
    credentials: Credentials,
    mut changes: UserChanges,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::profile(), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        let user = own_profile(&actor, Action::Update).map_err(error_handler)?;

        let may_assign_roles =
            decide(&actor, Action::Update, &Target::of(ResourceKind::Role)).is_allowed();

        if !may_assign_roles && changes.strip_role() {
            debug!(environment.logger, "Ignoring role change on own profile"; "username" => user.username());
        }

        let user = update_user(&environment, user.id(), changes)
            .await
            .map_err(error_handler)?;

        json(&user)
    }
}

pub async fn labels_list(
    environment: Environment,
    kind: LabelKind,
    credentials: Credentials,
    query: SearchQuery,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::labels(kind.as_str()), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(resource_kind(kind))).map_err(error_handler)?;

        let labels = environment
            .db
            .list_labels(kind, query.search)
            .await
            .map_err(error_handler)?;

        json(&labels)
    }
}

pub async fn label_create(
    environment: Environment,
    kind: LabelKind,
    credentials: Credentials,
    label: Label,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::labels(kind.as_str()), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Create, &Target::of(resource_kind(kind))).map_err(error_handler)?;

        label
            .validate()
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let label = environment
            .db
            .create_label(kind, label)
            .await
            .map_err(BackendError::conflict_as_validation)
            .map_err(error_handler)?;

        debug!(environment.logger, "Created label"; "kind" => %kind, "slug" => label.slug());

        let location = match kind {
            LabelKind::Category => environment.urls.category(label.slug()),
            LabelKind::Genre => environment.urls.genre(label.slug()),
        };

        with_header(
            with_status(json(&label), StatusCode::CREATED),
            "location",
            location.as_str(),
        )
    }
}

pub async fn label_delete(
    environment: Environment,
    slug: String,
    kind: LabelKind,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::label(kind.as_str(), slug.clone()), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Delete, &Target::of(resource_kind(kind))).map_err(error_handler)?;

        environment
            .db
            .delete_label(kind, &slug)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Deleted label"; "kind" => %kind, "slug" => &slug);

        StatusCode::NO_CONTENT
    }
}

pub async fn titles_list(
    environment: Environment,
    credentials: Credentials,
    filter: TitleFilter,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::titles(), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::Title)).map_err(error_handler)?;

        let titles = environment
            .db
            .list_titles(filter)
            .await
            .map_err(error_handler)?
            .into_iter()
            .map(TitleView::from)
            .collect::<Vec<_>>();

        json(&titles)
    }
}

pub async fn title_create(
    environment: Environment,
    credentials: Credentials,
    draft: TitleDraft,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::titles(), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Create, &Target::of(ResourceKind::Title)).map_err(error_handler)?;

        draft
            .validate(validation::current_year())
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let record = environment
            .db
            .create_title(draft)
            .await
            .map_err(BackendError::conflict_as_validation)
            .map_err(error_handler)?;
        let id = record.id();

        debug!(environment.logger, "Created title"; "title" => id);

        with_header(
            with_status(json(&TitleView::from(record)), StatusCode::CREATED),
            "location",
            environment.urls.title(id).as_str(),
        )
    }
}

pub async fn title_retrieve(
    environment: Environment,
    title: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::title(title), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::Title)).map_err(error_handler)?;

        let record = environment
            .db
            .retrieve_title(title)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| BackendError::not_found("title", title))
            .map_err(error_handler)?;

        json(&TitleView::from(record))
    }
}

pub async fn title_update(
    environment: Environment,
    title: Id,
    credentials: Credentials,
    changes: TitleChanges,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::title(title), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Update, &Target::of(ResourceKind::Title)).map_err(error_handler)?;

        changes
            .validate(validation::current_year())
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let record = environment
            .db
            .update_title(title, changes)
            .await
            .map_err(BackendError::conflict_as_validation)
            .map_err(error_handler)?;

        json(&TitleView::from(record))
    }
}

pub async fn title_delete(
    environment: Environment,
    title: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::title(title), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Delete, &Target::of(ResourceKind::Title)).map_err(error_handler)?;

        environment
            .db
            .delete_title(title)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Deleted title"; "title" => title);

        StatusCode::NO_CONTENT
    }
}

pub async fn reviews_list(
    environment: Environment,
    title: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reviews(title), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::Review)).map_err(error_handler)?;

        ensure_title(&environment, title).await.map_err(error_handler)?;

        let reviews = environment
            .db
            .list_reviews(title)
            .await
            .map_err(error_handler)?;

        json(&reviews)
    }
}

pub async fn review_create(
    environment: Environment,
    title: Id,
    credentials: Credentials,
    draft: ReviewDraft,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::reviews(title), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Create, &Target::of(ResourceKind::Review)).map_err(error_handler)?;
        let author = actor_id(&actor).map_err(error_handler)?;

        ensure_title(&environment, title).await.map_err(error_handler)?;

        draft
            .validate()
            .map_err(BackendError::from)
            .map_err(error_handler)?;
        validation::validate_review_uniqueness(environment.db.as_ref(), author, title)
            .await
            .map_err(error_handler)?;

        // a concurrent duplicate can still slip past the check above; the
        // database then reports the same failure
        let review = environment
            .db
            .create_review(draft.into_new(title, author))
            .await
            .map_err(BackendError::conflict_as_validation)
            .map_err(error_handler)?;

        debug!(environment.logger, "Created review"; "title" => title, "review" => review.id());

        with_header(
            with_status(json(&review), StatusCode::CREATED),
            "location",
            environment.urls.review(title, review.id()).as_str(),
        )
    }
}

pub async fn review_retrieve(
    environment: Environment,
    title: Id,
    review: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::review(title, review), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::Review)).map_err(error_handler)?;

        let review = find_review(&environment, title, review)
            .await
            .map_err(error_handler)?;

        json(&review)
    }
}

pub async fn review_update(
    environment: Environment,
    title: Id,
    review: Id,
    credentials: Credentials,
    changes: ReviewChanges,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::review(title, review), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        require_authenticated(&actor).map_err(error_handler)?;
        let existing = find_review(&environment, title, review)
            .await
            .map_err(error_handler)?;
        authorize(
            &actor,
            Action::Update,
            &Target::owned(ResourceKind::Review, existing.author_id()),
        )
        .map_err(error_handler)?;

        changes
            .validate()
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let updated = environment
            .db
            .update_review(review, changes)
            .await
            .map_err(error_handler)?;

        json(&updated)
    }
}

pub async fn review_delete(
    environment: Environment,
    title: Id,
    review: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::review(title, review), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        require_authenticated(&actor).map_err(error_handler)?;
        let existing = find_review(&environment, title, review)
            .await
            .map_err(error_handler)?;
        authorize(
            &actor,
            Action::Delete,
            &Target::owned(ResourceKind::Review, existing.author_id()),
        )
        .map_err(error_handler)?;

        environment
            .db
            .delete_review(review)
            .await
            .map_err(error_handler)?;

        debug!(environment.logger, "Deleted review"; "title" => title, "review" => review);

        StatusCode::NO_CONTENT
    }
}

pub async fn comments_list(
    environment: Environment,
    title: Id,
    review: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::comments(title, review), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::Comment)).map_err(error_handler)?;

        find_review(&environment, title, review)
            .await
            .map_err(error_handler)?;

        let comments = environment
            .db
            .list_comments(review)
            .await
            .map_err(error_handler)?;

        json(&comments)
    }
}

pub async fn comment_create(
    environment: Environment,
    title: Id,
    review: Id,
    credentials: Credentials,
    draft: CommentDraft,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::comments(title, review), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Create, &Target::of(ResourceKind::Comment)).map_err(error_handler)?;
        let author = actor_id(&actor).map_err(error_handler)?;

        find_review(&environment, title, review)
            .await
            .map_err(error_handler)?;

        draft
            .validate()
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let comment = environment
            .db
            .create_comment(draft.into_new(review, author))
            .await
            .map_err(error_handler)?;

        with_header(
            with_status(json(&comment), StatusCode::CREATED),
            "location",
            environment.urls.comment(title, review, comment.id()).as_str(),
        )
    }
}

pub async fn comment_retrieve(
    environment: Environment,
    title: Id,
    review: Id,
    comment: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::comment(title, review, comment), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        authorize(&actor, Action::Read, &Target::of(ResourceKind::Comment)).map_err(error_handler)?;

        let comment = find_comment(&environment, title, review, comment)
            .await
            .map_err(error_handler)?;

        json(&comment)
    }
}

pub async fn comment_update(
    environment: Environment,
    title: Id,
    review: Id,
    comment: Id,
    credentials: Credentials,
    changes: CommentChanges,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::comment(title, review, comment), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        require_authenticated(&actor).map_err(error_handler)?;
        let existing = find_comment(&environment, title, review, comment)
            .await
            .map_err(error_handler)?;
        authorize(
            &actor,
            Action::Update,
            &Target::owned(ResourceKind::Comment, existing.author_id()),
        )
        .map_err(error_handler)?;

        changes
            .validate()
            .map_err(BackendError::from)
            .map_err(error_handler)?;

        let updated = match changes.text.into_value() {
            Some(text) => environment
                .db
                .update_comment(comment, text)
                .await
                .map_err(error_handler)?,
            None => existing,
        };

        json(&updated)
    }
}

pub async fn comment_delete(
    environment: Environment,
    title: Id,
    review: Id,
    comment: Id,
    credentials: Credentials,
) -> RouteResult {
    timed! {
        let error_handler =
            |e: BackendError| Rejection::new(Context::comment(title, review, comment), e);

        let actor = authenticate(&environment, credentials).await.map_err(error_handler)?;
        require_authenticated(&actor).map_err(error_handler)?;
        let existing = find_comment(&environment, title, review, comment)
            .await
            .map_err(error_handler)?;
        authorize(
            &actor,
            Action::Delete,
            &Target::owned(ResourceKind::Comment, existing.author_id()),
        )
        .map_err(error_handler)?;

        environment
            .db
            .delete_comment(comment)
            .await
            .map_err(error_handler)?;

        StatusCode::NO_CONTENT
    }
}

/// Resolves the bearer of a request.
async fn authenticate(
    environment: &Environment,
    credentials: Credentials,
) -> Result<Actor, BackendError> {
    match credentials {
        Credentials::Anonymous => Ok(Actor::Anonymous),
        Credentials::Bearer(token) => environment
            .db
            .resolve_access_token(&token, environment.config.token_lifetime())
            .await?
            .map(Actor::User)
            .ok_or(BackendError::InvalidToken { token }),
    }
}

/// Owned resources are looked up before their owner can be checked, so
/// anonymous writes are turned away first.
fn require_authenticated(actor: &Actor) -> Result<(), BackendError> {
    if actor.is_authenticated() {
        Ok(())
    } else {
        Err(BackendError::NotAuthenticated)
    }
}

fn actor_id(actor: &Actor) -> Result<Id, BackendError> {
    actor.id().ok_or(BackendError::NotAuthenticated)
}

fn own_profile(actor: &Actor, action: Action) -> Result<&User, BackendError> {
    let user = actor.user().ok_or(BackendError::NotAuthenticated)?;
    authorize(actor, action, &Target::owned(ResourceKind::Profile, user.id()))?;

    Ok(user)
}

async fn update_user(
    environment: &Environment,
    id: Id,
    changes: UserChanges,
) -> Result<User, BackendError> {
    changes.validate(environment.config.profile_keyword())?;

    environment
        .db
        .update_user(id, changes)
        .await
        .map_err(BackendError::conflict_as_validation)
}

async fn find_user(environment: &Environment, username: &str) -> Result<User, BackendError> {
    environment
        .db
        .retrieve_user(username)
        .await?
        .ok_or_else(|| BackendError::not_found("user", username))
}

async fn ensure_title(environment: &Environment, title: Id) -> Result<(), BackendError> {
    environment
        .db
        .retrieve_title(title)
        .await?
        .map(|_| ())
        .ok_or_else(|| BackendError::not_found("title", title))
}

async fn find_review(
    environment: &Environment,
    title: Id,
    review: Id,
) -> Result<Review, BackendError> {
    environment
        .db
        .retrieve_review(title, review)
        .await?
        .ok_or_else(|| BackendError::not_found("review", review))
}

async fn find_comment(
    environment: &Environment,
    title: Id,
    review: Id,
    comment: Id,
) -> Result<Comment, BackendError> {
    find_review(environment, title, review).await?;

    environment
        .db
        .retrieve_comment(review, comment)
        .await?
        .ok_or_else(|| BackendError::not_found("comment", comment))
}

fn resource_kind(kind: LabelKind) -> ResourceKind {
    match kind {
        LabelKind::Category => ResourceKind::Category,
        LabelKind::Genre => ResourceKind::Genre,
    }
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
