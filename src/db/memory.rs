//! An in-process [`Db`](super::Db) holding everything behind one mutex.
//!
//! Each operation takes the lock once and does all of its checks and
//! writes under it, so a uniqueness check and the insert it guards can
//! never interleave with another request's.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{constraint, Db};
use crate::catalog::{Label, LabelKind, TitleChanges, TitleDraft, TitleFilter, TitleRecord};
use crate::errors::BackendError;
use crate::review::{Comment, NewComment, NewReview, Review, ReviewChanges, Score};
use crate::user::{Id, NewUser, User, UserChanges};

#[derive(Default)]
pub struct MemoryDb {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    last_id: Id,
    users: BTreeMap<Id, User>,
    confirmation_codes: HashMap<Id, (Uuid, OffsetDateTime)>,
    access_tokens: HashMap<Uuid, (Id, OffsetDateTime)>,
    categories: BTreeMap<Id, Label>,
    genres: BTreeMap<Id, Label>,
    titles: BTreeMap<Id, StoredTitle>,
    reviews: BTreeMap<Id, StoredReview>,
    comments: BTreeMap<Id, StoredComment>,
}

struct StoredTitle {
    name: String,
    year: i32,
    description: String,
    category: Option<Id>,
    genres: BTreeSet<Id>,
}

struct StoredReview {
    title_id: Id,
    author_id: Id,
    text: String,
    score: Score,
    pub_date: OffsetDateTime,
}

struct StoredComment {
    review_id: Id,
    author_id: Id,
    text: String,
    pub_date: OffsetDateTime,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T: Send + 'static>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, BackendError>,
    ) -> BoxFuture<Result<T, BackendError>> {
        let result = f(&mut self.lock());

        future::ready(result).boxed()
    }

    fn lock(&self) -> MutexGuard<State> {
        // operations check everything before they write, so a poisoned
        // lock still guards consistent state
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn next_id(&mut self) -> Id {
        self.last_id += 1;
        self.last_id
    }

    fn labels(&self, kind: LabelKind) -> &BTreeMap<Id, Label> {
        match kind {
            LabelKind::Category => &self.categories,
            LabelKind::Genre => &self.genres,
        }
    }

    fn labels_mut(&mut self, kind: LabelKind) -> &mut BTreeMap<Id, Label> {
        match kind {
            LabelKind::Category => &mut self.categories,
            LabelKind::Genre => &mut self.genres,
        }
    }

    fn resolve_slug(&self, kind: LabelKind, slug: &str) -> Result<Id, BackendError> {
        self.labels(kind)
            .iter()
            .find(|(_, label)| label.slug == slug)
            .map(|(id, _)| *id)
            .ok_or_else(|| BackendError::UnknownSlug {
                kind,
                slug: slug.to_owned(),
            })
    }

    fn check_user_unique(&self, id: Option<Id>, username: &str, email: &str) -> Result<(), BackendError> {
        for (other_id, other) in &self.users {
            if Some(*other_id) == id {
                continue;
            }

            if other.username == username {
                return Err(conflict(constraint::USERS_USERNAME));
            }

            if other.email == email {
                return Err(conflict(constraint::USERS_EMAIL));
            }
        }

        Ok(())
    }

    fn title_record(&self, id: Id) -> Option<TitleRecord> {
        let title = self.titles.get(&id)?;

        let mut genres = title
            .genres
            .iter()
            .filter_map(|genre| self.genres.get(genre).cloned())
            .collect::<Vec<_>>();
        genres.sort_by(|a, b| a.slug.cmp(&b.slug));

        let scores = self
            .reviews
            .values()
            .filter(|review| review.title_id == id)
            .map(|review| review.score)
            .collect();

        Some(TitleRecord {
            id,
            name: title.name.clone(),
            year: title.year,
            description: title.description.clone(),
            category: title
                .category
                .and_then(|category| self.categories.get(&category).cloned()),
            genres,
            scores,
        })
    }

    fn username(&self, id: Id) -> String {
        self.users
            .get(&id)
            .map(|user| user.username.clone())
            .unwrap_or_default()
    }

    fn review(&self, id: Id) -> Option<Review> {
        let review = self.reviews.get(&id)?;

        Some(Review {
            id,
            author_id: review.author_id,
            author: self.username(review.author_id),
            text: review.text.clone(),
            score: review.score,
            pub_date: review.pub_date,
        })
    }

    fn comment(&self, id: Id) -> Option<Comment> {
        let comment = self.comments.get(&id)?;

        Some(Comment {
            id,
            review_id: comment.review_id,
            author_id: comment.author_id,
            author: self.username(comment.author_id),
            text: comment.text.clone(),
            pub_date: comment.pub_date,
        })
    }

    fn remove_review(&mut self, id: Id) {
        self.reviews.remove(&id);
        self.comments.retain(|_, comment| comment.review_id != id);
    }

    fn remove_title(&mut self, id: Id) {
        self.titles.remove(&id);

        let reviews = self
            .reviews
            .iter()
            .filter(|(_, review)| review.title_id == id)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();

        for review in reviews {
            self.remove_review(review);
        }
    }

    fn remove_user(&mut self, id: Id) {
        self.users.remove(&id);
        self.confirmation_codes.remove(&id);
        self.access_tokens.retain(|_, (user, _)| *user != id);
        self.comments.retain(|_, comment| comment.author_id != id);

        let reviews = self
            .reviews
            .iter()
            .filter(|(_, review)| review.author_id == id)
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();

        for review in reviews {
            self.remove_review(review);
        }
    }
}

/// A zero `max_age` makes everything stale.
fn is_fresh(created_at: OffsetDateTime, max_age: Duration) -> bool {
    created_at + max_age > OffsetDateTime::now_utc()
}

fn conflict(name: &str) -> BackendError {
    BackendError::ConflictUnique {
        constraint: name.to_owned(),
    }
}

fn contains_ignoring_case(haystack: &str, needle: &Option<String>) -> bool {
    needle
        .as_ref()
        .map_or(true, |needle| haystack.to_lowercase().contains(&needle.to_lowercase()))
}

fn slug_constraint(kind: LabelKind) -> &'static str {
    match kind {
        LabelKind::Category => constraint::CATEGORIES_SLUG,
        LabelKind::Genre => constraint::GENRES_SLUG,
    }
}

impl Db for MemoryDb {
    fn create_user(&self, user: NewUser) -> BoxFuture<Result<User, BackendError>> {
        self.with_state(move |state| {
            state.check_user_unique(None, &user.username, &user.email)?;

            let id = state.next_id();
            let user = User {
                id,
                username: user.username,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                bio: user.bio,
                role: user.role,
                is_superuser: false,
            };

            state.users.insert(id, user.clone());

            Ok(user)
        })
    }

    fn retrieve_user(&self, username: &str) -> BoxFuture<Result<Option<User>, BackendError>> {
        let username = username.to_owned();

        self.with_state(move |state| {
            Ok(state
                .users
                .values()
                .find(|user| user.username == username)
                .cloned())
        })
    }

    fn list_users(&self, search: Option<String>) -> BoxFuture<Result<Vec<User>, BackendError>> {
        self.with_state(move |state| {
            let mut users = state
                .users
                .values()
                .filter(|user| contains_ignoring_case(&user.username, &search))
                .cloned()
                .collect::<Vec<_>>();
            users.sort_by(|a, b| a.username.cmp(&b.username));

            Ok(users)
        })
    }

    fn update_user(&self, id: Id, changes: UserChanges) -> BoxFuture<Result<User, BackendError>> {
        self.with_state(move |state| {
            let mut user = state
                .users
                .get(&id)
                .cloned()
                .ok_or_else(|| BackendError::not_found("user", id))?;

            changes.apply(&mut user);
            state.check_user_unique(Some(id), &user.username, &user.email)?;
            state.users.insert(id, user.clone());

            Ok(user)
        })
    }

    fn delete_user(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(move |state| {
            if !state.users.contains_key(&id) {
                return Err(BackendError::not_found("user", id));
            }

            state.remove_user(id);

            Ok(())
        })
    }

    fn store_confirmation_code(
        &self,
        user: Id,
        code: &Uuid,
    ) -> BoxFuture<Result<(), BackendError>> {
        let code = *code;

        self.with_state(move |state| {
            state
                .confirmation_codes
                .insert(user, (code, OffsetDateTime::now_utc()));

            Ok(())
        })
    }

    fn consume_confirmation_code(
        &self,
        user: Id,
        code: &Uuid,
        max_age: Duration,
    ) -> BoxFuture<Result<bool, BackendError>> {
        let code = *code;

        self.with_state(move |state| match state.confirmation_codes.get(&user) {
            Some(&(stored, created_at)) if stored == code && is_fresh(created_at, max_age) => {
                state.confirmation_codes.remove(&user);
                Ok(true)
            }
            _ => Ok(false),
        })
    }

    fn create_access_token(
        &self,
        user: Id,
        max_age: Duration,
    ) -> BoxFuture<Result<Uuid, BackendError>> {
        self.with_state(move |state| {
            state
                .access_tokens
                .retain(|_, &mut (owner, created_at)| owner != user || is_fresh(created_at, max_age));

            let token = Uuid::new_v4();
            state
                .access_tokens
                .insert(token, (user, OffsetDateTime::now_utc()));

            Ok(token)
        })
    }

    fn resolve_access_token(
        &self,
        token: &Uuid,
        max_age: Duration,
    ) -> BoxFuture<Result<Option<User>, BackendError>> {
        let token = *token;

        self.with_state(move |state| {
            Ok(state
                .access_tokens
                .get(&token)
                .filter(|&&(_, created_at)| is_fresh(created_at, max_age))
                .and_then(|(user, _)| state.users.get(user))
                .cloned())
        })
    }

    fn list_labels(
        &self,
        kind: LabelKind,
        search: Option<String>,
    ) -> BoxFuture<Result<Vec<Label>, BackendError>> {
        self.with_state(move |state| {
            let mut labels = state
                .labels(kind)
                .values()
                .filter(|label| contains_ignoring_case(&label.name, &search))
                .cloned()
                .collect::<Vec<_>>();
            labels.sort_by(|a, b| a.slug.cmp(&b.slug));

            Ok(labels)
        })
    }

    fn create_label(&self, kind: LabelKind, label: Label) -> BoxFuture<Result<Label, BackendError>> {
        self.with_state(move |state| {
            if state.labels(kind).values().any(|l| l.slug == label.slug) {
                return Err(conflict(slug_constraint(kind)));
            }

            let id = state.next_id();
            state.labels_mut(kind).insert(id, label.clone());

            Ok(label)
        })
    }

    fn delete_label(&self, kind: LabelKind, slug: &str) -> BoxFuture<Result<(), BackendError>> {
        let slug = slug.to_owned();

        self.with_state(move |state| {
            let id = state
                .resolve_slug(kind, &slug)
                .map_err(|_| BackendError::not_found(kind.as_str(), &slug))?;

            state.labels_mut(kind).remove(&id);

            for title in state.titles.values_mut() {
                match kind {
                    LabelKind::Category if title.category == Some(id) => title.category = None,
                    LabelKind::Genre => {
                        title.genres.remove(&id);
                    }
                    _ => {}
                }
            }

            Ok(())
        })
    }

    fn list_titles(&self, filter: TitleFilter) -> BoxFuture<Result<Vec<TitleRecord>, BackendError>> {
        self.with_state(move |state| {
            Ok(state
                .titles
                .keys()
                .filter_map(|id| state.title_record(*id))
                .filter(|record| filter.matches(record))
                .collect())
        })
    }

    fn retrieve_title(&self, id: Id) -> BoxFuture<Result<Option<TitleRecord>, BackendError>> {
        self.with_state(move |state| Ok(state.title_record(id)))
    }

    fn create_title(&self, draft: TitleDraft) -> BoxFuture<Result<TitleRecord, BackendError>> {
        self.with_state(move |state| {
            let category = match &draft.category {
                Some(slug) => Some(state.resolve_slug(LabelKind::Category, slug)?),
                None => None,
            };
            let genres = draft
                .genre
                .iter()
                .map(|slug| state.resolve_slug(LabelKind::Genre, slug))
                .collect::<Result<BTreeSet<_>, _>>()?;

            let id = state.next_id();
            state.titles.insert(
                id,
                StoredTitle {
                    name: draft.name,
                    year: draft.year,
                    description: draft.description,
                    category,
                    genres,
                },
            );

            state
                .title_record(id)
                .ok_or_else(|| BackendError::not_found("title", id))
        })
    }

    fn update_title(
        &self,
        id: Id,
        changes: TitleChanges,
    ) -> BoxFuture<Result<TitleRecord, BackendError>> {
        self.with_state(move |state| {
            if !state.titles.contains_key(&id) {
                return Err(BackendError::not_found("title", id));
            }

            let category = match changes.category.value() {
                Some(slug) => Some(state.resolve_slug(LabelKind::Category, slug)?),
                None => None,
            };
            let genres = match changes.genre.value() {
                Some(slugs) => Some(
                    slugs
                        .iter()
                        .map(|slug| state.resolve_slug(LabelKind::Genre, slug))
                        .collect::<Result<BTreeSet<_>, _>>()?,
                ),
                None => None,
            };

            if let Some(title) = state.titles.get_mut(&id) {
                if let Some(name) = changes.name.into_value() {
                    title.name = name;
                }
                if let Some(year) = changes.year.into_value() {
                    title.year = year;
                }
                if let Some(description) = changes.description.into_value() {
                    title.description = description;
                }
                if category.is_some() {
                    title.category = category;
                }
                if let Some(genres) = genres {
                    title.genres = genres;
                }
            }

            state
                .title_record(id)
                .ok_or_else(|| BackendError::not_found("title", id))
        })
    }

    fn delete_title(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(move |state| {
            if !state.titles.contains_key(&id) {
                return Err(BackendError::not_found("title", id));
            }

            state.remove_title(id);

            Ok(())
        })
    }

    fn list_reviews(&self, title: Id) -> BoxFuture<Result<Vec<Review>, BackendError>> {
        self.with_state(move |state| {
            Ok(state
                .reviews
                .iter()
                .filter(|(_, review)| review.title_id == title)
                .filter_map(|(id, _)| state.review(*id))
                .collect())
        })
    }

    fn retrieve_review(&self, title: Id, id: Id) -> BoxFuture<Result<Option<Review>, BackendError>> {
        self.with_state(move |state| {
            Ok(state
                .reviews
                .get(&id)
                .filter(|review| review.title_id == title)
                .and_then(|_| state.review(id)))
        })
    }

    fn review_exists(&self, title: Id, author: Id) -> BoxFuture<Result<bool, BackendError>> {
        self.with_state(move |state| {
            Ok(state
                .reviews
                .values()
                .any(|review| review.title_id == title && review.author_id == author))
        })
    }

    fn create_review(&self, review: NewReview) -> BoxFuture<Result<Review, BackendError>> {
        self.with_state(move |state| {
            if !state.titles.contains_key(&review.title_id) {
                return Err(BackendError::not_found("title", review.title_id));
            }

            let duplicate = state
                .reviews
                .values()
                .any(|r| r.title_id == review.title_id && r.author_id == review.author_id);

            if duplicate {
                return Err(conflict(constraint::REVIEWS_AUTHOR_TITLE));
            }

            let id = state.next_id();
            state.reviews.insert(
                id,
                StoredReview {
                    title_id: review.title_id,
                    author_id: review.author_id,
                    text: review.text,
                    score: review.score,
                    pub_date: OffsetDateTime::now_utc(),
                },
            );

            state
                .review(id)
                .ok_or_else(|| BackendError::not_found("review", id))
        })
    }

    fn update_review(&self, id: Id, changes: ReviewChanges) -> BoxFuture<Result<Review, BackendError>> {
        self.with_state(move |state| {
            let review = state
                .reviews
                .get_mut(&id)
                .ok_or_else(|| BackendError::not_found("review", id))?;

            if let Some(text) = changes.text.into_value() {
                review.text = text;
            }
            if let Some(score) = changes.score.into_value() {
                review.score = score;
            }

            state
                .review(id)
                .ok_or_else(|| BackendError::not_found("review", id))
        })
    }

    fn delete_review(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(move |state| {
            if !state.reviews.contains_key(&id) {
                return Err(BackendError::not_found("review", id));
            }

            state.remove_review(id);

            Ok(())
        })
    }

    fn list_comments(&self, review: Id) -> BoxFuture<Result<Vec<Comment>, BackendError>> {
        self.with_state(move |state| {
            Ok(state
                .comments
                .iter()
                .filter(|(_, comment)| comment.review_id == review)
                .filter_map(|(id, _)| state.comment(*id))
                .collect())
        })
    }

    fn retrieve_comment(
        &self,
        review: Id,
        id: Id,
    ) -> BoxFuture<Result<Option<Comment>, BackendError>> {
        self.with_state(move |state| {
            Ok(state
                .comment(id)
                .filter(|comment| comment.review_id == review))
        })
    }

    fn create_comment(&self, comment: NewComment) -> BoxFuture<Result<Comment, BackendError>> {
        self.with_state(move |state| {
            if !state.reviews.contains_key(&comment.review_id) {
                return Err(BackendError::not_found("review", comment.review_id));
            }

            let id = state.next_id();
            state.comments.insert(
                id,
                StoredComment {
                    review_id: comment.review_id,
                    author_id: comment.author_id,
                    text: comment.text,
                    pub_date: OffsetDateTime::now_utc(),
                },
            );

            state
                .comment(id)
                .ok_or_else(|| BackendError::not_found("comment", id))
        })
    }

    fn update_comment(&self, id: Id, text: String) -> BoxFuture<Result<Comment, BackendError>> {
        self.with_state(move |state| {
            let comment = state
                .comments
                .get_mut(&id)
                .ok_or_else(|| BackendError::not_found("comment", id))?;

            comment.text = text;

            state
                .comment(id)
                .ok_or_else(|| BackendError::not_found("comment", id))
        })
    }

    fn delete_comment(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
        self.with_state(move |state| {
            state
                .comments
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| BackendError::not_found("comment", id))
        })
    }
}
