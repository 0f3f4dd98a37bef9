use std::time::Duration;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::catalog::{Label, LabelKind, TitleChanges, TitleDraft, TitleFilter, TitleRecord};
use crate::errors::BackendError;
use crate::review::{Comment, NewComment, NewReview, Review, ReviewChanges};
use crate::user::{Id, NewUser, User, UserChanges};

pub mod memory;

/// Names of the uniqueness constraints in the schema. Both backends report
/// violations with these names.
pub mod constraint {
    pub const REVIEWS_AUTHOR_TITLE: &str = "reviews_author_title";
    pub const USERS_USERNAME: &str = "users_username";
    pub const USERS_EMAIL: &str = "users_email";
    pub const CATEGORIES_SLUG: &str = "categories_slug";
    pub const GENRES_SLUG: &str = "genres_slug";

    pub const UNIQUE: &[&str] = &[
        REVIEWS_AUTHOR_TITLE,
        USERS_USERNAME,
        USERS_EMAIL,
        CATEGORIES_SLUG,
        GENRES_SLUG,
    ];
}

pub trait Db {
    fn create_user(&self, user: NewUser) -> BoxFuture<Result<User, BackendError>>;

    fn retrieve_user(&self, username: &str) -> BoxFuture<Result<Option<User>, BackendError>>;

    /// Lists accounts, optionally only those whose username contains
    /// `search` in any case.
    fn list_users(&self, search: Option<String>) -> BoxFuture<Result<Vec<User>, BackendError>>;

    fn update_user(&self, id: Id, changes: UserChanges) -> BoxFuture<Result<User, BackendError>>;

    fn delete_user(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;

    /// Replaces the user's outstanding confirmation code.
    fn store_confirmation_code(&self, user: Id, code: &Uuid)
        -> BoxFuture<Result<(), BackendError>>;

    /// Removes the code if it matches and was stored less than `max_age`
    /// ago, reporting whether it did.
    fn consume_confirmation_code(
        &self,
        user: Id,
        code: &Uuid,
        max_age: Duration,
    ) -> BoxFuture<Result<bool, BackendError>>;

    /// Issues a new token, dropping the user's tokens older than `max_age`.
    fn create_access_token(
        &self,
        user: Id,
        max_age: Duration,
    ) -> BoxFuture<Result<Uuid, BackendError>>;

    /// Finds the owner of a token issued less than `max_age` ago.
    fn resolve_access_token(
        &self,
        token: &Uuid,
        max_age: Duration,
    ) -> BoxFuture<Result<Option<User>, BackendError>>;

    /// Lists labels, optionally only those whose name contains `search`
    /// in any case.
    fn list_labels(
        &self,
        kind: LabelKind,
        search: Option<String>,
    ) -> BoxFuture<Result<Vec<Label>, BackendError>>;

    fn create_label(&self, kind: LabelKind, label: Label) -> BoxFuture<Result<Label, BackendError>>;

    fn delete_label(&self, kind: LabelKind, slug: &str) -> BoxFuture<Result<(), BackendError>>;

    fn list_titles(&self, filter: TitleFilter) -> BoxFuture<Result<Vec<TitleRecord>, BackendError>>;

    fn retrieve_title(&self, id: Id) -> BoxFuture<Result<Option<TitleRecord>, BackendError>>;

    /// Inserts a title. Fails with [`BackendError::UnknownSlug`] if the
    /// draft names a category or genre that does not exist.
    fn create_title(&self, draft: TitleDraft) -> BoxFuture<Result<TitleRecord, BackendError>>;

    fn update_title(
        &self,
        id: Id,
        changes: TitleChanges,
    ) -> BoxFuture<Result<TitleRecord, BackendError>>;

    fn delete_title(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;

    fn list_reviews(&self, title: Id) -> BoxFuture<Result<Vec<Review>, BackendError>>;

    fn retrieve_review(&self, title: Id, id: Id)
        -> BoxFuture<Result<Option<Review>, BackendError>>;

    fn review_exists(&self, title: Id, author: Id) -> BoxFuture<Result<bool, BackendError>>;

    /// Inserts a review. A second review by the same author of the same
    /// title fails with [`BackendError::ConflictUnique`], however the two
    /// requests interleave.
    fn create_review(&self, review: NewReview) -> BoxFuture<Result<Review, BackendError>>;

    fn update_review(
        &self,
        id: Id,
        changes: ReviewChanges,
    ) -> BoxFuture<Result<Review, BackendError>>;

    fn delete_review(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;

    fn list_comments(&self, review: Id) -> BoxFuture<Result<Vec<Comment>, BackendError>>;

    fn retrieve_comment(
        &self,
        review: Id,
        id: Id,
    ) -> BoxFuture<Result<Option<Comment>, BackendError>>;

    fn create_comment(&self, comment: NewComment) -> BoxFuture<Result<Comment, BackendError>>;

    fn update_comment(&self, id: Id, text: String) -> BoxFuture<Result<Comment, BackendError>>;

    fn delete_comment(&self, id: Id) -> BoxFuture<Result<(), BackendError>>;
}

pub use self::memory::MemoryDb;
pub use self::postgres::*;

mod postgres {
    use std::time::Duration;

    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
        Postgres, Transaction,
    };
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::constraint;
    use crate::catalog::{Label, LabelKind, TitleChanges, TitleDraft, TitleFilter, TitleRecord};
    use crate::errors::BackendError;
    use crate::review::{Comment, NewComment, NewReview, Review, ReviewChanges, Score};
    use crate::user::{Id, NewUser, Role, User, UserChanges};

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn create_user(&self, user: NewUser) -> BoxFuture<Result<User, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create_user.sql"));

                let user = query
                    .bind(user.username)
                    .bind(user.email)
                    .bind(user.first_name)
                    .bind(user.last_name)
                    .bind(user.bio)
                    .bind(user.role.as_str())
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn retrieve_user(&self, username: &str) -> BoxFuture<Result<Option<User>, BackendError>> {
            let username = username.to_owned();

            async move {
                let query = sqlx::query(include_str!("queries/retrieve_user.sql"));

                let user = query
                    .bind(username)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn list_users(&self, search: Option<String>) -> BoxFuture<Result<Vec<User>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list_users.sql"));

                let users = query
                    .bind(search)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(users)
            }
            .boxed()
        }

        fn update_user(
            &self,
            id: Id,
            changes: UserChanges,
        ) -> BoxFuture<Result<User, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_user.sql"));

                let user = query
                    .bind(id)
                    .bind(changes.username.into_value())
                    .bind(changes.email.into_value())
                    .bind(changes.first_name.into_value())
                    .bind(changes.last_name.into_value())
                    .bind(changes.bio.into_value())
                    .bind(changes.role.into_value().map(|role| role.as_str()))
                    .bind(changes.is_superuser)
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                user.ok_or_else(|| BackendError::not_found("user", id))
            }
            .boxed()
        }

        fn delete_user(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_user.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, "user", id)
            }
            .boxed()
        }

        fn store_confirmation_code(
            &self,
            user: Id,
            code: &Uuid,
        ) -> BoxFuture<Result<(), BackendError>> {
            let code = *code;

            async move {
                let query = sqlx::query(include_str!("queries/store_confirmation_code.sql"));

                query
                    .bind(user)
                    .bind(code)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(())
            }
            .boxed()
        }

        fn consume_confirmation_code(
            &self,
            user: Id,
            code: &Uuid,
            max_age: Duration,
        ) -> BoxFuture<Result<bool, BackendError>> {
            let code = *code;

            async move {
                let query = sqlx::query(include_str!("queries/consume_confirmation_code.sql"));

                let count = query
                    .bind(user)
                    .bind(code)
                    .bind(max_age.as_secs_f64())
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                Ok(count > 0)
            }
            .boxed()
        }

        fn create_access_token(
            &self,
            user: Id,
            max_age: Duration,
        ) -> BoxFuture<Result<Uuid, BackendError>> {
            async move {
                let token = Uuid::new_v4();
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                sqlx::query(include_str!("queries/purge_access_tokens.sql"))
                    .bind(user)
                    .bind(max_age.as_secs_f64())
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                sqlx::query(include_str!("queries/create_access_token.sql"))
                    .bind(token)
                    .bind(user)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                tx.commit().await.map_err(map_sqlx_error)?;

                Ok(token)
            }
            .boxed()
        }

        fn resolve_access_token(
            &self,
            token: &Uuid,
            max_age: Duration,
        ) -> BoxFuture<Result<Option<User>, BackendError>> {
            let token = *token;

            async move {
                let query = sqlx::query(include_str!("queries/resolve_access_token.sql"));

                let user = query
                    .bind(token)
                    .bind(max_age.as_secs_f64())
                    .try_map(|row: PgRow| user_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(user)
            }
            .boxed()
        }

        fn list_labels(
            &self,
            kind: LabelKind,
            search: Option<String>,
        ) -> BoxFuture<Result<Vec<Label>, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, Label>(match kind {
                    LabelKind::Category => include_str!("queries/list_categories.sql"),
                    LabelKind::Genre => include_str!("queries/list_genres.sql"),
                });

                let labels = query
                    .bind(search)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(labels)
            }
            .boxed()
        }

        fn create_label(
            &self,
            kind: LabelKind,
            label: Label,
        ) -> BoxFuture<Result<Label, BackendError>> {
            async move {
                let query = sqlx::query_as::<_, Label>(match kind {
                    LabelKind::Category => include_str!("queries/create_category.sql"),
                    LabelKind::Genre => include_str!("queries/create_genre.sql"),
                });

                let label = query
                    .bind(label.name)
                    .bind(label.slug)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(label)
            }
            .boxed()
        }

        fn delete_label(&self, kind: LabelKind, slug: &str) -> BoxFuture<Result<(), BackendError>> {
            let slug = slug.to_owned();

            async move {
                let query = sqlx::query(match kind {
                    LabelKind::Category => include_str!("queries/delete_category.sql"),
                    LabelKind::Genre => include_str!("queries/delete_genre.sql"),
                });

                let count = query
                    .bind(&slug)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, kind.as_str(), slug)
            }
            .boxed()
        }

        fn list_titles(
            &self,
            filter: TitleFilter,
        ) -> BoxFuture<Result<Vec<TitleRecord>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list_titles.sql"));

                let titles = query
                    .bind(filter.name)
                    .bind(filter.category)
                    .bind(filter.genre)
                    .bind(filter.year)
                    .try_map(|row: PgRow| title_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(titles)
            }
            .boxed()
        }

        fn retrieve_title(&self, id: Id) -> BoxFuture<Result<Option<TitleRecord>, BackendError>> {
            async move { retrieve_title(&self.pool, id).await }.boxed()
        }

        fn create_title(&self, draft: TitleDraft) -> BoxFuture<Result<TitleRecord, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let category_id = match &draft.category {
                    Some(slug) => Some(resolve_slug(&mut tx, LabelKind::Category, slug).await?),
                    None => None,
                };

                let query = sqlx::query_as(include_str!("queries/create_title.sql"));

                let (id,): (Id,) = query
                    .bind(&draft.name)
                    .bind(draft.year)
                    .bind(&draft.description)
                    .bind(category_id)
                    .fetch_one(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?;

                set_genres(&mut tx, id, &draft.genre).await?;

                tx.commit().await.map_err(map_sqlx_error)?;

                retrieve_title(&self.pool, id)
                    .await?
                    .ok_or_else(|| BackendError::not_found("title", id))
            }
            .boxed()
        }

        fn update_title(
            &self,
            id: Id,
            changes: TitleChanges,
        ) -> BoxFuture<Result<TitleRecord, BackendError>> {
            async move {
                let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

                let category_id = match changes.category.value() {
                    Some(slug) => Some(resolve_slug(&mut tx, LabelKind::Category, slug).await?),
                    None => None,
                };

                let query = sqlx::query(include_str!("queries/update_title.sql"));

                let count = query
                    .bind(id)
                    .bind(changes.name.value())
                    .bind(changes.year.value())
                    .bind(changes.description.value())
                    .bind(category_id)
                    .execute(&mut tx)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, "title", id)?;

                if let Some(genres) = changes.genre.value() {
                    let query = sqlx::query(include_str!("queries/clear_title_genres.sql"));

                    query
                        .bind(id)
                        .execute(&mut tx)
                        .await
                        .map_err(map_sqlx_error)?;

                    set_genres(&mut tx, id, genres).await?;
                }

                tx.commit().await.map_err(map_sqlx_error)?;

                retrieve_title(&self.pool, id)
                    .await?
                    .ok_or_else(|| BackendError::not_found("title", id))
            }
            .boxed()
        }

        fn delete_title(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_title.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, "title", id)
            }
            .boxed()
        }

        fn list_reviews(&self, title: Id) -> BoxFuture<Result<Vec<Review>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list_reviews.sql"));

                let reviews = query
                    .bind(title)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(reviews)
            }
            .boxed()
        }

        fn retrieve_review(
            &self,
            title: Id,
            id: Id,
        ) -> BoxFuture<Result<Option<Review>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_review.sql"));

                let review = query
                    .bind(title)
                    .bind(id)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(review)
            }
            .boxed()
        }

        fn review_exists(&self, title: Id, author: Id) -> BoxFuture<Result<bool, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/review_exists.sql"));

                let (exists,): (bool,) = query
                    .bind(title)
                    .bind(author)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(exists)
            }
            .boxed()
        }

        fn create_review(&self, review: NewReview) -> BoxFuture<Result<Review, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create_review.sql"));

                let review = query
                    .bind(review.title_id)
                    .bind(review.author_id)
                    .bind(review.text)
                    .bind(review.score)
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(review)
            }
            .boxed()
        }

        fn update_review(
            &self,
            id: Id,
            changes: ReviewChanges,
        ) -> BoxFuture<Result<Review, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_review.sql"));

                let review = query
                    .bind(id)
                    .bind(changes.text.into_value())
                    .bind(changes.score.into_value())
                    .try_map(|row: PgRow| review_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                review.ok_or_else(|| BackendError::not_found("review", id))
            }
            .boxed()
        }

        fn delete_review(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_review.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, "review", id)
            }
            .boxed()
        }

        fn list_comments(&self, review: Id) -> BoxFuture<Result<Vec<Comment>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/list_comments.sql"));

                let comments = query
                    .bind(review)
                    .try_map(|row: PgRow| comment_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(comments)
            }
            .boxed()
        }

        fn retrieve_comment(
            &self,
            review: Id,
            id: Id,
        ) -> BoxFuture<Result<Option<Comment>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_comment.sql"));

                let comment = query
                    .bind(review)
                    .bind(id)
                    .try_map(|row: PgRow| comment_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(comment)
            }
            .boxed()
        }

        fn create_comment(&self, comment: NewComment) -> BoxFuture<Result<Comment, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/create_comment.sql"));

                let comment = query
                    .bind(comment.review_id)
                    .bind(comment.author_id)
                    .bind(comment.text)
                    .try_map(|row: PgRow| comment_from_row(&row))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(comment)
            }
            .boxed()
        }

        fn update_comment(&self, id: Id, text: String) -> BoxFuture<Result<Comment, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_comment.sql"));

                let comment = query
                    .bind(id)
                    .bind(text)
                    .try_map(|row: PgRow| comment_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                comment.ok_or_else(|| BackendError::not_found("comment", id))
            }
            .boxed()
        }

        fn delete_comment(&self, id: Id) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_comment.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, "comment", id)
            }
            .boxed()
        }
    }

    async fn retrieve_title(pool: &PgPool, id: Id) -> Result<Option<TitleRecord>, BackendError> {
        let query = sqlx::query(include_str!("queries/retrieve_title.sql"));

        let title = query
            .bind(id)
            .try_map(|row: PgRow| title_from_row(&row))
            .fetch_optional(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(title)
    }

    async fn resolve_slug(
        tx: &mut Transaction<'_, Postgres>,
        kind: LabelKind,
        slug: &str,
    ) -> Result<Id, BackendError> {
        let query = sqlx::query_as(match kind {
            LabelKind::Category => include_str!("queries/retrieve_category_id.sql"),
            LabelKind::Genre => include_str!("queries/retrieve_genre_id.sql"),
        });

        let id: Option<(Id,)> = query
            .bind(slug)
            .fetch_optional(tx)
            .await
            .map_err(map_sqlx_error)?;

        id.map(|(id,)| id).ok_or_else(|| BackendError::UnknownSlug {
            kind,
            slug: slug.to_owned(),
        })
    }

    async fn set_genres(
        tx: &mut Transaction<'_, Postgres>,
        title: Id,
        slugs: &[String],
    ) -> Result<(), BackendError> {
        for slug in slugs {
            let genre = resolve_slug(&mut *tx, LabelKind::Genre, slug).await?;
            let query = sqlx::query(include_str!("queries/add_title_genre.sql"));

            query
                .bind(title)
                .bind(genre)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        Ok(())
    }

    fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
        let role: String = try_get(row, "role")?;
        let role: Role = role
            .parse()
            .map_err(|e: BackendError| sqlx::Error::Decode(Box::new(e)))?;

        Ok(User {
            id: try_get(row, "id")?,
            username: try_get(row, "username")?,
            email: try_get(row, "email")?,
            first_name: try_get(row, "first_name")?,
            last_name: try_get(row, "last_name")?,
            bio: try_get(row, "bio")?,
            role,
            is_superuser: try_get(row, "is_superuser")?,
        })
    }

    fn title_from_row(row: &PgRow) -> Result<TitleRecord, sqlx::Error> {
        let category_name: Option<String> = try_get(row, "category_name")?;
        let category_slug: Option<String> = try_get(row, "category_slug")?;

        // both come from the same joined row, so they are null together
        let category = match (category_name, category_slug) {
            (Some(name), Some(slug)) => Some(Label::new(name, slug)),
            _ => None,
        };

        let genre_names: Vec<String> = try_get(row, "genre_names")?;
        let genre_slugs: Vec<String> = try_get(row, "genre_slugs")?;
        let genres = genre_names
            .into_iter()
            .zip(genre_slugs)
            .map(|(name, slug)| Label::new(name, slug))
            .collect();

        let scores: Vec<Score> = try_get(row, "scores")?;

        Ok(TitleRecord {
            id: try_get(row, "id")?,
            name: try_get(row, "name")?,
            year: try_get(row, "year")?,
            description: try_get(row, "description")?,
            category,
            genres,
            scores,
        })
    }

    fn review_from_row(row: &PgRow) -> Result<Review, sqlx::Error> {
        let pub_date: OffsetDateTime = try_get(row, "pub_date")?;

        Ok(Review {
            id: try_get(row, "id")?,
            author_id: try_get(row, "author_id")?,
            author: try_get(row, "author")?,
            text: try_get(row, "text")?,
            score: try_get(row, "score")?,
            pub_date,
        })
    }

    fn comment_from_row(row: &PgRow) -> Result<Comment, sqlx::Error> {
        let pub_date: OffsetDateTime = try_get(row, "pub_date")?;

        Ok(Comment {
            id: try_get(row, "id")?,
            review_id: try_get(row, "review_id")?,
            author_id: try_get(row, "author_id")?,
            author: try_get(row, "author")?,
            text: try_get(row, "text")?,
            pub_date,
        })
    }

    fn expect_one(
        count: u64,
        resource: &'static str,
        key: impl ToString,
    ) -> Result<(), BackendError> {
        if count == 0 {
            Err(BackendError::not_found(resource, key))
        } else {
            Ok(())
        }
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        if let sqlx::Error::Database(ref e) = error {
            if let Some(name) = e.constraint().filter(|c| constraint::UNIQUE.contains(c)) {
                return BackendError::ConflictUnique {
                    constraint: name.to_owned(),
                };
            }
        }

        BackendError::Sqlx { source: error }
    }
}
