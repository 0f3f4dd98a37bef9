use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use bytes::Bytes;
use warp::http::{Response, StatusCode};

use reviewdb::db::{Db, MemoryDb};
use reviewdb::environment::{Config, Environment};
use reviewdb::mailer::Outbox;
use reviewdb::routes::make_api;
use reviewdb::urls::Urls;
use reviewdb::user::{Role, UserChanges};

const BASE_URL: &str = "http://reviews.test/api/v1/";

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct SignupResponse {
    username: String,
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TokenResponse {
    token: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TitleResponse {
    id: i64,
    name: String,
    year: i32,
    rating: Option<f64>,
    description: String,
    genre: Vec<LabelResponse>,
    category: Option<LabelResponse>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct LabelResponse {
    name: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReviewResponse {
    id: i64,
    author: String,
    text: String,
    score: i16,
    pub_date: i64,
}

struct Harness {
    environment: Environment,
    db: Arc<MemoryDb>,
    outbox: Arc<Outbox>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(Config::new("me"))
    }

    fn with_config(config: Config) -> Self {
        let db = Arc::new(MemoryDb::new());
        let outbox = Arc::new(Outbox::new());
        let logger = Arc::new(log::discard());

        let environment = Environment::new(
            logger,
            db.clone(),
            outbox.clone(),
            Arc::new(Urls::new(BASE_URL)),
            config,
        );

        Harness {
            environment,
            db,
            outbox,
        }
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        token: Option<Uuid>,
        body: Option<Value>,
    ) -> Response<Bytes> {
        let api = make_api(self.environment.clone());

        let mut request = warp::test::request()
            .method(method)
            .path(&format!("/api/v1/{}", path));

        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }

        if let Some(body) = body {
            request = request.json(&body);
        }

        request.reply(&api).await
    }

    /// Signs up and exchanges the mailed code, returning an access token.
    async fn log_in(&self, username: &str) -> Uuid {
        let email = format!("{}@example.com", username);

        let response = self
            .send(
                "POST",
                "auth/signup/",
                None,
                Some(json!({ "username": username, "email": &email })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let code = self.outbox.latest_code(&email).expect("code was mailed");

        let response = self
            .send(
                "POST",
                "auth/token/",
                None,
                Some(json!({ "username": username, "confirmation_code": code.to_string() })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        parse::<TokenResponse>(&response).token
    }

    async fn log_in_as(&self, username: &str, role: Role) -> Uuid {
        let token = self.log_in(username).await;

        let user = self
            .db
            .retrieve_user(username)
            .await
            .unwrap()
            .expect("user exists");
        self.db
            .update_user(user.id(), UserChanges::grant(role, false))
            .await
            .unwrap();

        token
    }

    /// Creates the `books` category, the `drama` genre and one title in them.
    async fn seed_title(&self, admin: Uuid, year: i32) -> i64 {
        for (path, name, slug) in &[
            ("categories/", "Books", "books"),
            ("genres/", "Drama", "drama"),
        ] {
            let response = self
                .send("POST", path, Some(admin), Some(json!({ "name": name, "slug": slug })))
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = self
            .send(
                "POST",
                "titles/",
                Some(admin),
                Some(json!({
                    "name": "War and Peace",
                    "year": year,
                    "description": "Long.",
                    "genre": ["drama"],
                    "category": "books",
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        parse::<TitleResponse>(&response).id
    }
}

fn parse<'a, T: Deserialize<'a>>(response: &'a Response<Bytes>) -> T {
    serde_json::from_slice(response.body())
        .unwrap_or_else(|e| panic!("parse {:?}: {}", response.body(), e))
}

fn location(response: &Response<Bytes>) -> &str {
    response
        .headers()
        .get("location")
        .expect("location header")
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn signup_issues_a_single_use_code() {
    let harness = Harness::new();

    let response = harness
        .send(
            "POST",
            "auth/signup/",
            None,
            Some(json!({ "username": " Reader ", "email": "Reader@Example.COM" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        parse::<SignupResponse>(&response),
        SignupResponse {
            username: "Reader".to_owned(),
            email: "Reader@example.com".to_owned(),
        }
    );

    let code = harness.outbox.latest_code("Reader@example.com").unwrap();
    let exchange = json!({ "username": "Reader", "confirmation_code": code.to_string() });

    let response = harness
        .send("POST", "auth/token/", None, Some(exchange.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let token = parse::<TokenResponse>(&response).token;

    let response = harness.send("GET", "users/me/", Some(token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse::<Value>(&response)["username"], "Reader");

    let response = harness.send("POST", "auth/token/", None, Some(exchange)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["confirmation_code"].is_array());
}

#[tokio::test]
async fn signup_rejects_the_profile_keyword() {
    let harness = Harness::new();

    let response = harness
        .send(
            "POST",
            "auth/signup/",
            None,
            Some(json!({ "username": "ME", "email": "me@example.com" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["username"].is_array());
    assert!(harness.outbox.is_empty());
}

#[tokio::test]
async fn anonymous_visitors_can_read_but_not_write() {
    let harness = Harness::new();

    let response = harness.send("GET", "titles/", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse::<Value>(&response), json!([]));
    assert!(response.headers().contains_key("server-timing"));

    let response = harness
        .send(
            "POST",
            "categories/",
            None,
            Some(json!({ "name": "Films", "slug": "films" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = harness.send("GET", "users/me/", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let harness = Harness::new();

    let response = harness
        .send("GET", "titles/", Some(Uuid::new_v4()), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let api = make_api(harness.environment.clone());
    let response = warp::test::request()
        .method("GET")
        .path("/api/v1/titles/")
        .header("authorization", "Basic dXNlcjpwYXNz")
        .reply(&api)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn only_admins_manage_the_catalog() {
    let harness = Harness::new();
    let user = harness.log_in("reader").await;
    let admin = harness.log_in_as("curator", Role::Admin).await;

    let label = json!({ "name": "Films", "slug": "films" });

    let response = harness
        .send("POST", "categories/", Some(user), Some(label.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness
        .send("POST", "categories/", Some(admin), Some(label.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(location(&response), "http://reviews.test/api/v1/categories/films/");

    let response = harness
        .send("POST", "categories/", Some(admin), Some(label))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["slug"].is_array());

    let response = harness
        .send("GET", "categories/?search=fil", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        parse::<Vec<LabelResponse>>(&response),
        vec![LabelResponse {
            name: "Films".to_owned(),
            slug: "films".to_owned(),
        }]
    );
}

#[tokio::test]
async fn titles_reject_future_years_and_unknown_slugs() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let next_year = reviewdb::validation::current_year() + 1;

    let response = harness
        .send(
            "POST",
            "titles/",
            Some(admin),
            Some(json!({ "name": "Tomorrow", "year": next_year })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["year"].is_array());

    let response = harness
        .send(
            "POST",
            "titles/",
            Some(admin),
            Some(json!({ "name": "Today", "year": 2000, "genre": ["nonexistent"] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["genre"].is_array());
}

#[tokio::test]
async fn ratings_follow_the_reviews() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let ann = harness.log_in("ann").await;
    let bob = harness.log_in("bob").await;
    let title = harness.seed_title(admin, 1869).await;

    let path = format!("titles/{}/", title);
    let response = harness.send("GET", &path, None, None).await;
    let view = parse::<TitleResponse>(&response);
    assert_eq!(view.rating, None);
    assert_eq!(view.name, "War and Peace");
    assert_eq!(view.year, 1869);
    assert_eq!(view.description, "Long.");
    assert_eq!(view.category.unwrap().slug, "books");
    assert_eq!(view.genre[0].slug, "drama");

    let reviews = format!("titles/{}/reviews/", title);
    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Great", "score": 10 })))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let ann_review = parse::<ReviewResponse>(&response);
    assert_eq!(ann_review.author, "ann");
    assert_eq!(ann_review.text, "Great");
    assert_eq!(ann_review.score, 10);
    assert!(ann_review.pub_date > 0);
    assert_eq!(
        location(&response),
        format!("{}titles/{}/reviews/{}/", BASE_URL, title, ann_review.id)
    );

    let response = harness
        .send("POST", &reviews, Some(bob), Some(json!({ "text": "Fine", "score": 7 })))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = harness.send("GET", &path, None, None).await;
    assert_eq!(parse::<TitleResponse>(&response).rating, Some(8.5));

    let response = harness
        .send(
            "DELETE",
            &format!("{}{}/", reviews, ann_review.id),
            Some(ann),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness.send("GET", &path, None, None).await;
    assert_eq!(parse::<TitleResponse>(&response).rating, Some(7.0));
}

#[tokio::test]
async fn reviews_are_validated() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let ann = harness.log_in("ann").await;
    let title = harness.seed_title(admin, 1869).await;
    let reviews = format!("titles/{}/reviews/", title);

    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Too good", "score": 11 })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["score"].is_array());

    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Good", "score": 8 })))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Again", "score": 9 })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["non_field_errors"].is_array());

    let response = harness
        .send("POST", "titles/999/reviews/", Some(ann), Some(json!({ "text": "Hm", "score": 5 })))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reviews_belong_to_their_authors_and_moderators() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let ann = harness.log_in("ann").await;
    let bob = harness.log_in("bob").await;
    let moderator = harness.log_in_as("mod", Role::Moderator).await;
    let title = harness.seed_title(admin, 1869).await;

    let reviews = format!("titles/{}/reviews/", title);
    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Great", "score": 9 })))
        .await;
    let review = format!("{}{}/", reviews, parse::<ReviewResponse>(&response).id);

    let response = harness
        .send("PATCH", &review, Some(bob), Some(json!({ "score": 1 })))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness.send("DELETE", &review, Some(bob), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness
        .send("PATCH", &review, Some(ann), Some(json!({ "score": 6 })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = parse::<ReviewResponse>(&response);
    assert_eq!(updated.score, 6);
    assert_eq!(updated.text, "Great");

    let response = harness.send("DELETE", &review, Some(moderator), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness.send("GET", &review, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_disappear_with_their_title() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let ann = harness.log_in("ann").await;
    let bob = harness.log_in("bob").await;
    let title = harness.seed_title(admin, 1869).await;

    let reviews = format!("titles/{}/reviews/", title);
    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Great", "score": 9 })))
        .await;
    let review = parse::<ReviewResponse>(&response).id;

    let comments = format!("{}{}/comments/", reviews, review);
    let response = harness
        .send("POST", &comments, Some(bob), Some(json!({ "text": "Agreed" })))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let comment = parse::<Value>(&response)["id"].as_i64().unwrap();
    assert_eq!(
        location(&response),
        format!("{}{}{}/", BASE_URL, comments, comment)
    );

    let response = harness
        .send(
            "PATCH",
            &format!("{}{}/", comments, comment),
            Some(ann),
            Some(json!({ "text": "Not yours" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = harness.send("GET", &comments, None, None).await;
    assert_eq!(parse::<Value>(&response)[0]["author"], "bob");

    let response = harness
        .send("DELETE", &format!("titles/{}/", title), Some(admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness.send("GET", &comments, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_category_keeps_its_titles() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let title = harness.seed_title(admin, 1869).await;

    let response = harness
        .send("DELETE", "categories/books/", Some(admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness
        .send("GET", &format!("titles/{}/", title), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = parse::<TitleResponse>(&response);
    assert!(view.category.is_none());
    assert_eq!(view.genre.len(), 1);

    let response = harness
        .send("GET", "titles/?genre=DRAMA", None, None)
        .await;
    assert_eq!(parse::<Vec<TitleResponse>>(&response).len(), 1);

    let response = harness
        .send("GET", "titles/?category=books", None, None)
        .await;
    assert!(parse::<Vec<TitleResponse>>(&response).is_empty());
}

#[tokio::test]
async fn users_cannot_promote_themselves() {
    let harness = Harness::new();
    let ann = harness.log_in("ann").await;

    let response = harness
        .send(
            "PATCH",
            "users/me/",
            Some(ann),
            Some(json!({ "role": "admin", "bio": "Reader." })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = parse::<Value>(&response);
    assert_eq!(profile["role"], "user");
    assert_eq!(profile["bio"], "Reader.");

    let response = harness.send("GET", "users/", Some(ann), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_manage_accounts() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;

    let response = harness
        .send(
            "POST",
            "users/",
            Some(admin),
            Some(json!({ "username": "newbie", "email": "newbie@example.com", "role": "moderator" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(location(&response), "http://reviews.test/api/v1/users/newbie/");
    assert_eq!(parse::<Value>(&response)["role"], "moderator");

    let response = harness.send("GET", "users/?search=new", Some(admin), None).await;
    assert_eq!(parse::<Vec<Value>>(&response).len(), 1);

    let response = harness
        .send("PATCH", "users/newbie/", Some(admin), Some(json!({ "role": "user" })))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse::<Value>(&response)["role"], "user");

    let response = harness.send("DELETE", "users/newbie/", Some(admin), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness.send("GET", "users/newbie/", Some(admin), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;

    let response = harness
        .send("POST", "titles/", Some(admin), Some(json!({ "year": "soon" })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["message"].is_string());
}

#[tokio::test]
async fn expired_tokens_no_longer_authenticate() {
    let harness = Harness::with_config(Config::new("me").with_token_lifetime(Duration::from_secs(0)));

    let token = harness.log_in("ann").await;

    let response = harness.send("GET", "users/me/", Some(token), None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_codes_cannot_be_exchanged() {
    let harness = Harness::with_config(Config::new("me").with_code_lifetime(Duration::from_secs(0)));

    let response = harness
        .send(
            "POST",
            "auth/signup/",
            None,
            Some(json!({ "username": "ann", "email": "ann@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let code = harness.outbox.latest_code("ann@example.com").unwrap();
    let response = harness
        .send(
            "POST",
            "auth/token/",
            None,
            Some(json!({ "username": "ann", "confirmation_code": code.to_string() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["confirmation_code"].is_array());
}

#[tokio::test]
async fn null_fields_in_updates_are_rejected() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let ann = harness.log_in("ann").await;
    let title = harness.seed_title(admin, 1869).await;
    let path = format!("titles/{}/", title);

    let response = harness
        .send("PATCH", &path, Some(admin), Some(json!({ "category": null })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["category"].is_array());

    let response = harness.send("GET", &path, None, None).await;
    assert_eq!(
        parse::<TitleResponse>(&response).category,
        Some(LabelResponse {
            name: "Books".to_owned(),
            slug: "books".to_owned(),
        })
    );

    let reviews = format!("{}reviews/", path);
    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Great", "score": 9 })))
        .await;
    let review = format!("{}{}/", reviews, parse::<ReviewResponse>(&response).id);

    let response = harness
        .send("PATCH", &review, Some(ann), Some(json!({ "score": null, "text": null })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = &parse::<Value>(&response)["errors"];
    assert!(errors["score"].is_array());
    assert!(errors["text"].is_array());

    let response = harness.send("GET", &review, None, None).await;
    let unchanged = parse::<ReviewResponse>(&response);
    assert_eq!(unchanged.score, 9);
    assert_eq!(unchanged.text, "Great");
}

#[tokio::test]
async fn anonymous_writes_to_missing_content_need_credentials() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let title = harness.seed_title(admin, 1869).await;

    let review = format!("titles/{}/reviews/999/", title);
    let comment = format!("{}comments/999/", review);

    for path in &[&review, &comment] {
        let response = harness
            .send("PATCH", path, None, Some(json!({ "text": "Hello" })))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = harness.send("DELETE", path, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = harness
        .send("DELETE", &review, Some(admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_comment_updates_keep_the_text() {
    let harness = Harness::new();
    let admin = harness.log_in_as("curator", Role::Admin).await;
    let ann = harness.log_in("ann").await;
    let title = harness.seed_title(admin, 1869).await;

    let reviews = format!("titles/{}/reviews/", title);
    let response = harness
        .send("POST", &reviews, Some(ann), Some(json!({ "text": "Great", "score": 9 })))
        .await;
    let comments = format!("{}{}/comments/", reviews, parse::<ReviewResponse>(&response).id);

    let response = harness
        .send("POST", &comments, Some(ann), Some(json!({ "text": "Agreed" })))
        .await;
    let comment = format!("{}{}/", comments, parse::<Value>(&response)["id"]);

    let response = harness.send("PATCH", &comment, Some(ann), Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse::<Value>(&response)["text"], "Agreed");

    let response = harness
        .send("PATCH", &comment, Some(ann), Some(json!({ "text": null })))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(parse::<Value>(&response)["errors"]["text"].is_array());
}
