//! Field-level rules applied to proposed writes before they reach the
//! database.

use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::db::{constraint, Db};
use crate::errors::BackendError;
use crate::user::Id;

pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_PERSONAL_NAME_LENGTH: usize = 150;
pub const MAX_LABEL_NAME_LENGTH: usize = 256;
pub const MAX_SLUG_LENGTH: usize = 50;
pub const MAX_TITLE_NAME_LENGTH: usize = 256;

pub const MIN_SCORE: i16 = 1;
pub const MAX_SCORE: i16 = 10;

/// The key under which errors that concern the whole submission are
/// reported.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

pub const DUPLICATE_REVIEW: &str = "you have already reviewed this title";

/// A set of per-field failures. An empty set means the write passed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding exactly one failure.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// The failure reported when the database rejects a write because of
    /// the named uniqueness constraint.
    pub fn conflict(constraint_name: &str) -> Self {
        let (field, message) = match constraint_name {
            constraint::REVIEWS_AUTHOR_TITLE => (NON_FIELD_ERRORS, DUPLICATE_REVIEW),
            constraint::USERS_USERNAME => ("username", "a user with that username already exists"),
            constraint::USERS_EMAIL => ("email", "a user with that email already exists"),
            constraint::CATEGORIES_SLUG | constraint::GENRES_SLUG => {
                ("slug", "this slug is already in use")
            }
            _ => (NON_FIELD_ERRORS, "this object already exists"),
        };

        Self::single(field, message)
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Folds another outcome into this one.
    pub fn merge(&mut self, outcome: Result<(), ValidationErrors>) {
        if let Err(other) = outcome {
            for (field, messages) in other.0 {
                self.0.entry(field).or_default().extend(messages);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.0.keys().map(String::as_str).collect::<Vec<_>>();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

impl From<ValidationErrors> for BackendError {
    fn from(errors: ValidationErrors) -> Self {
        BackendError::ValidationFailed(errors)
    }
}

/// Checks a username.
///
/// 1. It must not equal `reserved` (the profile keyword), ignoring case
/// 2. It begins with a letter
/// 3. It uses only letters, digits, `.`, `_` and `-`
/// 4. It is at most 150 characters long
///
/// Every failing rule is reported.
pub fn validate_username(value: &str, reserved: &str) -> Result<(), ValidationErrors> {
    lazy_static! {
        // Unwrap as we checked the regular expression for correctness
        static ref USERNAME_REGEX: Regex = Regex::new("^[A-Za-z][A-Za-z0-9._-]{0,149}$").unwrap();
    }

    let mut errors = ValidationErrors::new();

    if value.to_lowercase() == reserved.to_lowercase() {
        errors.add("username", format!("username cannot be {:?}", reserved));
    }

    if !USERNAME_REGEX.is_match(value) {
        errors.add(
            "username",
            format!(
                "username must start with a letter and contain at most {} letters, digits, '.', '_' or '-'",
                MAX_USERNAME_LENGTH
            ),
        );
    }

    errors.into_result()
}

/// Checks that an email address has a plausible shape. Deliverability
/// is the mailer's problem.
pub fn validate_email(value: &str) -> Result<(), ValidationErrors> {
    lazy_static! {
        static ref EMAIL_REGEX: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }

    let mut errors = ValidationErrors::new();

    if !EMAIL_REGEX.is_match(value) {
        errors.add("email", "enter a valid email address");
    }

    errors.merge(validate_length("email", value, MAX_EMAIL_LENGTH));

    errors.into_result()
}

/// Checks a category or genre slug: 1 to 50 ASCII letters, digits,
/// hyphens or underscores.
pub fn validate_slug(value: &str) -> Result<(), ValidationErrors> {
    lazy_static! {
        static ref SLUG_REGEX: Regex = Regex::new("^[-a-zA-Z0-9_]+$").unwrap();
    }

    let mut errors = ValidationErrors::new();

    if !SLUG_REGEX.is_match(value) {
        errors.add(
            "slug",
            "slug must consist of letters, numbers, underscores or hyphens",
        );
    }

    errors.merge(validate_length("slug", value, MAX_SLUG_LENGTH));

    errors.into_result()
}

/// Checks that a field holds at most `max` characters.
pub fn validate_length(field: &str, value: &str, max: usize) -> Result<(), ValidationErrors> {
    if value.chars().count() > max {
        Err(ValidationErrors::single(
            field,
            format!("ensure this field has no more than {} characters", max),
        ))
    } else {
        Ok(())
    }
}

/// Checks that a field holds something other than whitespace.
pub fn validate_not_blank(field: &str, value: &str) -> Result<(), ValidationErrors> {
    if value.trim().is_empty() {
        Err(ValidationErrors::single(field, "this field may not be blank"))
    } else {
        Ok(())
    }
}

/// Checks that a release year is not after `current_year`.
pub fn validate_year(value: i32, current_year: i32) -> Result<(), ValidationErrors> {
    if value > current_year {
        Err(ValidationErrors::single(
            "year",
            format!(
                "year cannot be later than the current year ({})",
                current_year
            ),
        ))
    } else {
        Ok(())
    }
}

/// Checks a release year against the calendar year at the time of the
/// call.
pub fn validate_year_now(value: i32) -> Result<(), ValidationErrors> {
    validate_year(value, current_year())
}

pub fn current_year() -> i32 {
    time::OffsetDateTime::now_utc().year()
}

/// Checks that a score lies within `1..=10`.
pub fn validate_score(value: i16) -> Result<(), ValidationErrors> {
    if (MIN_SCORE..=MAX_SCORE).contains(&value) {
        Ok(())
    } else {
        Err(ValidationErrors::single(
            "score",
            format!("score must be between {} and {}", MIN_SCORE, MAX_SCORE),
        ))
    }
}

/// Checks that `author` has not already reviewed `title`. This is only an
/// early exit: the database constraint is what actually guarantees
/// uniqueness, and it reports the same failure.
pub async fn validate_review_uniqueness(
    db: &(dyn Db + Send + Sync),
    author: Id,
    title: Id,
) -> Result<(), BackendError> {
    if db.review_exists(title, author).await? {
        Err(ValidationErrors::conflict(constraint::REVIEWS_AUTHOR_TITLE).into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const RESERVED: &str = "me";

    #[test]
    fn ordinary_usernames_pass() {
        assert_eq!(validate_username("Ann_01", RESERVED), Ok(()));
        assert_eq!(validate_username("j.doe-2", RESERVED), Ok(()));
    }

    #[test]
    fn reserved_username_fails_in_any_case() {
        for name in &["me", "Me", "ME", "mE"] {
            let errors = validate_username(name, RESERVED).unwrap_err();
            assert_eq!(errors.messages("username").len(), 1, "{:?}", name);
        }
    }

    #[test]
    fn reserved_check_uses_the_configured_keyword() {
        assert_eq!(validate_username("me", "self"), Ok(()));
        assert!(validate_username("Self", "self").is_err());
    }

    #[test]
    fn both_username_rules_are_reported() {
        // a malformed keyword trips both rules at once
        let errors = validate_username("_me", "_ME").unwrap_err();
        assert_eq!(errors.messages("username").len(), 2);
    }

    #[test]
    fn malformed_usernames_fail() {
        for name in &["", "1abc", "_abc", "has space", "ünïcode", "semi;colon"] {
            assert!(validate_username(name, RESERVED).is_err(), "{:?}", name);
        }

        let long = format!("a{}", "b".repeat(MAX_USERNAME_LENGTH));
        assert!(validate_username(&long, RESERVED).is_err());
        assert!(validate_username(&long[1..], RESERVED).is_ok());
    }

    #[test]
    fn emails_need_an_at_sign_and_a_domain() {
        assert!(validate_email("ann@example.com").is_ok());

        for email in &["", "ann", "ann@", "@example.com", "ann@example", "a b@example.com"] {
            assert!(validate_email(email).is_err(), "{:?}", email);
        }
    }

    #[test]
    fn slugs_are_restricted() {
        assert!(validate_slug("science-fiction_2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug(&"s".repeat(MAX_SLUG_LENGTH + 1)).is_err());
    }

    #[test]
    fn current_year_passes_and_next_year_fails() {
        let year = current_year();

        assert!(validate_year_now(year).is_ok());
        assert!(validate_year_now(year + 1).is_err());
        assert!(validate_year_now(1895).is_ok());
    }

    #[test]
    fn score_bounds_are_inclusive() {
        assert!(validate_score(10).is_ok());
        assert!(validate_score(1).is_ok());
        assert!(validate_score(11).unwrap_err().contains("score"));
        assert!(validate_score(0).is_err());
    }

    #[test]
    fn merging_collects_messages_per_field() {
        let mut errors = ValidationErrors::new();
        errors.merge(Ok(()));
        errors.merge(validate_not_blank("text", "  "));
        errors.merge(validate_score(42));
        errors.merge(validate_length("text", "abc", 2));

        assert_eq!(errors.messages("text").len(), 2);
        assert_eq!(errors.messages("score").len(), 1);
        assert!(errors.messages("year").is_empty());
    }

    #[test]
    fn duplicate_review_conflict_matches_the_precheck_message() {
        let errors = ValidationErrors::conflict(constraint::REVIEWS_AUTHOR_TITLE);

        assert_eq!(errors.messages(NON_FIELD_ERRORS), &[DUPLICATE_REVIEW.to_owned()]);
    }

    proptest! {
        #[test]
        fn years_after_the_reference_fail(reference in 1000i32..3000, offset in 1i32..1000) {
            prop_assert!(validate_year(reference + offset, reference).is_err());
            prop_assert!(validate_year(reference - offset, reference).is_ok());
            prop_assert!(validate_year(reference, reference).is_ok());
        }

        #[test]
        fn scores_pass_exactly_within_bounds(score in any::<i16>()) {
            prop_assert_eq!(validate_score(score).is_ok(), (1..=10).contains(&score));
        }

        #[test]
        fn reserved_keyword_fails_in_any_casing(mask in proptest::collection::vec(any::<bool>(), 2)) {
            let name: String = "me"
                .chars()
                .zip(mask)
                .map(|(c, upper)| if upper { c.to_ascii_uppercase() } else { c })
                .collect();

            prop_assert!(validate_username(&name, RESERVED).is_err());
        }

        #[test]
        fn well_formed_usernames_pass(name in "[A-Za-z][A-Za-z0-9._-]{2,40}") {
            prop_assert!(validate_username(&name, RESERVED).is_ok());
        }
    }
}
