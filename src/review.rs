use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::patch::Patch;
use crate::user::Id;
use crate::validation::{self, ValidationErrors};

/// A review score. Valid scores lie within `1..=10`.
pub type Score = i16;

/// A single review in the database.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Review {
    /// The ID of the review.
    pub(crate) id: Id,

    /// The ID of the author, used for ownership checks.
    #[serde(skip_serializing)]
    pub(crate) author_id: Id,

    /// The username of the author.
    pub(crate) author: String,

    pub(crate) text: String,

    pub(crate) score: Score,

    /// The date and time it was published.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) pub_date: OffsetDateTime,
}

impl Review {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn author_id(&self) -> Id {
        self.author_id
    }
}

/// A single comment on a review.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comment {
    /// The ID of the comment.
    pub(crate) id: Id,

    /// The ID of the review it belongs to.
    #[serde(skip_serializing)]
    pub(crate) review_id: Id,

    #[serde(skip_serializing)]
    pub(crate) author_id: Id,

    /// The username of the author.
    pub(crate) author: String,

    pub(crate) text: String,

    /// The date and time it was published.
    #[serde(with = "time::serde::timestamp")]
    pub(crate) pub_date: OffsetDateTime,
}

impl Comment {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn author_id(&self) -> Id {
        self.author_id
    }
}

/// A submitted review. The author and title come from the request, not
/// the body.
#[derive(Clone, Debug, Deserialize)]
pub struct ReviewDraft {
    pub(crate) text: String,
    pub(crate) score: Score,
}

impl ReviewDraft {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        errors.merge(validation::validate_not_blank("text", &self.text));
        errors.merge(validation::validate_score(self.score));

        errors.into_result()
    }

    pub fn into_new(self, title_id: Id, author_id: Id) -> NewReview {
        NewReview {
            title_id,
            author_id,
            text: self.text,
            score: self.score,
        }
    }
}

/// A validated review ready to be inserted.
#[derive(Clone, Debug)]
pub struct NewReview {
    pub(crate) title_id: Id,
    pub(crate) author_id: Id,
    pub(crate) text: String,
    pub(crate) score: Score,
}

/// A partial update to a review.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReviewChanges {
    pub(crate) text: Patch<String>,
    pub(crate) score: Patch<Score>,
}

impl ReviewChanges {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        self.text.reject_null("text", &mut errors);
        self.score.reject_null("score", &mut errors);

        if let Some(text) = self.text.value() {
            errors.merge(validation::validate_not_blank("text", text));
        }

        if let Some(&score) = self.score.value() {
            errors.merge(validation::validate_score(score));
        }

        errors.into_result()
    }
}

/// A submitted comment.
#[derive(Clone, Debug, Deserialize)]
pub struct CommentDraft {
    pub(crate) text: String,
}

impl CommentDraft {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validation::validate_not_blank("text", &self.text)
    }

    pub fn into_new(self, review_id: Id, author_id: Id) -> NewComment {
        NewComment {
            review_id,
            author_id,
            text: self.text,
        }
    }
}

/// A partial update to a comment.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentChanges {
    pub(crate) text: Patch<String>,
}

impl CommentChanges {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        self.text.reject_null("text", &mut errors);

        if let Some(text) = self.text.value() {
            errors.merge(validation::validate_not_blank("text", text));
        }

        errors.into_result()
    }
}

/// A validated comment ready to be inserted.
#[derive(Clone, Debug)]
pub struct NewComment {
    pub(crate) review_id: Id,
    pub(crate) author_id: Id,
    pub(crate) text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drafts_check_text_and_score() {
        let draft = ReviewDraft {
            text: "Superb.".to_owned(),
            score: 10,
        };
        assert!(draft.validate().is_ok());

        let draft = ReviewDraft {
            text: "".to_owned(),
            score: 11,
        };
        let errors = draft.validate().unwrap_err();
        assert!(errors.contains("text"));
        assert!(errors.contains("score"));
    }

    #[test]
    fn changes_only_check_present_fields() {
        assert!(ReviewChanges::default().validate().is_ok());

        let changes = ReviewChanges {
            text: Patch::Absent,
            score: Patch::Value(0),
        };
        assert!(changes.validate().unwrap_err().contains("score"));
    }

    #[test]
    fn null_changes_are_field_errors() {
        let changes: ReviewChanges =
            serde_json::from_str(r#"{"text": null, "score": null}"#).unwrap();

        let errors = changes.validate().unwrap_err();
        assert!(errors.contains("text"));
        assert!(errors.contains("score"));

        let changes: CommentChanges = serde_json::from_str("{}").unwrap();
        assert!(changes.validate().is_ok());

        let changes: CommentChanges = serde_json::from_str(r#"{"text": null}"#).unwrap();
        assert!(changes.validate().unwrap_err().contains("text"));
    }

    #[test]
    fn serialized_reviews_name_the_author() {
        let review = Review {
            id: 3,
            author_id: 2,
            author: "ann".to_owned(),
            text: "Fine".to_owned(),
            score: 6,
            pub_date: OffsetDateTime::unix_epoch(),
        };

        let value = serde_json::to_value(&review).unwrap();
        assert_eq!(value["author"], "ann");
        assert_eq!(value["pub_date"], 0);
        assert!(value.get("author_id").is_none());
    }
}
