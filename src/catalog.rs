use std::fmt;

use serde::{Deserialize, Serialize};

use crate::patch::Patch;
use crate::rating::aggregate_rating;
use crate::review::Score;
use crate::user::Id;
use crate::validation::{self, ValidationErrors};

/// Which of the two label tables a [`Label`] lives in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LabelKind {
    Category,
    Genre,
}

impl LabelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelKind::Category => "category",
            LabelKind::Genre => "genre",
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category or genre. Titles refer to these by slug.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, sqlx::FromRow)]
pub struct Label {
    /// The display name.
    pub(crate) name: String,

    /// The unique identifier used in URLs and title submissions.
    pub(crate) slug: String,
}

impl Label {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Label {
            name: name.into(),
            slug: slug.into(),
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        errors.merge(validation::validate_not_blank("name", &self.name));
        errors.merge(validation::validate_length(
            "name",
            &self.name,
            validation::MAX_LABEL_NAME_LENGTH,
        ));
        errors.merge(validation::validate_slug(&self.slug));

        errors.into_result()
    }
}

/// A title as stored, together with the scores of its current reviews.
#[derive(Clone, Debug, PartialEq)]
pub struct TitleRecord {
    pub(crate) id: Id,
    pub(crate) name: String,
    pub(crate) year: i32,
    pub(crate) description: String,
    pub(crate) category: Option<Label>,
    pub(crate) genres: Vec<Label>,
    pub(crate) scores: Vec<Score>,
}

impl TitleRecord {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn category(&self) -> Option<&Label> {
        self.category.as_ref()
    }

    pub fn genres(&self) -> &[Label] {
        &self.genres
    }

    pub fn scores(&self) -> &[Score] {
        &self.scores
    }
}

/// The outgoing representation of a title.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TitleView {
    id: Id,
    name: String,
    year: i32,

    /// The mean review score, or `null` before the first review.
    rating: Option<f64>,

    description: String,
    genre: Vec<Label>,
    category: Option<Label>,
}

impl From<TitleRecord> for TitleView {
    fn from(record: TitleRecord) -> Self {
        TitleView {
            rating: aggregate_rating(&record.scores),
            id: record.id,
            name: record.name,
            year: record.year,
            description: record.description,
            genre: record.genres,
            category: record.category,
        }
    }
}

impl TitleView {
    pub fn rating(&self) -> Option<f64> {
        self.rating
    }
}

/// A submitted title. Genres and the category are given by slug.
#[derive(Clone, Debug, Deserialize)]
pub struct TitleDraft {
    pub(crate) name: String,
    pub(crate) year: i32,

    #[serde(default)]
    pub(crate) description: String,

    #[serde(default)]
    pub(crate) genre: Vec<String>,

    #[serde(default)]
    pub(crate) category: Option<String>,
}

impl TitleDraft {
    pub fn validate(&self, current_year: i32) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        errors.merge(validation::validate_not_blank("name", &self.name));
        errors.merge(validation::validate_length(
            "name",
            &self.name,
            validation::MAX_TITLE_NAME_LENGTH,
        ));
        errors.merge(validation::validate_year(self.year, current_year));

        errors.into_result()
    }
}

/// A partial update to a title. Absent fields are left alone; a present
/// `genre` replaces the whole set. No field may be `null`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TitleChanges {
    pub(crate) name: Patch<String>,
    pub(crate) year: Patch<i32>,
    pub(crate) description: Patch<String>,
    pub(crate) genre: Patch<Vec<String>>,
    pub(crate) category: Patch<String>,
}

impl TitleChanges {
    pub fn validate(&self, current_year: i32) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        self.name.reject_null("name", &mut errors);
        self.year.reject_null("year", &mut errors);
        self.description.reject_null("description", &mut errors);
        self.genre.reject_null("genre", &mut errors);
        self.category.reject_null("category", &mut errors);

        if let Some(name) = self.name.value() {
            errors.merge(validation::validate_not_blank("name", name));
            errors.merge(validation::validate_length(
                "name",
                name,
                validation::MAX_TITLE_NAME_LENGTH,
            ));
        }

        if let Some(&year) = self.year.value() {
            errors.merge(validation::validate_year(year, current_year));
        }

        errors.into_result()
    }
}

/// Filters for the title listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TitleFilter {
    /// Substring of the name.
    pub(crate) name: Option<String>,

    /// Category slug, compared case-insensitively.
    pub(crate) category: Option<String>,

    /// Genre slug, compared case-insensitively.
    pub(crate) genre: Option<String>,

    pub(crate) year: Option<i32>,
}

impl TitleFilter {
    pub fn matches(&self, record: &TitleRecord) -> bool {
        let name = self
            .name
            .as_ref()
            .map_or(true, |n| record.name.contains(n.as_str()));
        let category = self.category.as_ref().map_or(true, |slug| {
            record
                .category
                .as_ref()
                .map_or(false, |c| c.slug.eq_ignore_ascii_case(slug))
        });
        let genre = self.genre.as_ref().map_or(true, |slug| {
            record
                .genres
                .iter()
                .any(|g| g.slug.eq_ignore_ascii_case(slug))
        });
        let year = self.year.map_or(true, |y| record.year == y);

        name && category && genre && year
    }
}

/// A `?search=` query on a listing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub(crate) search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scores: Vec<Score>) -> TitleRecord {
        TitleRecord {
            id: 1,
            name: "The Long Voyage".to_owned(),
            year: 1940,
            description: String::new(),
            category: Some(Label::new("Film", "film")),
            genres: vec![Label::new("Drama", "drama"), Label::new("War", "war")],
            scores,
        }
    }

    #[test]
    fn view_reports_null_rating_without_reviews() {
        let value = serde_json::to_value(TitleView::from(record(vec![]))).unwrap();

        assert!(value["rating"].is_null());
        assert_eq!(value["genre"][0]["slug"], "drama");
        assert_eq!(value["category"]["name"], "Film");
    }

    #[test]
    fn view_reports_mean_rating() {
        let view = TitleView::from(record(vec![9, 6]));

        assert_eq!(view.rating(), Some(7.5));
    }

    #[test]
    fn title_changes_refuse_nulls() {
        let changes: TitleChanges =
            serde_json::from_str(r#"{"category": null, "year": 1999}"#).unwrap();
        let errors = changes.validate(2020).unwrap_err();

        assert!(!errors.messages("category").is_empty());
        assert!(errors.messages("year").is_empty());

        let changes: TitleChanges = serde_json::from_str("{}").unwrap();
        assert!(changes.validate(2020).is_ok());
    }

    #[test]
    fn filters_combine() {
        let r = record(vec![]);

        assert!(TitleFilter::default().matches(&r));

        let filter = TitleFilter {
            name: Some("Voyage".to_owned()),
            genre: Some("WAR".to_owned()),
            ..Default::default()
        };
        assert!(filter.matches(&r));

        let filter = TitleFilter {
            category: Some("book".to_owned()),
            ..Default::default()
        };
        assert!(!filter.matches(&r));

        let filter = TitleFilter {
            year: Some(1941),
            ..Default::default()
        };
        assert!(!filter.matches(&r));
    }

    #[test]
    fn drafts_from_the_future_are_rejected() {
        let draft = TitleDraft {
            name: "Tomorrow".to_owned(),
            year: 2031,
            description: String::new(),
            genre: vec![],
            category: None,
        };

        assert!(draft.validate(2031).is_ok());
        assert!(draft.validate(2030).unwrap_err().contains("year"));
    }

    #[test]
    fn labels_validate_name_and_slug() {
        assert!(Label::new("Comedy", "comedy").validate().is_ok());

        let errors = Label::new(" ", "no spaces").validate().unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("slug"));
    }
}
