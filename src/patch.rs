use serde::{Deserialize, Deserializer};

use crate::validation::ValidationErrors;

pub const NULL_FIELD: &str = "this field may not be null";

/// One field of a partial update: left out, sent as `null`, or sent with
/// a value.
///
/// Use with `#[serde(default)]` so that a missing field becomes
/// [`Patch::Absent`].
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Patch::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Patch::Absent => Patch::Absent,
            Patch::Null => Patch::Null,
            Patch::Value(value) => Patch::Value(f(value)),
        }
    }

    /// Records a failure under `field` if the client sent `null`.
    pub fn reject_null(&self, field: &str, errors: &mut ValidationErrors) {
        if let Patch::Null = self {
            errors.add(field, NULL_FIELD);
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Patch::Absent, Patch::Value)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        // only reached for fields that are present
        Option::<T>::deserialize(deserializer).map(|value| value.map_or(Patch::Null, Patch::Value))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Changes {
        #[serde(default)]
        score: Patch<i16>,
    }

    fn parse(body: &str) -> Patch<i16> {
        serde_json::from_str::<Changes>(body).unwrap().score
    }

    #[test]
    fn absent_null_and_present_fields_differ() {
        assert_eq!(parse("{}"), Patch::Absent);
        assert_eq!(parse(r#"{"score": null}"#), Patch::Null);
        assert_eq!(parse(r#"{"score": 7}"#), Patch::Value(7));
    }

    #[test]
    fn only_null_is_a_field_error() {
        let mut errors = ValidationErrors::new();

        Patch::<i16>::Absent.reject_null("score", &mut errors);
        Patch::Value(3).reject_null("score", &mut errors);
        assert!(errors.is_empty());

        Patch::<i16>::Null.reject_null("score", &mut errors);
        assert_eq!(errors.messages("score"), &[NULL_FIELD.to_owned()]);
    }
}
