use serde::{Deserialize, Deserializer};

use crate::patch::Patch;

/// Normalizes a username by composing it into Unicode Normalization
/// Form KC, so that visually identical names compare equal, and stripping
/// surrounding whitespace.
///
/// ```
/// use reviewdb::normalization::normalize_username;
/// assert_eq!(normalize_username(" ﬁona "), "fiona");
/// ```
pub fn normalize_username(name: impl AsRef<str>) -> String {
    use unicode_normalization::UnicodeNormalization;

    let composed: String = name.as_ref().nfkc().collect();

    // compatibility mappings can produce spaces, so trim afterwards
    composed.trim().to_owned()
}

/// Normalizes an email address by trimming it and lowercasing the domain
/// part. The local part is left alone since some servers treat it as
/// case-sensitive.
///
/// ```
/// use reviewdb::normalization::normalize_email;
/// assert_eq!(normalize_email(" Ann@Example.COM"), "Ann@example.com");
/// ```
pub fn normalize_email(email: impl AsRef<str>) -> String {
    let email = email.as_ref().trim();

    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_owned(),
    }
}

/// Deserializes a `String` after running it through `normalize_username`.
pub fn deserialize_username<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_username(s))
}

/// Deserializes a patched `String` after running it through `normalize_username`.
pub fn deserialize_username_patch<'de, D>(deserializer: D) -> Result<Patch<String>, D::Error>
where D: Deserializer<'de> {
    let p: Patch<String> = Deserialize::deserialize(deserializer)?;
    Ok(p.map(normalize_username))
}

/// Deserializes a `String` after running it through `normalize_email`.
pub fn deserialize_email<'de, D>(deserializer: D) -> Result<String, D::Error>
where D: Deserializer<'de> {
    let s: String = Deserialize::deserialize(deserializer)?;
    Ok(normalize_email(s))
}

/// Deserializes a patched `String` after running it through `normalize_email`.
pub fn deserialize_email_patch<'de, D>(deserializer: D) -> Result<Patch<String>, D::Error>
where D: Deserializer<'de> {
    let p: Patch<String> = Deserialize::deserialize(deserializer)?;
    Ok(p.map(normalize_email))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use unicode_normalization::is_nfkc;

    use super::{normalize_email, normalize_username};

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 2000, ..ProptestConfig::default()
        })]

        #[test]
        fn usernames_are_trimmed_and_composed(string in "\\S(.*\\S)?", space_before in "\\s*", space_after in "\\s*") {
            let normalized = normalize_username(format!("{}{}{}", space_before, string, space_after));

            prop_assert!(is_nfkc(&normalized), "{:?} (normalized form of {:?}) is in NFKC", normalized, string);

            prop_assert_eq!(normalized.trim(), normalized.as_str(), "{:?} (normalized form of {:?}) has no surrounding whitespace", normalized, string);
        }

        #[test]
        fn email_domains_are_lowercased(local in "[A-Za-z0-9._]{1,20}", domain in "[A-Za-z0-9]{1,20}\\.[A-Za-z]{2,5}") {
            let normalized = normalize_email(format!("{}@{}", local, domain));

            prop_assert_eq!(normalized, format!("{}@{}", local, domain.to_lowercase()));
        }
    }

    #[test]
    fn addresses_without_at_signs_are_only_trimmed() {
        assert_eq!(normalize_email("  Nobody  "), "Nobody");
    }
}
