use url::Url;

use crate::user::Id;

/// Convenience wrapper for URL generation functions.
#[derive(Clone)]
pub struct Urls {
    /// Top-level URL of the API, including trailing slash.
    base: Url,
}

impl Urls {
    /// Create a new instance. `base` is the public URL of the `api/v1/`
    /// prefix, with or without a trailing slash.
    pub fn new(base: impl AsRef<str>) -> Self {
        let mut base = base.as_ref().to_owned();
        if !base.ends_with('/') {
            base.push('/');
        }

        let base = Url::parse(&base).unwrap_or_else(|_| panic!("parse {} as URL", base));

        Urls { base }
    }

    fn join(&self, path: &str) -> Url {
        self.base
            .join(path)
            .unwrap_or_else(|_| panic!("get URL for {}", path))
    }

    pub fn user(&self, username: &str) -> Url {
        self.join(&format!("users/{}/", username))
    }

    pub fn category(&self, slug: &str) -> Url {
        self.join(&format!("categories/{}/", slug))
    }

    pub fn genre(&self, slug: &str) -> Url {
        self.join(&format!("genres/{}/", slug))
    }

    pub fn title(&self, id: Id) -> Url {
        self.join(&format!("titles/{}/", id))
    }

    pub fn review(&self, title: Id, id: Id) -> Url {
        self.join(&format!("titles/{}/reviews/{}/", title, id))
    }

    pub fn comment(&self, title: Id, review: Id, id: Id) -> Url {
        self.join(&format!("titles/{}/reviews/{}/comments/{}/", title, review, id))
    }
}
