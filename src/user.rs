use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::BackendError;
use crate::normalization;
use crate::patch::Patch;
use crate::validation::{self, ValidationErrors};

/// A primary key in the database.
pub type Id = i64;

/// The role a user holds. The superuser flag on [`User`] sits outside
/// this hierarchy.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(BackendError::InvalidRole {
                value: s.to_owned(),
            }),
        }
    }
}

/// A single account in the database.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct User {
    /// The ID of the account.
    #[serde(skip_serializing)]
    pub(crate) id: Id,

    /// The unique, normalized username.
    pub(crate) username: String,

    /// The unique email address.
    pub(crate) email: String,

    pub(crate) first_name: String,

    pub(crate) last_name: String,

    pub(crate) bio: String,

    pub(crate) role: Role,

    /// Whether the account was granted full rights outside the API.
    #[serde(skip_serializing)]
    pub(crate) is_superuser: bool,
}

impl User {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }

    /// Administrators and superusers.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.is_superuser
    }

    /// Moderators and everyone above them.
    pub fn is_moderator(&self) -> bool {
        self.role == Role::Moderator || self.is_admin()
    }
}

/// The identity issuing a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Actor {
    Anonymous,
    User(User),
}

impl Actor {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::User(_))
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Actor::User(user) => Some(user),
            Actor::Anonymous => None,
        }
    }

    pub fn id(&self) -> Option<Id> {
        self.user().map(User::id)
    }

    pub fn is_admin(&self) -> bool {
        self.user().map_or(false, User::is_admin)
    }

    pub fn is_moderator(&self) -> bool {
        self.user().map_or(false, User::is_moderator)
    }
}

/// The fields needed to create an account.
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    #[serde(deserialize_with = "normalization::deserialize_username")]
    pub(crate) username: String,

    #[serde(deserialize_with = "normalization::deserialize_email")]
    pub(crate) email: String,

    #[serde(default)]
    pub(crate) first_name: String,

    #[serde(default)]
    pub(crate) last_name: String,

    #[serde(default)]
    pub(crate) bio: String,

    #[serde(default)]
    pub(crate) role: Role,
}

impl NewUser {
    /// An account created through signup: only a username and an email.
    pub fn signup(username: impl AsRef<str>, email: impl AsRef<str>) -> Self {
        NewUser {
            username: normalization::normalize_username(username),
            email: normalization::normalize_email(email),
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
            role: Role::User,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Checks every field, reporting all failures. `reserved` is the
    /// profile keyword, which no account may take as its username.
    pub fn validate(&self, reserved: &str) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        errors.merge(validation::validate_username(&self.username, reserved));
        errors.merge(validation::validate_email(&self.email));
        errors.merge(validate_personal_names(
            Some(&self.first_name),
            Some(&self.last_name),
        ));

        errors.into_result()
    }
}

fn validate_personal_names(
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (field, value) in &[("first_name", first_name), ("last_name", last_name)] {
        if let Some(value) = value {
            errors.merge(validation::validate_length(
                field,
                value,
                validation::MAX_PERSONAL_NAME_LENGTH,
            ));
        }
    }

    errors.into_result()
}

/// A partial update to an account. Absent fields are left alone and
/// `null` fields fail validation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserChanges {
    #[serde(deserialize_with = "normalization::deserialize_username_patch")]
    pub(crate) username: Patch<String>,

    #[serde(deserialize_with = "normalization::deserialize_email_patch")]
    pub(crate) email: Patch<String>,

    pub(crate) first_name: Patch<String>,

    pub(crate) last_name: Patch<String>,

    pub(crate) bio: Patch<String>,

    pub(crate) role: Patch<Role>,

    /// Only settable out of band; never deserialized from a request.
    #[serde(skip)]
    pub(crate) is_superuser: Option<bool>,
}

impl UserChanges {
    /// Changes that only touch the role and superuser flag.
    pub fn grant(role: Role, is_superuser: bool) -> Self {
        UserChanges {
            role: Patch::Value(role),
            is_superuser: Some(is_superuser),
            ..Default::default()
        }
    }

    /// Drops any requested role change, reporting whether there was one.
    pub fn strip_role(&mut self) -> bool {
        !std::mem::take(&mut self.role).is_absent()
    }

    /// Whether the request mentions the role at all.
    pub fn touches_role(&self) -> bool {
        !self.role.is_absent()
    }

    /// Checks the fields that are present.
    pub fn validate(&self, reserved: &str) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        self.username.reject_null("username", &mut errors);
        self.email.reject_null("email", &mut errors);
        self.first_name.reject_null("first_name", &mut errors);
        self.last_name.reject_null("last_name", &mut errors);
        self.bio.reject_null("bio", &mut errors);
        self.role.reject_null("role", &mut errors);

        if let Some(username) = self.username.value() {
            errors.merge(validation::validate_username(username, reserved));
        }
        if let Some(email) = self.email.value() {
            errors.merge(validation::validate_email(email));
        }
        errors.merge(validate_personal_names(
            self.first_name.value().map(String::as_str),
            self.last_name.value().map(String::as_str),
        ));

        errors.into_result()
    }

    pub(crate) fn apply(self, user: &mut User) {
        if let Patch::Value(username) = self.username {
            user.username = username;
        }
        if let Patch::Value(email) = self.email {
            user.email = email;
        }
        if let Patch::Value(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Patch::Value(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Patch::Value(bio) = self.bio {
            user.bio = bio;
        }
        if let Patch::Value(role) = self.role {
            user.role = role;
        }
        if let Some(is_superuser) = self.is_superuser {
            user.is_superuser = is_superuser;
        }
    }
}
