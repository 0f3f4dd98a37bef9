//! Who may do what to which resource.
//!
//! Every rule lives in [`RULES`], keyed by resource kind and action. A
//! rule names a [`Requirement`] that the actor has to meet; a pair with no
//! rule is denied to everyone, superusers included.

use self::Action::*;
use self::Requirement::*;
use self::ResourceKind as K;
use crate::errors::BackendError;
use crate::user::{Actor, Id};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResourceKind {
    Category,
    Genre,
    Title,
    Review,
    Comment,

    /// Any account, through the administrative surface.
    User,

    /// The actor's own account.
    Profile,

    /// The role field of an account.
    Role,
}

/// What an action is aimed at: the kind of resource and, for resources
/// that have one, the ID of the user who owns it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Target {
    kind: ResourceKind,
    owner: Option<Id>,
}

impl Target {
    /// A collection, or a resource with no owner.
    pub fn of(kind: ResourceKind) -> Self {
        Target { kind, owner: None }
    }

    /// A resource owned by `owner`.
    pub fn owned(kind: ResourceKind, owner: Id) -> Self {
        Target {
            kind,
            owner: Some(owner),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Requirement {
    Anyone,
    Authenticated,
    Owner,
    OwnerOrModerator,
    Admin,
}

impl Requirement {
    fn is_met_by(self, actor: &Actor, owner: Option<Id>) -> bool {
        let is_owner = match (actor.id(), owner) {
            (Some(actor), Some(owner)) => actor == owner,
            _ => false,
        };

        match self {
            Requirement::Anyone => true,
            Requirement::Authenticated => actor.is_authenticated(),
            Requirement::Owner => is_owner,
            Requirement::OwnerOrModerator => is_owner || actor.is_moderator(),
            Requirement::Admin => actor.is_admin(),
        }
    }
}

const RULES: &[(ResourceKind, Action, Requirement)] = &[
    (K::Category, Read, Anyone),
    (K::Category, Create, Admin),
    (K::Category, Delete, Admin),
    (K::Genre, Read, Anyone),
    (K::Genre, Create, Admin),
    (K::Genre, Delete, Admin),
    (K::Title, Read, Anyone),
    (K::Title, Create, Admin),
    (K::Title, Update, Admin),
    (K::Title, Delete, Admin),
    (K::Review, Read, Anyone),
    (K::Review, Create, Authenticated),
    (K::Review, Update, OwnerOrModerator),
    (K::Review, Delete, OwnerOrModerator),
    (K::Comment, Read, Anyone),
    (K::Comment, Create, Authenticated),
    (K::Comment, Update, OwnerOrModerator),
    (K::Comment, Delete, OwnerOrModerator),
    (K::User, Read, Admin),
    (K::User, Create, Admin),
    (K::User, Update, Admin),
    (K::User, Delete, Admin),
    (K::Profile, Read, Owner),
    (K::Profile, Update, Owner),
    (K::Role, Update, Admin),
];

/// Decides whether `actor` may perform `action` on `target`. Pure: the
/// answer depends on nothing but the arguments.
pub fn decide(actor: &Actor, action: Action, target: &Target) -> Decision {
    let requirement = RULES
        .iter()
        .find(|(kind, a, _)| *kind == target.kind && *a == action)
        .map(|(_, _, requirement)| *requirement);

    match requirement {
        Some(r) if r.is_met_by(actor, target.owner) => Decision::Allow,
        _ => Decision::Deny,
    }
}

/// Like [`decide`], but turns a denial into the error to report: anonymous
/// actors are asked to authenticate, everybody else is refused.
pub fn authorize(actor: &Actor, action: Action, target: &Target) -> Result<(), BackendError> {
    match decide(actor, action, target) {
        Decision::Allow => Ok(()),
        Decision::Deny if actor.is_authenticated() => Err(BackendError::Forbidden),
        Decision::Deny => Err(BackendError::NotAuthenticated),
    }
}
