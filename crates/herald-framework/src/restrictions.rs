//! Built-in restrictions.
//!
//! [`Everyone`] and [`Nobody`] are registered by every dispatcher under
//! [`EVERYONE`](herald_core::EVERYONE) and [`NOBODY`](herald_core::NOBODY).
//!
//! Platform checks (author, role, channel, server) all reduce to "does one of
//! these subjects match a criterion". [`SubjectRestriction`] expresses that
//! once: the host supplies an extractor yielding the relevant [`Subject`]s for
//! an invocation, and a validated [`MatchCriterion`] decides.
//!
//! ```rust,ignore
//! let admins = SubjectRestriction::new(
//!     MatchCriterion::by_name("Admin", false)?,
//!     |ctx: &InvocationContext<ChatMessage>| ctx.message().author_roles(),
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use herald_core::{ConfigError, ConfigResult, InvocationContext, Restriction};

/// Allows every invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Everyone;

impl<M> Restriction<M> for Everyone {
    fn allows(&self, _ctx: &InvocationContext<M>) -> bool {
        true
    }
}

/// Rejects every invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Nobody;

impl<M> Restriction<M> for Nobody {
    fn allows(&self, _ctx: &InvocationContext<M>) -> bool {
        false
    }
}

// =============================================================================
// Criteria
// =============================================================================

/// Something a restriction can be checked against: a user, role, channel...
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// How a [`Subject`] is recognised.
///
/// Construct through [`by_id`](Self::by_id), [`by_name`](Self::by_name) or
/// [`by_pattern`](Self::by_pattern), which reject empty input and invalid
/// patterns.
#[derive(Debug, Clone)]
pub enum MatchCriterion {
    /// Exact identifier match.
    ById(String),
    /// Name match, optionally ignoring case.
    ByName { name: String, case_sensitive: bool },
    /// Regular expression that must match the whole name.
    ByPattern(Regex),
}

impl MatchCriterion {
    pub fn by_id(id: impl Into<String>) -> ConfigResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConfigError::invalid_criterion(
                "identifier must not be empty",
            ));
        }
        Ok(Self::ById(id))
    }

    pub fn by_name(name: impl Into<String>, case_sensitive: bool) -> ConfigResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::invalid_criterion("name must not be empty"));
        }
        Ok(Self::ByName {
            name,
            case_sensitive,
        })
    }

    /// Compiles `pattern`, anchored at both ends.
    pub fn by_pattern(pattern: &str) -> ConfigResult<Self> {
        if pattern.is_empty() {
            return Err(ConfigError::invalid_criterion("pattern must not be empty"));
        }
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::ByPattern)
            .map_err(|e| ConfigError::invalid_pattern(pattern, e))
    }

    pub fn matches(&self, subject: &Subject) -> bool {
        match self {
            Self::ById(id) => subject.id == *id,
            Self::ByName {
                name,
                case_sensitive: true,
            } => subject.name == *name,
            Self::ByName {
                name,
                case_sensitive: false,
            } => subject.name.to_lowercase() == name.to_lowercase(),
            Self::ByPattern(pattern) => pattern.is_match(&subject.name),
        }
    }
}

impl fmt::Display for MatchCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ById(id) => write!(f, "id={id}"),
            Self::ByName {
                name,
                case_sensitive,
            } => {
                let mode = if *case_sensitive { "" } else { "~" };
                write!(f, "name{mode}={name}")
            }
            Self::ByPattern(pattern) => write!(f, "pattern={}", pattern.as_str()),
        }
    }
}

// =============================================================================
// SubjectRestriction
// =============================================================================

type Extractor<M> = Arc<dyn Fn(&InvocationContext<M>) -> Vec<Subject> + Send + Sync>;

/// Allows an invocation when any extracted subject matches the criterion.
pub struct SubjectRestriction<M> {
    criterion: MatchCriterion,
    extract: Extractor<M>,
}

impl<M> SubjectRestriction<M> {
    pub fn new<F>(criterion: MatchCriterion, extract: F) -> Self
    where
        F: Fn(&InvocationContext<M>) -> Vec<Subject> + Send + Sync + 'static,
    {
        Self {
            criterion,
            extract: Arc::new(extract),
        }
    }

    pub fn criterion(&self) -> &MatchCriterion {
        &self.criterion
    }
}

impl<M> Clone for SubjectRestriction<M> {
    fn clone(&self) -> Self {
        Self {
            criterion: self.criterion.clone(),
            extract: Arc::clone(&self.extract),
        }
    }
}

impl<M> Restriction<M> for SubjectRestriction<M> {
    fn allows(&self, ctx: &InvocationContext<M>) -> bool {
        (self.extract)(ctx)
            .iter()
            .any(|subject| self.criterion.matches(subject))
    }
}

impl<M> fmt::Debug for SubjectRestriction<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectRestriction")
            .field("criterion", &self.criterion)
            .finish_non_exhaustive()
    }
}
