//! Restrictions and restriction chains.
//!
//! A [`Restriction`] is a named boolean predicate over an
//! [`InvocationContext`]. Commands do not hold restrictions directly; they
//! declare a [`RestrictionChain`], a small boolean expression over
//! restriction *identifiers*, which is evaluated against a
//! [`RestrictionLookup`] built once at startup.
//!
//! ```rust,ignore
//! use herald_core::RestrictionChain;
//!
//! // (owner | moderator) & !muted
//! let chain = (RestrictionChain::leaf("owner") | RestrictionChain::leaf("moderator"))
//!     & !RestrictionChain::leaf("muted");
//! assert_eq!(chain.to_string(), "(owner | moderator) & !muted");
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::context::InvocationContext;
use crate::error::{ConfigError, ConfigResult};

/// Identifier of the built-in restriction that allows every invocation.
pub const EVERYONE: &str = "everyone";

/// Identifier of the built-in restriction that rejects every invocation.
pub const NOBODY: &str = "nobody";

static EVERYONE_CHAIN: Lazy<RestrictionChain> = Lazy::new(|| RestrictionChain::leaf(EVERYONE));

// =============================================================================
// Restriction
// =============================================================================

/// A boolean predicate deciding whether an invocation may proceed.
pub trait Restriction<M>: Send + Sync {
    /// Returns `true` if the invocation is allowed.
    fn allows(&self, ctx: &InvocationContext<M>) -> bool;
}

impl<M, F> Restriction<M> for F
where
    F: Fn(&InvocationContext<M>) -> bool + Send + Sync,
{
    fn allows(&self, ctx: &InvocationContext<M>) -> bool {
        self(ctx)
    }
}

/// A shared, type-erased restriction.
pub type BoxedRestriction<M> = Arc<dyn Restriction<M>>;

// =============================================================================
// RestrictionLookup
// =============================================================================

/// Lookup table from restriction identifier to predicate.
///
/// Built once at startup and read-only afterwards.
pub struct RestrictionLookup<M> {
    entries: HashMap<String, BoxedRestriction<M>>,
}

impl<M> RestrictionLookup<M> {
    /// Creates an empty lookup table.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers a restriction under `id`.
    ///
    /// Fails if `id` is already taken.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        restriction: BoxedRestriction<M>,
    ) -> ConfigResult<()> {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(ConfigError::DuplicateRestriction { id });
        }
        self.entries.insert(id, restriction);
        Ok(())
    }

    /// Returns the restriction registered under `id`.
    pub fn get(&self, id: &str) -> Option<&BoxedRestriction<M>> {
        self.entries.get(id)
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns all registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered restrictions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no restriction is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn missing(&self, id: &str) -> ConfigError {
        ConfigError::MissingRestriction {
            id: id.to_string(),
            known: self.ids(),
        }
    }
}

impl<M> Default for RestrictionLookup<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for RestrictionLookup<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestrictionLookup")
            .field("ids", &self.ids())
            .finish()
    }
}

// =============================================================================
// RestrictionChain
// =============================================================================

/// A boolean expression tree over restriction identifiers.
///
/// Equality and hashing are structural. `And` and `Or` short-circuit exactly
/// like the boolean operators: the left operand is evaluated first and the
/// right one is skipped once the result is decided.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RestrictionChain {
    /// A single restriction, referenced by identifier.
    Leaf(String),
    /// Both operands must allow.
    And(Box<RestrictionChain>, Box<RestrictionChain>),
    /// At least one operand must allow.
    Or(Box<RestrictionChain>, Box<RestrictionChain>),
    /// The operand must reject.
    Not(Box<RestrictionChain>),
}

impl RestrictionChain {
    /// A chain consisting of the single restriction `id`.
    pub fn leaf(id: impl Into<String>) -> Self {
        Self::Leaf(id.into())
    }

    /// The chain that allows every invocation.
    pub fn everyone() -> Self {
        Self::leaf(EVERYONE)
    }

    /// A shared reference to [`everyone`](Self::everyone).
    pub fn everyone_ref() -> &'static Self {
        &EVERYONE_CHAIN
    }

    /// The chain that rejects every invocation.
    pub fn nobody() -> Self {
        Self::leaf(NOBODY)
    }

    /// Combines `self` and `other` with AND.
    pub fn and(self, other: impl Into<Self>) -> Self {
        Self::And(Box::new(self), Box::new(other.into()))
    }

    /// Combines `self` and `other` with OR.
    pub fn or(self, other: impl Into<Self>) -> Self {
        Self::Or(Box::new(self), Box::new(other.into()))
    }

    /// Negates `self`.
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluates the chain against `ctx`.
    ///
    /// A leaf whose identifier is absent from `lookup` is a wiring defect and
    /// yields [`ConfigError::MissingRestriction`].
    pub fn is_allowed<M>(
        &self,
        ctx: &InvocationContext<M>,
        lookup: &RestrictionLookup<M>,
    ) -> ConfigResult<bool> {
        match self {
            Self::Leaf(id) => lookup
                .get(id)
                .map(|restriction| restriction.allows(ctx))
                .ok_or_else(|| lookup.missing(id)),
            Self::And(left, right) => {
                Ok(left.is_allowed(ctx, lookup)? && right.is_allowed(ctx, lookup)?)
            }
            Self::Or(left, right) => {
                Ok(left.is_allowed(ctx, lookup)? || right.is_allowed(ctx, lookup)?)
            }
            Self::Not(inner) => Ok(!inner.is_allowed(ctx, lookup)?),
        }
    }

    /// Returns every restriction identifier referenced by the chain.
    pub fn restriction_ids(&self) -> BTreeSet<&str> {
        let mut ids = BTreeSet::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, ids: &mut BTreeSet<&'a str>) {
        match self {
            Self::Leaf(id) => {
                ids.insert(id.as_str());
            }
            Self::And(left, right) | Self::Or(left, right) => {
                left.collect_ids(ids);
                right.collect_ids(ids);
            }
            Self::Not(inner) => inner.collect_ids(ids),
        }
    }

    /// Checks that every referenced identifier is present in `lookup`.
    pub fn validate<M>(&self, lookup: &RestrictionLookup<M>) -> ConfigResult<()> {
        match self
            .restriction_ids()
            .into_iter()
            .find(|id| !lookup.contains(id))
        {
            Some(id) => Err(lookup.missing(id)),
            None => Ok(()),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 0,
            Self::And(..) => 1,
            Self::Not(_) | Self::Leaf(_) => 2,
        }
    }

    fn fmt_operand(&self, parent: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.precedence() < parent {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl Default for RestrictionChain {
    fn default() -> Self {
        Self::everyone()
    }
}

impl From<&str> for RestrictionChain {
    fn from(id: &str) -> Self {
        Self::leaf(id)
    }
}

impl From<String> for RestrictionChain {
    fn from(id: String) -> Self {
        Self::Leaf(id)
    }
}

impl fmt::Display for RestrictionChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(id) => f.write_str(id),
            Self::And(left, right) => {
                left.fmt_operand(1, f)?;
                f.write_str(" & ")?;
                right.fmt_operand(1, f)
            }
            Self::Or(left, right) => {
                left.fmt_operand(0, f)?;
                f.write_str(" | ")?;
                right.fmt_operand(0, f)
            }
            Self::Not(inner) => {
                f.write_str("!")?;
                inner.fmt_operand(2, f)
            }
        }
    }
}

impl BitAnd for RestrictionChain {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        self.and(rhs)
    }
}

impl BitOr for RestrictionChain {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.or(rhs)
    }
}

impl Not for RestrictionChain {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

// =============================================================================
// RestrictionPolicy
// =============================================================================

/// How a flat list of restrictions is combined into a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestrictionPolicy {
    /// Every restriction must allow.
    #[default]
    AllOf,
    /// At least one restriction must allow.
    AnyOf,
    /// No restriction may allow.
    NoneOf,
    /// Exactly one restriction must allow.
    OneOf,
}

impl RestrictionPolicy {
    /// Returns the policy name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllOf => "all-of",
            Self::AnyOf => "any-of",
            Self::NoneOf => "none-of",
            Self::OneOf => "one-of",
        }
    }

    /// Builds the chain combining `ids` under this policy.
    pub fn chain<I, S>(self, ids: I) -> ConfigResult<RestrictionChain>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let leaves: Vec<RestrictionChain> = ids
            .into_iter()
            .map(|id| RestrictionChain::Leaf(id.into()))
            .collect();
        if leaves.is_empty() {
            return Err(ConfigError::EmptyRestrictionPolicy {
                policy: self.as_str(),
            });
        }

        let chain = match self {
            Self::AllOf => fold(leaves, |a, b| a.and(b)),
            Self::AnyOf => fold(leaves, |a, b| a.or(b)),
            Self::NoneOf => fold(leaves, |a, b| a.or(b)).negate(),
            Self::OneOf => {
                let alternatives = (0..leaves.len()).map(|i| {
                    let others: Vec<RestrictionChain> = leaves
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .map(|(_, leaf)| leaf.clone())
                        .collect();
                    if others.is_empty() {
                        leaves[i].clone()
                    } else {
                        leaves[i].clone().and(fold(others, |a, b| a.or(b)).negate())
                    }
                });
                fold(alternatives.collect(), |a, b| a.or(b))
            }
        };
        Ok(chain)
    }
}

impl fmt::Display for RestrictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn fold(
    chains: Vec<RestrictionChain>,
    combine: fn(RestrictionChain, RestrictionChain) -> RestrictionChain,
) -> RestrictionChain {
    let mut iter = chains.into_iter();
    let first = iter.next().unwrap_or_default();
    iter.fold(first, combine)
}
