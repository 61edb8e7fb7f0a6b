//! Moment registry.
//!
//! A moment is a named extension point with a combinator kind that decides how
//! the observers registered on it combine. The set of moments is fixed when a
//! timeline type is defined; instances can only add observers.

use indexmap::IndexMap;
use std::fmt;
use std::marker::PhantomData;

use crate::observers::Listener;
use crate::SdkError;

/// How the observers of a moment combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MomentKind {
    /// Observers run in order, each receiving the previous one's output.
    AsyncReduce,
    /// The last registered observer performs the operation alone.
    Request,
    /// Every observer receives the same payload; nothing is returned.
    Broadcast,
    /// Fired outside the main flow (construction, init, dispose).
    Lifecycle,
}

impl MomentKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AsyncReduce => "asyncReduce",
            Self::Request => "request",
            Self::Broadcast => "broadcast",
            Self::Lifecycle => "lifecycle",
        }
    }
}

impl fmt::Display for MomentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed key for a moment whose observers have type `H`.
///
/// Declared as constants by the timeline type that owns the moment:
///
/// ```ignore
/// pub const PRE: Moment<Reducer<PreparedRequest>> = Moment::new("pre", MomentKind::AsyncReduce);
/// ```
pub struct Moment<H> {
    name: &'static str,
    kind: MomentKind,
    _observer: PhantomData<fn() -> H>,
}

impl<H> Moment<H> {
    pub const fn new(name: &'static str, kind: MomentKind) -> Self {
        Self {
            name,
            kind,
            _observer: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn kind(&self) -> MomentKind {
        self.kind
    }
}

impl<H> fmt::Debug for Moment<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Moment")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Built-in moment every registry carries. Receives the error that aborted an
/// invocation.
pub const ERROR: Moment<Listener<SdkError>> = Moment::new("error", MomentKind::Broadcast);

/// The fixed set of moments of a timeline type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MomentRegistry {
    moments: IndexMap<&'static str, MomentKind>,
}

impl MomentRegistry {
    /// Kind of the named moment, if it is defined.
    pub fn kind_of(&self, name: &str) -> Option<MomentKind> {
        self.moments.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.moments.contains_key(name)
    }

    /// Moment names in definition order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.moments.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.moments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }
}

/// Builds a registry from `(name, kind)` pairs.
///
/// The `error` moment is always appended. A repeated name keeps its first
/// position and takes the last kind given.
pub fn define_moments<I>(kinds: I) -> MomentRegistry
where
    I: IntoIterator<Item = (&'static str, MomentKind)>,
{
    let mut moments: IndexMap<&'static str, MomentKind> = kinds.into_iter().collect();
    moments.entry(ERROR.name()).or_insert(ERROR.kind());
    MomentRegistry { moments }
}
