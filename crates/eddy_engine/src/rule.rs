//! Rule definitions: blocks, commits and watches.
//!
//! A [`Rule`] pairs a [`Body`] with the [`Action`]s it performs for every
//! binding the body yields. Rules are validated by [`RuleCompiler`] when they
//! are registered.

pub mod compiler;

pub use compiler::{CompiledRule, RuleCompiler};

use std::fmt;

use eddy_foundation::Attribute;
use eddy_store::Term;

use crate::expr::Expr;
use crate::pattern::{Body, Branch, Gather};

// =============================================================================
// Rule Kind
// =============================================================================

/// How a rule's actions are applied.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Continuously re-derived; outputs are dropped when their support goes.
    Block,
    /// Fires once per newly-appearing binding; effects become base facts.
    Commit,
    /// Maintained like a block, but its output diff is sent on a channel.
    Watch {
        /// Forwarding channel name.
        channel: String,
    },
}

impl RuleKind {
    /// Returns a short name for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Commit => "commit",
            Self::Watch { .. } => "watch",
        }
    }
}

// =============================================================================
// Actions
// =============================================================================

/// A record construction site: one new entity per distinct identity.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordSpec {
    /// Variable the new entity is bound to within the rule's actions.
    pub handle: String,
    /// Tags (facts under `tag`).
    pub tags: Vec<String>,
    /// Attribute expressions, evaluated after every handle is allocated.
    pub attrs: Vec<(Attribute, Expr)>,
}

impl RecordSpec {
    /// Creates a record bound to `handle`.
    #[must_use]
    pub fn new(handle: &str) -> Self {
        Self {
            handle: handle.strip_prefix('?').unwrap_or(handle).to_string(),
            tags: Vec::new(),
            attrs: Vec::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn attr(mut self, attribute: &str, value: impl Into<Expr>) -> Self {
        self.attrs.push((Attribute::new(attribute), value.into()));
        self
    }

    /// Iterates over every expression of the record.
    pub fn exprs(&self) -> impl Iterator<Item = &Expr> {
        self.attrs.iter().map(|(_, expr)| expr)
    }
}

/// Something a rule does for each binding.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Construct a new entity.
    Record(RecordSpec),
    /// Add a fact to an existing entity.
    Add {
        /// Target entity.
        entity: Expr,
        /// Attribute to add.
        attribute: Attribute,
        /// Value to add.
        value: Expr,
    },
    /// Remove facts (commits only).
    Remove {
        /// Target entity.
        entity: Expr,
        /// `None` removes every fact of the entity.
        attribute: Option<Attribute>,
        /// `None` removes every value of the attribute.
        value: Option<Expr>,
    },
}

impl Action {
    /// Iterates over the expressions this action evaluates.
    pub fn exprs(&self) -> Box<dyn Iterator<Item = &Expr> + '_> {
        match self {
            Self::Record(spec) => Box::new(spec.exprs()),
            Self::Add { entity, value, .. } => Box::new([entity, value].into_iter()),
            Self::Remove { entity, value, .. } => {
                Box::new(std::iter::once(entity).chain(value.as_ref()))
            }
        }
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A named rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    /// Unique name within a program.
    pub name: String,
    /// Block, commit or watch.
    pub kind: RuleKind,
    /// What to match.
    pub body: Body,
    /// What to do per binding.
    pub actions: Vec<Action>,
}

impl Rule {
    /// Creates a rule of the given kind with an empty body.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            body: Body::new(),
            actions: Vec::new(),
        }
    }

    /// Creates a block.
    #[must_use]
    pub fn block(name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Block)
    }

    /// Creates a commit.
    #[must_use]
    pub fn commit(name: impl Into<String>) -> Self {
        Self::new(name, RuleKind::Commit)
    }

    /// Creates a watch exporting on `channel`.
    #[must_use]
    pub fn watch(name: impl Into<String>, channel: impl Into<String>) -> Self {
        Self::new(
            name,
            RuleKind::Watch {
                channel: channel.into(),
            },
        )
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Appends a `find` clause.
    #[must_use]
    pub fn find(
        mut self,
        entity: impl Into<Term>,
        attribute: impl Into<Term>,
        value: impl Into<Term>,
    ) -> Self {
        self.body = self.body.find(entity, attribute, value);
        self
    }

    /// Appends a negated sub-body.
    #[must_use]
    pub fn not(mut self, body: Body) -> Self {
        self.body = self.body.not(body);
        self
    }

    /// Appends ordered alternatives.
    #[must_use]
    pub fn choose<'a>(mut self, outputs: impl IntoIterator<Item = &'a str>, branches: Vec<Branch>) -> Self {
        self.body = self.body.choose(outputs, branches);
        self
    }

    /// Appends an aggregation.
    #[must_use]
    pub fn gather(mut self, gather: Gather) -> Self {
        self.body = self.body.gather(gather);
        self
    }

    /// Appends a filter.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.body = self.body.filter(expr);
        self
    }

    /// Appends a computed binding.
    #[must_use]
    pub fn bind(mut self, var: &str, expr: impl Into<Expr>) -> Self {
        self.body = self.body.bind(var, expr);
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Constructs a record per binding.
    #[must_use]
    pub fn record(self, spec: RecordSpec) -> Self {
        self.action(Action::Record(spec))
    }

    /// Adds `[entity attribute value]` per binding.
    #[must_use]
    pub fn add(self, entity: impl Into<Expr>, attribute: &str, value: impl Into<Expr>) -> Self {
        self.action(Action::Add {
            entity: entity.into(),
            attribute: Attribute::new(attribute),
            value: value.into(),
        })
    }

    /// Removes `[entity attribute value]` per binding.
    #[must_use]
    pub fn remove(self, entity: impl Into<Expr>, attribute: &str, value: impl Into<Expr>) -> Self {
        self.action(Action::Remove {
            entity: entity.into(),
            attribute: Some(Attribute::new(attribute)),
            value: Some(value.into()),
        })
    }

    /// Removes every value of `attribute` on `entity`.
    #[must_use]
    pub fn remove_attribute(self, entity: impl Into<Expr>, attribute: &str) -> Self {
        self.action(Action::Remove {
            entity: entity.into(),
            attribute: Some(Attribute::new(attribute)),
            value: None,
        })
    }

    /// Removes every fact of `entity`.
    #[must_use]
    pub fn remove_entity(self, entity: impl Into<Expr>) -> Self {
        self.action(Action::Remove {
            entity: entity.into(),
            attribute: None,
            value: None,
        })
    }

    /// Record handles introduced by this rule's actions, in order.
    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|action| match action {
            Action::Record(spec) => Some(spec.handle.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.name)?;
        if let RuleKind::Watch { channel } = &self.kind {
            write!(f, " -> {channel}")?;
        }
        Ok(())
    }
}
