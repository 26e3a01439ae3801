//! Join engine, rules, and incremental evaluation for Eddy.
//!
//! This crate provides:
//! - [`PatternMatcher`] - Set-at-a-time joins with `not`, `choose` and `gather`
//! - [`RuleRegistry`] - Rule validation, dependencies and recursive groups
//! - [`RoundExecutor`] - The round state machine and block fixpoint
//! - [`RecordBuilder`] - Two-phase entity construction from rule actions
//! - [`Program`] and [`Hub`] - Evaluator instances and diff forwarding
//! - [`InvariantChecker`] - Invariant reporting
//! - [`QueryExecutor`] - Ad-hoc queries

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod expr;
pub mod forward;
pub mod invariant;
pub mod pattern;
pub mod program;
pub mod query;
pub mod record;
pub mod registry;
pub mod round;
pub mod rule;
pub mod watcher;

pub use config::EvaluatorConfig;
pub use expr::{BinaryOp, Expr, Function};
pub use forward::{FnSubscriber, Hub, RoundLog, Subscriber, subscriber_fn};
pub use invariant::{Invariant, InvariantChecker, InvariantViolation};
pub use pattern::{
    Aggregate, Body, Branch, Choose, Dependencies, Gather, MatchStats, Op, Order, PatternMatcher,
};
pub use program::Program;
pub use query::{Query, QueryExecutor};
pub use record::{Effect, RecordBuilder, Removal};
pub use registry::RuleRegistry;
pub use round::{EvalState, FiredCommit, Phase, RoundExecutor, RoundReport, RoundStats};
pub use rule::{Action, CompiledRule, RecordSpec, Rule, RuleCompiler, RuleKind};
pub use watcher::{FnWatcher, Watcher, watcher_fn};
