//! Programs - one store, its rules, and its input queue.
//!
//! A [`Program`] is a single fixpoint domain. External input is queued with
//! [`Program::submit`] and only applied at round boundaries; every completed
//! round is reported to the program's subscribers.

use std::collections::{BTreeSet, VecDeque};

use eddy_foundation::{Attribute, EntityId, Error, ErrorContext, Result, SemanticLimit, Value};
use eddy_store::{Bindings, Diff, FactStore};
use tracing::debug;

use crate::config::EvaluatorConfig;
use crate::forward::Subscriber;
use crate::invariant::{Invariant, InvariantChecker};
use crate::pattern::Body;
use crate::query::{Query, QueryExecutor};
use crate::registry::RuleRegistry;
use crate::round::{Phase, RoundExecutor, RoundReport};
use crate::rule::Rule;
use crate::watcher::Watcher;

/// A named evaluator instance.
pub struct Program {
    name: String,
    config: EvaluatorConfig,
    registry: RuleRegistry,
    invariants: InvariantChecker,
    executor: RoundExecutor,
    subscribers: Vec<Box<dyn Subscriber>>,
    inbox: VecDeque<Diff>,
    outbox: Vec<(String, Diff)>,
    watchers: BTreeSet<String>,
}

impl Program {
    /// Creates an empty program.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: EvaluatorConfig::default(),
            registry: RuleRegistry::new(),
            invariants: InvariantChecker::new(),
            executor: RoundExecutor::new(),
            subscribers: Vec::new(),
            inbox: VecDeque::new(),
            outbox: Vec::new(),
            watchers: BTreeSet::new(),
        }
    }

    /// Sets the evaluator configuration.
    #[must_use]
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the evaluator configuration.
    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Returns the registered rules.
    #[must_use]
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    // --- Setup ---

    /// Registers a rule; it is evaluated for the first time in the next round.
    ///
    /// # Errors
    /// Returns a registration error if the rule is invalid or its name is taken.
    pub fn register(&mut self, rule: Rule) -> Result<()> {
        let name = self.registry.register(rule)?.name().to_string();
        self.executor.mark_pending(&name);
        Ok(())
    }

    /// Adds an invariant checked at the end of every round.
    ///
    /// # Errors
    /// Returns a registration error if the body is invalid or the name is taken.
    pub fn add_invariant(&mut self, invariant: Invariant) -> Result<()> {
        self.invariants.add(invariant)
    }

    /// Adds a subscriber.
    pub fn subscribe(&mut self, subscriber: impl Subscriber + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Attaches a watcher unless one with the same name is already attached.
    ///
    /// Returns `false` if it was already attached. A watcher whose setup fails
    /// leaves the program as it was.
    ///
    /// # Errors
    /// Returns the watcher's setup error.
    pub fn attach<W: Watcher>(&mut self, watcher: W) -> Result<bool> {
        let name = watcher.name().to_string();
        if self.watchers.contains(&name) {
            debug!(program = self.name.as_str(), watcher = name.as_str(), "watcher already attached");
            return Ok(false);
        }

        let registry = self.registry.clone();
        let invariants = self.invariants.clone();
        let executor = self.executor.clone();
        let subscribers = self.subscribers.len();
        if let Err(err) = watcher.setup(self) {
            self.registry = registry;
            self.invariants = invariants;
            self.executor = executor;
            self.subscribers.truncate(subscribers);
            return Err(err);
        }

        debug!(program = self.name.as_str(), watcher = name.as_str(), "watcher attached");
        self.watchers.insert(name);
        Ok(true)
    }

    /// Returns true if a watcher with this name is attached.
    #[must_use]
    pub fn is_attached(&self, watcher: &str) -> bool {
        self.watchers.contains(watcher)
    }

    // --- Input ---

    /// Queues an input diff for the next round.
    pub fn submit(&mut self, diff: Diff) {
        self.inbox.push_back(diff);
    }

    /// Queues an ordered sequence of triples as one input diff.
    pub fn input_eavs<A, V>(&mut self, triples: impl IntoIterator<Item = (EntityId, A, V)>)
    where
        A: Into<Attribute>,
        V: Into<Value>,
    {
        let mut diff = Diff::new();
        for (entity, attribute, value) in triples {
            diff.add_triple(entity, attribute, value);
        }
        self.submit(diff);
    }

    /// Returns true if input is queued, a rule awaits its first evaluation,
    /// or a commit holds a binding it has not fired for.
    #[must_use]
    pub fn has_work(&self) -> bool {
        !self.inbox.is_empty() || self.executor.has_pending() || self.executor.has_ready_commits()
    }

    // --- Rounds ---

    /// Runs one round per queued input diff, or a single empty round if only
    /// newly registered rules are waiting.
    ///
    /// Commits enabled by the effects of other commits fire at the following
    /// round, so empty rounds keep running until no commit is ready.
    ///
    /// # Errors
    /// Returns the first round error. That round is rolled back and its input
    /// dropped; later inputs stay queued. Returns `MaxFixpointIterations` if
    /// commits keep enabling each other for more empty rounds than the limit
    /// allows; the rounds already run stay applied.
    pub fn run_pending(&mut self) -> Result<Vec<RoundReport>> {
        let mut reports = Vec::new();
        if self.inbox.is_empty() && self.executor.has_pending() {
            reports.push(self.apply(Diff::new())?);
        }
        while let Some(diff) = self.inbox.pop_front() {
            reports.push(self.apply(diff)?);
        }

        let mut follow_ups = 0;
        while self.executor.has_ready_commits() {
            if follow_ups >= self.config.max_fixpoint_iterations {
                let context = ErrorContext::new()
                    .with_source(self.name.as_str())
                    .with_round(self.executor.round())
                    .with_frame("commit chain");
                return Err(Error::limit_exceeded(SemanticLimit::MaxFixpointIterations {
                    limit: self.config.max_fixpoint_iterations,
                    context: Some("commits keep enabling each other".to_string()),
                })
                .with_context(context));
            }
            follow_ups += 1;
            reports.push(self.apply(Diff::new())?);
        }
        Ok(reports)
    }

    /// Runs exactly one round with `diff` as its input.
    ///
    /// # Errors
    /// Returns an error if the round exceeds a semantic limit; the program is
    /// then unchanged and subscribers are not notified.
    pub fn apply(&mut self, diff: Diff) -> Result<RoundReport> {
        let report = self.executor.run(
            &self.name,
            &self.registry,
            &self.invariants,
            &self.config,
            &diff,
        )?;
        self.outbox.extend(report.outbound.iter().cloned());
        for subscriber in &mut self.subscribers {
            subscriber.on_round(&report);
        }
        Ok(report)
    }

    // --- Inspection ---

    /// Runs a body against the current store.
    ///
    /// # Errors
    /// Returns a registration error if the body uses unbound variables.
    pub fn query(&self, body: &Body) -> Result<Vec<Bindings>> {
        self.run_query(&Query::new(body.clone()))
    }

    /// Runs a query against the current store.
    ///
    /// # Errors
    /// See [`QueryExecutor::execute`].
    pub fn run_query(&self, query: &Query) -> Result<Vec<Bindings>> {
        QueryExecutor::execute(query, self.executor.store())
    }

    /// Returns the visible store.
    #[must_use]
    pub fn store(&self) -> &FactStore {
        self.executor.store()
    }

    /// Returns the evaluator.
    #[must_use]
    pub fn executor(&self) -> &RoundExecutor {
        &self.executor
    }

    /// Removes and returns watch output waiting to be forwarded.
    pub fn take_outbound(&mut self) -> Vec<(String, Diff)> {
        std::mem::take(&mut self.outbox)
    }

    /// Returns the number of completed rounds.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.executor.round()
    }

    /// Returns the current round phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.executor.phase()
    }
}
