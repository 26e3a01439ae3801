//! Round orchestration - the incremental evaluator.
//!
//! A round is the unit of change. Each round:
//! 1. Applies the external input diff to the base fact set
//! 2. Runs blocks to a fixpoint
//! 3. Fires commits once against the stable snapshot, then re-runs the fixpoint
//! 4. Evaluates watches into outbound diffs
//! 5. Checks invariants and emits the net diff
//!
//! The visible store always equals the base facts (input and commit facts)
//! plus every fact with positive derived support. Any error rolls the whole
//! evaluator state back to where the round started.

use std::collections::BTreeSet;
use std::fmt;

use eddy_foundation::{Attribute, Error, Fact, Result, SemanticLimit};
use eddy_store::{Bindings, Diff, FactStore};
use im::{OrdMap, OrdSet};
use tracing::{debug, error, warn};

use crate::config::EvaluatorConfig;
use crate::invariant::{InvariantChecker, InvariantViolation};
use crate::pattern::{MatchStats, PatternMatcher};
use crate::record::{RecordBuilder, merge_commit_diffs, normalize};
use crate::registry::RuleRegistry;
use crate::rule::{CompiledRule, RuleKind};

// =============================================================================
// Round Phase
// =============================================================================

/// Where a program is in its round state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Between rounds.
    #[default]
    Idle,
    /// Merging the input diff into the base facts.
    ApplyingInput,
    /// Re-deriving blocks.
    Fixpoint,
    /// Firing commits.
    Committing,
    /// Evaluating watches, checking invariants and reporting.
    Emitting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ApplyingInput => "applying input",
            Self::Fixpoint => "fixpoint",
            Self::Committing => "committing",
            Self::Emitting => "emitting",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Round Report
// =============================================================================

/// Counters for one round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundStats {
    /// Fixpoint iterations across both fixpoint phases.
    pub fixpoint_iterations: usize,
    /// Block body evaluations.
    pub block_evaluations: usize,
    /// Commit bindings that fired.
    pub commits_fired: usize,
    /// Clause lookups.
    pub lookups: usize,
    /// Clause lookups that degraded to a full scan.
    pub full_scans: usize,
}

impl RoundStats {
    fn record(&mut self, stats: MatchStats) {
        self.lookups += stats.lookups;
        self.full_scans += stats.full_scans;
    }
}

/// A commit binding that fired this round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FiredCommit {
    /// The commit rule.
    pub rule: String,
    /// The newly-appearing binding.
    pub bindings: Bindings,
}

/// Everything a completed round produced.
#[derive(Clone, Debug)]
pub struct RoundReport {
    /// Program the round ran in.
    pub program: String,
    /// Round number (1-based).
    pub round: u64,
    /// Net change of the visible store.
    pub diff: Diff,
    /// Commits that fired.
    pub fired: Vec<FiredCommit>,
    /// Invariant violations in the final state.
    pub violations: Vec<InvariantViolation>,
    /// Watch output diffs, by channel.
    pub outbound: Vec<(String, Diff)>,
    /// Counters.
    pub stats: RoundStats,
}

impl RoundReport {
    /// Returns true if the round changed nothing and produced nothing.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.diff.is_empty() && self.fired.is_empty() && self.outbound.is_empty()
    }
}

// =============================================================================
// Evaluator State
// =============================================================================

/// Everything the evaluator remembers between rounds.
///
/// Built from persistent collections so checkpointing a round is O(1).
#[derive(Clone, Debug, Default)]
pub struct EvalState {
    /// Input and commit facts.
    base: OrdSet<Fact>,
    /// Number of blocks currently deriving each fact.
    support: OrdMap<Fact, usize>,
    /// Current output set of each block.
    outputs: OrdMap<String, OrdSet<Fact>>,
    /// Current output set of each watch.
    watch_outputs: OrdMap<String, OrdSet<Fact>>,
    /// Bindings each commit saw at its last evaluation.
    commit_seen: OrdMap<String, OrdSet<Bindings>>,
    /// Attributes changed since commits were last evaluated.
    commit_stale: OrdSet<Attribute>,
    /// Commits holding bindings they have not fired for yet.
    commit_ready: OrdSet<String>,
    /// Rules that must be evaluated regardless of dependencies.
    pending: OrdSet<String>,
}

impl EvalState {
    /// Returns true if the fact was supplied by input or a commit.
    #[must_use]
    pub fn is_base(&self, fact: &Fact) -> bool {
        self.base.contains(fact)
    }

    /// Returns how many blocks currently derive the fact.
    #[must_use]
    pub fn support(&self, fact: &Fact) -> usize {
        self.support.get(fact).copied().unwrap_or(0)
    }

    /// Iterates over the base facts.
    pub fn base(&self) -> impl Iterator<Item = &Fact> {
        self.base.iter()
    }
}

// =============================================================================
// Round Executor
// =============================================================================

/// Runs rounds over one program's store.
#[derive(Clone, Debug, Default)]
pub struct RoundExecutor {
    store: FactStore,
    state: EvalState,
    round: u64,
    phase: Phase,
    /// Effective store changes not yet folded into the round diff.
    changes: Diff,
}

impl RoundExecutor {
    /// Creates an executor with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the visible store.
    #[must_use]
    pub fn store(&self) -> &FactStore {
        &self.store
    }

    /// Returns the evaluator state.
    #[must_use]
    pub fn state(&self) -> &EvalState {
        &self.state
    }

    /// Returns the number of completed rounds.
    #[must_use]
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Marks a rule for evaluation in the next round.
    pub fn mark_pending(&mut self, rule: &str) {
        self.state.pending.insert(rule.to_string());
    }

    /// Returns true if some rule is waiting for its first evaluation.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.state.pending.is_empty()
    }

    /// Returns true if some commit's own effects gave it, or another commit,
    /// a binding it has not fired for. The next round fires it.
    #[must_use]
    pub fn has_ready_commits(&self) -> bool {
        !self.state.commit_ready.is_empty()
    }

    /// Runs one round.
    ///
    /// # Errors
    /// Returns an error if a semantic limit is exceeded. The executor is then
    /// restored to its state before the round.
    pub fn run(
        &mut self,
        program: &str,
        registry: &RuleRegistry,
        invariants: &InvariantChecker,
        config: &EvaluatorConfig,
        input: &Diff,
    ) -> Result<RoundReport> {
        let checkpoint = (self.store.clone(), self.state.clone());
        let round = self.round + 1;
        debug!(program, round, input = input.len(), "round started");

        match self.execute(program, round, registry, invariants, config, input) {
            Ok(report) => {
                self.round = round;
                self.phase = Phase::Idle;
                debug!(
                    program,
                    round,
                    changes = report.diff.len(),
                    fired = report.fired.len(),
                    iterations = report.stats.fixpoint_iterations,
                    "round finished"
                );
                if report.stats.full_scans > 0 {
                    debug!(program, round, full_scans = report.stats.full_scans, "round used full scans");
                }
                Ok(report)
            }
            Err(err) => {
                let phase = self.phase;
                (self.store, self.state) = checkpoint;
                self.changes = Diff::new();
                self.phase = Phase::Idle;
                error!(program, round, %phase, error = %err, "round aborted, state rolled back");
                let context = err
                    .context
                    .clone()
                    .unwrap_or_default()
                    .with_source(program)
                    .with_round(round)
                    .with_frame(phase.to_string());
                Err(err.with_context(context))
            }
        }
    }

    fn execute(
        &mut self,
        program: &str,
        round: u64,
        registry: &RuleRegistry,
        invariants: &InvariantChecker,
        config: &EvaluatorConfig,
        input: &Diff,
    ) -> Result<RoundReport> {
        let mut stats = RoundStats::default();
        let mut net = Diff::new();

        self.phase = Phase::ApplyingInput;
        self.apply_base(input);

        self.phase = Phase::Fixpoint;
        self.fixpoint(registry, config, &mut stats, &mut net)?;

        self.phase = Phase::Committing;
        let mut stale: BTreeSet<Attribute> = self.state.commit_stale.iter().cloned().collect();
        stale.extend(net.attributes().cloned());
        let (commit_diff, fired) = self.commit(program, round, registry, &stale, &mut stats);
        self.apply_base(&commit_diff);

        self.phase = Phase::Fixpoint;
        let before = net.clone();
        self.fixpoint(registry, config, &mut stats, &mut net)?;
        let after_commits: BTreeSet<Attribute> =
            before.negated().merged(&net).attributes().cloned().collect();
        self.settle_commits(registry, &after_commits, &mut stats);
        self.state.commit_stale = after_commits.into_iter().collect();

        self.phase = Phase::Emitting;
        let touched: BTreeSet<Attribute> = net.attributes().cloned().collect();
        let outbound = self.watch(registry, &touched, &mut stats);

        let (violations, invariant_stats) = invariants.check(&self.store);
        stats.record(invariant_stats);
        for violation in &violations {
            warn!(program, round, invariant = %violation.invariant, bindings = %violation.bindings, "invariant violated");
        }

        Ok(RoundReport {
            program: program.to_string(),
            round,
            diff: net,
            fired,
            violations,
            outbound,
            stats,
        })
    }

    // --- Visibility ---

    fn show(&mut self, fact: Fact) {
        if self.store.insert(fact.clone()) {
            self.changes.add(fact);
        }
    }

    fn hide(&mut self, fact: &Fact) {
        if self.store.remove(fact) {
            self.changes.remove(fact.clone());
        }
    }

    fn apply_base(&mut self, diff: &Diff) {
        for fact in diff.removed() {
            if self.state.base.remove(fact).is_some() && self.state.support(fact) == 0 {
                self.hide(fact);
            }
        }
        for fact in diff.added() {
            if self.state.base.insert(fact.clone()).is_none() && self.state.support(fact) == 0 {
                self.show(fact.clone());
            }
        }
    }

    fn support(&mut self, fact: &Fact) {
        let count = self.state.support(fact);
        self.state.support.insert(fact.clone(), count + 1);
        if count == 0 && !self.state.is_base(fact) {
            self.show(fact.clone());
        }
    }

    fn unsupport(&mut self, fact: &Fact) {
        match self.state.support(fact) {
            0 => {}
            1 => {
                self.state.support.remove(fact);
                if !self.state.is_base(fact) {
                    self.hide(fact);
                }
            }
            count => {
                self.state.support.insert(fact.clone(), count - 1);
            }
        }
    }

    // --- Fixpoint ---

    /// Re-evaluates dirty blocks until no block output changes.
    fn fixpoint(
        &mut self,
        registry: &RuleRegistry,
        config: &EvaluatorConfig,
        stats: &mut RoundStats,
        net: &mut Diff,
    ) -> Result<()> {
        let mut iterations = 0;
        loop {
            let changes = std::mem::take(&mut self.changes);
            let touched: BTreeSet<Attribute> = changes.attributes().cloned().collect();
            net.merge(&changes);

            let dirty: Vec<&CompiledRule> = registry
                .blocks()
                .filter(|b| self.state.pending.contains(b.name()) || b.deps.touches(&touched))
                .collect();
            if dirty.is_empty() {
                return Ok(());
            }
            if iterations >= config.max_fixpoint_iterations {
                let names: Vec<&str> = dirty.iter().map(|b| b.name()).collect();
                return Err(Error::limit_exceeded(SemanticLimit::MaxFixpointIterations {
                    limit: config.max_fixpoint_iterations,
                    context: Some(format!("still changing: {}", names.join(", "))),
                }));
            }
            iterations += 1;
            stats.fixpoint_iterations += 1;

            let mut rederived: BTreeSet<&str> = BTreeSet::new();
            for block in &dirty {
                if rederived.contains(block.name()) {
                    continue;
                }
                match registry.group_of(block.name()) {
                    Some(group) => {
                        let members: Vec<&CompiledRule> =
                            group.iter().filter_map(|name| registry.get(name)).collect();
                        self.rederive_group(&members, config, stats)?;
                        rederived.extend(group.iter().map(String::as_str));
                    }
                    None => {
                        self.evaluate_block(block, stats);
                    }
                }
            }
            for block in &dirty {
                self.state.pending.remove(block.name());
            }
        }
    }

    /// Retracts every output of a recursive group and derives it again.
    ///
    /// Support counts alone cannot retract facts that only support each
    /// other through the group, so the group restarts from nothing.
    fn rederive_group(
        &mut self,
        members: &[&CompiledRule],
        config: &EvaluatorConfig,
        stats: &mut RoundStats,
    ) -> Result<()> {
        for member in members {
            if let Some(old) = self.state.outputs.remove(member.name()) {
                for fact in old.iter() {
                    self.unsupport(fact);
                }
            }
        }

        let mut iterations = 0;
        loop {
            let mut changed = false;
            for member in members {
                changed |= self.evaluate_block(member, stats);
            }
            if !changed {
                return Ok(());
            }
            iterations += 1;
            if iterations >= config.max_fixpoint_iterations {
                let names: Vec<&str> = members.iter().map(|m| m.name()).collect();
                return Err(Error::limit_exceeded(SemanticLimit::MaxFixpointIterations {
                    limit: config.max_fixpoint_iterations,
                    context: Some(format!("recursive group: {}", names.join(", "))),
                }));
            }
        }
    }

    /// Re-evaluates one block and updates support for the output delta.
    ///
    /// Returns true if the block's output set changed.
    fn evaluate_block(&mut self, block: &CompiledRule, stats: &mut RoundStats) -> bool {
        let mut matcher = PatternMatcher::new(&self.store);
        let bindings = matcher.match_body(&block.rule.body);
        stats.record(matcher.stats());
        stats.block_evaluations += 1;

        let next: OrdSet<Fact> = RecordBuilder::new(block).derive(&bindings).into_iter().collect();
        let previous = self.state.outputs.get(block.name()).cloned().unwrap_or_default();
        if next == previous {
            return false;
        }

        for fact in previous.iter().filter(|f| !next.contains(f)) {
            self.unsupport(fact);
        }
        for fact in next.iter().filter(|f| !previous.contains(f)) {
            self.support(fact);
        }
        self.state.outputs.insert(block.name().to_string(), next);
        true
    }

    // --- Commits ---

    /// Evaluates every commit once against the current snapshot.
    ///
    /// Returns the merged effect diff and the bindings that fired.
    fn commit(
        &mut self,
        program: &str,
        round: u64,
        registry: &RuleRegistry,
        stale: &BTreeSet<Attribute>,
        stats: &mut RoundStats,
    ) -> (Diff, Vec<FiredCommit>) {
        let snapshot = self.store.clone();
        let mut fired = Vec::new();
        let mut normalized = Vec::new();

        for commit in registry.commits() {
            let name = commit.name();
            if !self.state.pending.contains(name) && !commit.deps.touches(stale) {
                continue;
            }
            self.state.pending.remove(name);

            let mut matcher = PatternMatcher::new(&snapshot);
            let current: OrdSet<Bindings> = matcher.match_body(&commit.rule.body).into_iter().collect();
            stats.record(matcher.stats());

            let seen = self.state.commit_seen.get(name).cloned().unwrap_or_default();
            let builder = RecordBuilder::new(commit).firing(program, round);
            let mut effects = Vec::new();
            for bindings in current.iter().filter(|b| !seen.contains(b)) {
                debug!(rule = name, %bindings, "commit fired");
                effects.extend(builder.build(bindings));
                fired.push(FiredCommit {
                    rule: name.to_string(),
                    bindings: bindings.clone(),
                });
            }
            self.state.commit_seen.insert(name.to_string(), current);

            if !effects.is_empty() {
                normalized.push(normalize(&effects, &snapshot));
            }
        }

        stats.commits_fired += fired.len();
        (merge_commit_diffs(&normalized), fired)
    }

    /// Re-matches the commits that the post-commit changes touch.
    ///
    /// Remembered bindings that stopped matching are dropped, so a consumed
    /// trigger can fire again when it is supplied anew. Commits left with
    /// bindings they have not fired for are marked ready.
    fn settle_commits(
        &mut self,
        registry: &RuleRegistry,
        changed: &BTreeSet<Attribute>,
        stats: &mut RoundStats,
    ) {
        self.state.commit_ready = OrdSet::new();
        for commit in registry.commits() {
            if !commit.deps.touches(changed) {
                continue;
            }
            let name = commit.name();
            let mut matcher = PatternMatcher::new(&self.store);
            let current: OrdSet<Bindings> = matcher.match_body(&commit.rule.body).into_iter().collect();
            stats.record(matcher.stats());

            let seen = self.state.commit_seen.get(name).cloned().unwrap_or_default();
            if current.iter().any(|b| !seen.contains(b)) {
                debug!(rule = name, "commit ready for the next round");
                self.state.commit_ready.insert(name.to_string());
            }
            if !seen.is_empty() {
                self.state.commit_seen.insert(name.to_string(), seen.intersection(current));
            }
        }
    }

    // --- Watches ---

    /// Re-evaluates watches and returns their output deltas by channel.
    fn watch(
        &mut self,
        registry: &RuleRegistry,
        touched: &BTreeSet<Attribute>,
        stats: &mut RoundStats,
    ) -> Vec<(String, Diff)> {
        let mut outbound = Vec::new();
        for watch in registry.watches() {
            let RuleKind::Watch { channel } = watch.kind() else {
                continue;
            };
            let name = watch.name();
            if !self.state.pending.contains(name) && !watch.deps.touches(touched) {
                continue;
            }
            self.state.pending.remove(name);

            let mut matcher = PatternMatcher::new(&self.store);
            let bindings = matcher.match_body(&watch.rule.body);
            stats.record(matcher.stats());

            let next: OrdSet<Fact> = RecordBuilder::new(watch).derive(&bindings).into_iter().collect();
            let previous = self.state.watch_outputs.get(name).cloned().unwrap_or_default();

            let mut delta = Diff::new();
            for fact in previous.iter().filter(|f| !next.contains(f)) {
                delta.remove(fact.clone());
            }
            for fact in next.iter().filter(|f| !previous.contains(f)) {
                delta.add(fact.clone());
            }
            self.state.watch_outputs.insert(name.to_string(), next);

            if !delta.is_empty() {
                debug!(rule = name, channel = channel.as_str(), changes = delta.len(), "watch output changed");
                outbound.push((channel.clone(), delta));
            }
        }
        outbound
    }
}
