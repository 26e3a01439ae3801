//! Rule bodies and the set-at-a-time join engine.
//!
//! A [`Body`] is an ordered list of operations. [`PatternMatcher`] threads a
//! set of binding environments through them: `find` joins against the fact
//! store, `not` is an anti-join, `choose` picks the first non-empty
//! alternative, `gather` aggregates per group, and `filter`/`bind` evaluate
//! expressions.

use std::collections::{BTreeMap, BTreeSet};

use eddy_foundation::{Attribute, Value};
use eddy_store::{Bindings, FactPattern, FactStore, Term};

use crate::expr::Expr;

// =============================================================================
// Body Operations
// =============================================================================

/// One step of a rule body.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Join against facts matching a clause.
    Find(FactPattern),
    /// Keep environments for which the sub-body yields nothing.
    Not(Body),
    /// Ordered alternatives; the first branch with results wins.
    Choose(Choose),
    /// Per-group aggregation.
    Gather(Gather),
    /// Keep environments where the expression is `true`.
    Filter(Expr),
    /// Bind a computed value (an equality test when already bound).
    Bind {
        /// Target variable (without `?`).
        var: String,
        /// Value expression.
        expr: Expr,
    },
}

/// One alternative of a [`Choose`].
#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    /// Sub-body evaluated against the incoming environment.
    pub body: Body,
    /// One expression per output variable, evaluated on the branch results.
    pub values: Vec<Expr>,
}

impl Branch {
    /// Creates a branch.
    #[must_use]
    pub fn new(body: Body, values: Vec<Expr>) -> Self {
        Self { body, values }
    }
}

/// Ordered alternatives binding a fixed set of output variables.
#[derive(Clone, Debug, PartialEq)]
pub struct Choose {
    /// Variables bound by whichever branch is chosen.
    pub outputs: Vec<String>,
    /// Alternatives in priority order.
    pub branches: Vec<Branch>,
}

/// Sort direction for ranking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Order {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// The scalar computed per group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregate {
    /// Number of distinct projected tuples.
    Count,
    /// Sum of a variable over distinct tuples.
    Sum(String),
    /// Smallest value of a variable.
    Min(String),
    /// Largest value of a variable.
    Max(String),
    /// 1-based position of each member's tuple, ordered by the `by` variables.
    Rank {
        /// Sort key variables.
        by: Vec<String>,
        /// Sort direction.
        order: Order,
    },
}

impl Aggregate {
    /// Variables the aggregate reads besides the projection.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Self::Count => Vec::new(),
            Self::Sum(var) | Self::Min(var) | Self::Max(var) => vec![var.as_str()],
            Self::Rank { by, .. } => by.iter().map(String::as_str).collect(),
        }
    }
}

/// Groups environments and binds a per-group scalar into each member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gather {
    /// Variables whose distinct combinations are aggregated.
    pub project: Vec<String>,
    /// Grouping variables.
    pub per: Vec<String>,
    /// The aggregate function.
    pub aggregate: Aggregate,
    /// Variable receiving the result (must be unbound).
    pub into: String,
}

fn var_names<'a>(vars: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    vars.into_iter()
        .map(|v| v.strip_prefix('?').unwrap_or(v).to_string())
        .collect()
}

fn var_name(var: &str) -> String {
    var.strip_prefix('?').unwrap_or(var).to_string()
}

impl Gather {
    /// Creates a gather with the given aggregate.
    #[must_use]
    pub fn new(aggregate: Aggregate, into: &str) -> Self {
        Self {
            project: Vec::new(),
            per: Vec::new(),
            aggregate,
            into: var_name(into),
        }
    }

    /// `count` into `into`.
    #[must_use]
    pub fn count(into: &str) -> Self {
        Self::new(Aggregate::Count, into)
    }

    /// `sum(var)` into `into`.
    #[must_use]
    pub fn sum(var: &str, into: &str) -> Self {
        Self::new(Aggregate::Sum(var_name(var)), into)
    }

    /// `min(var)` into `into`.
    #[must_use]
    pub fn min(var: &str, into: &str) -> Self {
        Self::new(Aggregate::Min(var_name(var)), into)
    }

    /// `max(var)` into `into`.
    #[must_use]
    pub fn max(var: &str, into: &str) -> Self {
        Self::new(Aggregate::Max(var_name(var)), into)
    }

    /// `rank` by the given variables into `into`.
    #[must_use]
    pub fn rank<'a>(by: impl IntoIterator<Item = &'a str>, order: Order, into: &str) -> Self {
        Self::new(
            Aggregate::Rank {
                by: var_names(by),
                order,
            },
            into,
        )
    }

    /// Sets the projected variables.
    #[must_use]
    pub fn project<'a>(mut self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        self.project = var_names(vars);
        self
    }

    /// Sets the grouping variables.
    #[must_use]
    pub fn per<'a>(mut self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        self.per = var_names(vars);
        self
    }

    /// The variables that make up a distinct tuple: projection, then aggregate inputs.
    pub(crate) fn key_vars(&self) -> Vec<&str> {
        let mut vars: Vec<&str> = self.project.iter().map(String::as_str).collect();
        for var in self.aggregate.variables() {
            if !vars.contains(&var) {
                vars.push(var);
            }
        }
        vars
    }
}

// =============================================================================
// Body
// =============================================================================

/// An ordered sequence of operations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Body {
    /// The operations, applied left to right.
    pub ops: Vec<Op>,
}

impl Body {
    /// Creates an empty body (yields one empty environment).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    #[must_use]
    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Appends a `find` clause.
    #[must_use]
    pub fn find(
        self,
        entity: impl Into<Term>,
        attribute: impl Into<Term>,
        value: impl Into<Term>,
    ) -> Self {
        self.op(Op::Find(FactPattern::new(entity, attribute, value)))
    }

    /// Appends a negated sub-body.
    #[must_use]
    pub fn not(self, body: Body) -> Self {
        self.op(Op::Not(body))
    }

    /// Appends ordered alternatives binding `outputs`.
    #[must_use]
    pub fn choose<'a>(self, outputs: impl IntoIterator<Item = &'a str>, branches: Vec<Branch>) -> Self {
        self.op(Op::Choose(Choose {
            outputs: var_names(outputs),
            branches,
        }))
    }

    /// Appends an aggregation.
    #[must_use]
    pub fn gather(self, gather: Gather) -> Self {
        self.op(Op::Gather(gather))
    }

    /// Appends a filter.
    #[must_use]
    pub fn filter(self, expr: Expr) -> Self {
        self.op(Op::Filter(expr))
    }

    /// Appends a computed binding.
    #[must_use]
    pub fn bind(self, var: &str, expr: impl Into<Expr>) -> Self {
        self.op(Op::Bind {
            var: var_name(var),
            expr: expr.into(),
        })
    }

    /// Returns the attributes this body reads, including every sub-body.
    #[must_use]
    pub fn dependencies(&self) -> Dependencies {
        let mut deps = Dependencies::default();
        self.collect_dependencies(&mut deps);
        deps
    }

    fn collect_dependencies(&self, deps: &mut Dependencies) {
        for op in &self.ops {
            match op {
                Op::Find(pattern) => match pattern.attribute_name() {
                    Some(name) => {
                        deps.attributes.insert(Attribute::new(name));
                    }
                    None => deps.any_attribute = true,
                },
                Op::Not(body) => body.collect_dependencies(deps),
                Op::Choose(choose) => {
                    for branch in &choose.branches {
                        branch.body.collect_dependencies(deps);
                    }
                }
                Op::Gather(_) | Op::Filter(_) | Op::Bind { .. } => {}
            }
        }
    }
}

// =============================================================================
// Dependencies
// =============================================================================

/// The attributes a rule reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Attributes read by constant-attribute clauses.
    pub attributes: BTreeSet<Attribute>,
    /// Set when some clause has a variable or wildcard attribute.
    pub any_attribute: bool,
}

impl Dependencies {
    /// Returns true if a change to any of `changed` can affect the reader.
    #[must_use]
    pub fn touches(&self, changed: &BTreeSet<Attribute>) -> bool {
        if changed.is_empty() {
            return false;
        }
        self.any_attribute || changed.iter().any(|a| self.attributes.contains(a))
    }
}

// =============================================================================
// Matching
// =============================================================================

/// Counters describing how a body was matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Clause lookups performed.
    pub lookups: usize,
    /// Lookups that degraded to a full scan.
    pub full_scans: usize,
}

impl MatchStats {
    /// Adds another set of counters into this one.
    pub fn merge(&mut self, other: MatchStats) {
        self.lookups += other.lookups;
        self.full_scans += other.full_scans;
    }
}

/// Evaluates bodies against a fact store.
pub struct PatternMatcher<'a> {
    store: &'a FactStore,
    stats: MatchStats,
}

impl<'a> PatternMatcher<'a> {
    /// Creates a matcher over a store.
    #[must_use]
    pub fn new(store: &'a FactStore) -> Self {
        Self {
            store,
            stats: MatchStats::default(),
        }
    }

    /// Returns the counters accumulated so far.
    #[must_use]
    pub fn stats(&self) -> MatchStats {
        self.stats
    }

    /// Evaluates a body from a single empty environment.
    pub fn match_body(&mut self, body: &Body) -> Vec<Bindings> {
        self.evaluate(body, vec![Bindings::new()])
    }

    /// Threads `envs` through every operation of `body`.
    ///
    /// The result is deduplicated and sorted.
    pub fn evaluate(&mut self, body: &Body, envs: Vec<Bindings>) -> Vec<Bindings> {
        let mut envs = envs;
        for op in &body.ops {
            if envs.is_empty() {
                break;
            }
            envs = match op {
                Op::Find(pattern) => self.find(pattern, &envs),
                Op::Not(sub) => self.not(sub, envs),
                Op::Choose(choose) => self.choose(choose, envs),
                Op::Gather(gather) => Self::gather(gather, envs),
                Op::Filter(expr) => envs
                    .into_iter()
                    .filter(|env| expr.eval(env) == Some(Value::Bool(true)))
                    .collect(),
                Op::Bind { var, expr } => envs
                    .into_iter()
                    .filter_map(|mut env| {
                        let value = expr.eval(&env)?;
                        match env.get(var) {
                            Some(existing) => existing.loosely_equals(&value).then_some(env),
                            None => {
                                env.insert(var.clone(), value);
                                Some(env)
                            }
                        }
                    })
                    .collect(),
            };
        }
        dedup(envs)
    }

    fn find(&mut self, pattern: &FactPattern, envs: &[Bindings]) -> Vec<Bindings> {
        let mut out = Vec::new();
        for env in envs {
            let Some(plan) = self.store.plan_pattern(pattern, env) else {
                continue;
            };
            self.stats.lookups += 1;
            if plan.is_full_scan() {
                self.stats.full_scans += 1;
            }
            out.extend(self.store.query(pattern, env));
        }
        out
    }

    fn not(&mut self, sub: &Body, envs: Vec<Bindings>) -> Vec<Bindings> {
        let mut out = Vec::with_capacity(envs.len());
        for env in envs {
            if self.evaluate(sub, vec![env.clone()]).is_empty() {
                out.push(env);
            }
        }
        out
    }

    fn choose(&mut self, choose: &Choose, envs: Vec<Bindings>) -> Vec<Bindings> {
        let mut out = Vec::new();
        for env in envs {
            for branch in &choose.branches {
                let results = self.evaluate(&branch.body, vec![env.clone()]);
                if results.is_empty() {
                    continue;
                }
                for inner in &results {
                    let Some(values) = branch
                        .values
                        .iter()
                        .map(|expr| expr.eval(inner))
                        .collect::<Option<Vec<_>>>()
                    else {
                        continue;
                    };
                    let mut next = env.clone();
                    if choose
                        .outputs
                        .iter()
                        .zip(&values)
                        .all(|(var, value)| next.unify(var, value))
                    {
                        out.push(next);
                    }
                }
                break;
            }
        }
        dedup(out)
    }

    fn gather(gather: &Gather, envs: Vec<Bindings>) -> Vec<Bindings> {
        let key_vars = gather.key_vars();
        let per: Vec<&str> = gather.per.iter().map(String::as_str).collect();

        let mut groups: BTreeMap<Vec<Value>, Vec<(Bindings, Vec<Value>)>> = BTreeMap::new();
        for env in envs {
            let (Some(group), Some(tuple)) = (bound_values(&env, &per), bound_values(&env, &key_vars))
            else {
                continue;
            };
            groups.entry(group).or_default().push((env, tuple));
        }

        let mut out = Vec::new();
        for members in groups.into_values() {
            let distinct: BTreeSet<Vec<Value>> =
                members.iter().map(|(_, tuple)| tuple.clone()).collect();

            if let Aggregate::Rank { by, order } = &gather.aggregate {
                let ranks = rank_tuples(distinct, &key_vars, by, *order);
                for (mut env, tuple) in members {
                    if let Some(rank) = ranks.get(&tuple) {
                        env.insert(gather.into.clone(), *rank);
                        out.push(env);
                    }
                }
                continue;
            }

            let Some(scalar) = aggregate_scalar(&gather.aggregate, &distinct, &key_vars) else {
                continue;
            };
            for (mut env, _) in members {
                env.insert(gather.into.clone(), scalar.clone());
                out.push(env);
            }
        }
        out
    }
}

fn dedup(envs: Vec<Bindings>) -> Vec<Bindings> {
    envs.into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn bound_values(env: &Bindings, vars: &[&str]) -> Option<Vec<Value>> {
    vars.iter().map(|var| env.get(var).cloned()).collect()
}

fn aggregate_scalar(
    aggregate: &Aggregate,
    distinct: &BTreeSet<Vec<Value>>,
    key_vars: &[&str],
) -> Option<Value> {
    let column = |var: &str| -> Option<Vec<&Value>> {
        let index = key_vars.iter().position(|k| *k == var)?;
        Some(distinct.iter().map(|tuple| &tuple[index]).collect())
    };

    match aggregate {
        Aggregate::Count => Some(Value::Int(i64::try_from(distinct.len()).ok()?)),
        Aggregate::Sum(var) => sum(&column(var)?),
        Aggregate::Min(var) => column(var)?.into_iter().min().cloned(),
        Aggregate::Max(var) => column(var)?.into_iter().max().cloned(),
        Aggregate::Rank { .. } => None,
    }
}

fn sum(values: &[&Value]) -> Option<Value> {
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        let mut total: i64 = 0;
        for value in values {
            total = total.checked_add(value.as_int()?)?;
        }
        return Some(Value::Int(total));
    }
    let mut total = 0.0;
    for value in values {
        total += value.as_number()?;
    }
    Some(Value::Float(total))
}

fn rank_tuples(
    distinct: BTreeSet<Vec<Value>>,
    key_vars: &[&str],
    by: &[String],
    order: Order,
) -> BTreeMap<Vec<Value>, i64> {
    let by_index: Vec<usize> = by
        .iter()
        .filter_map(|var| key_vars.iter().position(|k| k == var))
        .collect();
    let sort_key = |tuple: &Vec<Value>| -> Vec<Value> {
        by_index.iter().map(|i| tuple[*i].clone()).collect()
    };

    let mut ordered: Vec<Vec<Value>> = distinct.into_iter().collect();
    ordered.sort_by(|a, b| {
        let ord = sort_key(a).cmp(&sort_key(b)).then_with(|| a.cmp(b));
        match order {
            Order::Ascending => ord,
            Order::Descending => ord.reverse(),
        }
    });

    ordered
        .into_iter()
        .zip(1_i64..)
        .collect()
}
