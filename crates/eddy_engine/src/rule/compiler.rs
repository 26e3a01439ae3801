//! Rule compiler - validates rules and precomputes what evaluation needs.
//!
//! Checks variable scoping and rule shape at registration time, and derives
//! each rule's attribute dependencies, output attributes, and the identity
//! variables of every record construction site.

use std::collections::{BTreeMap, BTreeSet};

use eddy_foundation::{Attribute, Error, Result, Value};
use eddy_store::Term;

use super::{Action, Rule, RuleKind};
use crate::expr::Expr;
use crate::pattern::{Body, Dependencies, Op};

// =============================================================================
// Compiled Rule
// =============================================================================

/// A validated rule with its precomputed evaluation metadata.
#[derive(Clone, Debug)]
pub struct CompiledRule {
    /// The rule as registered.
    pub rule: Rule,
    /// Attributes the body reads.
    pub deps: Dependencies,
    /// Attributes the actions write.
    pub outputs: BTreeSet<Attribute>,
    /// Identity variables of each record site, in action order.
    pub identities: Vec<Vec<String>>,
}

impl CompiledRule {
    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.rule.name
    }

    /// Returns the rule kind.
    #[must_use]
    pub fn kind(&self) -> &RuleKind {
        &self.rule.kind
    }

    /// Returns true if this rule's outputs can change what `other` matches.
    #[must_use]
    pub fn feeds(&self, other: &CompiledRule) -> bool {
        other.deps.touches(&self.outputs)
    }
}

// =============================================================================
// Rule Compiler
// =============================================================================

/// Validates rules and bodies.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compiles a rule.
    ///
    /// # Errors
    /// Returns a registration error for unbound variables, handle collisions,
    /// malformed `choose`/`gather` operations, or `remove` outside a commit.
    pub fn compile(rule: Rule) -> Result<CompiledRule> {
        if rule.name.trim().is_empty() {
            return Err(Error::invalid_rule(&rule.name, "rule name is empty"));
        }

        let bound = Self::check_body(&rule.name, &rule.body, BTreeSet::new())?;

        let mut handles = BTreeSet::new();
        for handle in rule.handles() {
            if bound.contains(handle) {
                return Err(Error::invalid_rule(
                    &rule.name,
                    format!("record handle ?{handle} is already bound by the body"),
                ));
            }
            if !handles.insert(handle.to_string()) {
                return Err(Error::invalid_rule(
                    &rule.name,
                    format!("record handle ?{handle} is used twice"),
                ));
            }
        }

        let mut scope = bound.clone();
        scope.extend(handles.iter().cloned());
        for action in &rule.actions {
            if matches!(action, Action::Remove { .. }) && rule.kind != RuleKind::Commit {
                return Err(Error::invalid_rule(
                    &rule.name,
                    format!("remove is only allowed in commits, not in a {}", rule.kind.label()),
                ));
            }
            for expr in action.exprs() {
                Self::check_expr(&rule.name, expr, &scope)?;
            }
        }

        let deps = rule.body.dependencies();
        let outputs = Self::outputs(&rule);
        let identities = Self::identities(&rule, &bound, &handles);

        Ok(CompiledRule {
            rule,
            deps,
            outputs,
            identities,
        })
    }

    /// Validates a body given the variables already bound on entry.
    ///
    /// Returns the variables bound after the body runs.
    ///
    /// # Errors
    /// Returns a registration error naming `rule` for the first problem found.
    pub fn check_body(
        rule: &str,
        body: &Body,
        mut bound: BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        for op in &body.ops {
            match op {
                Op::Find(pattern) => {
                    if let Term::Const(value) = &pattern.attribute {
                        if !matches!(value, Value::String(_)) {
                            return Err(Error::invalid_rule(
                                rule,
                                format!("attribute {value:?} in {pattern} is not a string"),
                            ));
                        }
                    }
                    bound.extend(pattern.variables().map(str::to_string));
                }
                Op::Not(sub) => {
                    Self::check_body(rule, sub, bound.clone())?;
                }
                Op::Choose(choose) => {
                    if choose.branches.is_empty() {
                        return Err(Error::invalid_rule(rule, "choose has no branches"));
                    }
                    for (i, branch) in choose.branches.iter().enumerate() {
                        if branch.values.len() != choose.outputs.len() {
                            return Err(Error::invalid_rule(
                                rule,
                                format!(
                                    "choose branch {i} yields {} values for {} outputs",
                                    branch.values.len(),
                                    choose.outputs.len()
                                ),
                            ));
                        }
                        let inner = Self::check_body(rule, &branch.body, bound.clone())?;
                        for value in &branch.values {
                            Self::check_expr(rule, value, &inner)?;
                        }
                    }
                    bound.extend(choose.outputs.iter().cloned());
                }
                Op::Gather(gather) => {
                    let reads = gather
                        .per
                        .iter()
                        .chain(&gather.project)
                        .map(String::as_str)
                        .chain(gather.aggregate.variables());
                    for var in reads {
                        if !bound.contains(var) {
                            return Err(Error::unbound_variable(rule, var));
                        }
                    }
                    if !bound.insert(gather.into.clone()) {
                        return Err(Error::invalid_rule(
                            rule,
                            format!("gather target ?{} is already bound", gather.into),
                        ));
                    }
                    if gather.key_vars().is_empty() {
                        return Err(Error::invalid_rule(
                            rule,
                            format!("gather into ?{} projects no variables", gather.into),
                        ));
                    }
                }
                Op::Filter(expr) => Self::check_expr(rule, expr, &bound)?,
                Op::Bind { var, expr } => {
                    Self::check_expr(rule, expr, &bound)?;
                    bound.insert(var.clone());
                }
            }
        }
        Ok(bound)
    }

    fn check_expr(rule: &str, expr: &Expr, bound: &BTreeSet<String>) -> Result<()> {
        if let Some(var) = expr.variables().into_iter().find(|v| !bound.contains(*v)) {
            return Err(Error::unbound_variable(rule, var));
        }
        if let Some(reason) = expr.arity_error() {
            return Err(Error::invalid_rule(rule, reason));
        }
        Ok(())
    }

    fn outputs(rule: &Rule) -> BTreeSet<Attribute> {
        let mut outputs = BTreeSet::new();
        for action in &rule.actions {
            match action {
                Action::Record(spec) => {
                    if !spec.tags.is_empty() {
                        outputs.insert(Attribute::tag());
                    }
                    outputs.extend(spec.attrs.iter().map(|(a, _)| a.clone()));
                }
                Action::Add { attribute, .. } => {
                    outputs.insert(attribute.clone());
                }
                Action::Remove { attribute, .. } => {
                    outputs.extend(attribute.clone());
                }
            }
        }
        outputs
    }

    /// Body variables each record's identity depends on, closed over the
    /// handles it references.
    fn identities(
        rule: &Rule,
        bound: &BTreeSet<String>,
        handles: &BTreeSet<String>,
    ) -> Vec<Vec<String>> {
        let sites: Vec<_> = rule
            .actions
            .iter()
            .filter_map(|action| match action {
                Action::Record(spec) => Some(spec),
                _ => None,
            })
            .collect();

        let mut direct: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let mut refs: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for spec in &sites {
            let mut vars = BTreeSet::new();
            for expr in spec.exprs() {
                expr.collect_variables(&mut vars);
            }
            let own = direct.entry(spec.handle.as_str()).or_default();
            let linked = refs.entry(spec.handle.as_str()).or_default();
            for var in vars {
                if bound.contains(var) {
                    own.insert(var.to_string());
                } else if handles.contains(var) && var != spec.handle {
                    linked.insert(var);
                }
            }
        }

        let mut closed = direct;
        loop {
            let mut changed = false;
            for (handle, linked) in &refs {
                let inherited: BTreeSet<String> = linked
                    .iter()
                    .filter_map(|other| closed.get(other))
                    .flatten()
                    .cloned()
                    .collect();
                if let Some(own) = closed.get_mut(handle) {
                    let before = own.len();
                    own.extend(inherited);
                    changed |= own.len() != before;
                }
            }
            if !changed {
                break;
            }
        }

        sites
            .iter()
            .map(|spec| {
                closed
                    .get(spec.handle.as_str())
                    .map(|vars| vars.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .collect()
    }
}
