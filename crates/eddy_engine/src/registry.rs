//! Rule registry.
//!
//! Holds the compiled rules of one program in registration order and groups
//! blocks that feed each other into recursive groups.

use std::collections::{BTreeMap, BTreeSet};

use eddy_foundation::{Error, Result};
use tracing::debug;

use crate::rule::{CompiledRule, Rule, RuleCompiler, RuleKind};

/// The rules of a program.
#[derive(Clone, Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<CompiledRule>,
    by_name: BTreeMap<String, usize>,
    groups: Vec<BTreeSet<String>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers a rule.
    ///
    /// # Errors
    /// Returns a registration error if the rule is invalid or its name is taken.
    pub fn register(&mut self, rule: Rule) -> Result<&CompiledRule> {
        if self.by_name.contains_key(&rule.name) {
            return Err(Error::duplicate_rule(rule.name));
        }
        let compiled = RuleCompiler::compile(rule)?;
        debug!(rule = %compiled.rule, deps = compiled.deps.attributes.len(), "registered rule");

        let index = self.rules.len();
        self.by_name.insert(compiled.rule.name.clone(), index);
        self.rules.push(compiled);
        self.groups = self.compute_groups();
        Ok(&self.rules[index])
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CompiledRule> {
        self.by_name.get(name).map(|&i| &self.rules[i])
    }

    /// Returns true if a rule with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterates over all rules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter()
    }

    /// Iterates over blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|r| *r.kind() == RuleKind::Block)
    }

    /// Iterates over commits.
    pub fn commits(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|r| *r.kind() == RuleKind::Commit)
    }

    /// Iterates over watches.
    pub fn watches(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules
            .iter()
            .filter(|r| matches!(r.kind(), RuleKind::Watch { .. }))
    }

    /// Groups of blocks that (transitively) feed themselves.
    ///
    /// Each group is a strongly connected component of the block dependency
    /// graph that contains a cycle, including single self-feeding blocks.
    #[must_use]
    pub fn recursive_groups(&self) -> &[BTreeSet<String>] {
        &self.groups
    }

    /// Returns the recursive group containing `name`, if any.
    #[must_use]
    pub fn group_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.groups.iter().find(|group| group.contains(name))
    }

    fn compute_groups(&self) -> Vec<BTreeSet<String>> {
        let blocks: Vec<&CompiledRule> = self.blocks().collect();
        let n = blocks.len();

        // reach[i][j]: block i can (eventually) change what block j matches
        let mut reach = vec![vec![false; n]; n];
        for (i, from) in blocks.iter().enumerate() {
            for (j, to) in blocks.iter().enumerate() {
                reach[i][j] = from.feeds(to);
            }
        }
        for k in 0..n {
            for i in 0..n {
                if reach[i][k] {
                    for j in 0..n {
                        if reach[k][j] {
                            reach[i][j] = true;
                        }
                    }
                }
            }
        }

        let mut seen = BTreeSet::new();
        let mut groups = Vec::new();
        for i in 0..n {
            if !reach[i][i] || seen.contains(&i) {
                continue;
            }
            let members: Vec<usize> = (0..n).filter(|&j| reach[i][j] && reach[j][i]).collect();
            seen.extend(members.iter().copied());
            groups.push(members.iter().map(|&j| blocks[j].name().to_string()).collect());
        }
        groups
    }
}
