//! Diff forwarding - subscribers and cross-program routing.
//!
//! This module provides:
//! - [`Subscriber`] - Receives the net diff of every completed round
//! - [`Hub`] - Owns named programs and moves watch output between them

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use eddy_foundation::{Error, Result, SemanticLimit};
use eddy_store::Diff;
use tracing::debug;

use crate::config::EvaluatorConfig;
use crate::program::Program;
use crate::round::RoundReport;

// =============================================================================
// Subscribers
// =============================================================================

/// Receives a report after every completed round.
///
/// Subscribers see the exact net diff of the round, never a snapshot, and
/// never see rounds that were rolled back.
pub trait Subscriber {
    /// Called once per completed round.
    fn on_round(&mut self, report: &RoundReport);
}

impl<S: Subscriber + ?Sized> Subscriber for Rc<RefCell<S>> {
    fn on_round(&mut self, report: &RoundReport) {
        self.borrow_mut().on_round(report);
    }
}

impl<S: Subscriber + ?Sized> Subscriber for Box<S> {
    fn on_round(&mut self, report: &RoundReport) {
        (**self).on_round(report);
    }
}

/// A subscriber backed by a closure.
pub struct FnSubscriber<F>(F);

impl<F: FnMut(&RoundReport)> Subscriber for FnSubscriber<F> {
    fn on_round(&mut self, report: &RoundReport) {
        (self.0)(report);
    }
}

/// Wraps a closure as a subscriber.
pub fn subscriber_fn<F: FnMut(&RoundReport)>(f: F) -> FnSubscriber<F> {
    FnSubscriber(f)
}

/// A subscriber that keeps every report.
#[derive(Clone, Debug, Default)]
pub struct RoundLog {
    reports: Vec<RoundReport>,
}

impl RoundLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded reports in order.
    #[must_use]
    pub fn reports(&self) -> &[RoundReport] {
        &self.reports
    }

    /// Composes every recorded round diff into one.
    #[must_use]
    pub fn total(&self) -> Diff {
        self.reports
            .iter()
            .fold(Diff::new(), |total, report| total.merged(&report.diff))
    }

    /// Removes and returns the recorded reports.
    pub fn drain(&mut self) -> Vec<RoundReport> {
        std::mem::take(&mut self.reports)
    }
}

impl Subscriber for RoundLog {
    fn on_round(&mut self, report: &RoundReport) {
        self.reports.push(report.clone());
    }
}

// =============================================================================
// Hub
// =============================================================================

/// Owns named programs and forwards watch output along routes.
pub struct Hub {
    programs: BTreeMap<String, Program>,
    routes: BTreeMap<(String, String), Vec<String>>,
    config: EvaluatorConfig,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            programs: BTreeMap::new(),
            routes: BTreeMap::new(),
            config: EvaluatorConfig::default(),
        }
    }

    /// Sets the configuration (only `max_forward_hops` is used by the hub).
    #[must_use]
    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a program under its own name.
    ///
    /// # Errors
    /// Returns an error if a program with the same name exists.
    pub fn add_program(&mut self, program: Program) -> Result<()> {
        let name = program.name().to_string();
        if self.programs.contains_key(&name) {
            return Err(Error::duplicate_program(name));
        }
        self.programs.insert(name, program);
        Ok(())
    }

    /// Routes diffs that `from` exports on `channel` into `to`'s input queue.
    ///
    /// # Errors
    /// Returns an error if either program is unknown.
    pub fn route(&mut self, from: &str, channel: &str, to: &str) -> Result<()> {
        for name in [from, to] {
            if !self.programs.contains_key(name) {
                return Err(Error::unknown_program(name));
            }
        }
        let targets = self
            .routes
            .entry((from.to_string(), channel.to_string()))
            .or_default();
        if !targets.iter().any(|t| t == to) {
            targets.push(to.to_string());
        }
        Ok(())
    }

    /// Returns a program by name.
    #[must_use]
    pub fn program(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    /// Returns a program by name, mutably.
    pub fn program_mut(&mut self, name: &str) -> Option<&mut Program> {
        self.programs.get_mut(name)
    }

    /// Queues an input diff for a program.
    ///
    /// # Errors
    /// Returns an error if the program is unknown.
    pub fn submit(&mut self, program: &str, diff: Diff) -> Result<()> {
        self.programs
            .get_mut(program)
            .ok_or_else(|| Error::unknown_program(program))?
            .submit(diff);
        Ok(())
    }

    /// Runs programs and forwards their output until every program is idle.
    ///
    /// Each wave runs every program with queued work, including any follow-up
    /// rounds for ready commits, then moves outbound diffs along routes.
    /// Diffs on channels without a route are dropped.
    ///
    /// # Errors
    /// Returns the first round error, or `MaxForwardHops` if forwarding does
    /// not settle within the configured number of waves.
    pub fn run(&mut self) -> Result<Vec<RoundReport>> {
        let mut reports = Vec::new();
        let mut hops = 0;
        loop {
            for program in self.programs.values_mut() {
                if program.has_work() {
                    reports.extend(program.run_pending()?);
                }
            }

            let mut deliveries = Vec::new();
            for (name, program) in &mut self.programs {
                for (channel, diff) in program.take_outbound() {
                    match self.routes.get(&(name.clone(), channel.clone())) {
                        Some(targets) => {
                            for target in targets {
                                deliveries.push((target.clone(), channel.clone(), diff.clone()));
                            }
                        }
                        None => debug!(program = name.as_str(), channel = channel.as_str(), "no route for outbound diff"),
                    }
                }
            }
            if deliveries.is_empty() {
                return Ok(reports);
            }

            hops += 1;
            if hops > self.config.max_forward_hops {
                return Err(Error::limit_exceeded(SemanticLimit::MaxForwardHops {
                    limit: self.config.max_forward_hops,
                }));
            }
            for (target, channel, diff) in deliveries {
                debug!(to = target.as_str(), channel = channel.as_str(), changes = diff.len(), "diff forwarded");
                self.submit(&target, diff)?;
            }
        }
    }
}
