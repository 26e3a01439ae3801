//! Capability attachment.
//!
//! A [`Watcher`] bundles the rules, invariants and subscribers that give a
//! program some capability (rendering, editor support, ...). Attaching is
//! idempotent per watcher name.

use eddy_foundation::Result;

use crate::program::Program;

/// A named capability that installs itself into a program.
pub trait Watcher {
    /// Unique name; a program attaches each name at most once.
    fn name(&self) -> &str;

    /// Registers the watcher's rules, invariants and subscribers.
    ///
    /// # Errors
    /// Returns an error if any of its rules fail to register.
    fn setup(self, program: &mut Program) -> Result<()>
    where
        Self: Sized;
}

/// A watcher built from a name and a setup closure.
pub struct FnWatcher<F> {
    name: String,
    setup: F,
}

/// Creates a watcher from a name and a setup closure.
pub fn watcher_fn<F>(name: impl Into<String>, setup: F) -> FnWatcher<F>
where
    F: FnOnce(&mut Program) -> Result<()>,
{
    FnWatcher {
        name: name.into(),
        setup,
    }
}

impl<F> Watcher for FnWatcher<F>
where
    F: FnOnce(&mut Program) -> Result<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(self, program: &mut Program) -> Result<()> {
        (self.setup)(program)
    }
}
