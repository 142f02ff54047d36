//! Job discovery for release trees.
//!
//! A release tree is a lazily evaluated set of attribute sets whose leaves
//! are derivations. [`find_jobs`] walks such a tree through an
//! [`Evaluator`], records a [`JobDescriptor`] or an error for every job it
//! finds, and registers each job's derivation as a GC root.

pub mod aggregate;
pub mod attr_path;
pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod job;
pub mod meta;
pub mod report;
pub mod roots;
pub mod value;
pub mod walker;

use std::path::Path;

pub use attr_path::AttrPath;
pub use config::EvalConfig;
pub use document::DocumentEvaluator;
pub use error::{Error, Result};
pub use job::JobDescriptor;
pub use report::{Report, ReportEntry, ReportLayout};
pub use roots::{LocalStore, RootOutcome, RootRegistrar, Store};
pub use value::{AutoArg, AutoArgs, Context, Evaluator, Whnf};
pub use walker::{Interrupt, WalkStats, Walker};

/// Walks `root` with the settings in `config`. `store` may be `None` when
/// no store is reachable, in which case no GC roots are registered.
pub fn find_jobs<E: Evaluator>(
    eval: &E,
    root: &E::Value,
    config: &EvalConfig,
    store: Option<&dyn Store>,
    interrupt: &Interrupt,
) -> Result<(Report, WalkStats)> {
    let auto_args = config.auto_args();
    let registrar = RootRegistrar::new(store, config.gc_roots_dir.as_deref(), config.dry_run);
    Walker::new(eval, &auto_args, registrar)
        .with_interrupt(interrupt.clone())
        .walk(root)
}

/// Loads a release document from disk and walks it against the local store.
pub fn evaluate_release(
    release: &Path,
    config: &EvalConfig,
    interrupt: &Interrupt,
) -> Result<(Report, WalkStats)> {
    let eval = DocumentEvaluator::from_path(release)?;
    find_jobs(&eval, eval.root(), config, Some(&LocalStore), interrupt)
}
