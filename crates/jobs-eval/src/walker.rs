//! Depth-first discovery of jobs.
//!
//! Every node is auto-called, forced and classified. Jobs are recorded and
//! not descended into; plain attribute sets are explored member by member.
//! Evaluation errors are recorded against the path they happened at, while
//! unsupported values and interrupts end the whole walk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::aggregate::{is_aggregate, resolve_constituents};
use crate::attr_path::AttrPath;
use crate::classify::{classify, Node};
use crate::error::{Error, Result};
use crate::job::{extract_job, JobDescriptor};
use crate::report::{Report, ReportBuilder};
use crate::roots::{RootOutcome, RootRegistrar};
use crate::value::{Attrs, AutoArgs, Evaluator};

/// Attribute sets nested deeper than this are taken to include themselves.
pub const MAX_DEPTH: usize = 128;

/// Cooperative cancellation, checked once per visited node.
///
/// Clones share one flag. The `eval-jobs` binary never triggers it and
/// leaves SIGINT to its default action, which ends the process before any
/// report is written.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_triggered() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub nodes: usize,
    pub jobs: usize,
    pub errors: usize,
    pub roots_created: usize,
}

pub struct Walker<'a, E: Evaluator> {
    eval: &'a E,
    auto_args: &'a AutoArgs,
    registrar: RootRegistrar<'a>,
    interrupt: Interrupt,
    report: ReportBuilder,
    stats: WalkStats,
}

impl<'a, E: Evaluator> Walker<'a, E> {
    pub fn new(eval: &'a E, auto_args: &'a AutoArgs, registrar: RootRegistrar<'a>) -> Self {
        Self {
            eval,
            auto_args,
            registrar,
            interrupt: Interrupt::new(),
            report: ReportBuilder::new(),
            stats: WalkStats::default(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Walks the tree below `root`. Nothing is returned unless the whole
    /// walk completes.
    pub fn walk(mut self, root: &E::Value) -> Result<(Report, WalkStats)> {
        self.explore(&AttrPath::root(), root)?;
        tracing::info!(
            nodes = self.stats.nodes,
            jobs = self.stats.jobs,
            errors = self.stats.errors,
            roots_created = self.stats.roots_created,
            "evaluation finished"
        );
        Ok((self.report.finish(), self.stats))
    }

    fn explore(&mut self, path: &AttrPath, value: &E::Value) -> Result<()> {
        match self.explore_node(path, value) {
            Err(err) if err.is_recoverable() => {
                tracing::debug!(path = %path, error = %err, "evaluation error");
                self.stats.errors += 1;
                self.report.record_error(path, err.to_string());
                Ok(())
            }
            other => other,
        }
    }

    fn explore_node(&mut self, path: &AttrPath, value: &E::Value) -> Result<()> {
        tracing::debug!("at path ‘{}’", path);
        self.interrupt.check()?;
        self.stats.nodes += 1;
        if path.segments().len() > MAX_DEPTH {
            return Err(Error::eval("infinite recursion encountered"));
        }

        let value = self.eval.auto_call(value, self.auto_args)?;
        let forced = self.eval.force(&value)?;
        match classify(self.eval, forced)? {
            Node::Job(drv) => {
                let job = self.job(&drv)?;
                self.stats.jobs += 1;
                self.report.record_job(path, job);
            }
            Node::Group(attrs) => {
                for (name, child) in attrs.iter() {
                    self.explore(&path.child(name), child)?;
                }
            }
            Node::Empty => {}
            Node::Unsupported(shown) => return Err(Error::UnsupportedValue(shown)),
        }
        Ok(())
    }

    fn job(&mut self, drv: &Attrs<E::Value>) -> Result<JobDescriptor> {
        let mut job = extract_job(self.eval, drv)?;
        if is_aggregate(self.eval, drv)? {
            job.constituents = Some(resolve_constituents(self.eval, drv)?);
        }
        if self.registrar.register(&job.artifact_path)? == RootOutcome::Created {
            self.stats.roots_created += 1;
        }
        Ok(job)
    }
}
