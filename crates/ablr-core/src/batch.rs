//! Running one refactoring over many targets
//!
//! Targets are processed file by file. Each file's scanner list is edited in
//! place by the refactoring, swept, and written once all of that file's
//! targets have run. A target that fails recoverably is reported and the
//! rest of the batch carries on.

use crate::config::RefactorConfig;
use crate::error::RefactorError;
use crate::result::Result;
use crate::rollback::{Rollback, absolute, mirror_path};
use crate::scan::{AblScanner, Scan, ScanManager, SourceScanner};
use crate::store::TokenStore;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One place a refactoring should be applied
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    /// Refactoring-specific argument, e.g. a new name
    pub detail: Option<String>,
}

impl Target {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// `file:line:col`
    pub fn position(&self) -> String {
        format!("{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.position())
    }
}

/// What a refactoring sees of the file it is working on
pub struct RefactorContext<'a> {
    pub store: &'a mut TokenStore,
    pub scan: &'a mut Scan,
    pub config: &'a RefactorConfig,
    messages: &'a mut Vec<String>,
}

impl RefactorContext<'_> {
    /// Add a line to the batch report
    pub fn message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }
}

/// A refactoring applied target by target
pub trait Refactoring {
    fn name(&self) -> &str;

    /// Edit the scanner list for `target`; `Ok(false)` when nothing changed
    ///
    /// Recoverable errors fail only this target.
    fn apply(&mut self, ctx: &mut RefactorContext<'_>, target: &Target) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: Target,
    pub message: String,
}

/// Outcome of [`BatchRunner::run`]
#[derive(Debug, Default)]
pub struct BatchReport {
    pub messages: Vec<String>,
    pub failures: Vec<TargetFailure>,
    /// Files written, in the order they were written
    pub written: Vec<PathBuf>,
    /// Output files withheld because targets disagreed on their content
    pub bad_files: BTreeSet<PathBuf>,
    /// Targets the refactoring changed something for
    pub applied: usize,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.bad_files.is_empty()
    }
}

enum Destination<'a> {
    InPlace(&'a mut Rollback),
    OutputDir(PathBuf),
}

/// Drives a [`Refactoring`] over a set of targets
pub struct BatchRunner<'a, S: SourceScanner = AblScanner> {
    config: &'a RefactorConfig,
    store: TokenStore,
    scans: ScanManager<S>,
    destination: Destination<'a>,
}

impl<'a> BatchRunner<'a, AblScanner> {
    /// Write through `rollback`, or into the configured output directory
    /// when there is one
    pub fn new(config: &'a RefactorConfig, rollback: &'a mut Rollback) -> Self {
        Self::with_scanner(config, rollback, AblScanner)
    }

    /// Write every result below `output_dir`, leaving the sources alone
    pub fn to_output_dir(config: &'a RefactorConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            store: TokenStore::new(),
            scans: ScanManager::new(AblScanner),
            destination: Destination::OutputDir(output_dir.into()),
        }
    }
}

impl<'a, S: SourceScanner> BatchRunner<'a, S> {
    pub fn with_scanner(config: &'a RefactorConfig, rollback: &'a mut Rollback, scanner: S) -> Self {
        let destination = match &config.output_dir {
            Some(dir) => Destination::OutputDir(dir.clone()),
            None => Destination::InPlace(rollback),
        };
        Self {
            config,
            store: TokenStore::new(),
            scans: ScanManager::new(scanner),
            destination,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Apply `refactoring` to every target, grouped by file in path order
    pub fn run(
        &mut self,
        targets: impl IntoIterator<Item = Target>,
        refactoring: &mut dyn Refactoring,
    ) -> Result<BatchReport> {
        let mut targets: Vec<Target> = targets.into_iter().collect();
        targets.sort();
        let mut report = BatchReport::default();
        info!("Running {} over {} targets", refactoring.name(), targets.len());

        let mut start = 0;
        while start < targets.len() {
            let file = targets[start].file.clone();
            let end = targets[start..]
                .iter()
                .position(|t| t.file != file)
                .map_or(targets.len(), |offset| start + offset);
            self.run_file(&file, &targets[start..end], refactoring, &mut report)?;
            start = end;
        }

        info!(
            "{}: {} applied, {} failed, {} files written",
            refactoring.name(),
            report.applied,
            report.failures.len(),
            report.written.len()
        );
        Ok(report)
    }

    fn run_file(
        &mut self,
        file: &Path,
        targets: &[Target],
        refactoring: &mut dyn Refactoring,
        report: &mut BatchReport,
    ) -> Result<()> {
        let scan = self.scans.scan_for_path(&mut self.store, file)?;
        let mut changed = false;

        for target in targets {
            let mut ctx = RefactorContext {
                store: &mut self.store,
                scan: &mut *scan,
                config: self.config,
                messages: &mut report.messages,
            };
            match refactoring.apply(&mut ctx, target) {
                Ok(true) => {
                    changed = true;
                    report.applied += 1;
                }
                Ok(false) => debug!("{} left {target} unchanged", refactoring.name()),
                Err(e) if e.is_recoverable() => {
                    warn!("{} failed at {target}: {e}", refactoring.name());
                    report.failures.push(TargetFailure {
                        target: target.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        if !changed {
            return Ok(());
        }
        self.store.sweep(scan)?;
        let text = self.store.scan_text(scan)?;
        self.write(file, &text, report)
    }

    fn write(&mut self, source: &Path, text: &str, report: &mut BatchReport) -> Result<()> {
        match &mut self.destination {
            Destination::InPlace(rollback) => {
                rollback.preserve_and_write(text, source)?;
                report.written.push(source.to_path_buf());
                Ok(())
            }
            Destination::OutputDir(dir) => {
                let out = mirror_path(dir, &absolute(source)?);
                write_output(source, &out, text, report)
            }
        }
    }
}

/// Write one result below the output directory
///
/// The same include file can be reached from several compile units. When an
/// earlier result for it differs from this one the file has more than one
/// outcome, so it is withheld and reported instead.
fn write_output(source: &Path, out: &Path, text: &str, report: &mut BatchReport) -> Result<()> {
    if report.bad_files.contains(out) {
        return Ok(());
    }
    if out.exists() {
        let existing = fs::read_to_string(out).map_err(|e| RefactorError::io_error(out, e))?;
        if existing != text {
            warn!("Multiple outcomes for {}, not written", source.display());
            report.messages.push(format!(
                "Include file refactoring has multiple outcomes, file not written: {}",
                source.display()
            ));
            report.bad_files.insert(out.to_path_buf());
            fs::remove_file(out).map_err(|e| RefactorError::io_error(out, e))?;
        }
        return Ok(());
    }
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent).map_err(|e| RefactorError::io_error(parent, e))?;
    }
    fs::write(out, text).map_err(|e| RefactorError::io_error(out, e))?;
    report.written.push(out.to_path_buf());
    Ok(())
}
