//! Collects a structured trace of one compilation: the intermediate
//! representations after every pass plus the `log` records emitted meanwhile.
#![doc(hidden)]

use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::SystemTime;

use chrono::prelude::*;
use log::{LevelFilter, Metadata, Record};
use serde::Serialize;
use strum_macros::AsRefStr;

use crate::ir::CompiledMultiLevelQuery;
use crate::translation::TranslatedQuery;
use crate::FormulaItem;

/// Debug info about the current compilation.
/// Is reset by [log_start] and [log_finish].
static CURRENT_LOG: RwLock<Option<DebugLog>> = RwLock::new(None);

fn current_log() -> RwLockWriteGuard<'static, Option<DebugLog>> {
    CURRENT_LOG.write().unwrap_or_else(PoisonError::into_inner)
}

/// Starts a new log, discarding one that was never finished.
pub fn log_start() {
    let started_at: DateTime<Utc> = SystemTime::now().into();

    *current_log() = Some(DebugLog {
        started_at: format!("{}", started_at.format("%+")),
        version: crate::compiler_version().to_string(),
        entries: Vec::new(),

        current_stage: Stage::Initial,
        suppress: false,
    });
}

pub fn log_finish() -> Option<DebugLog> {
    current_log().take()
}

pub fn log_is_enabled() -> bool {
    CURRENT_LOG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .is_some_and(|log| !log.suppress)
}

pub fn log_set_suppress(suppress: bool) {
    if let Some(log) = current_log().as_mut() {
        log.suppress = suppress;
    }
}

pub fn log_stage(stage: Stage) {
    if let Some(log) = current_log().as_mut() {
        if !log.suppress {
            log.current_stage = stage;
        }
    }
}

/// Appends an entry. `entry` is only evaluated when a log is being collected.
pub fn log_entry(entry: impl FnOnce() -> DebugEntryKind) {
    let mut lock = current_log();
    let Some(log) = lock.as_mut() else {
        return;
    };
    if log.suppress {
        return;
    }

    let entry = DebugEntry {
        stage: log.current_stage,
        kind: entry(),
    };
    log.entries.push(entry);
}

#[derive(Debug, Serialize)]
pub struct DebugLog {
    pub started_at: String,
    pub version: String,
    pub entries: Vec<DebugEntry>,

    #[serde(skip)]
    current_stage: Stage,

    #[serde(skip)]
    suppress: bool,
}

#[derive(Debug, Serialize)]
pub struct DebugEntry {
    pub stage: Stage,
    pub kind: DebugEntryKind,
}

#[derive(Debug, Serialize, AsRefStr)]
pub enum DebugEntryKind {
    ReprFormula(FormulaItem),
    ReprPlan(CompiledMultiLevelQuery),
    ReprTranslated(Vec<TranslatedQuery>),
    Message(Message),
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub level: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub module_path: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
pub enum Stage {
    Initial,
    Optimization,
    Forking,
    Sanitization,
    Translation,
}

impl DebugLog {
    /// Number of entries of each stage, in order of appearance.
    pub fn stage_summary(&self) -> Vec<(Stage, usize)> {
        let mut res: Vec<(Stage, usize)> = Vec::new();
        for entry in &self.entries {
            match res.last_mut() {
                Some((stage, count)) if *stage == entry.stage => *count += 1,
                _ => res.push((entry.stage, 1)),
            }
        }
        res
    }
}

/// Routes `log` records up to `max_level` into the current debug log.
pub struct MessageLogger {
    pub max_level: LevelFilter,
}

impl log::Log for MessageLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level && log_is_enabled()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        log_entry(|| {
            DebugEntryKind::Message(Message {
                level: record.level().to_string(),
                file: record.file().map(str::to_string),
                line: record.line(),
                module_path: record.module_path().map(str::to_string),
                text: record.args().to_string(),
            })
        });
    }

    fn flush(&self) {}
}
