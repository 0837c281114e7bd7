//! The update driver.
//!
//! One run moves through:
//!
//! ```text
//! Idle -> SyncingRaw -> RawFailed
//!                    -> RawSynced -> SyncingProduction -> ProductionFailed
//!                                                      -> ProductionSynced -> RecordPersisted -> Idle
//! ```
//!
//! The build record is saved after each stage that completes, never after a
//! failed one.

use crate::cid::Cid;
use crate::client::{ObjectStore, Timeouts};
use crate::config::{Config, DEFAULT_GATEWAY, DEFAULT_PRODUCTION_NAME, DEFAULT_RAW_NAME};
use crate::error::{Error, Result};
use crate::locator::{Locator, gateway_url};
use crate::pins::PinMode;
use crate::production::ProductionSynchronizer;
use crate::raw::RawSynchronizer;
use crate::record::{BuildRecord, RecordRepository};
use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use tracing::{error, info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    SyncingRaw,
    RawFailed,
    RawSynced,
    SyncingProduction,
    ProductionFailed,
    ProductionSynced,
    RecordPersisted,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::SyncingRaw => "syncing-raw",
            Stage::RawFailed => "raw-failed",
            Stage::RawSynced => "raw-synced",
            Stage::SyncingProduction => "syncing-production",
            Stage::ProductionFailed => "production-failed",
            Stage::ProductionSynced => "production-synced",
            Stage::RecordPersisted => "record-persisted",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeReport {
    pub cid: Cid,
    pub changed: bool,
    /// Public locator, `<gateway>/ipfs/<cid>`.
    pub locator: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub raw: TreeReport,
    pub production: TreeReport,
}

#[derive(Clone, Copy)]
enum Tree {
    Raw,
    Production,
}

/// Drives a raw pass followed by a production pass.
pub struct Updater<'a, S: ObjectStore + ?Sized, R: RecordRepository + ?Sized> {
    store: &'a S,
    records: &'a R,
    source: Locator,
    raw_name: String,
    production_name: String,
    timeouts: Timeouts,
    verify: bool,
    gateway: String,
    stage: Cell<Stage>,
}

impl<'a, S: ObjectStore + ?Sized, R: RecordRepository + ?Sized> Updater<'a, S, R> {
    pub fn new(store: &'a S, records: &'a R, source: Locator) -> Self {
        Self {
            store,
            records,
            source,
            raw_name: DEFAULT_RAW_NAME.to_string(),
            production_name: DEFAULT_PRODUCTION_NAME.to_string(),
            timeouts: Timeouts::default(),
            verify: false,
            gateway: DEFAULT_GATEWAY.to_string(),
            stage: Cell::new(Stage::Idle),
        }
    }

    /// Build an updater from loaded configuration. The source must be set.
    pub fn from_config(store: &'a S, records: &'a R, config: &Config) -> Result<Self> {
        Ok(Self::new(store, records, config.require_source()?.clone())
            .with_names(config.raw_name.clone(), config.production_name.clone())
            .with_timeouts(config.timeouts)
            .with_verify(config.verify)
            .with_gateway(config.gateway.clone()))
    }

    /// Mutable names the raw and production roots are published under.
    pub fn with_names(mut self, raw: impl Into<String>, production: impl Into<String>) -> Self {
        self.raw_name = raw.into();
        self.production_name = production.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = gateway.into();
        self
    }

    /// Last stage entered.
    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    fn enter(&self, stage: Stage) {
        self.stage.set(stage);
        info!(stage = %stage, "stage");
    }

    /// Run both passes.
    ///
    /// # Errors
    ///
    /// - the build record is missing or unreadable (nothing else happens)
    /// - the raw pass fails (the record is untouched)
    /// - the production pass fails (the raw result has already been saved)
    pub fn run(&self) -> Result<UpdateReport> {
        self.enter(Stage::Idle);
        let mut record = self.records.load()?;

        self.enter(Stage::SyncingRaw);
        let raw = match self.sync_raw(&mut record) {
            Ok(report) => report,
            Err(e) => {
                self.enter(Stage::RawFailed);
                error!(source = %self.source, error = %e, "raw stage failed");
                return Err(e);
            }
        };
        self.enter(Stage::RawSynced);

        self.enter(Stage::SyncingProduction);
        let production = match self.sync_production(&mut record, &raw.cid) {
            Ok(report) => report,
            Err(e) => {
                self.enter(Stage::ProductionFailed);
                error!(raw = %raw.locator, error = %e, "production stage failed");
                return Err(e);
            }
        };
        self.enter(Stage::ProductionSynced);
        self.enter(Stage::RecordPersisted);

        info!(raw = %raw.locator, production = %production.locator, "update finished");
        self.enter(Stage::Idle);

        Ok(UpdateReport { raw, production })
    }

    fn sync_raw(&self, record: &mut BuildRecord) -> Result<TreeReport> {
        let source = self.source.resolve(self.store, &self.timeouts)?;

        let previous = match record.current_raw_build {
            Some(cid) => Some(cid),
            None => match self.store.resolve_name(&self.raw_name, self.timeouts.short) {
                Ok(cid) => Some(cid),
                Err(Error::NameNotFound { .. }) => None,
                Err(e) => return Err(e),
            },
        };

        let outcome = RawSynchronizer::new(self.store, self.timeouts)
            .with_verify(self.verify)
            .with_gateway(self.gateway.clone())
            .sync(&source, previous.as_ref())?;
        let cid = outcome.cid.ok_or_else(|| Error::empty_tree("raw"))?;

        self.commit(record, Tree::Raw, &cid)?;
        Ok(TreeReport {
            cid,
            changed: outcome.changed,
            locator: gateway_url(&self.gateway, &cid),
        })
    }

    fn sync_production(&self, record: &mut BuildRecord, raw: &Cid) -> Result<TreeReport> {
        let outcome = ProductionSynchronizer::new(self.store, self.timeouts)
            .with_verify(self.verify)
            .with_gateway(self.gateway.clone())
            .sync(raw, "/")?;
        let cid = outcome.cid.ok_or_else(|| Error::empty_tree("production"))?;
        let changed = record.current_build != Some(cid);

        self.commit(record, Tree::Production, &cid)?;
        Ok(TreeReport {
            cid,
            changed,
            locator: gateway_url(&self.gateway, &cid),
        })
    }

    /// Pin and publish a new root, then persist the record.
    fn commit(&self, record: &mut BuildRecord, tree: Tree, cid: &Cid) -> Result<()> {
        let name = match tree {
            Tree::Raw => &self.raw_name,
            Tree::Production => &self.production_name,
        };

        self.store.pin(cid, PinMode::Recursive)?;
        match self.store.resolve_name(name, self.timeouts.short) {
            Ok(current) if current == *cid => {}
            _ => self.store.publish_name(name, cid, self.timeouts.short)?,
        }

        let displaced = match tree {
            Tree::Raw => record.advance_raw(cid),
            Tree::Production => record.advance_production(cid),
        };
        self.records.save(record)?;

        // Only unpin once the record no longer points at it.
        if let Some(old) = displaced
            && let Err(e) = self.store.unpin(&old)
        {
            warn!(locator = %gateway_url(&self.gateway, &old), error = %e, "could not unpin displaced root");
        }

        info!(name = %name, locator = %gateway_url(&self.gateway, cid), "published");
        Ok(())
    }
}
