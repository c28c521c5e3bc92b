// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.

use std::collections::HashSet;
use std::sync::{Mutex, Once};

use crate::targets::TRACING_TARGETS;
use crate::trace_target;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

trace_target!("tracectl", LevelFilter::INFO, &["tracectl"]);

/// A single target's configured trace level, as registered by [`trace_target!`] or
/// [`custom_target!`] or overridden later via [`TracingControl::set_tag_level`].
#[derive(Debug)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
    pub(crate) custom: bool,
}
impl TargetCfg {
    const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
        custom: bool,
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
            custom,
        }
    }
}

#[derive(Debug)]
pub(crate) struct TargetCfgDb {
    pub(crate) default: LevelFilter,
    pub(crate) targets: HashMapT,
}

// named to avoid clashing with `std::collections::HashMap` when iterated as a BTreeMap
type HashMapT = std::collections::HashMap<&'static str, TargetCfg>;

impl TargetCfgDb {
    fn new(default: LevelFilter) -> Self {
        Self {
            default,
            targets: HashMapT::new(),
        }
    }

    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
        custom: bool,
    ) {
        debug!("Registering tracing target {target} ({name}) level={level} tags={tags:?}");
        let unit = TargetCfg::new(target, name, level, tags, custom);
        if self.targets.insert(target, unit).is_some() {
            debug!("tracing target {target} registered more than once, keeping latest");
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let mut f = EnvFilter::new(self.default.to_string());
        for unit in self.targets.values() {
            let directive = format!("{}={}", unit.target, unit.level);
            if let Ok(directive) = directive.parse() {
                f = f.add_directive(directive);
            }
        }
        f
    }

    /// Targets sharing a given tag.
    pub(crate) fn tag_targets(&self, tag: &str) -> impl Iterator<Item = &TargetCfg> {
        self.targets.values().filter(move |t| t.tags.contains(&tag))
    }

    /// The full set of tags known across all registered targets.
    pub(crate) fn all_tags(&self) -> HashSet<&'static str> {
        let mut tags = HashSet::new();
        for target in self.targets.values() {
            tags.extend(target.tags.iter().copied());
        }
        tags
    }
}

/// Handle used to read and mutate the live tracing configuration of the process.
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetCfgDb>,
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl TracingControl {
    fn new() -> Self {
        let mut db = TargetCfgDb::new(LevelFilter::INFO);
        for t in TRACING_TARGETS {
            db.register(t.target, t.name, t.level, t.tags, t.custom);
        }

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(true)
            .with_level(true);

        let (filter, reload_handle) = reload::Layer::new(db.env_filter());

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        // only the first caller across the process gets to install the global subscriber;
        // in tests multiple modules may call `init()` so a failure here is expected and benign.
        let _ = tracing::subscriber::set_global_default(subscriber);

        info!("initialized tracing control, default level is {}", db.default);
        Self {
            db: Mutex::new(db),
            reload_handle,
        }
    }

    fn reload(&self, filter: EnvFilter) {
        let _ = self.reload_handle.reload(filter);
    }
}

static INIT: Once = Once::new();
static mut TRACING_CTL: Option<TracingControl> = None;

/// Get a reference to the process-wide [`TracingControl`], initializing it on first call.
#[allow(static_mut_refs)]
pub fn get_trace_ctl() -> &'static TracingControl {
    INIT.call_once(|| unsafe {
        TRACING_CTL = Some(TracingControl::new());
    });
    unsafe { TRACING_CTL.as_ref().expect("initialized above") }
}

impl TracingControl {
    /// Ensure the global tracing subscriber is installed. Safe to call more than once.
    pub fn init() {
        get_trace_ctl();
    }

    /// Set the level of every target carrying `tag` to `level`.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) {
        let mut changed = false;
        let Ok(mut db) = self.db.lock() else {
            return;
        };
        for unit in db.targets.values_mut() {
            if unit.tags.contains(&tag) && unit.level != level {
                changed = true;
                unit.level = level;
            }
        }
        if changed {
            info!("set log level for tag {tag} to {level}");
            self.reload(db.env_filter());
        }
    }

    /// Set the process-wide default log level (used for targets with no explicit override).
    pub fn set_default_level(&self, level: LevelFilter) {
        if let Ok(mut db) = self.db.lock()
            && db.default != level
        {
            db.default = level;
            info!("set default log level to {level}");
            self.reload(db.env_filter());
        }
    }

    /// The current process-wide default log level.
    pub fn get_default_level(&self) -> LevelFilter {
        self.db.lock().map(|db| db.default).unwrap_or(LevelFilter::INFO)
    }

    /// Register (or re-register) a target at runtime.
    pub fn register(&self, target: &'static str, name: &'static str, level: LevelFilter, tags: &'static [&'static str]) {
        if let Ok(mut db) = self.db.lock() {
            db.register(target, name, level, tags, true);
            self.reload(db.env_filter());
        }
    }

    /// All tags known across every registered target.
    pub fn get_tags(&self) -> HashSet<&'static str> {
        self.db.lock().map(|db| db.all_tags()).unwrap_or_default()
    }

    /// Dump the current tracing configuration via `tracing::info!`.
    pub fn dump(&self) {
        if let Ok(db) = self.db.lock() {
            info!("{db}");
        }
    }

    /// Dump the current tracing configuration grouped by tag via `tracing::info!`.
    pub fn dump_by_tag(&self) {
        if let Ok(db) = self.db.lock() {
            info!("{}", crate::display::TargetCfgDbByTag(&db));
        }
    }
}
