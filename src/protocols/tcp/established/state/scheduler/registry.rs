// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The scheduler registry (spec.md §4.5): `mptcp_register_scheduler` /
//! `mptcp_unregister_scheduler` / `mptcp_sched_find` /
//! `mptcp_set_default_scheduler` / `mptcp_get_default_scheduler` /
//! `mptcp_init_scheduler` / `mptcp_cleanup_scheduler` in the original.
//!
//! The original guards the list with a spinlock and defers reclamation
//! with `synchronize_rcu()` so readers never see a scheduler disappear
//! mid-use. This crate has no RCU, so it gets the same guarantee from
//! `Arc`: every connection bound to a scheduler holds a clone of its
//! `Arc<SchedulerEntry>`, and `unregister` simply waits for the
//! refcount to drop back to one (itself) before returning — the
//! `Arc`-holding readers are the "grace period".

use super::meta::MetaConnection;
use super::next_segment::NextSegment;
use super::segment::Segment;
use super::subflow::Subflow;
use crate::fail::Fail;
use crate::runtime::{Clock, SystemClock};
use std::{
    rc::Rc,
    sync::{Arc, RwLock},
    thread,
    time::{Duration, Instant},
};

/// Proof of the capability the original gates behind `CAP_NET_ADMIN`.
/// This crate has no process/user model, so the "capability" is simply
/// a token the caller must have obtained some other way; it exists to
/// keep the same two call shapes (privileged vs. unprivileged) the
/// kernel code has, rather than silently letting anyone re-point the
/// default scheduler.
pub struct AdminCapability(());

impl AdminCapability {
    /// Constructing one is itself the privileged operation; callers
    /// outside this crate's administrative surface should not be able
    /// to manufacture one for free.
    pub fn assume() -> Self {
        Self(())
    }
}

/// A registered scheduler implementation, analogous to `mptcp_sched_ops`.
///
/// Operates over `MetaConnection<SystemClock>`: the registry is wiring
/// for production connections, which always run against the real clock.
/// Tests exercise `availability`/`select`/`rcv_buf`/`next_segment`
/// directly against a `MetaConnection<TestClock>` instead of going
/// through a registered scheduler.
pub trait SchedulerOps {
    fn name(&self) -> &str;

    fn get_subflow(
        &self,
        meta: &MetaConnection<SystemClock>,
        segment: Option<&Segment>,
        zero_wnd_test: bool,
    ) -> Option<Rc<Subflow>>;

    fn next_segment(&self, meta: &MetaConnection<SystemClock>) -> Option<NextSegment>;

    /// `sched_ops->init(sk)` — called once per subflow when it first
    /// joins a connection bound to this scheduler (spec.md §4.5).
    fn init(&self, _subflow: &Subflow, _now: Instant) {}

    /// Declared size in bytes of this scheduler's per-subflow scratch
    /// region (spec.md §4.5 `priv_size`), checked against
    /// `SCHED_MAX_PRIV` at `Registry::register` time. The `Any`-boxed
    /// scratch (`SchedScratch`) doesn't need this to size a buffer, but
    /// the registration-time bound is still part of the contract, so a
    /// scheduler whose scratch type is unexpectedly large gets caught at
    /// `register` rather than silently at runtime.
    fn priv_size(&self) -> usize {
        0
    }
}

/// A named, registered scheduler. Held behind `Arc` so bound
/// connections and the registry's own list can share ownership; see
/// module docs for how that substitutes for RCU.
pub struct SchedulerEntry {
    name: String,
    ops: Box<dyn SchedulerOps>,
}

impl SchedulerEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ops(&self) -> &dyn SchedulerOps {
        self.ops.as_ref()
    }
}

/// How long `unregister` will spin waiting for readers to drop their
/// `Arc` before giving up and logging a warning (it still blocks past
/// this, this is just when it starts complaining — see body).
const QUIESCE_WARN_AFTER: Duration = Duration::from_millis(100);

/// `mptcp_sched_list` plus the spinlock that protects it (spec.md
/// §4.5). Order matters: index 0 is the default scheduler, exactly as
/// `mptcp_get_default_scheduler` reads `list.next` and
/// `mptcp_set_default_scheduler` does `list_move(&sched->list, ...)` to
/// the head.
pub struct Registry {
    schedulers: RwLock<Vec<Arc<SchedulerEntry>>>,
    autoload: Option<Box<dyn Fn(&str) -> Option<Box<dyn SchedulerOps>> + Send + Sync>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            schedulers: RwLock::new(Vec::new()),
            autoload: None,
        }
    }

    /// Installs an autoload hook standing in for `request_module("mptcp_%s", name)`:
    /// when `set_default` or `bind_to_connection` is asked for a name
    /// that is not yet registered, this is given one chance to produce
    /// and register it before the lookup fails.
    pub fn with_autoload(autoload: impl Fn(&str) -> Option<Box<dyn SchedulerOps>> + Send + Sync + 'static) -> Self {
        Self {
            schedulers: RwLock::new(Vec::new()),
            autoload: Some(Box::new(autoload)),
        }
    }

    /// `mptcp_register_scheduler`.
    pub fn register(&self, _cap: &AdminCapability, ops: Box<dyn SchedulerOps>) -> Result<Arc<SchedulerEntry>, Fail> {
        if ops.priv_size() > super::scratch::SCHED_MAX_PRIV {
            return Err(Fail::Invalid {
                details: "priv_size exceeds SCHED_MAX_PRIV",
            });
        }

        let mut schedulers = self.schedulers.write().unwrap();
        if schedulers.iter().any(|e| e.name() == ops.name()) {
            return Err(Fail::Exists {
                name: ops.name().to_string(),
            });
        }
        let entry = Arc::new(SchedulerEntry {
            name: ops.name().to_string(),
            ops,
        });
        schedulers.push(entry.clone());
        Ok(entry)
    }

    /// `mptcp_unregister_scheduler`. Blocks until every connection that
    /// was bound to `entry` has released it (see module docs); a
    /// scheduler a connection is actively using cannot vanish out from
    /// under that connection mid-`next_segment`.
    pub fn unregister(&self, entry: Arc<SchedulerEntry>) {
        {
            let mut schedulers = self.schedulers.write().unwrap();
            schedulers.retain(|e| !Arc::ptr_eq(e, &entry));
        }

        let deadline_warned = Instant::now() + QUIESCE_WARN_AFTER;
        let mut warned = false;
        while Arc::strong_count(&entry) > 1 {
            if !warned && Instant::now() >= deadline_warned {
                log::warn!("unregister({}) waiting on outstanding readers", entry.name());
                warned = true;
            }
            thread::yield_now();
        }
    }

    /// `mptcp_sched_find`.
    pub fn find(&self, name: &str) -> Option<Arc<SchedulerEntry>> {
        self.schedulers.read().unwrap().iter().find(|e| e.name() == name).cloned()
    }

    fn find_with_autoload(&self, _cap: &AdminCapability, name: &str) -> Option<Arc<SchedulerEntry>> {
        if let Some(found) = self.find(name) {
            return Some(found);
        }
        let ops = self.autoload.as_ref()?(name)?;
        self.register(&AdminCapability::assume(), ops).ok()
    }

    /// `mptcp_get_default_scheduler`.
    pub fn get_default(&self) -> Option<Arc<SchedulerEntry>> {
        self.schedulers.read().unwrap().first().cloned()
    }

    /// `mptcp_set_default_scheduler`. Requires `AdminCapability` the way
    /// the original requires `CAP_NET_ADMIN` before it will even attempt
    /// the autoload.
    pub fn set_default(&self, cap: &AdminCapability, name: &str) -> Result<(), Fail> {
        let entry = self.find_with_autoload(cap, name).ok_or_else(|| Fail::NotFound {
            name: name.to_string(),
        })?;
        let mut schedulers = self.schedulers.write().unwrap();
        schedulers.retain(|e| !Arc::ptr_eq(e, &entry));
        schedulers.insert(0, entry);
        Ok(())
    }

    /// `mptcp_init_scheduler`: binds `meta` to `name` if given (and
    /// registered or autoloadable), otherwise to the current default.
    pub fn bind_to_connection<C: Clock>(
        &self,
        meta: &MetaConnection<C>,
        name: Option<&str>,
    ) -> Result<(), Fail> {
        let entry = match name {
            Some(name) => self
                .find_with_autoload(&AdminCapability::assume(), name)
                .ok_or_else(|| Fail::NotFound {
                    name: name.to_string(),
                })?,
            None => self.get_default().ok_or_else(|| Fail::NotFound {
                name: "default".to_string(),
            })?,
        };
        meta.set_bound_scheduler(Some(entry));
        Ok(())
    }

    /// `mptcp_cleanup_scheduler`: releases this connection's reference,
    /// letting `unregister` proceed once every other connection using
    /// the same scheduler has done the same.
    pub fn unbind_from_connection<C: Clock>(&self, meta: &MetaConnection<C>) {
        meta.set_bound_scheduler(None);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::tcp::established::state::scheduler::meta::test_helpers::meta_with_subflows;

    struct NoopScheduler(&'static str);
    impl SchedulerOps for NoopScheduler {
        fn name(&self) -> &str {
            self.0
        }
        fn get_subflow(
            &self,
            _meta: &MetaConnection<SystemClock>,
            _segment: Option<&Segment>,
            _zero_wnd_test: bool,
        ) -> Option<Rc<Subflow>> {
            None
        }
        fn next_segment(&self, _meta: &MetaConnection<SystemClock>) -> Option<NextSegment> {
            None
        }
    }

    struct OversizedScratchScheduler;
    impl SchedulerOps for OversizedScratchScheduler {
        fn name(&self) -> &str {
            "oversized"
        }
        fn get_subflow(
            &self,
            _meta: &MetaConnection<SystemClock>,
            _segment: Option<&Segment>,
            _zero_wnd_test: bool,
        ) -> Option<Rc<Subflow>> {
            None
        }
        fn next_segment(&self, _meta: &MetaConnection<SystemClock>) -> Option<NextSegment> {
            None
        }
        fn priv_size(&self) -> usize {
            super::super::scratch::SCHED_MAX_PRIV + 1
        }
    }

    #[test]
    fn register_rejects_priv_size_over_the_bound() {
        let registry = Registry::new();
        let cap = AdminCapability::assume();
        assert!(registry.register(&cap, Box::new(OversizedScratchScheduler)).is_err());
        assert!(registry.find("oversized").is_none());
    }

    /// Scenario 6 (spec.md §8): register two, set one default, observe
    /// `EEXIST` on a duplicate name, then unregister cleanly.
    #[test]
    fn scenario_6_register_set_default_unregister() {
        let registry = Registry::new();
        let cap = AdminCapability::assume();

        let a = registry.register(&cap, Box::new(NoopScheduler("alpha"))).unwrap();
        registry.register(&cap, Box::new(NoopScheduler("beta"))).unwrap();

        assert!(registry.register(&cap, Box::new(NoopScheduler("alpha"))).is_err());

        assert_eq!(registry.get_default().unwrap().name(), "alpha");
        registry.set_default(&cap, "beta").unwrap();
        assert_eq!(registry.get_default().unwrap().name(), "beta");

        registry.unregister(a);
        assert!(registry.find("alpha").is_none());
        assert_eq!(registry.get_default().unwrap().name(), "beta");
    }

    #[test]
    fn set_default_on_unknown_name_fails_without_autoload() {
        let registry = Registry::new();
        let cap = AdminCapability::assume();
        registry.register(&cap, Box::new(NoopScheduler("alpha"))).unwrap();
        assert!(registry.set_default(&cap, "ghost").is_err());
    }

    #[test]
    fn autoload_hook_registers_on_demand() {
        let registry = Registry::with_autoload(|name| {
            if name == "lazy" {
                Some(Box::new(NoopScheduler("lazy")) as Box<dyn SchedulerOps>)
            } else {
                None
            }
        });
        let cap = AdminCapability::assume();
        assert!(registry.find("lazy").is_none());
        registry.set_default(&cap, "lazy").unwrap();
        assert!(registry.find("lazy").is_some());
    }

    #[test]
    fn bind_and_unbind_roundtrip() {
        let registry = Registry::new();
        let cap = AdminCapability::assume();
        registry.register(&cap, Box::new(NoopScheduler("alpha"))).unwrap();

        let meta = meta_with_subflows(&[]);
        registry.bind_to_connection(&meta, None).unwrap();
        assert_eq!(meta.bound_scheduler().unwrap().name(), "alpha");
        registry.unbind_from_connection(&meta);
        assert!(meta.bound_scheduler().is_none());
    }

    #[test]
    fn unregister_waits_for_bound_connections_to_release() {
        let registry = Registry::new();
        let cap = AdminCapability::assume();
        let entry = registry.register(&cap, Box::new(NoopScheduler("alpha"))).unwrap();

        let meta = meta_with_subflows(&[]);
        meta.set_bound_scheduler(Some(entry.clone()));

        // Dropping the registry's own list entry leaves the connection's
        // clone outstanding; strong_count is 2 (entry + meta's clone).
        assert_eq!(Arc::strong_count(&entry), 2);
        meta.set_bound_scheduler(None);
        assert_eq!(Arc::strong_count(&entry), 1);
        registry.unregister(entry);
    }
}
