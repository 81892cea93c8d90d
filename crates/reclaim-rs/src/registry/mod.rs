//! Resource registry: registration, keep-alive touches, and sweeps.
//!
//! A [`Registry`] maps resource ids to entries holding a last-touched
//! timestamp and an optional cleanup callback. Callers register resources
//! when the owning object comes alive, touch them while they are in use, and
//! let sweeps evict whatever a predicate selects. Evicting an entry removes
//! it from the map and runs its cleanup.
//!
//! The registry is an explicit context object. Clone it to share: all clones
//! point at the same map. Tests build a fresh one per case.
//!
//! # Example
//!
//! ```ignore
//! use reclaim_rs::registry::{Registry, untouched};
//!
//! let registry = Registry::new();
//! let banner = registry.register_with_cleanup("image-banner", || println!("freed"));
//! banner.touch();
//!
//! // Evict everything nobody has touched since registration.
//! let evicted = registry.collect_where(untouched());
//! ```

pub mod naming;
pub mod staleness;

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

pub use naming::{TYPE_SEPARATORS, matches_type, resource_id, type_tag};
pub use staleness::{idle_for, of_type, untouched};

/// Logs registry activity at `info` when verbose, otherwise at `trace`.
macro_rules! activity {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            ::tracing::info!($($arg)+)
        } else {
            ::tracing::trace!($($arg)+)
        }
    };
}

/// Cleanup callback run once when an entry is evicted.
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// One registered resource.
struct ResourceEntry {
    cleanup: Option<Cleanup>,
    registered_at: Instant,
    last_touched: Option<Instant>,
    touch_count: u64,
    generation: u64,
}

impl ResourceEntry {
    fn info(&self, id: &str, now: Instant) -> ResourceInfo {
        let since = self.last_touched.unwrap_or(self.registered_at);
        ResourceInfo {
            id: id.to_string(),
            registered_at: self.registered_at,
            last_touched: self.last_touched,
            touch_count: self.touch_count,
            idle: now.saturating_duration_since(since),
            has_cleanup: self.cleanup.is_some(),
        }
    }
}

/// Read-only view of a registered resource.
///
/// Passed to staleness predicates during a sweep and returned by
/// [`Registry::resources`].
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub id: String,
    pub registered_at: Instant,
    /// `None` when the resource was registered without a touch and has not
    /// been touched since.
    pub last_touched: Option<Instant>,
    pub touch_count: u64,
    /// Time since the last touch, or since registration if never touched.
    pub idle: Duration,
    pub has_cleanup: bool,
}

impl ResourceInfo {
    /// Whether the resource has been touched at least once.
    pub fn touched(&self) -> bool {
        self.last_touched.is_some()
    }
}

/// Per-registration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Whether registration itself counts as a touch. `None` falls back to
    /// the registry-wide [`RegistryOptions::touch_on_register`].
    pub touch: Option<bool>,
}

impl RegisterOptions {
    /// Options that force (or suppress) the registration touch.
    pub fn with_touch(touch: bool) -> Self {
        Self { touch: Some(touch) }
    }
}

/// Registry-wide behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Count every registration as a touch. Default: `true`.
    pub touch_on_register: bool,
    /// Log registry activity at `info` instead of `trace`. Default: `false`.
    pub verbose: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            touch_on_register: true,
            verbose: false,
        }
    }
}

/// Cumulative registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Entries currently registered.
    pub live: usize,
    /// Total `register` calls, including replacements.
    pub registered: u64,
    /// Registrations that replaced an existing entry.
    pub replaced: u64,
    /// Successful touches.
    pub touched: u64,
    /// Entries evicted by sweeps.
    pub collected: u64,
    /// Entries removed through [`Registry::release`] or a handle.
    pub released: u64,
    /// Cleanup callbacks that panicked.
    pub cleanup_failures: u64,
    /// Completed sweeps.
    pub sweeps: u64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Evicted ids, sorted.
    pub collected: Vec<String>,
    /// `(id, panic message)` for every cleanup that panicked. These entries
    /// are still evicted.
    pub failed: Vec<(String, String)>,
}

impl SweepReport {
    /// Number of evicted entries.
    pub fn count(&self) -> usize {
        self.collected.len()
    }
}

struct RegistryState {
    entries: HashMap<String, ResourceEntry>,
    next_generation: u64,
    stats: RegistryStats,
}

struct Inner {
    state: Mutex<RegistryState>,
    options: RegistryOptions,
}

/// Shared registry of live resources.
///
/// Every operation takes a short lock on the internal map. Cleanups run
/// after the lock is released, so a cleanup may call back into the registry.
/// Predicates passed to sweeps also run without the lock held.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    /// Create an empty registry with default options.
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    /// Create an empty registry with the given options.
    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RegistryState {
                    entries: HashMap::new(),
                    next_generation: 1,
                    stats: RegistryStats::default(),
                }),
                options,
            }),
        }
    }

    pub fn options(&self) -> RegistryOptions {
        self.inner.options
    }

    /// Register a resource without a cleanup callback.
    pub fn register(&self, id: impl Into<String>) -> ResourceHandle {
        self.register_with(id, None, RegisterOptions::default())
    }

    /// Register a resource whose `cleanup` runs when it is evicted.
    pub fn register_with_cleanup(
        &self,
        id: impl Into<String>,
        cleanup: impl FnOnce() + Send + 'static,
    ) -> ResourceHandle {
        self.register_with(id, Some(Box::new(cleanup)), RegisterOptions::default())
    }

    /// Register (or replace) the entry for `id`.
    ///
    /// An existing entry with the same id is replaced. Its cleanup is
    /// dropped without being called.
    pub fn register_with(
        &self,
        id: impl Into<String>,
        cleanup: Option<Cleanup>,
        options: RegisterOptions,
    ) -> ResourceHandle {
        let id = id.into();
        let touch = options.touch.unwrap_or(self.inner.options.touch_on_register);
        let now = Instant::now();

        let (generation, replaced) = {
            let mut state = self.lock();
            let generation = state.next_generation;
            state.next_generation += 1;
            let entry = ResourceEntry {
                cleanup,
                registered_at: now,
                last_touched: touch.then_some(now),
                touch_count: u64::from(touch),
                generation,
            };
            let replaced = state.entries.insert(id.clone(), entry);
            state.stats.registered += 1;
            if replaced.is_some() {
                state.stats.replaced += 1;
            }
            (generation, replaced)
        };

        // Drop the superseded entry outside the lock: its cleanup closure may
        // own values whose destructors touch the registry.
        let was_replaced = replaced.is_some();
        drop(replaced);

        activity!(
            self.inner.options.verbose,
            id = %id,
            generation,
            replaced = was_replaced,
            "registered resource"
        );

        ResourceHandle {
            id,
            generation,
            registry: self.clone(),
        }
    }

    /// Refresh the last-touched time of `id`.
    ///
    /// Returns `false` if no such entry exists (never registered, or already
    /// evicted). That case is a no-op, not an error.
    pub fn touch(&self, id: &str) -> bool {
        let touched = {
            let mut state = self.lock();
            let now = Instant::now();
            let touched = match state.entries.get_mut(id) {
                Some(entry) => {
                    entry.last_touched = Some(now);
                    entry.touch_count += 1;
                    true
                }
                None => false,
            };
            if touched {
                state.stats.touched += 1;
            }
            touched
        };
        if touched {
            activity!(self.inner.options.verbose, id, "touched resource");
        } else {
            tracing::trace!(id, "touch ignored: resource not registered");
        }
        touched
    }

    /// Evict every entry. Returns how many were evicted.
    pub fn collect(&self) -> usize {
        self.sweep(|_| true).count()
    }

    /// Evict every entry matching `predicate`. Returns how many were evicted.
    pub fn collect_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ResourceInfo) -> bool,
    {
        self.sweep(predicate).count()
    }

    /// Evict every entry whose id follows the naming convention for
    /// `type_tag` (see [`matches_type`]).
    pub fn collect_by_type(&self, type_tag: &str) -> usize {
        self.sweep(of_type(type_tag)).count()
    }

    /// Evict every entry matching `predicate` and report what happened.
    ///
    /// A cleanup that panics does not stop the sweep: the panic is caught,
    /// logged, and recorded in [`SweepReport::failed`], and the remaining
    /// cleanups still run.
    pub fn sweep<F>(&self, predicate: F) -> SweepReport
    where
        F: Fn(&ResourceInfo) -> bool,
    {
        let now = Instant::now();
        let candidates: Vec<(ResourceInfo, u64)> = {
            let state = self.lock();
            state
                .entries
                .iter()
                .map(|(id, entry)| (entry.info(id, now), entry.generation))
                .collect()
        };

        let selected: Vec<(String, u64)> = candidates
            .into_iter()
            .filter(|(info, _)| predicate(info))
            .map(|(info, generation)| (info.id, generation))
            .collect();

        let mut evicted = {
            let mut state = self.lock();
            let evicted: Vec<(String, Option<Cleanup>)> = selected
                .into_iter()
                .filter_map(|(id, generation)| {
                    // Skip entries re-registered while the predicate ran.
                    let current = state.entries.get(&id)?.generation;
                    if current != generation {
                        return None;
                    }
                    state.entries.remove(&id).map(|entry| (id, entry.cleanup))
                })
                .collect();
            state.stats.sweeps += 1;
            state.stats.collected += evicted.len() as u64;
            evicted
        };
        evicted.sort_by(|a, b| a.0.cmp(&b.0));

        let report = self.run_cleanups(evicted);
        activity!(
            self.inner.options.verbose,
            collected = report.count(),
            failed = report.failed.len(),
            "sweep finished"
        );
        report
    }

    /// Remove `id` and run its cleanup, regardless of which registration
    /// created it. Returns `false` if no such entry exists.
    pub fn release(&self, id: &str) -> bool {
        self.release_matching(id, None)
    }

    fn release_matching(&self, id: &str, generation: Option<u64>) -> bool {
        let removed = {
            let mut state = self.lock();
            let owned = match (state.entries.get(id), generation) {
                (Some(entry), Some(expected)) => entry.generation == expected,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !owned {
                return false;
            }
            state.stats.released += 1;
            state.entries.remove(id)
        };
        let Some(entry) = removed else {
            return false;
        };
        activity!(self.inner.options.verbose, id, "released resource");
        self.run_cleanups(vec![(id.to_string(), entry.cleanup)]);
        true
    }

    fn run_cleanups(&self, evicted: Vec<(String, Option<Cleanup>)>) -> SweepReport {
        let mut report = SweepReport::default();
        for (id, cleanup) in evicted {
            if let Some(cleanup) = cleanup
                && let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup))
            {
                let message = panic_message(payload.as_ref());
                warn!(id = %id, "cleanup panicked: {message}");
                report.failed.push((id.clone(), message));
            }
            report.collected.push(id);
        }
        if !report.failed.is_empty() {
            self.lock().stats.cleanup_failures += report.failed.len() as u64;
        }
        report
    }

    /// Whether `id` is currently registered.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of every registered entry, sorted by id.
    pub fn resources(&self) -> Vec<ResourceInfo> {
        let now = Instant::now();
        let mut infos: Vec<ResourceInfo> = self
            .lock()
            .entries
            .iter()
            .map(|(id, entry)| entry.info(id, now))
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Current counters.
    pub fn stats(&self) -> RegistryStats {
        let state = self.lock();
        RegistryStats {
            live: state.entries.len(),
            ..state.stats
        }
    }

    fn generation_of(&self, id: &str) -> Option<u64> {
        self.lock().entries.get(id).map(|e| e.generation)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("live", &self.len())
            .field("options", &self.inner.options)
            .finish()
    }
}

/// Handle returned by registration, bound to one id.
///
/// Dropping the handle does not evict the resource. Call
/// [`release`](Self::release) when the owner goes away.
pub struct ResourceHandle {
    id: String,
    generation: u64,
    registry: Registry,
}

impl ResourceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keep the resource alive. Returns `false` if it was already evicted.
    pub fn touch(&self) -> bool {
        self.registry.touch(&self.id)
    }

    /// Whether the entry created by this registration is still registered.
    ///
    /// Returns `false` after eviction and after a later registration with
    /// the same id replaced it.
    pub fn is_live(&self) -> bool {
        self.registry.generation_of(&self.id) == Some(self.generation)
    }

    /// Evict the entry and run its cleanup.
    ///
    /// Only removes the entry this handle registered; if the id has since
    /// been re-registered the newer entry is left alone and `false` is
    /// returned.
    pub fn release(self) -> bool {
        self.registry
            .release_matching(&self.id, Some(self.generation))
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(c: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let c = Arc::clone(c);
        move || {
            c.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn untouched_registry() -> Registry {
        Registry::with_options(RegistryOptions {
            touch_on_register: false,
            verbose: false,
        })
    }

    #[test]
    fn register_then_collect_runs_cleanup_once() {
        let registry = Registry::new();
        let calls = counter();
        registry.register_with_cleanup("image-hero", bump(&calls));

        assert_eq!(registry.collect(), 1);
        assert!(!registry.contains("image-hero"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // A second sweep finds nothing and never re-runs the cleanup.
        assert_eq!(registry.collect(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn touch_missing_id_is_noop() {
        let registry = Registry::new();
        registry.register("menu-main");
        assert!(!registry.touch("menu-missing"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reregister_replaces_without_running_old_cleanup() {
        let registry = Registry::new();
        let old = counter();
        let new = counter();
        registry.register_with_cleanup("image-a", bump(&old));
        registry.register_with_cleanup("image-a", bump(&new));

        assert_eq!(registry.len(), 1);
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(registry.stats().replaced, 1);

        registry.collect();
        assert_eq!(old.load(Ordering::SeqCst), 0);
        assert_eq!(new.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn collect_untouched_keeps_touched_entries() {
        let registry = untouched_registry();
        let (a, b, c) = (counter(), counter(), counter());
        registry.register_with_cleanup("a", bump(&a));
        registry.register_with_cleanup("b", bump(&b));
        registry.register_with_cleanup("c", bump(&c));
        assert!(registry.touch("a"));
        assert!(registry.touch("b"));

        assert_eq!(registry.collect_where(untouched()), 1);
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 0);
        assert_eq!(c.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn collect_by_type_only_removes_matching_ids() {
        let registry = Registry::new();
        registry.register("image-1");
        registry.register("image:2");
        registry.register("images-3");
        registry.register("menu-1");

        assert_eq!(registry.collect_by_type("image"), 2);
        assert_eq!(
            registry.ids(),
            vec!["images-3".to_string(), "menu-1".to_string()]
        );
    }

    #[test]
    fn register_options_override_touch_default() {
        let registry = untouched_registry();
        registry.register_with("a", None, RegisterOptions::with_touch(true));
        registry.register("b");

        let infos = registry.resources();
        assert!(infos[0].touched());
        assert_eq!(infos[0].touch_count, 1);
        assert!(!infos[1].touched());
    }

    #[test]
    fn panicking_cleanup_does_not_block_others() {
        let registry = Registry::new();
        let ok = counter();
        registry.register_with_cleanup("a", || panic!("boom"));
        registry.register_with_cleanup("b", bump(&ok));

        let report = registry.sweep(|_| true);
        assert_eq!(report.count(), 2);
        assert_eq!(report.failed, vec![("a".to_string(), "boom".to_string())]);
        assert_eq!(ok.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().cleanup_failures, 1);
    }

    #[test]
    fn cleanup_may_reenter_registry() {
        let registry = Registry::new();
        let inner = registry.clone();
        registry.register_with_cleanup("a", move || {
            inner.register("a-replacement");
        });

        assert_eq!(registry.collect_where(|info| info.id == "a"), 1);
        assert!(registry.contains("a-replacement"));
    }

    #[test]
    fn handle_release_respects_replacement() {
        let registry = Registry::new();
        let first = registry.register("menu-nav");
        let second = registry.register("menu-nav");

        assert!(!first.is_live());
        assert!(second.is_live());
        assert!(!first.release());
        assert!(registry.contains("menu-nav"));

        assert!(second.release());
        assert!(registry.is_empty());
        assert_eq!(registry.stats().released, 1);
    }

    #[test]
    fn handle_touch_after_eviction_returns_false() {
        let registry = Registry::new();
        let handle = registry.register("image-x");
        assert!(handle.touch());
        registry.collect();
        assert!(!handle.touch());
        assert!(!handle.is_live());
    }

    #[test]
    fn release_by_id_runs_cleanup() {
        let registry = Registry::new();
        let calls = counter();
        registry.register_with_cleanup("tooltip-help", bump(&calls));
        assert!(registry.release("tooltip-help"));
        assert!(!registry.release("tooltip-help"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stats_track_activity() {
        let registry = Registry::new();
        registry.register("a");
        registry.register("b");
        registry.touch("a");
        registry.touch("zzz");
        registry.collect_where(|info| info.id == "b");

        let stats = registry.stats();
        assert_eq!(stats.live, 1);
        assert_eq!(stats.registered, 2);
        assert_eq!(stats.touched, 1);
        assert_eq!(stats.collected, 1);
        assert_eq!(stats.sweeps, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_for_uses_last_touch() {
        let registry = Registry::new();
        registry.register("old");
        registry.register("fresh");

        tokio::time::advance(Duration::from_secs(30)).await;
        registry.touch("fresh");

        assert_eq!(registry.collect_where(idle_for(Duration::from_secs(10))), 1);
        assert_eq!(registry.ids(), vec!["fresh".to_string()]);
    }
}
