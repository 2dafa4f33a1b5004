//! Store Providers
//!
//! A [`Provider`] owns (or adopts) one [`StoreInstance`] and publishes it
//! into the registry for the duration of each render pass, so everything
//! evaluated inside [`Provider::render`] resolves the provider's instance
//! for its store name and scope.
//!
//! # Lifecycle
//!
//! - **Hydrate once**: on the first pass with a given instance, writable
//!   base fields are seeded from the merge of `initial_values` and
//!   `values` (direct values win). Re-renders never re-hydrate.
//! - **Sync always**: on every pass, fields present in `values` are
//!   written through. The most recent write wins, whether it came from a
//!   prop or a consumer setter.
//! - **Reset**: when `reset_key` differs from the previous pass, the
//!   provider discards its instance for a fresh one and hydrates again.
//!   Adopted instances (the `store` prop) are never reset.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::reactive::StoreInstance;
use crate::store::builder::{CellSet, FieldValues};
use crate::store::registry::StoreRegistry;

/// Per-render inputs to a provider.
#[derive(Clone, Default)]
pub struct ProviderProps {
    /// Adopt this instance instead of the provider-owned one.
    pub store: Option<Arc<StoreInstance>>,
    /// Register the instance under this scope as well as the provider
    /// fallback entry.
    pub scope: Option<String>,
    /// Seed values applied once, at hydration.
    pub initial_values: FieldValues,
    /// Values written through on every pass.
    pub values: FieldValues,
    /// Changing this key discards the owned instance and re-hydrates.
    pub reset_key: Option<u64>,
}

impl ProviderProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(mut self, instance: Arc<StoreInstance>) -> Self {
        self.store = Some(instance);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn initial_values(mut self, values: FieldValues) -> Self {
        self.initial_values = values;
        self
    }

    pub fn values(mut self, values: FieldValues) -> Self {
        self.values = values;
        self
    }

    pub fn reset_key(mut self, key: u64) -> Self {
        self.reset_key = Some(key);
        self
    }
}

struct ProviderState {
    instance: Arc<StoreInstance>,
    hydrated: bool,
    last_reset_key: Option<u64>,
    started: bool,
}

/// A mounted provider for one store definition.
pub struct Provider {
    name: String,
    cells: Arc<CellSet>,
    effect: Option<Arc<dyn Fn() + Send + Sync>>,
    state: Mutex<ProviderState>,
}

impl Provider {
    pub(crate) fn new(
        name: String,
        cells: Arc<CellSet>,
        effect: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Self {
        Self {
            name,
            cells,
            effect,
            state: Mutex::new(ProviderState {
                instance: StoreInstance::new(),
                hydrated: false,
                last_reset_key: None,
                started: false,
            }),
        }
    }

    /// The instance currently backing this provider.
    pub fn instance(&self) -> Arc<StoreInstance> {
        self.state.lock().instance.clone()
    }

    /// Run one render pass: settle the instance, hydrate or sync, publish
    /// the registry overlay, then evaluate `children` inside it.
    pub fn render<R>(
        &self,
        props: &ProviderProps,
        children: impl FnOnce() -> R,
    ) -> R {
        // Settle the instance under the lock, then release it before any
        // cell writes: subscriber callbacks fire synchronously inside
        // `set_erased` and may call back into this provider.
        let (instance, needs_hydration) = {
            let mut state = self.state.lock();

            if let Some(adopted) = &props.store {
                if !Arc::ptr_eq(&state.instance, adopted) {
                    state.instance = adopted.clone();
                    state.hydrated = false;
                }
            } else if state.started && state.last_reset_key != props.reset_key {
                tracing::debug!(store = %self.name, "provider reset");
                state.instance = StoreInstance::new();
                state.hydrated = false;
            }
            state.last_reset_key = props.reset_key;
            state.started = true;

            let needs_hydration = !state.hydrated;
            state.hydrated = true;
            (state.instance.clone(), needs_hydration)
        };

        if needs_hydration {
            hydrate_cells(&self.cells, &instance, props);
        }
        sync_cells(&self.cells, &instance, &props.values);

        let registry = StoreRegistry::current().with_instance(
            &self.name,
            props.scope.as_deref(),
            instance,
        );
        let _frame = registry.enter();

        if let Some(effect) = &self.effect {
            effect();
        }

        children()
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("hydrated", &state.hydrated)
            .finish()
    }
}

// Seed writable base fields from the merge of initial and direct values;
// direct values win. Runs once per instance.
fn hydrate_cells(cells: &CellSet, instance: &StoreInstance, props: &ProviderProps) {
    for (key, atom) in cells.base_writable() {
        let init = props
            .values
            .get(key)
            .or_else(|| props.initial_values.get(key));
        if let Some(value) = init.and_then(|init| init.as_value()) {
            instance.set_erased(atom, value);
        }
    }
}

// Write direct values through on every pass. Fields absent from `values`
// keep whatever the store holds.
fn sync_cells(cells: &CellSet, instance: &StoreInstance, values: &FieldValues) {
    for (key, atom) in cells.base_writable() {
        if let Some(value) = values.get(key).and_then(|init| init.as_value()) {
            instance.set_erased(atom, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::builder::{build_cell_set, FieldInit};

    fn counter_cells() -> Arc<CellSet> {
        let state: FieldValues = [("count".to_string(), FieldInit::value(0i64))]
            .into_iter()
            .collect();
        Arc::new(build_cell_set(&state, None, None))
    }

    fn values_of(pairs: Vec<(&str, FieldInit)>) -> FieldValues {
        pairs
            .into_iter()
            .map(|(key, init)| (key.to_string(), init))
            .collect()
    }

    fn read_count(instance: &StoreInstance, cells: &CellSet) -> i64 {
        let atom = cells.atom("count").unwrap();
        *instance.get_erased(atom).downcast_ref::<i64>().unwrap()
    }

    #[test]
    fn renders_publish_the_instance() {
        let cells = counter_cells();
        let provider = Provider::new("app".to_string(), cells, None);
        let props = ProviderProps::new();

        provider.render(&props, || {
            let found = StoreRegistry::resolve("app", None, false).unwrap();
            assert!(Arc::ptr_eq(&found, &provider.instance()));
        });

        // Outside the render pass the entry is gone.
        assert!(StoreRegistry::resolve("app", None, false).is_none());
    }

    #[test]
    fn hydrates_once_from_merged_values() {
        let cells = counter_cells();
        let provider = Provider::new("app".to_string(), cells.clone(), None);

        let props = ProviderProps::new()
            .initial_values(values_of(vec![("count", FieldInit::value(5i64))]));
        provider.render(&props, || {});
        assert_eq!(read_count(&provider.instance(), &cells), 5);

        // A consumer write survives later renders with the same props.
        let atom = cells.atom("count").unwrap().clone();
        provider.instance().set_erased(&atom, Arc::new(42i64));
        provider.render(&props, || {});
        assert_eq!(read_count(&provider.instance(), &cells), 42);
    }

    #[test]
    fn direct_values_win_at_hydration_and_sync_every_pass() {
        let cells = counter_cells();
        let provider = Provider::new("app".to_string(), cells.clone(), None);

        let props = ProviderProps::new()
            .initial_values(values_of(vec![("count", FieldInit::value(1i64))]))
            .values(values_of(vec![("count", FieldInit::value(2i64))]));
        provider.render(&props, || {});
        assert_eq!(read_count(&provider.instance(), &cells), 2);

        // A consumer write is overwritten again on the next pass because
        // the field is still present in `values`.
        let atom = cells.atom("count").unwrap().clone();
        provider.instance().set_erased(&atom, Arc::new(99i64));
        provider.render(&props, || {});
        assert_eq!(read_count(&provider.instance(), &cells), 2);
    }

    #[test]
    fn reset_key_change_discards_the_instance() {
        let cells = counter_cells();
        let provider = Provider::new("app".to_string(), cells.clone(), None);

        let props = ProviderProps::new()
            .initial_values(values_of(vec![("count", FieldInit::value(5i64))]))
            .reset_key(1);
        provider.render(&props, || {});
        let first = provider.instance();

        let atom = cells.atom("count").unwrap().clone();
        first.set_erased(&atom, Arc::new(100i64));

        // Same key: same instance, value intact.
        provider.render(&props, || {});
        assert!(Arc::ptr_eq(&first, &provider.instance()));
        assert_eq!(read_count(&provider.instance(), &cells), 100);

        // New key: fresh instance, hydrated again.
        let reset_props = props.clone().reset_key(2);
        provider.render(&reset_props, || {});
        assert!(!Arc::ptr_eq(&first, &provider.instance()));
        assert_eq!(read_count(&provider.instance(), &cells), 5);
    }

    #[test]
    fn adopted_instances_are_used_and_rehydrated_on_change() {
        let cells = counter_cells();
        let provider = Provider::new("app".to_string(), cells.clone(), None);

        let external = StoreInstance::new();
        let props = ProviderProps::new()
            .store(external.clone())
            .initial_values(values_of(vec![("count", FieldInit::value(7i64))]));

        provider.render(&props, || {});
        assert!(Arc::ptr_eq(&external, &provider.instance()));
        assert_eq!(read_count(&external, &cells), 7);
    }

    #[test]
    fn subscribers_may_read_provider_state_during_sync() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cells = counter_cells();
        let provider = Arc::new(Provider::new("app".to_string(), cells.clone(), None));

        provider.render(&ProviderProps::new(), || {});

        // Subscribe a callback that calls back into the provider; the sync
        // write on the next render must not hold provider state across the
        // notification.
        let atom = cells.atom("count").unwrap().clone();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let provider_clone = provider.clone();
        let notify: crate::reactive::SubscriberFn = Arc::new(move |_| {
            let _ = provider_clone.instance();
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        let mut sub = provider.instance().subscribe_erased(&atom, notify, false);

        let props = ProviderProps::new()
            .values(values_of(vec![("count", FieldInit::value(1i64))]));
        provider.render(&props, || {});

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(read_count(&provider.instance(), &cells), 1);
        sub.unsubscribe();
    }

    #[test]
    fn effect_runs_inside_the_registry_overlay() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cells = counter_cells();
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let effect: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            assert!(StoreRegistry::resolve("app", None, false).is_some());
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });

        let provider = Provider::new("app".to_string(), cells, Some(effect));
        let props = ProviderProps::new();

        provider.render(&props, || {});
        provider.render(&props, || {});
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_providers_shadow_by_scope() {
        let cells = counter_cells();
        let outer = Provider::new("app".to_string(), cells.clone(), None);
        let inner = Provider::new("app".to_string(), cells, None);

        let outer_props = ProviderProps::new().scope("a");
        let inner_props = ProviderProps::new().scope("b");

        outer.render(&outer_props, || {
            inner.render(&inner_props, || {
                let for_a = StoreRegistry::resolve("app", Some("a"), false).unwrap();
                let for_b = StoreRegistry::resolve("app", Some("b"), false).unwrap();
                assert!(Arc::ptr_eq(&for_a, &outer.instance()));
                assert!(Arc::ptr_eq(&for_b, &inner.instance()));

                // No scope: the innermost provider entry wins.
                let nearest = StoreRegistry::resolve("app", None, false).unwrap();
                assert!(Arc::ptr_eq(&nearest, &inner.instance()));
            });
        });
    }
}
