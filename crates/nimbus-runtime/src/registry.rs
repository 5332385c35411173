#![forbid(unsafe_code)]

//! Strategy registry keyed by [`DependencyId`].
//!
//! # Invariants
//!
//! 1. Binding is last-writer-wins.
//! 2. Looking up an unbound id never registers anything.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use nimbus_core::DependencyId;
use tracing::debug;

use crate::strategy::{NeverUpdateStrategy, UpdateStrategy};

/// Maps dependencies to the strategy that refreshes them.
#[derive(Default)]
pub struct StrategyRegistry {
    bindings: RefCell<HashMap<DependencyId, Rc<dyn UpdateStrategy>>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.bindings.borrow();
        f.debug_map()
            .entries(bindings.iter().map(|(id, s)| (id.to_string(), s.name())))
            .finish()
    }
}

impl StrategyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `strategy` to `id`, returning the strategy it replaces.
    pub fn update_with_strategy(
        &self,
        id: DependencyId,
        strategy: Rc<dyn UpdateStrategy>,
    ) -> Option<Rc<dyn UpdateStrategy>> {
        let name = strategy.name();
        let previous = self.bindings.borrow_mut().insert(id.clone(), strategy);
        if let Some(previous) = &previous {
            debug!(%id, from = previous.name(), to = name, "strategy rebound");
        }
        previous
    }

    /// The strategy bound to `id`, or a fresh [`NeverUpdateStrategy`].
    #[must_use]
    pub fn get_strategy(&self, id: &DependencyId) -> Rc<dyn UpdateStrategy> {
        self.bindings
            .borrow()
            .get(id)
            .cloned()
            .unwrap_or_else(|| Rc::new(NeverUpdateStrategy))
    }

    #[must_use]
    pub fn is_bound(&self, id: &DependencyId) -> bool {
        self.bindings.borrow().contains_key(id)
    }

    pub fn unbind(&self, id: &DependencyId) -> Option<Rc<dyn UpdateStrategy>> {
        self.bindings.borrow_mut().remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::IntervalStrategy;
    use nimbus_core::Duration;

    #[test]
    fn unbound_lookup_is_never_and_not_registered() {
        let registry = StrategyRegistry::new();
        let id = DependencyId::generate();
        let strategy = registry.get_strategy(&id);
        assert!(!strategy.should_update());
        assert!(!registry.is_bound(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn last_writer_wins() {
        let registry = StrategyRegistry::new();
        let id = DependencyId::from_url("/proxy/vms");
        assert!(
            registry
                .update_with_strategy(id.clone(), Rc::new(IntervalStrategy::from_millis(100)))
                .is_none()
        );
        let previous = registry
            .update_with_strategy(id.clone(), Rc::new(IntervalStrategy::from_millis(900)));
        assert_eq!(previous.map(|s| s.interval()), Some(Duration::from_millis(100)));
        assert_eq!(registry.get_strategy(&id).interval(), Duration::from_millis(900));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn url_keys_survive_recreation() {
        let registry = StrategyRegistry::new();
        registry.update_with_strategy(
            DependencyId::from_url("/proxy/vms"),
            Rc::new(IntervalStrategy::from_millis(5)),
        );
        assert!(registry.get_strategy(&DependencyId::from_url("/proxy/vms")).should_update());
    }

    #[test]
    fn unbind_falls_back_to_never() {
        let registry = StrategyRegistry::new();
        let id = DependencyId::generate();
        registry.update_with_strategy(id.clone(), Rc::new(IntervalStrategy::from_millis(5)));
        assert!(registry.unbind(&id).is_some());
        assert!(!registry.get_strategy(&id).should_update());
        assert!(registry.unbind(&id).is_none());
    }
}
