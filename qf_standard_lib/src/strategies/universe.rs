use crate::standardized_types::base_data::base_data_enum::BaseDataCollection;
use crate::standardized_types::securities::SecurityChanges;
use crate::standardized_types::subscriptions::SubscriptionId;
use crate::standardized_types::symbols::Symbol;
use ahash::AHashSet;

/// The selection function: given one universe data collection, the full set
/// of symbols the strategy wants subscribed. The feed diffs it against the
/// current members to produce adds and removes.
pub type UniverseSelector = Box<dyn FnMut(&BaseDataCollection) -> Vec<Symbol> + Send>;

/// A universe binds a coarse data subscription to a selector. Selection runs
/// between slices whenever the universe subscription yields an item, members
/// drive subscription creation and removal.
pub struct Universe {
    pub name: String,
    pub subscription_id: SubscriptionId,
    selector: UniverseSelector,
    members: AHashSet<Symbol>,
}

impl Universe {
    pub fn new(name: &str, subscription_id: SubscriptionId, selector: UniverseSelector) -> Self {
        Universe {
            name: name.to_string(),
            subscription_id,
            selector,
            members: AHashSet::new(),
        }
    }

    pub fn members(&self) -> impl Iterator<Item = &Symbol> {
        self.members.iter()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.members.contains(symbol)
    }

    /// Runs the selector and diffs the result against current members.
    /// Ordering of the produced changes is deterministic: sorted by symbol.
    pub fn select(&mut self, data: &BaseDataCollection) -> SecurityChanges {
        let desired: AHashSet<Symbol> = (self.selector)(data).into_iter().collect();
        let mut added: Vec<Symbol> = desired.difference(&self.members).cloned().collect();
        let mut removed: Vec<Symbol> = self.members.difference(&desired).cloned().collect();
        added.sort();
        removed.sort();
        self.members = desired;
        SecurityChanges { added, removed }
    }
}
