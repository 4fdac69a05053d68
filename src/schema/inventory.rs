use serde::{Deserialize, Serialize};

/// The player's items. Set semantics: adding an item already held is a
/// no-op and only membership is observable. Insertion order is kept so
/// saves are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Inventory {
    items: Vec<String>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|held| held == item)
    }

    /// Returns true if the item was not already held.
    pub fn add(&mut self, item: impl Into<String>) -> bool {
        let item = item.into();
        if item.is_empty() || self.contains(&item) {
            return false;
        }
        self.items.push(item);
        true
    }

    /// Returns true if the item was held.
    pub fn remove(&mut self, item: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|held| held != item);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for Inventory {
    fn from(items: Vec<String>) -> Self {
        items.into_iter().collect()
    }
}

impl From<Inventory> for Vec<String> {
    fn from(inventory: Inventory) -> Self {
        inventory.items
    }
}

impl<S: Into<String>> FromIterator<S> for Inventory {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut inventory = Inventory::new();
        for item in iter {
            inventory.add(item);
        }
        inventory
    }
}
