use std::collections::HashMap;
use std::hash::Hash;

/// Interning table giving each structurally distinct value a stable index.
///
/// Indices are handed out in first-seen order. Used for conditions, results
/// and hash-consed CFG nodes.
#[derive(Debug, Clone)]
pub(crate) struct Pool<T> {
    items: Vec<T>,
    index: HashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> Pool<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Intern `item`, returning its index. An item already present keeps
    /// its existing index.
    pub(crate) fn intern(&mut self, item: T) -> usize {
        if let Some(&idx) = self.index.get(&item) {
            return idx;
        }
        let idx = self.items.len();
        self.index.insert(item.clone(), idx);
        self.items.push(item);
        idx
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
