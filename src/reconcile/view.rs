use std::cmp::Ordering;
use std::fmt;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Client-side filter and sort a screen applies on top of its collection.
///
/// The derived view is always recomputed from the full collection after a
/// change, never patched, so it cannot drift from the data.
pub struct ViewSpec<T> {
    filter: Option<Predicate<T>>,
    sort: Option<Comparator<T>>,
}

impl<T> Default for ViewSpec<T> {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
        }
    }
}

impl<T> ViewSpec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    pub fn sort_by<F>(mut self, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Box::new(compare));
        self
    }

    pub fn sort_by_key<K, F>(self, key: F) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.sort_by(move |a, b| key(a).cmp(&key(b)))
    }

    /// Indices into `items` of the visible elements, in display order.
    /// Sorting is stable, so ties keep collection order.
    pub fn project(&self, items: &[T]) -> Vec<usize> {
        let mut indices: Vec<usize> = match &self.filter {
            Some(filter) => (0..items.len()).filter(|&i| filter(&items[i])).collect(),
            None => (0..items.len()).collect(),
        };
        if let Some(compare) = &self.sort {
            indices.sort_by(|&a, &b| compare(&items[a], &items[b]));
        }
        indices
    }
}

impl<T> fmt::Debug for ViewSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSpec")
            .field("filter", &self.filter.is_some())
            .field("sort", &self.sort.is_some())
            .finish()
    }
}
