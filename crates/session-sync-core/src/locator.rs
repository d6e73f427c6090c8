//! Sorted-index locator for id-ordered collections.
//!
//! Both reconciliation engines keep their arrays sorted ascending by id and
//! go through these helpers for every lookup, insert and removal.

/// An item addressable by a string key.
pub trait Keyed {
    /// The key the collection is sorted by.
    fn key(&self) -> &str;
}

/// Result of a lookup.
///
/// When `found`, `items[index]` has the target key; otherwise `index` is
/// where the key would have to be inserted to keep the slice sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub found: bool,
    pub index: usize,
}

/// What [`upsert_sorted`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted(usize),
    Updated(usize),
}

/// Binary-search `items` for `key`.
#[must_use]
pub fn locate<T: Keyed>(items: &[T], key: &str) -> Location {
    match items.binary_search_by(|item| item.key().cmp(key)) {
        Ok(index) => Location { found: true, index },
        Err(index) => Location {
            found: false,
            index,
        },
    }
}

/// Insert `item` at its sorted position, or hand it to `merge` together with
/// the existing entry that has the same key.
pub fn upsert_sorted<T, F>(items: &mut Vec<T>, item: T, merge: F) -> Upsert
where
    T: Keyed,
    F: FnOnce(&mut T, T),
{
    let Location { found, index } = locate(items, item.key());
    if found {
        merge(&mut items[index], item);
        Upsert::Updated(index)
    } else {
        items.insert(index, item);
        Upsert::Inserted(index)
    }
}

/// Remove the entry with `key`, if any.
pub fn remove_sorted<T: Keyed>(items: &mut Vec<T>, key: &str) -> Option<T> {
    let Location { found, index } = locate(items, key);
    found.then(|| items.remove(index))
}

/// Get the entry with `key`, if any.
#[must_use]
pub fn find_sorted<'a, T: Keyed>(items: &'a [T], key: &str) -> Option<&'a T> {
    let Location { found, index } = locate(items, key);
    found.then(|| &items[index])
}

impl Keyed for String {
    fn key(&self) -> &str {
        self
    }
}
