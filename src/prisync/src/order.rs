//! Priority ordering of waiter sequences
//!
//! Sequences are kept in descending priority order. Among equal priorities,
//! the element that arrived first comes first.
use alloc::vec::Vec;
use core::cmp::Reverse;

/// Insert `item` after every element whose priority is greater than or equal
/// to that of `item`.
///
/// `v` does not have to be sorted (its elements' priorities may have changed
/// since they were inserted), in which case `item` is placed before the first
/// element with a strictly lower priority.
pub(crate) fn insert_by_priority<T>(v: &mut Vec<T>, item: T, mut priority: impl FnMut(&T) -> usize) {
    let item_priority = priority(&item);
    let i = v
        .iter()
        .position(|x| priority(x) < item_priority)
        .unwrap_or(v.len());
    v.insert(i, item);
}

/// Re-establish the descending priority order. This sort is stable.
pub(crate) fn sort_by_priority<T>(v: &mut [T], mut priority: impl FnMut(&T) -> usize) {
    v.sort_by_key(|x| Reverse(priority(x)));
}

/// Re-sort `v` and remove its first element.
pub(crate) fn pop_highest<T>(v: &mut Vec<T>, priority: impl FnMut(&T) -> usize) -> Option<T> {
    if v.is_empty() {
        return None;
    }
    sort_by_priority(v, priority);
    Some(v.remove(0))
}

/// Check the structural consistency of a priority-ordered sequence.
pub(crate) fn is_sorted_by_priority<T>(v: &[T], mut priority: impl FnMut(&T) -> usize) -> bool {
    v.windows(2).all(|w| priority(&w[0]) >= priority(&w[1]))
}
