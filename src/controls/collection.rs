/*
 * Ordered child wrappers of a menu or form, kept in lockstep with the raw handle
 * array handed to the library. `children[i]` always wraps `handles[i]`, and once
 * the library has accepted the array, its reported count and per-child index
 * must agree with those positions. A disagreement means the binding and the
 * library no longer describe the same container; that is fatal.
 *
 * The sentinel-terminated form the C API expects is built fresh from `handles`
 * for every attach and given to the library by value.
 */

use crate::curses::{HandleArray, RawHandle};
use crate::types::Ownership;

use std::fmt::Debug;

#[derive(Debug, Clone)]
pub(crate) struct ChildCollection<Id> {
    children: Vec<Id>,
    handles: Vec<RawHandle>,
    ownership: Ownership,
}

impl<Id: Copy + Eq + Debug> ChildCollection<Id> {
    pub(crate) fn new(pairs: Vec<(Id, RawHandle)>, ownership: Ownership) -> Self {
        let (children, handles) = pairs.into_iter().unzip();
        Self {
            children,
            handles,
            ownership,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn children(&self) -> &[Id] {
        &self.children
    }

    pub(crate) fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub(crate) fn get(&self, index: usize) -> Option<Id> {
        self.children.get(index).copied()
    }

    pub(crate) fn contains(&self, id: Id) -> bool {
        self.children.contains(&id)
    }

    /// `handles` followed by the terminating NULL.
    pub(crate) fn sentinel_array(&self) -> HandleArray {
        self.handles
            .iter()
            .copied()
            .map(Some)
            .chain(std::iter::once(None))
            .collect()
    }

    /*
     * Checks the library's view against ours after an attach.
     * `index_of` is `item_index`/`field_index`.
     */
    /// # Panics
    /// Panics when the reported count or any reported index differs.
    pub(crate) fn verify_sync(
        &self,
        container: &str,
        reported_count: i32,
        index_of: impl Fn(RawHandle) -> i32,
    ) {
        if usize::try_from(reported_count).ok() != Some(self.len()) {
            index_sync_violation(
                container,
                &format!(
                    "library reports {reported_count} children, collection holds {}",
                    self.len()
                ),
            );
        }
        for (position, handle) in self.handles.iter().enumerate() {
            let reported = index_of(*handle);
            if usize::try_from(reported).ok() != Some(position) {
                index_sync_violation(
                    container,
                    &format!(
                        "child {:?} at position {position} reported at index {reported}",
                        self.children[position]
                    ),
                );
            }
        }
    }

    /// Children of an owned collection that `next` no longer holds, in order.
    pub(crate) fn retired_by(&self, next: &ChildCollection<Id>) -> Vec<Id> {
        if self.ownership == Ownership::Borrowed {
            return Vec::new();
        }
        self.children
            .iter()
            .copied()
            .filter(|id| !next.contains(*id))
            .collect()
    }

    /// Children the container must destroy on teardown.
    pub(crate) fn owned_children(&self) -> &[Id] {
        match self.ownership {
            Ownership::Owned => &self.children,
            Ownership::Borrowed => &[],
        }
    }
}

fn index_sync_violation(container: &str, detail: &str) -> ! {
    log::error!("Collection: index sync violation in {container}: {detail}");
    panic!("index sync violation in {container}: {detail}");
}
