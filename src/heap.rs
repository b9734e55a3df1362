//! Indexed binary max-heap.
//!
//! Elements live in a slot arena; the heap itself is a vector of arena slots
//! and every element remembers its own heap position, so an element found
//! through the `id -> slot` index can be re-balanced in place in O(log n).
//!
//! ```text
//! index:  id ──> slot
//! arena:  slot ──> Element { id, weight, pos }
//! heap:   pos ──> slot
//! ```
//!
//! Invariants, for every live element `e`:
//! - `heap[e.pos] == slot(e)`
//! - if `e.pos > 0`, the element at `(e.pos - 1) / 2` weighs at least `e.weight`
//! - `index.len() == heap.len()`
//!
//! The heap does no locking of its own, see [`crate::rpq::RankedQueue`].

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Element {
    pub id: i64,
    pub weight: f64,
    pos: usize,
}

impl Element {
    /// Current position of the element in the heap array.
    pub fn pos(&self) -> usize {
        self.pos
    }
}

#[derive(Debug, Default)]
pub struct IndexedHeap {
    arena: Vec<Element>,
    /// Arena slots released by `remove`, reused by `insert`.
    free: Vec<usize>,
    heap: Vec<usize>,
    index: HashMap<i64, usize>,
}

impl IndexedHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<&Element> {
        self.index.get(&id).map(|&slot| &self.arena[slot])
    }

    /// The maximum-weighted element as `(id, weight)`.
    pub fn top(&self) -> Option<(i64, f64)> {
        self.heap.first().map(|&slot| {
            let e = &self.arena[slot];
            (e.id, e.weight)
        })
    }

    /// Id of the element at heap position `pos`.
    pub fn id_at(&self, pos: usize) -> Option<i64> {
        self.heap.get(pos).map(|&slot| self.arena[slot].id)
    }

    /// Inserts a new element. Returns `false` and leaves the heap untouched if
    /// `id` is already tracked.
    pub fn insert(&mut self, id: i64, weight: f64) -> bool {
        if self.contains(id) {
            return false;
        }

        let pos = self.heap.len();
        let element = Element { id, weight, pos };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.arena[slot] = element;
                slot
            }
            None => {
                self.arena.push(element);
                self.arena.len() - 1
            }
        };

        self.index.insert(id, slot);
        self.heap.push(slot);
        self.sift_up(pos);
        true
    }

    /// Adds `delta` to the weight of `id`. Returns `false` if `id` is not tracked.
    pub fn adjust(&mut self, id: i64, delta: f64) -> bool {
        let Some(&slot) = self.index.get(&id) else {
            return false;
        };

        let element = &mut self.arena[slot];
        element.weight += delta;
        let pos = element.pos;

        // A heavier element can only conflict with its parent, a lighter one
        // only with its children.
        if delta > 0.0 {
            self.sift_up(pos);
        } else if delta < 0.0 {
            self.sift_down(pos);
        }
        true
    }

    /// Removes `id`, returning its last weight.
    ///
    /// The tail entry takes over the vacated position. It may be heavier than
    /// its new parent as well as lighter than its new children, so it is sifted
    /// down first and, if it did not move, up.
    pub fn remove(&mut self, id: i64) -> Option<f64> {
        let slot = self.index.remove(&id)?;
        let Element { weight, pos, .. } = self.arena[slot];
        self.free.push(slot);

        let last = self.heap.pop()?;
        if pos < self.heap.len() {
            self.place(pos, last);
            if self.sift_down(pos) == pos {
                self.sift_up(pos);
            }
        }
        Some(weight)
    }

    /// Checks all structural invariants. O(n).
    pub fn is_valid(&self) -> bool {
        if self.index.len() != self.heap.len() {
            return false;
        }

        let positions_consistent = self
            .index
            .values()
            .all(|&slot| self.heap.get(self.arena[slot].pos) == Some(&slot));

        let ordered = (1..self.heap.len()).all(|pos| {
            let parent = (pos - 1) / 2;
            self.weight_at(parent) >= self.weight_at(pos)
        });

        positions_consistent && ordered
    }

    fn weight_at(&self, pos: usize) -> f64 {
        self.arena[self.heap[pos]].weight
    }

    fn place(&mut self, pos: usize, slot: usize) {
        self.heap[pos] = slot;
        self.arena[slot].pos = pos;
    }

    /// Moves the element at `pos` towards the root while its parent is lighter.
    /// Returns its final position.
    fn sift_up(&mut self, mut pos: usize) -> usize {
        let slot = self.heap[pos];
        let weight = self.arena[slot].weight;

        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.weight_at(parent) >= weight {
                break;
            }
            let parent_slot = self.heap[parent];
            self.place(pos, parent_slot);
            pos = parent;
        }

        self.place(pos, slot);
        pos
    }

    /// Moves the element at `pos` towards the leaves while its heavier child
    /// outweighs it. Returns its final position.
    fn sift_down(&mut self, mut pos: usize) -> usize {
        let slot = self.heap[pos];
        let weight = self.arena[slot].weight;
        let len = self.heap.len();

        loop {
            let mut child = 2 * pos + 1;
            if child >= len {
                break;
            }
            if child + 1 < len && self.weight_at(child) <= self.weight_at(child + 1) {
                child += 1;
            }
            if weight >= self.weight_at(child) {
                break;
            }
            let child_slot = self.heap[child];
            self.place(pos, child_slot);
            pos = child;
        }

        self.place(pos, slot);
        pos
    }
}
