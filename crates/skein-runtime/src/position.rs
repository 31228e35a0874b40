use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a [`PositionRegister`].
///
/// A downstream network adopts the register of its upstream network when
/// chained; networks are fed strictly in pipeline order, so there is one
/// writer at a time.
pub type SharedPositions = Rc<RefCell<PositionRegister>>;

/// Maps raw indices to canonical positions.
///
/// Merging two positions makes them interchangeable, which is how skipped
/// spans (whitespace, comments) become zero-width: indices on either side
/// of the span canonicalize to the same position.
#[derive(Default, Debug)]
pub struct PositionRegister {
    parent: HashMap<u32, u32>,
}

impl PositionRegister {
    pub fn new() -> PositionRegister {
        Self::default()
    }

    pub fn shared() -> SharedPositions {
        Rc::new(RefCell::new(PositionRegister::new()))
    }

    /// The canonical representative of `index`, the smallest index merged
    /// with it.
    pub fn canonical(&self, index: u32) -> u32 {
        let mut current = index;
        while let Some(&next) = self.parent.get(&current) {
            current = next;
        }
        current
    }

    pub fn same(&self, a: u32, b: u32) -> bool {
        self.canonical(a) == self.canonical(b)
    }

    /// Union the positions of `a` and `b`.
    pub fn merge(&mut self, a: u32, b: u32) {
        let a = self.canonical(a);
        let b = self.canonical(b);
        if a == b {
            return;
        }
        let (root, child) = if a < b { (a, b) } else { (b, a) };
        self.parent.insert(child, root);
    }
}
