pub mod branch;
pub mod item;
pub mod rule;

use std::rc::Rc;

pub type RcString = Rc<str>;

pub use branch::{Branch, BranchCase, BranchSet};
pub use item::{Group, Item};
pub use rule::{Action, Rule, SplitCase};
