//! The destructor tree.
//!
//! Every block, list item, component instance and modifier that needs
//! teardown registers a [`Destroy`] with the list of the block it was
//! rendered in. Tearing a block down walks its list in two phases:
//! `will_destroy` runs immediately, `did_destroy` once the environment
//! transaction commits.

use core::{fmt, mem, ptr};
use std::cell::RefCell;
use std::rc::Rc;

/// Something with teardown work.
pub trait Destroy {
    /// Runs as soon as the owner is torn down, while the DOM is intact.
    fn will_destroy(&self) {}

    /// Runs when the transaction that tore the owner down commits.
    fn did_destroy(&self) {}
}

/// The destructors registered by one block, in registration order.
#[derive(Default)]
pub struct DestructorList {
    children: RefCell<Vec<Rc<dyn Destroy>>>,
}

impl DestructorList {
    /// An empty list.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register `child` for teardown with this list.
    pub fn associate(&self, child: Rc<dyn Destroy>) {
        self.children.borrow_mut().push(child);
    }

    /// Forget `child` without destroying it. Returns whether it was present.
    pub fn remove<T: ?Sized>(&self, child: &Rc<T>) -> bool {
        let mut children = self.children.borrow_mut();
        let before = children.len();
        children.retain(|existing| !ptr::addr_eq(Rc::as_ptr(existing), Rc::as_ptr(child)));
        children.len() != before
    }

    /// Take every registered destructor, leaving the list empty.
    pub fn take(&self) -> Vec<Rc<dyn Destroy>> {
        mem::take(&mut *self.children.borrow_mut())
    }

    /// The number of registered destructors.
    #[inline]
    pub fn len(&self) -> usize {
        self.children.borrow().len()
    }

    /// Whether nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.children.borrow().is_empty()
    }

    fn snapshot(&self) -> Vec<Rc<dyn Destroy>> {
        self.children.borrow().clone()
    }
}

impl Destroy for DestructorList {
    fn will_destroy(&self) {
        for child in self.snapshot() {
            child.will_destroy();
        }
    }

    fn did_destroy(&self) {
        for child in self.snapshot() {
            child.did_destroy();
        }
    }
}

impl fmt::Debug for DestructorList {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DestructorList")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Counter {
        will: Cell<u32>,
        did: Cell<u32>,
    }

    impl Destroy for Counter {
        fn will_destroy(&self) {
            self.will.set(self.will.get() + 1);
        }

        fn did_destroy(&self) {
            self.did.set(self.did.get() + 1);
        }
    }

    /// Test that nested lists forward both phases.
    ///
    /// # Panics
    /// Panics if a phase is skipped or repeated.
    #[test]
    fn nested_lists_forward_phases() {
        let root = DestructorList::new();
        let nested = DestructorList::new();
        let counter = Rc::new(Counter::default());
        nested.associate(Rc::clone(&counter) as Rc<dyn Destroy>);
        root.associate(Rc::clone(&nested) as Rc<dyn Destroy>);

        root.will_destroy();
        assert_eq!((counter.will.get(), counter.did.get()), (1, 0));
        root.did_destroy();
        assert_eq!((counter.will.get(), counter.did.get()), (1, 1));
    }

    /// Test removal by identity.
    ///
    /// # Panics
    /// Panics if the wrong destructor is removed.
    #[test]
    fn removes_by_identity() {
        let list = DestructorList::new();
        let first = Rc::new(Counter::default());
        let second = Rc::new(Counter::default());
        list.associate(Rc::clone(&first) as Rc<dyn Destroy>);
        list.associate(Rc::clone(&second) as Rc<dyn Destroy>);

        assert!(list.remove(&first));
        assert!(!list.remove(&first));
        assert_eq!(list.len(), 1);
        list.will_destroy();
        assert_eq!((first.will.get(), second.will.get()), (0, 1));
        assert_eq!(list.take().len(), 1);
        assert!(list.is_empty());
    }
}
