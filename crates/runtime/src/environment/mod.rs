//! The host environment: DOM access, path semantics and the transaction
//! lifecycle hooks run in.

mod sanitize;
mod transaction;

use anyhow::{Result, anyhow, ensure};
use log::{debug, warn};
use std::cell::RefCell;
use std::rc::Rc;
use trellis_dom::DomTree;
use trellis_reference::{IterableReference, PathDelegate, Reference, Value};

use crate::component::{ComponentManager, ComponentState};
use crate::destroyable::{Destroy, DestructorList};
use crate::modifier::{ModifierManager, ModifierState};

pub use sanitize::{
    default_protocol_for_url, normalize_attribute_value, requires_sanitization,
    sanitize_attribute_value,
};
pub use transaction::Transaction;

/// Host hooks beyond property access.
pub trait EnvironmentDelegate: PathDelegate {
    /// The protocol of `url` with its trailing colon, such as `"https:"`.
    fn protocol_for_url(&self, url: &str) -> String {
        default_protocol_for_url(url)
    }

    /// A render or revalidation pass is starting.
    fn on_transaction_begin(&self) {}

    /// A pass finished and its hooks ran.
    fn on_transaction_commit(&self) {}
}

/// The delegate used when the host has no opinions.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultEnvironment;

impl PathDelegate for DefaultEnvironment {}

impl EnvironmentDelegate for DefaultEnvironment {}

/// Everything the VMs need from the host.
pub struct Environment {
    delegate: Rc<dyn EnvironmentDelegate>,
    path_delegate: Rc<dyn PathDelegate>,
    dom: Rc<RefCell<dyn DomTree>>,
    transaction: RefCell<Option<Transaction>>,
}

impl Environment {
    /// An environment rendering into `dom`.
    pub fn new<D>(delegate: Rc<D>, dom: Rc<RefCell<dyn DomTree>>) -> Rc<Self>
    where
        D: EnvironmentDelegate + 'static,
    {
        let path_delegate: Rc<dyn PathDelegate> = Rc::clone(&delegate) as _;
        Rc::new(Self {
            delegate,
            path_delegate,
            dom,
            transaction: RefCell::new(None),
        })
    }

    /// An environment with the [`DefaultEnvironment`] delegate.
    pub fn with_defaults(dom: Rc<RefCell<dyn DomTree>>) -> Rc<Self> {
        Self::new(Rc::new(DefaultEnvironment), dom)
    }

    /// The DOM being rendered into.
    #[inline]
    pub const fn dom(&self) -> &Rc<RefCell<dyn DomTree>> {
        &self.dom
    }

    /// Path semantics for references.
    #[inline]
    pub fn path_delegate(&self) -> Rc<dyn PathDelegate> {
        Rc::clone(&self.path_delegate)
    }

    /// The host delegate.
    #[inline]
    pub const fn delegate(&self) -> &Rc<dyn EnvironmentDelegate> {
        &self.delegate
    }

    /// The protocol of `url`, per the delegate.
    pub fn protocol_for_url(&self, url: &str) -> String {
        self.delegate.protocol_for_url(url)
    }

    /// The attribute value to set, sanitized when it is a script URL.
    pub fn sanitize(&self, tag: Option<&str>, attribute: &str, value: String) -> String {
        sanitize_attribute_value(tag, attribute, value, |url| self.protocol_for_url(url))
    }

    /// An iterable over `list` keyed by `key`. A missing key means
    /// `@identity`.
    pub fn iterable_for(&self, list: Reference, key: &Value) -> IterableReference {
        let key = match key {
            Value::Undefined | Value::Null => "@identity".to_owned(),
            other => other.to_text(),
        };
        IterableReference::new(list, &key, self.path_delegate())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.borrow().is_some()
    }

    /// Open a transaction.
    ///
    /// # Errors
    /// Returns an error if one is already open.
    pub fn begin(&self) -> Result<()> {
        ensure!(!self.in_transaction(), "a transaction is already open");
        self.delegate.on_transaction_begin();
        *self.transaction.borrow_mut() = Some(Transaction::default());
        Ok(())
    }

    /// Close the open transaction and run its hooks.
    ///
    /// # Errors
    /// Returns an error if none is open, or the first failing hook's error.
    pub fn commit(&self) -> Result<()> {
        let transaction = self
            .transaction
            .borrow_mut()
            .take()
            .ok_or_else(|| anyhow!("no transaction to commit"))?;
        transaction.commit(self)?;
        self.delegate.on_transaction_commit();
        Ok(())
    }

    /// Drop the open transaction without running its hooks.
    pub fn discard(&self) {
        if let Some(transaction) = self.transaction.borrow_mut().take() {
            warn!(target: "trellis::environment", "discarding {transaction:?}");
        }
    }

    /// Run `run` inside a transaction, committing on success and discarding
    /// on failure.
    ///
    /// # Errors
    /// Returns `run`'s error, or a commit failure.
    pub fn transact<T, F>(&self, run: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.begin()?;
        match run() {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(error) => {
                self.discard();
                Err(error)
            }
        }
    }

    fn with_transaction(&self, what: &str, record: impl FnOnce(&mut Transaction)) -> Result<()> {
        let mut transaction = self.transaction.borrow_mut();
        let transaction = transaction
            .as_mut()
            .ok_or_else(|| anyhow!("{what} outside a transaction"))?;
        record(transaction);
        Ok(())
    }

    /// Queue `did_create` for a new component.
    ///
    /// # Errors
    /// Returns an error outside a transaction.
    pub fn did_create(&self, manager: Rc<dyn ComponentManager>, state: ComponentState) -> Result<()> {
        self.with_transaction("creating a component", |transaction| {
            transaction.did_create(manager, state);
        })
    }

    /// Queue `did_update` for an updated component.
    ///
    /// # Errors
    /// Returns an error outside a transaction.
    pub fn did_update(&self, manager: Rc<dyn ComponentManager>, state: ComponentState) -> Result<()> {
        self.with_transaction("updating a component", |transaction| {
            transaction.did_update(manager, state);
        })
    }

    /// Queue a modifier install.
    ///
    /// # Errors
    /// Returns an error outside a transaction.
    pub fn schedule_install_modifier(&self, manager: Rc<dyn ModifierManager>, state: ModifierState) -> Result<()> {
        self.with_transaction("installing a modifier", |transaction| {
            transaction.install_modifier(manager, state);
        })
    }

    /// Queue a modifier update.
    ///
    /// # Errors
    /// Returns an error outside a transaction.
    pub fn schedule_update_modifier(&self, manager: Rc<dyn ModifierManager>, state: ModifierState) -> Result<()> {
        self.with_transaction("updating a modifier", |transaction| {
            transaction.update_modifier(manager, state);
        })
    }

    /// Tear `target` down: `will_destroy` now, `did_destroy` when the open
    /// transaction commits, or immediately without one.
    pub fn destroy(&self, target: Rc<dyn Destroy>) {
        target.will_destroy();
        let deferred = match self.transaction.borrow_mut().as_mut() {
            Some(transaction) => {
                transaction.did_destroy(Rc::clone(&target));
                true
            }
            None => false,
        };
        if !deferred {
            target.did_destroy();
        }
    }

    /// Tear down everything registered with `list` and empty it.
    pub fn destroy_children(&self, list: &DestructorList) {
        let children = list.take();
        if !children.is_empty() {
            debug!(target: "trellis::environment", "destroying {} children", children.len());
        }
        for child in children {
            self.destroy(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use trellis_dom::Document;
    use trellis_reference::ConstReference;

    #[derive(Default)]
    struct Recorder {
        will: Cell<bool>,
        did: Cell<bool>,
    }

    impl Destroy for Recorder {
        fn will_destroy(&self) {
            self.will.set(true);
        }

        fn did_destroy(&self) {
            self.did.set(true);
        }
    }

    fn environment() -> Rc<Environment> {
        Environment::with_defaults(Rc::new(RefCell::new(Document::new())))
    }

    /// Test that `did_destroy` waits for the commit.
    ///
    /// # Panics
    /// Panics if the second phase runs early.
    #[test]
    fn destruction_waits_for_commit() -> Result<()> {
        let env = environment();
        let recorder = Rc::new(Recorder::default());
        env.transact(|| {
            env.destroy(Rc::clone(&recorder) as Rc<dyn Destroy>);
            assert!(recorder.will.get());
            assert!(!recorder.did.get());
            Ok(())
        })?;
        assert!(recorder.did.get());
        Ok(())
    }

    /// Test that transactions do not nest and failures discard.
    ///
    /// # Panics
    /// Panics if a failed pass leaves a transaction open.
    #[test]
    fn failed_passes_discard() -> Result<()> {
        let env = environment();
        let recorder = Rc::new(Recorder::default());
        let result: Result<()> = env.transact(|| {
            assert!(env.begin().is_err());
            env.destroy(Rc::clone(&recorder) as Rc<dyn Destroy>);
            Err(anyhow!("boom"))
        });
        assert!(result.is_err());
        assert!(!env.in_transaction());
        assert!(!recorder.did.get());
        assert!(env.commit().is_err());
        Ok(())
    }

    /// Test iterable keys.
    ///
    /// # Panics
    /// Panics if a missing key is not identity.
    #[test]
    fn missing_keys_use_identity() {
        let env = environment();
        let list = ConstReference::new(Value::array([Value::from(1)]));
        let iterable = env.iterable_for(list, &Value::Null);
        assert!(iterable.tag().is_const());
    }
}
