//! Cross-document undo coordination.
//!
//! [`MultiDocUndoManager`] creates one [`UndoManager`] per document the first
//! time an array of that document is added to its scope. Every time one of
//! those managers pushes a stack item, the coordinator records the owning
//! document on its own stack, so undo and redo follow the order in which
//! edits happened across all documents.

use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    rc::{Rc, Weak},
    sync::Arc,
};

use tracing::{debug, warn};

use super::{StackCleared, StackItem, StackItemEvent, StackKind, UndoManager, UndoOptions};
use crate::{
    Result,
    clock::{Clock, SystemClock},
    doc::{ArrayRef, DocId},
    observable::{Observable, Subscription},
};

/// A [`StackItemEvent`] of one member document, tagged with that document.
#[derive(Debug, Clone)]
pub struct DocStackItemEvent {
    pub doc: DocId,
    pub event: StackItemEvent,
}

struct Member<T> {
    manager: UndoManager<T>,
    _subscriptions: Vec<Subscription>,
}

struct MultiInner<T> {
    options: UndoOptions,
    clock: Arc<dyn Clock>,
    docs: RefCell<BTreeMap<DocId, Member<T>>>,
    /// Owning document of every undo item, oldest first.
    undo_stack: RefCell<Vec<DocId>>,
    redo_stack: RefCell<Vec<DocId>>,
    added: Observable<DocStackItemEvent>,
    updated: Observable<DocStackItemEvent>,
    popped: Observable<DocStackItemEvent>,
    cleared: Observable<StackCleared>,
}

/// One undo/redo history spanning several documents.
///
/// The length of the global undo stack always equals the total number of
/// undo items of the member managers, and likewise for redo.
pub struct MultiDocUndoManager<T> {
    inner: Rc<MultiInner<T>>,
}

impl<T: Clone + 'static> MultiDocUndoManager<T> {
    /// Creates an empty coordinator. `options` configure every member manager.
    pub fn new(options: UndoOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Creates an empty coordinator whose member managers read `clock`.
    pub fn with_clock(options: UndoOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Rc::new(MultiInner {
                options,
                clock,
                docs: RefCell::new(BTreeMap::new()),
                undo_stack: RefCell::new(Vec::new()),
                redo_stack: RefCell::new(Vec::new()),
                added: Observable::new(),
                updated: Observable::new(),
                popped: Observable::new(),
                cleared: Observable::new(),
            }),
        }
    }

    /// Adds arrays to the scope, creating a manager for each new document.
    ///
    /// Adding an array that is already in scope is a no-op.
    pub fn add_to_scope(&self, arrays: impl IntoIterator<Item = ArrayRef<T>>) -> Result<()> {
        for array in arrays {
            let doc = array.doc().id();
            let existing = self
                .inner
                .docs
                .borrow()
                .get(&doc)
                .map(|member| member.manager.clone());
            let manager = match existing {
                Some(manager) => manager,
                None => self.register(&array),
            };
            manager.expand_scope(&array)?;
        }
        Ok(())
    }

    fn register(&self, array: &ArrayRef<T>) -> UndoManager<T> {
        let doc = array.doc().id();
        let manager = UndoManager::with_clock(
            array,
            self.inner.options.clone(),
            Arc::clone(&self.inner.clock),
        );
        let weak = Rc::downgrade(&self.inner);

        let subscriptions = vec![
            manager.observe_stack_item_added(with_coordinator(
                &weak,
                move |mum, event: &StackItemEvent| mum.on_stack_item_added(doc, event),
            )),
            manager.observe_stack_item_updated(with_coordinator(
                &weak,
                move |mum, event: &StackItemEvent| {
                    mum.inner.updated.emit(&DocStackItemEvent {
                        doc,
                        event: event.clone(),
                    })
                },
            )),
            manager.observe_stack_item_popped(with_coordinator(
                &weak,
                move |mum, event: &StackItemEvent| {
                    mum.inner.popped.emit(&DocStackItemEvent {
                        doc,
                        event: event.clone(),
                    })
                },
            )),
            manager.observe_stack_cleared(with_coordinator(
                &weak,
                |mum, cleared: &StackCleared| {
                    mum.clear(cleared.undo_stack_cleared, cleared.redo_stack_cleared)
                },
            )),
            array.doc().observe_destroy(with_coordinator(&weak, |mum, doc: &DocId| {
                mum.on_doc_destroyed(*doc)
            })),
        ];

        debug!(doc = %doc, "Tracking document for undo");
        self.inner.docs.borrow_mut().insert(
            doc,
            Member {
                manager: manager.clone(),
                _subscriptions: subscriptions,
            },
        );
        manager
    }

    fn on_stack_item_added(&self, doc: DocId, event: &StackItemEvent) {
        self.stack(event.kind).borrow_mut().push(doc);
        self.inner.added.emit(&DocStackItemEvent {
            doc,
            event: event.clone(),
        });
    }

    fn on_doc_destroyed(&self, doc: DocId) {
        let member = self.inner.docs.borrow_mut().remove(&doc);
        let Some(member) = member else {
            return;
        };
        member.manager.destroy();
        self.inner.undo_stack.borrow_mut().retain(|id| *id != doc);
        self.inner.redo_stack.borrow_mut().retain(|id| *id != doc);
        debug!(doc = %doc, "Document destroyed, dropped its undo history");
    }

    fn stack(&self, kind: StackKind) -> &RefCell<Vec<DocId>> {
        match kind {
            StackKind::Undo => &self.inner.undo_stack,
            StackKind::Redo => &self.inner.redo_stack,
        }
    }

    /// Undoes the most recent edit, across all documents, that still changes
    /// something.
    pub fn undo(&self) -> Option<StackItem> {
        self.pop_stack_item(StackKind::Undo)
    }

    /// Redoes the most recently undone edit that still changes something.
    pub fn redo(&self) -> Option<StackItem> {
        self.pop_stack_item(StackKind::Redo)
    }

    fn pop_stack_item(&self, kind: StackKind) -> Option<StackItem> {
        loop {
            let doc = self.stack(kind).borrow_mut().pop()?;
            let Some(manager) = self.manager(doc) else {
                warn!(doc = %doc, "Undo stack refers to an untracked document");
                continue;
            };
            let item = match kind {
                StackKind::Undo => manager.undo_top(),
                StackKind::Redo => manager.redo_top(),
            };
            if item.is_some() {
                return item;
            }
            debug!(doc = %doc, ?kind, "Stack item had no effect");
        }
    }

    /// Empties the requested global stacks and the matching stacks of every
    /// member manager, then notifies `stack-cleared` observers.
    ///
    /// Does nothing if the requested stacks are already empty.
    pub fn clear(&self, clear_undo: bool, clear_redo: bool) {
        if !((clear_undo && self.can_undo()) || (clear_redo && self.can_redo())) {
            return;
        }
        if clear_undo {
            self.inner.undo_stack.borrow_mut().clear();
        }
        if clear_redo {
            self.inner.redo_stack.borrow_mut().clear();
        }
        for manager in self.managers() {
            manager.clear(clear_undo, clear_redo);
        }
        debug!(undo = clear_undo, redo = clear_redo, "Cleared cross-document stacks");
        self.inner.cleared.emit(&StackCleared {
            undo_stack_cleared: clear_undo,
            redo_stack_cleared: clear_redo,
        });
    }

    /// Ends the capture window of every member manager.
    pub fn stop_capturing(&self) {
        for manager in self.managers() {
            manager.stop_capturing();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.inner.undo_stack.borrow().is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.inner.redo_stack.borrow().is_empty()
    }

    /// Owning document of every undo item, oldest first.
    pub fn undo_stack(&self) -> Vec<DocId> {
        self.inner.undo_stack.borrow().clone()
    }

    /// Owning document of every redo item, oldest first.
    pub fn redo_stack(&self) -> Vec<DocId> {
        self.inner.redo_stack.borrow().clone()
    }

    /// The member manager of `doc`, if the document is tracked.
    pub fn manager(&self, doc: DocId) -> Option<UndoManager<T>> {
        self.inner
            .docs
            .borrow()
            .get(&doc)
            .map(|member| member.manager.clone())
    }

    /// Every tracked document.
    pub fn docs(&self) -> Vec<DocId> {
        self.inner.docs.borrow().keys().copied().collect()
    }

    fn managers(&self) -> Vec<UndoManager<T>> {
        self.inner
            .docs
            .borrow()
            .values()
            .map(|member| member.manager.clone())
            .collect()
    }

    pub fn observe_stack_item_added<F>(&self, f: F) -> Subscription
    where
        F: Fn(&DocStackItemEvent) + 'static,
    {
        self.inner.added.subscribe(f)
    }

    pub fn observe_stack_item_updated<F>(&self, f: F) -> Subscription
    where
        F: Fn(&DocStackItemEvent) + 'static,
    {
        self.inner.updated.subscribe(f)
    }

    pub fn observe_stack_item_popped<F>(&self, f: F) -> Subscription
    where
        F: Fn(&DocStackItemEvent) + 'static,
    {
        self.inner.popped.subscribe(f)
    }

    pub fn observe_stack_cleared<F>(&self, f: F) -> Subscription
    where
        F: Fn(&StackCleared) + 'static,
    {
        self.inner.cleared.subscribe(f)
    }

    /// Destroys every member manager and drops every observer.
    pub fn destroy(&self) {
        let members = std::mem::take(&mut *self.inner.docs.borrow_mut());
        debug!(docs = members.len(), "Destroying cross-document undo manager");
        for member in members.values() {
            member.manager.destroy();
        }
        self.inner.undo_stack.borrow_mut().clear();
        self.inner.redo_stack.borrow_mut().clear();
        self.inner.added.clear();
        self.inner.updated.clear();
        self.inner.popped.clear();
        self.inner.cleared.clear();
    }
}

/// Wraps `f` so it runs against the coordinator while it is still alive.
fn with_coordinator<T, E, F>(weak: &Weak<MultiInner<T>>, f: F) -> impl Fn(&E) + 'static
where
    T: Clone + 'static,
    E: ?Sized + 'static,
    F: Fn(&MultiDocUndoManager<T>, &E) + 'static,
{
    let weak = weak.clone();
    move |event| {
        if let Some(inner) = weak.upgrade() {
            f(&MultiDocUndoManager { inner }, event);
        }
    }
}

impl<T> Clone for MultiDocUndoManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for MultiDocUndoManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiDocUndoManager")
            .field("docs", &self.inner.docs.borrow().len())
            .field("undo", &self.inner.undo_stack.borrow().len())
            .field("redo", &self.inner.redo_stack.borrow().len())
            .finish()
    }
}
