//! Undo manager for a single document.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeSet,
    fmt,
    rc::{Rc, Weak},
    sync::Arc,
};

use tracing::debug;
use uuid::Uuid;

use super::{StackCleared, StackItem, StackItemEvent, StackKind, UndoOptions};
use crate::{
    Result,
    clock::{Clock, SystemClock},
    constants::UNDO_ORIGIN_PREFIX,
    doc::{ArrayRef, Doc, DocError, Origin, TransactionSummary},
    observable::{Observable, Subscription},
};

struct UndoInner<T> {
    doc: Doc<T>,
    origin: Origin,
    scope: RefCell<Vec<ArrayRef<T>>>,
    tracked_origins: RefCell<BTreeSet<Option<Origin>>>,
    capture_timeout: u64,
    clock: Arc<dyn Clock>,
    undo_stack: RefCell<Vec<StackItem>>,
    redo_stack: RefCell<Vec<StackItem>>,
    undoing: Cell<bool>,
    redoing: Cell<bool>,
    /// Time of the last ordinary edit, 0 when the capture window is closed.
    last_change: Cell<u64>,
    added: Observable<StackItemEvent>,
    updated: Observable<StackItemEvent>,
    popped: Observable<StackItemEvent>,
    cleared: Observable<StackCleared>,
    subscription: RefCell<Option<Subscription>>,
    destroyed: Cell<bool>,
}

/// Records local edits of a set of arrays and reverts them on demand.
///
/// Every committed local transaction that changed an array in scope and whose
/// origin is tracked is captured. Undo and redo run in transactions tagged
/// with the manager's own [`origin`](UndoManager::origin), which is always
/// tracked so that undoing an edit produces a redo item and vice versa.
///
/// `UndoManager` is a handle; clones share the same stacks.
pub struct UndoManager<T> {
    inner: Rc<UndoInner<T>>,
}

impl<T: Clone + 'static> UndoManager<T> {
    /// Creates a manager tracking `scope`, reading time from the system clock.
    pub fn new(scope: &ArrayRef<T>, options: UndoOptions) -> Self {
        Self::with_clock(scope, options, Arc::new(SystemClock))
    }

    /// Creates a manager tracking `scope` with a custom clock.
    pub fn with_clock(scope: &ArrayRef<T>, options: UndoOptions, clock: Arc<dyn Clock>) -> Self {
        let doc = scope.doc().clone();
        let origin = Origin::new(format!("{UNDO_ORIGIN_PREFIX}:{}", Uuid::new_v4()));
        let mut tracked_origins = options.tracked_origins;
        tracked_origins.insert(Some(origin.clone()));

        let inner = Rc::new_cyclic(|weak: &Weak<UndoInner<T>>| {
            let weak = weak.clone();
            let subscription = doc.observe_after_transaction(move |summary| {
                if let Some(inner) = weak.upgrade() {
                    UndoManager { inner }.capture(summary);
                }
            });
            UndoInner {
                doc,
                origin,
                scope: RefCell::new(vec![scope.clone()]),
                tracked_origins: RefCell::new(tracked_origins),
                capture_timeout: options.capture_timeout,
                clock,
                undo_stack: RefCell::new(Vec::new()),
                redo_stack: RefCell::new(Vec::new()),
                undoing: Cell::new(false),
                redoing: Cell::new(false),
                last_change: Cell::new(0),
                added: Observable::new(),
                updated: Observable::new(),
                popped: Observable::new(),
                cleared: Observable::new(),
                subscription: RefCell::new(Some(subscription)),
                destroyed: Cell::new(false),
            }
        });
        debug!(doc = %inner.doc.id(), origin = %inner.origin, "Created undo manager");
        Self { inner }
    }

    /// Origin of the transactions this manager runs when undoing or redoing.
    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    pub fn doc(&self) -> &Doc<T> {
        &self.inner.doc
    }

    /// Arrays currently in scope.
    pub fn scope(&self) -> Vec<ArrayRef<T>> {
        self.inner.scope.borrow().clone()
    }

    /// Adds `array` to the scope. Adding an array twice is a no-op.
    pub fn expand_scope(&self, array: &ArrayRef<T>) -> Result<()> {
        if !array.doc().ptr_eq(&self.inner.doc) {
            return Err(DocError::ForeignDocument {
                array: array.name().to_string(),
            }
            .into());
        }
        let mut scope = self.inner.scope.borrow_mut();
        if !scope.contains(array) {
            debug!(doc = %self.inner.doc.id(), array = array.name(), "Expanding undo scope");
            scope.push(array.clone());
        }
        Ok(())
    }

    /// Starts capturing edits made with `origin`. `None` stands for
    /// transactions without origin.
    pub fn add_tracked_origin(&self, origin: Option<Origin>) {
        self.inner.tracked_origins.borrow_mut().insert(origin);
    }

    pub fn remove_tracked_origin(&self, origin: &Option<Origin>) {
        self.inner.tracked_origins.borrow_mut().remove(origin);
    }

    /// Ends the current capture window, so the next edit gets its own item.
    pub fn stop_capturing(&self) {
        self.inner.last_change.set(0);
    }

    /// Reverts the most recent undo item that still changes something.
    pub fn undo(&self) -> Option<StackItem> {
        self.pop_until_applied(StackKind::Undo)
    }

    /// Re-applies the most recent redo item that still changes something.
    pub fn redo(&self) -> Option<StackItem> {
        self.pop_until_applied(StackKind::Redo)
    }

    /// Pops the top undo item and reverts it.
    ///
    /// The item is consumed even if reverting it changes nothing; in that case
    /// `None` is returned.
    pub fn undo_top(&self) -> Option<StackItem> {
        self.pop_top(StackKind::Undo)
    }

    /// Pops the top redo item and re-applies it. See [`undo_top`](Self::undo_top).
    pub fn redo_top(&self) -> Option<StackItem> {
        self.pop_top(StackKind::Redo)
    }

    pub fn can_undo(&self) -> bool {
        !self.inner.undo_stack.borrow().is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.inner.redo_stack.borrow().is_empty()
    }

    pub fn undo_stack(&self) -> Vec<StackItem> {
        self.inner.undo_stack.borrow().clone()
    }

    pub fn redo_stack(&self) -> Vec<StackItem> {
        self.inner.redo_stack.borrow().clone()
    }

    /// Empties the requested stacks and notifies `stack-cleared` observers,
    /// unless there was nothing to clear.
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
        debug!(
            doc = %self.inner.doc.id(),
            undo = clear_undo,
            redo = clear_redo,
            "Cleared undo stacks"
        );
        self.inner.cleared.emit(&StackCleared {
            undo_stack_cleared: clear_undo,
            redo_stack_cleared: clear_redo,
        });
    }

    pub fn observe_stack_item_added<F>(&self, f: F) -> Subscription
    where
        F: Fn(&StackItemEvent) + 'static,
    {
        self.inner.added.subscribe(f)
    }

    /// Notified when an edit was merged into the top item instead of
    /// creating a new one.
    pub fn observe_stack_item_updated<F>(&self, f: F) -> Subscription
    where
        F: Fn(&StackItemEvent) + 'static,
    {
        self.inner.updated.subscribe(f)
    }

    pub fn observe_stack_item_popped<F>(&self, f: F) -> Subscription
    where
        F: Fn(&StackItemEvent) + 'static,
    {
        self.inner.popped.subscribe(f)
    }

    pub fn observe_stack_cleared<F>(&self, f: F) -> Subscription
    where
        F: Fn(&StackCleared) + 'static,
    {
        self.inner.cleared.subscribe(f)
    }

    /// Stops capturing, drops both stacks and every observer.
    pub fn destroy(&self) {
        if self.inner.destroyed.replace(true) {
            return;
        }
        debug!(doc = %self.inner.doc.id(), origin = %self.inner.origin, "Destroying undo manager");
        self.inner.subscription.borrow_mut().take();
        self.inner.undo_stack.borrow_mut().clear();
        self.inner.redo_stack.borrow_mut().clear();
        self.inner.added.clear();
        self.inner.updated.clear();
        self.inner.popped.clear();
        self.inner.cleared.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    fn stack(&self, kind: StackKind) -> &RefCell<Vec<StackItem>> {
        match kind {
            StackKind::Undo => &self.inner.undo_stack,
            StackKind::Redo => &self.inner.redo_stack,
        }
    }

    fn in_scope(&self, name: &str) -> bool {
        self.inner.scope.borrow().iter().any(|array| array.name() == name)
    }

    fn capture(&self, summary: &TransactionSummary) {
        let inner = &self.inner;
        if inner.destroyed.get() || !summary.is_local() {
            return;
        }
        let changed_parent_types: BTreeSet<String> = summary
            .changed()
            .iter()
            .filter(|name| self.in_scope(name))
            .cloned()
            .collect();
        if changed_parent_types.is_empty() {
            return;
        }
        let origin = summary.origin().cloned();
        if !inner.tracked_origins.borrow().contains(&origin) {
            return;
        }

        let undoing = inner.undoing.get();
        let redoing = inner.redoing.get();
        if undoing {
            self.stop_capturing();
        } else if !redoing {
            self.clear(false, true);
        }

        let now = inner.clock.now_millis();
        let last_change = inner.last_change.get();
        let stack = if undoing {
            &inner.redo_stack
        } else {
            &inner.undo_stack
        };
        let merge_into = if !undoing
            && !redoing
            && last_change > 0
            && now.saturating_sub(last_change) < inner.capture_timeout
        {
            stack.borrow().last().cloned()
        } else {
            None
        };
        let (stack_item, added) = match merge_into {
            Some(item) => {
                item.merge(summary.inserted(), summary.deleted());
                (item, false)
            }
            None => {
                let item = StackItem::new(summary.inserted().clone(), summary.deleted().clone());
                stack.borrow_mut().push(item.clone());
                (item, true)
            }
        };
        if !undoing && !redoing {
            inner.last_change.set(now);
        }

        let kind = if undoing {
            StackKind::Redo
        } else {
            StackKind::Undo
        };
        debug!(
            doc = %inner.doc.id(),
            ?kind,
            merged = !added,
            inserted = summary.inserted().len(),
            deleted = summary.deleted().len(),
            "Captured edit"
        );
        let event = StackItemEvent {
            kind,
            stack_item,
            origin,
            changed_parent_types,
        };
        if added {
            inner.added.emit(&event);
        } else {
            inner.updated.emit(&event);
        }
    }

    fn pop_until_applied(&self, kind: StackKind) -> Option<StackItem> {
        loop {
            let item = self.stack(kind).borrow_mut().pop()?;
            if self.apply(&item, kind) {
                return Some(item);
            }
        }
    }

    fn pop_top(&self, kind: StackKind) -> Option<StackItem> {
        let item = self.stack(kind).borrow_mut().pop()?;
        self.apply(&item, kind).then_some(item)
    }

    /// Reverts `item` in one transaction. Returns true if anything changed.
    fn apply(&self, item: &StackItem, kind: StackKind) -> bool {
        let inner = &self.inner;
        if inner.destroyed.get() {
            return false;
        }
        let flag = match kind {
            StackKind::Undo => &inner.undoing,
            StackKind::Redo => &inner.redoing,
        };
        let insertions = item.insertions();
        let deletions = item.deletions();

        flag.set(true);
        let changed = inner.doc.transact_with(inner.origin.clone(), |txn| {
            let mut changed = BTreeSet::new();
            for id in deletions.iter().filter(|id| !insertions.contains(id)) {
                let Some(parent) = txn.parent_of(*id) else {
                    continue;
                };
                if self.in_scope(&parent) && txn.restore(*id).is_some() {
                    changed.insert(parent);
                }
            }
            for id in insertions.iter().rev() {
                let current = txn.follow_redone(*id);
                let Some(parent) = txn.parent_of(current) else {
                    continue;
                };
                if self.in_scope(&parent) && txn.delete_item(current) {
                    changed.insert(parent);
                }
            }
            changed
        });
        flag.set(false);

        debug!(doc = %inner.doc.id(), ?kind, changed = changed.len(), "Applied stack item");
        if changed.is_empty() {
            return false;
        }
        inner.popped.emit(&StackItemEvent {
            kind,
            stack_item: item.clone(),
            origin: Some(inner.origin.clone()),
            changed_parent_types: changed,
        });
        true
    }
}

impl<T> Clone for UndoManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for UndoManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoManager")
            .field("origin", &self.inner.origin)
            .field("undo", &self.inner.undo_stack.borrow().len())
            .field("redo", &self.inner.redo_stack.borrow().len())
            .finish()
    }
}
