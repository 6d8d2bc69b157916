use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::backend::VectorHandleRef;
use crate::error::{Result, SyncError};
use crate::observable::{Linkable, ObservableVector, VectorChange, VectorChangeKind};
use crate::signal::{Signal, SlotId};

use super::DISPOSED;

type Parent<T> = Rc<dyn ObservableVector<T>>;

/// Plain observable vector.
pub struct LocalVector<T: Clone + 'static> {
    this: Weak<Self>,
    items: RefCell<Vec<T>>,
    parent: RefCell<Option<(Parent<T>, SlotId)>>,
    changed: Signal<VectorChange<T>>,
    disposed: Cell<bool>,
}

impl<T: Clone + 'static> LocalVector<T> {
    pub fn new() -> Rc<Self> {
        Self::from_values(Vec::new())
    }

    pub fn from_values(items: Vec<T>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            items: RefCell::new(items),
            parent: RefCell::new(None),
            changed: Signal::new(),
            disposed: Cell::new(false),
        })
    }

    fn assert_live(&self) {
        assert!(!self.disposed.get(), "{}", DISPOSED);
    }

    fn parent(&self) -> Option<Parent<T>> {
        self.assert_live();
        self.parent.borrow().as_ref().map(|(p, _)| p.clone())
    }

    fn emit(
        &self,
        kind: VectorChangeKind,
        old_index: usize,
        new_index: usize,
        old_values: Vec<T>,
        new_values: Vec<T>,
    ) {
        self.changed.emit(&VectorChange {
            kind,
            old_index,
            new_index,
            old_values,
            new_values,
        });
    }

    fn detach(&self) -> Option<Parent<T>> {
        let (parent, slot) = self.parent.borrow_mut().take()?;
        if !parent.is_disposed() {
            parent.changed().disconnect(slot);
        }
        Some(parent)
    }
}

impl<T: Clone + 'static> ObservableVector<T> for LocalVector<T> {
    fn changed(&self) -> &Signal<VectorChange<T>> {
        self.assert_live();
        &self.changed
    }

    fn len(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.len(),
            None => self.items.borrow().len(),
        }
    }

    fn get(&self, index: usize) -> Option<T> {
        match self.parent() {
            Some(parent) => parent.get(index),
            None => self.items.borrow().get(index).cloned(),
        }
    }

    fn values(&self) -> Vec<T> {
        match self.parent() {
            Some(parent) => parent.values(),
            None => self.items.borrow().clone(),
        }
    }

    fn set(&self, index: usize, value: T) -> Result<T> {
        if let Some(parent) = self.parent() {
            return parent.set(index, value);
        }
        let old = {
            let mut items = self.items.borrow_mut();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(SyncError::IndexOutOfBounds { index, len })?;
            std::mem::replace(slot, value.clone())
        };
        self.emit(
            VectorChangeKind::Set,
            index,
            index,
            vec![old.clone()],
            vec![value],
        );
        Ok(old)
    }

    fn push(&self, value: T) -> Result<usize> {
        if let Some(parent) = self.parent() {
            return parent.push(value);
        }
        let index = self.items.borrow().len();
        self.insert(index, value)?;
        Ok(index + 1)
    }

    fn insert(&self, index: usize, value: T) -> Result<()> {
        if let Some(parent) = self.parent() {
            return parent.insert(index, value);
        }
        {
            let mut items = self.items.borrow_mut();
            if index > items.len() {
                return Err(SyncError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value.clone());
        }
        self.emit(VectorChangeKind::Add, index, index, Vec::new(), vec![value]);
        Ok(())
    }

    fn remove(&self, index: usize) -> Result<T> {
        if let Some(parent) = self.parent() {
            return parent.remove(index);
        }
        let len = self.items.borrow().len();
        let mut removed = self.remove_range(index, index + 1)?;
        removed.pop().ok_or(SyncError::IndexOutOfBounds { index, len })
    }

    fn remove_range(&self, start: usize, end: usize) -> Result<Vec<T>> {
        if let Some(parent) = self.parent() {
            return parent.remove_range(start, end);
        }
        let removed: Vec<T> = {
            let mut items = self.items.borrow_mut();
            if start > end || end > items.len() {
                return Err(SyncError::IndexOutOfBounds {
                    index: end,
                    len: items.len(),
                });
            }
            items.drain(start..end).collect()
        };
        if !removed.is_empty() {
            self.emit(
                VectorChangeKind::Remove,
                start,
                start,
                removed.clone(),
                Vec::new(),
            );
        }
        Ok(removed)
    }

    fn move_item(&self, from: usize, to: usize) -> Result<()> {
        if let Some(parent) = self.parent() {
            return parent.move_item(from, to);
        }
        let value = {
            let mut items = self.items.borrow_mut();
            let len = items.len();
            if from >= len || to >= len {
                return Err(SyncError::IndexOutOfBounds {
                    index: from.max(to),
                    len,
                });
            }
            if from == to {
                return Ok(());
            }
            let value = items.remove(from);
            items.insert(to, value.clone());
            value
        };
        self.emit(
            VectorChangeKind::Move,
            from,
            to,
            vec![value.clone()],
            vec![value],
        );
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let len = self.len();
        self.remove_range(0, len).map(|_| ())
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.detach();
        self.changed.clear();
        let items = std::mem::take(&mut *self.items.borrow_mut());
        drop(items);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn backend(&self) -> Option<VectorHandleRef> {
        if self.disposed.get() {
            return None;
        }
        self.parent
            .borrow()
            .as_ref()
            .and_then(|(parent, _)| parent.backend())
    }

    fn as_linkable(&self) -> Option<&dyn Linkable<dyn ObservableVector<T>>> {
        Some(self)
    }
}

impl<T: Clone + 'static> Linkable<dyn ObservableVector<T>> for LocalVector<T> {
    fn link(&self, parent: Rc<dyn ObservableVector<T>>) {
        self.assert_live();
        self.detach();
        let weak = self.this.clone();
        let slot = parent.changed().connect(move |change: &VectorChange<T>| {
            if let Some(me) = weak.upgrade() {
                me.changed.emit(change);
            }
        });
        self.items.borrow_mut().clear();
        *self.parent.borrow_mut() = Some((parent, slot));
    }

    fn unlink(&self) {
        self.assert_live();
        let Some(parent) = self.detach() else {
            return;
        };
        if !parent.is_disposed() {
            *self.items.borrow_mut() = parent.values();
        }
    }

    fn is_linked(&self) -> bool {
        self.parent.borrow().is_some()
    }
}

impl<T: Clone + 'static> Drop for LocalVector<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Clone + 'static> fmt::Debug for LocalVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalVector")
            .field("items", &self.items.borrow().len())
            .field("linked", &self.parent.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_operations() {
        let v = LocalVector::from_values(vec![1, 2, 3]);
        v.push(4).unwrap();
        v.move_item(0, 3).unwrap();
        assert_eq!(v.values(), vec![2, 3, 4, 1]);
        assert_eq!(v.remove_range(1, 3).unwrap(), vec![3, 4]);
        assert_eq!(v.set(0, 9).unwrap(), 2);
        assert_eq!(v.values(), vec![9, 1]);
        assert!(v.insert(5, 0).is_err());
    }

    #[test]
    fn test_change_payloads() {
        let v = LocalVector::<u8>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        v.changed().connect(move |c: &VectorChange<u8>| {
            s.borrow_mut()
                .push((c.kind, c.old_values.clone(), c.new_values.clone()))
        });

        v.push(1).unwrap();
        v.push(2).unwrap();
        v.clear().unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                (VectorChangeKind::Add, vec![], vec![1]),
                (VectorChangeKind::Add, vec![], vec![2]),
                (VectorChangeKind::Remove, vec![1, 2], vec![]),
            ]
        );
    }

    #[test]
    fn test_link_and_unlink() {
        let parent = LocalVector::from_values(vec!["a"]);
        let child = LocalVector::from_values(vec!["stale"]);
        child.link(parent.clone());

        assert_eq!(child.values(), vec!["a"]);
        child.push("b").unwrap();
        assert_eq!(parent.values(), vec!["a", "b"]);

        child.unlink();
        parent.push("c").unwrap();
        assert_eq!(child.values(), vec!["a", "b"]);
    }
}
