use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::backend::{BackendValue, VectorEvent, VectorHandleRef};
use crate::error::{Result, SyncError};
use crate::factory;
use crate::observable::{ObservableVector, VectorChange, VectorChangeKind};
use crate::signal::Signal;
use crate::value::Element;

use super::DISPOSED;

/// Local mirror of a backend vector.
///
/// # Panics
///
/// Every operation except `dispose`/`is_disposed` panics once the vector
/// has been disposed.
pub struct SyncVector<T: Element> {
    handle: RefCell<Option<VectorHandleRef>>,
    mirror: RefCell<Vec<T>>,
    changed: Signal<VectorChange<T>>,
    disposed: Cell<bool>,
}

fn wrap_all<T: Element>(raw: &[BackendValue]) -> Result<Vec<T>> {
    raw.iter()
        .map(|v| T::from_entry(factory::wrap_value(v.clone())?))
        .collect()
}

impl<T: Element> SyncVector<T> {
    pub fn new(handle: VectorHandleRef) -> Result<Rc<Self>> {
        let mirror = wrap_all(&handle.values()?)?;
        log::debug!("SyncVector populated with {} items", mirror.len());

        let vector = Rc::new(Self {
            handle: RefCell::new(Some(handle.clone())),
            mirror: RefCell::new(mirror),
            changed: Signal::new(),
            disposed: Cell::new(false),
        });

        let weak = Rc::downgrade(&vector);
        handle.add_listener(Rc::new(move |event: &VectorEvent| {
            if let Some(vector) = weak.upgrade() {
                vector.on_backend_change(event);
            }
        }));
        Ok(vector)
    }

    fn live_handle(&self) -> VectorHandleRef {
        match self.handle.borrow().as_ref() {
            Some(handle) if !self.disposed.get() => handle.clone(),
            _ => panic!("{}", DISPOSED),
        }
    }

    fn assert_live(&self) {
        assert!(!self.disposed.get(), "{}", DISPOSED);
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        if index >= len {
            return Err(SyncError::IndexOutOfBounds { index, len });
        }
        Ok(())
    }

    fn change(
        kind: VectorChangeKind,
        old_index: usize,
        new_index: usize,
        old_values: Vec<T>,
        new_values: Vec<T>,
    ) -> VectorChange<T> {
        VectorChange {
            kind,
            old_index,
            new_index,
            old_values,
            new_values,
        }
    }

    /// Write `value` as a new item at `index` and return what the mirror
    /// keeps for it.
    fn write_at(&self, handle: &VectorHandleRef, index: usize, value: T) -> Result<T> {
        let entry = value.to_entry()?;
        let mut stored = handle.insert(index, vec![factory::to_prelim(&entry)])?;
        match stored.pop() {
            Some(stored) => factory::adopt_stored(value, &entry, stored, T::from_entry),
            None => Err(SyncError::Backend(format!(
                "vector insert at {} returned nothing",
                index
            ))),
        }
    }

    // ── Remote path ────────────────────────────────────────────────

    fn on_backend_change(&self, event: &VectorEvent) {
        if self.disposed.get() {
            return;
        }
        if event.is_local() {
            log::trace!("echo of local vector write ignored");
            return;
        }
        match self.apply_remote(event) {
            Ok(change) => self.changed.emit(&change),
            Err(e) => log::error!("dropping remote vector change: {}", e),
        }
    }

    fn apply_remote(&self, event: &VectorEvent) -> Result<VectorChange<T>> {
        let len = self.mirror.borrow().len();
        match event {
            VectorEvent::Inserted { index, values, .. } => {
                if *index > len {
                    return self.resync();
                }
                let new_values = wrap_all::<T>(values)?;
                {
                    let mut mirror = self.mirror.borrow_mut();
                    let tail = mirror.split_off(*index);
                    mirror.extend(new_values.iter().cloned());
                    mirror.extend(tail);
                }
                Ok(Self::change(
                    VectorChangeKind::Add,
                    *index,
                    *index,
                    Vec::new(),
                    new_values,
                ))
            }
            VectorEvent::Removed { index, values, .. } => {
                let end = index + values.len();
                if end > len {
                    return self.resync();
                }
                let old_values: Vec<T> = self.mirror.borrow_mut().drain(*index..end).collect();
                Ok(Self::change(
                    VectorChangeKind::Remove,
                    *index,
                    *index,
                    old_values,
                    Vec::new(),
                ))
            }
            VectorEvent::Set {
                index, new_value, ..
            } => {
                if *index >= len {
                    return self.resync();
                }
                let new_value = T::from_entry(factory::wrap_value(new_value.clone())?)?;
                let old_value =
                    std::mem::replace(&mut self.mirror.borrow_mut()[*index], new_value.clone());
                Ok(Self::change(
                    VectorChangeKind::Set,
                    *index,
                    *index,
                    vec![old_value],
                    vec![new_value],
                ))
            }
        }
    }

    /// Rebuild the whole mirror from the backend.
    fn resync(&self) -> Result<VectorChange<T>> {
        let handle = self.live_handle();
        let fresh = wrap_all::<T>(&handle.values()?)?;
        let stale = std::mem::replace(&mut *self.mirror.borrow_mut(), fresh.clone());
        log::warn!(
            "vector mirror out of step with backend ({} vs {} items); rebuilt",
            stale.len(),
            fresh.len()
        );
        Ok(Self::change(VectorChangeKind::Set, 0, 0, stale, fresh))
    }
}

impl<T: Element> ObservableVector<T> for SyncVector<T> {
    fn changed(&self) -> &Signal<VectorChange<T>> {
        self.assert_live();
        &self.changed
    }

    fn len(&self) -> usize {
        self.assert_live();
        self.mirror.borrow().len()
    }

    fn get(&self, index: usize) -> Option<T> {
        self.assert_live();
        self.mirror.borrow().get(index).cloned()
    }

    fn values(&self) -> Vec<T> {
        self.assert_live();
        self.mirror.borrow().clone()
    }

    fn set(&self, index: usize, value: T) -> Result<T> {
        let handle = self.live_handle();
        self.check_index(index, self.mirror.borrow().len())?;
        let entry = value.to_entry()?;
        let kept = match factory::store_in_vector(handle.as_ref(), index, &entry)? {
            Some(stored) => factory::adopt_stored(value, &entry, stored, T::from_entry)?,
            None => value,
        };
        let old = std::mem::replace(&mut self.mirror.borrow_mut()[index], kept.clone());
        log::debug!("vector set [{}]", index);
        self.changed.emit(&Self::change(
            VectorChangeKind::Set,
            index,
            index,
            vec![old.clone()],
            vec![kept],
        ));
        Ok(old)
    }

    fn push(&self, value: T) -> Result<usize> {
        let len = self.len();
        self.insert(len, value)?;
        Ok(len + 1)
    }

    fn insert(&self, index: usize, value: T) -> Result<()> {
        let handle = self.live_handle();
        let len = self.mirror.borrow().len();
        if index > len {
            return Err(SyncError::IndexOutOfBounds { index, len });
        }
        let kept = self.write_at(&handle, index, value)?;
        self.mirror.borrow_mut().insert(index, kept.clone());
        log::debug!("vector insert [{}]", index);
        self.changed.emit(&Self::change(
            VectorChangeKind::Add,
            index,
            index,
            Vec::new(),
            vec![kept],
        ));
        Ok(())
    }

    fn remove(&self, index: usize) -> Result<T> {
        self.check_index(index, self.len())?;
        let mut removed = self.remove_range(index, index + 1)?;
        removed
            .pop()
            .ok_or(SyncError::IndexOutOfBounds { index, len: 0 })
    }

    fn remove_range(&self, start: usize, end: usize) -> Result<Vec<T>> {
        let handle = self.live_handle();
        let len = self.mirror.borrow().len();
        if start > end || end > len {
            return Err(SyncError::IndexOutOfBounds { index: end, len });
        }
        if start == end {
            return Ok(Vec::new());
        }
        handle.remove(start, end - start)?;
        let old_values: Vec<T> = self.mirror.borrow_mut().drain(start..end).collect();
        log::debug!("vector remove [{}..{}]", start, end);
        self.changed.emit(&Self::change(
            VectorChangeKind::Remove,
            start,
            start,
            old_values.clone(),
            Vec::new(),
        ));
        Ok(old_values)
    }

    /// The backend has no move primitive: the item is removed and written
    /// again at `to`.
    fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let handle = self.live_handle();
        let len = self.mirror.borrow().len();
        self.check_index(from, len)?;
        self.check_index(to, len)?;
        if from == to {
            return Ok(());
        }
        let value = self.mirror.borrow()[from].clone();
        let entry = value.to_entry()?;
        let prelim = factory::to_prelim(&entry);
        handle.remove(from, 1)?;
        let stored = handle.insert(to, vec![prelim])?;
        let kept = match stored.into_iter().next() {
            Some(stored) => factory::adopt_stored(value.clone(), &entry, stored, T::from_entry)?,
            None => value.clone(),
        };
        {
            let mut mirror = self.mirror.borrow_mut();
            mirror.remove(from);
            mirror.insert(to, kept.clone());
        }
        log::debug!("vector move [{}] -> [{}]", from, to);
        self.changed.emit(&Self::change(
            VectorChangeKind::Move,
            from,
            to,
            vec![value],
            vec![kept],
        ));
        Ok(())
    }

    /// One `Remove` change carrying every value.
    fn clear(&self) -> Result<()> {
        let len = self.len();
        self.remove_range(0, len).map(|_| ())
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let handle = self.handle.borrow_mut().take();
        if let Some(handle) = handle {
            handle.remove_all_listeners();
        }
        self.changed.clear();
        let mirror = std::mem::take(&mut *self.mirror.borrow_mut());
        log::debug!("SyncVector disposed ({} items released)", mirror.len());
        drop(mirror);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn backend(&self) -> Option<VectorHandleRef> {
        self.handle.borrow().clone()
    }
}

impl<T: Element> Drop for SyncVector<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: Element> fmt::Debug for SyncVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncVector")
            .field("len", &self.mirror.borrow().len())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
