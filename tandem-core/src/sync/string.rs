use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::backend::{char_to_byte, TextEvent, TextHandleRef};
use crate::error::{Result, SyncError};
use crate::observable::{ObservableString, StringChange, StringChangeKind};
use crate::signal::Signal;

use super::DISPOSED;

/// Local mirror of a backend text buffer. Indices count characters.
///
/// # Panics
///
/// Every operation except `dispose`/`is_disposed` panics once the string
/// has been disposed.
pub struct SyncString {
    handle: RefCell<Option<TextHandleRef>>,
    mirror: RefCell<String>,
    changed: Signal<StringChange>,
    disposed: Cell<bool>,
}

impl SyncString {
    pub fn new(handle: TextHandleRef) -> Result<Rc<Self>> {
        let string = Rc::new(Self {
            handle: RefCell::new(Some(handle.clone())),
            mirror: RefCell::new(handle.text()),
            changed: Signal::new(),
            disposed: Cell::new(false),
        });

        let weak = Rc::downgrade(&string);
        handle.add_listener(Rc::new(move |event: &TextEvent| {
            if let Some(string) = weak.upgrade() {
                string.on_backend_change(event);
            }
        }));
        Ok(string)
    }

    fn live_handle(&self) -> TextHandleRef {
        match self.handle.borrow().as_ref() {
            Some(handle) if !self.disposed.get() => handle.clone(),
            _ => panic!("{}", DISPOSED),
        }
    }

    fn assert_live(&self) {
        assert!(!self.disposed.get(), "{}", DISPOSED);
    }

    fn byte_range(&self, start: usize, end: usize) -> Result<(usize, usize)> {
        let mirror = self.mirror.borrow();
        let len = mirror.chars().count();
        match (char_to_byte(&mirror, start), char_to_byte(&mirror, end)) {
            (Some(from), Some(to)) if start <= end => Ok((from, to)),
            _ => Err(SyncError::IndexOutOfBounds {
                index: end.max(start),
                len,
            }),
        }
    }

    // ── Remote path ────────────────────────────────────────────────

    fn on_backend_change(&self, event: &TextEvent) {
        if self.disposed.get() {
            return;
        }
        if event.is_local() {
            log::trace!("echo of local text edit ignored");
            return;
        }
        let change = match event {
            TextEvent::Inserted { index, text, .. } => self.apply_insert(*index, text),
            TextEvent::Deleted { index, text, .. } => {
                self.apply_delete(*index, *index + text.chars().count())
            }
        };
        self.changed.emit(&change);
    }

    fn apply_insert(&self, index: usize, text: &str) -> StringChange {
        let offset = char_to_byte(&self.mirror.borrow(), index);
        let Some(offset) = offset else {
            return self.resync();
        };
        self.mirror.borrow_mut().insert_str(offset, text);
        StringChange {
            kind: StringChangeKind::Insert,
            start: index,
            end: index + text.chars().count(),
            value: text.to_string(),
        }
    }

    fn apply_delete(&self, start: usize, end: usize) -> StringChange {
        let Ok((from, to)) = self.byte_range(start, end) else {
            return self.resync();
        };
        let removed: String = self.mirror.borrow_mut().drain(from..to).collect();
        StringChange {
            kind: StringChangeKind::Remove,
            start,
            end,
            value: removed,
        }
    }

    fn resync(&self) -> StringChange {
        let text = self.live_handle().text();
        log::warn!("text mirror out of step with backend; rebuilt");
        *self.mirror.borrow_mut() = text.clone();
        StringChange {
            kind: StringChangeKind::Set,
            start: 0,
            end: text.chars().count(),
            value: text,
        }
    }
}

impl ObservableString for SyncString {
    fn changed(&self) -> &Signal<StringChange> {
        self.assert_live();
        &self.changed
    }

    fn text(&self) -> String {
        self.assert_live();
        self.mirror.borrow().clone()
    }

    fn len(&self) -> usize {
        self.assert_live();
        self.mirror.borrow().chars().count()
    }

    fn set_text(&self, text: &str) -> Result<()> {
        let handle = self.live_handle();
        let len = handle.len();
        if len > 0 {
            handle.delete(0, len)?;
        }
        if !text.is_empty() {
            handle.insert(0, text)?;
        }
        *self.mirror.borrow_mut() = text.to_string();
        log::debug!("text set ({} chars)", text.chars().count());
        self.changed.emit(&StringChange {
            kind: StringChangeKind::Set,
            start: 0,
            end: text.chars().count(),
            value: text.to_string(),
        });
        Ok(())
    }

    fn insert(&self, index: usize, text: &str) -> Result<()> {
        let handle = self.live_handle();
        let (offset, _) = self.byte_range(index, index)?;
        if text.is_empty() {
            return Ok(());
        }
        handle.insert(index, text)?;
        self.mirror.borrow_mut().insert_str(offset, text);
        self.changed.emit(&StringChange {
            kind: StringChangeKind::Insert,
            start: index,
            end: index + text.chars().count(),
            value: text.to_string(),
        });
        Ok(())
    }

    fn remove(&self, start: usize, end: usize) -> Result<String> {
        let handle = self.live_handle();
        let (from, to) = self.byte_range(start, end)?;
        if start == end {
            return Ok(String::new());
        }
        handle.delete(start, end - start)?;
        let removed: String = self.mirror.borrow_mut().drain(from..to).collect();
        self.changed.emit(&StringChange {
            kind: StringChangeKind::Remove,
            start,
            end,
            value: removed.clone(),
        });
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        let len = self.len();
        self.remove(0, len).map(|_| ())
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
        self.mirror.borrow_mut().clear();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn backend(&self) -> Option<TextHandleRef> {
        self.handle.borrow().clone()
    }
}

impl Drop for SyncString {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SyncString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncString")
            .field("text", &*self.mirror.borrow())
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
