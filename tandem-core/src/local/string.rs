use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::backend::{char_to_byte, TextHandleRef};
use crate::error::{Result, SyncError};
use crate::observable::{Linkable, ObservableString, StringChange, StringChangeKind};
use crate::signal::{Signal, SlotId};

use super::DISPOSED;

type Parent = Rc<dyn ObservableString>;

/// Plain observable string. Indices count characters.
pub struct LocalString {
    this: Weak<Self>,
    text: RefCell<String>,
    parent: RefCell<Option<(Parent, SlotId)>>,
    changed: Signal<StringChange>,
    disposed: Cell<bool>,
}

impl LocalString {
    pub fn new() -> Rc<Self> {
        Self::from_text("")
    }

    pub fn from_text(text: &str) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            text: RefCell::new(text.to_string()),
            parent: RefCell::new(None),
            changed: Signal::new(),
            disposed: Cell::new(false),
        })
    }

    fn assert_live(&self) {
        assert!(!self.disposed.get(), "{}", DISPOSED);
    }

    fn parent(&self) -> Option<Parent> {
        self.assert_live();
        self.parent.borrow().as_ref().map(|(p, _)| p.clone())
    }

    fn detach(&self) -> Option<Parent> {
        let (parent, slot) = self.parent.borrow_mut().take()?;
        if !parent.is_disposed() {
            parent.changed().disconnect(slot);
        }
        Some(parent)
    }

    fn offset(&self, index: usize) -> Result<usize> {
        let text = self.text.borrow();
        char_to_byte(&text, index).ok_or(SyncError::IndexOutOfBounds {
            index,
            len: text.chars().count(),
        })
    }
}

impl ObservableString for LocalString {
    fn changed(&self) -> &Signal<StringChange> {
        self.assert_live();
        &self.changed
    }

    fn text(&self) -> String {
        match self.parent() {
            Some(parent) => parent.text(),
            None => self.text.borrow().clone(),
        }
    }

    fn len(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.len(),
            None => self.text.borrow().chars().count(),
        }
    }

    fn set_text(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.parent() {
            return parent.set_text(text);
        }
        *self.text.borrow_mut() = text.to_string();
        self.changed.emit(&StringChange {
            kind: StringChangeKind::Set,
            start: 0,
            end: text.chars().count(),
            value: text.to_string(),
        });
        Ok(())
    }

    fn insert(&self, index: usize, text: &str) -> Result<()> {
        if let Some(parent) = self.parent() {
            return parent.insert(index, text);
        }
        let offset = self.offset(index)?;
        if text.is_empty() {
            return Ok(());
        }
        self.text.borrow_mut().insert_str(offset, text);
        self.changed.emit(&StringChange {
            kind: StringChangeKind::Insert,
            start: index,
            end: index + text.chars().count(),
            value: text.to_string(),
        });
        Ok(())
    }

    fn remove(&self, start: usize, end: usize) -> Result<String> {
        if let Some(parent) = self.parent() {
            return parent.remove(start, end);
        }
        if start > end {
            return Err(SyncError::IndexOutOfBounds {
                index: start,
                len: self.len(),
            });
        }
        let (from, to) = (self.offset(start)?, self.offset(end)?);
        if from == to {
            return Ok(String::new());
        }
        let removed: String = self.text.borrow_mut().drain(from..to).collect();
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
        self.detach();
        self.changed.clear();
        self.text.borrow_mut().clear();
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn backend(&self) -> Option<TextHandleRef> {
        if self.disposed.get() {
            return None;
        }
        self.parent
            .borrow()
            .as_ref()
            .and_then(|(parent, _)| parent.backend())
    }

    fn as_linkable(&self) -> Option<&dyn Linkable<dyn ObservableString>> {
        Some(self)
    }
}

impl Linkable<dyn ObservableString> for LocalString {
    fn link(&self, parent: Rc<dyn ObservableString>) {
        self.assert_live();
        self.detach();
        let weak = self.this.clone();
        let slot = parent.changed().connect(move |change: &StringChange| {
            if let Some(me) = weak.upgrade() {
                me.changed.emit(change);
            }
        });
        self.text.borrow_mut().clear();
        *self.parent.borrow_mut() = Some((parent, slot));
    }

    fn unlink(&self) {
        self.assert_live();
        let Some(parent) = self.detach() else {
            return;
        };
        if !parent.is_disposed() {
            *self.text.borrow_mut() = parent.text();
        }
    }

    fn is_linked(&self) -> bool {
        self.parent.borrow().is_some()
    }
}

impl Drop for LocalString {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for LocalString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalString")
            .field("text", &*self.text.borrow())
            .field("linked", &self.parent.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_indices() {
        let s = LocalString::from_text("naïve");
        s.insert(5, "!").unwrap();
        assert_eq!(s.remove(2, 3).unwrap(), "ï");
        assert_eq!(s.text(), "nave!");
        assert!(s.insert(9, "x").is_err());
    }

    #[test]
    fn test_link_proxies_parent() {
        let parent = LocalString::from_text("shared");
        let child = LocalString::from_text("mine");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        child
            .changed()
            .connect(move |c: &StringChange| s.borrow_mut().push(c.value.clone()));

        child.link(parent.clone());
        assert_eq!(child.text(), "shared");
        parent.insert(0, "un").unwrap();
        assert_eq!(child.text(), "unshared");
        assert_eq!(*seen.borrow(), vec!["un".to_string()]);

        child.unlink();
        parent.clear().unwrap();
        assert_eq!(child.text(), "unshared");
    }
}
