use std::any::Any;
use std::rc::Rc;

use tandem_core::backend::{
    char_to_byte, BackendValue, MapEvent, MapHandle, MapListener, Prelim, TextEvent, TextHandle,
    TextListener, VectorEvent, VectorHandle, VectorListener,
};
use tandem_core::{Result, SyncError};
use yrs::{Array, ArrayRef, GetString, Map, MapRef, Text, TextRef, Transact};

use super::convert::{fill_array, insert_into_array, insert_into_map, Slot};
use super::{Registered, Shared};

/// A yrs map exposed as a backend map handle.
pub struct YrsMap {
    pub(crate) shared: Rc<Shared>,
    pub(crate) map: MapRef,
    pub(crate) owner: u64,
}

impl YrsMap {
    fn slot(&self, key: &str) -> Option<Slot> {
        let txn = self.shared.doc.transact();
        self.map.get(&txn, key).map(Slot::from)
    }
}

impl MapHandle for YrsMap {
    fn get(&self, key: &str) -> Result<Option<BackendValue>> {
        self.slot(key).map(|s| self.shared.value(&s)).transpose()
    }

    fn set(&self, key: &str, value: Prelim) -> Result<BackendValue> {
        let (old, new, update) = {
            let mut txn = self.shared.doc.transact_mut();
            let old = self.map.get(&txn, key).map(Slot::from);
            insert_into_map(&self.map, &mut txn, key, value)?;
            let new = self
                .map
                .get(&txn, key)
                .map_or(Slot::Unsupported, Slot::from);
            (old, new, txn.encode_update_v1())
        };
        self.shared.record_update(update);

        let stored = self.shared.value(&new)?;
        self.shared.notify_map(
            &self.map,
            &MapEvent {
                property: key.to_string(),
                old_value: old.map(|s| self.shared.lossy_value(&s)),
                new_value: Some(stored.clone()),
                is_local: true,
            },
        );
        Ok(stored)
    }

    fn delete(&self, key: &str) -> Result<Option<BackendValue>> {
        let (old, update) = {
            let mut txn = self.shared.doc.transact_mut();
            let old = self.map.remove(&mut txn, key).map(Slot::from);
            (old, txn.encode_update_v1())
        };
        let Some(old) = old else {
            return Ok(None);
        };
        self.shared.record_update(update);

        let old = self.shared.lossy_value(&old);
        self.shared.notify_map(
            &self.map,
            &MapEvent {
                property: key.to_string(),
                old_value: Some(old.clone()),
                new_value: None,
                is_local: true,
            },
        );
        Ok(Some(old))
    }

    fn has(&self, key: &str) -> bool {
        let txn = self.shared.doc.transact();
        self.map.contains_key(&txn, key)
    }

    fn keys(&self) -> Vec<String> {
        let txn = self.shared.doc.transact();
        let mut keys: Vec<String> = self.map.keys(&txn).map(str::to_string).collect();
        keys.sort();
        keys
    }

    fn size(&self) -> usize {
        let txn = self.shared.doc.transact();
        self.map.len(&txn) as usize
    }

    fn add_listener(&self, listener: MapListener) {
        self.shared.maps.borrow_mut().push(Registered {
            owner: self.owner,
            target: self.map.clone(),
            callback: listener,
        });
    }

    fn remove_all_listeners(&self) {
        self.shared
            .maps
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }

    fn same_handle(&self, other: &dyn MapHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<YrsMap>()
            .is_some_and(|o| o.map == self.map)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A yrs array exposed as a backend vector handle.
pub struct YrsArray {
    pub(crate) shared: Rc<Shared>,
    pub(crate) array: ArrayRef,
    pub(crate) owner: u64,
}

impl YrsArray {
    fn slots(&self, txn: &impl yrs::ReadTxn, start: usize, end: usize) -> Vec<Slot> {
        (start..end)
            .map(|i| {
                self.array
                    .get(txn, i as u32)
                    .map_or(Slot::Unsupported, Slot::from)
            })
            .collect()
    }

    fn notify(&self, event: VectorEvent) {
        self.shared.notify_vector(&self.array, &event);
    }
}

impl VectorHandle for YrsArray {
    fn len(&self) -> usize {
        let txn = self.shared.doc.transact();
        self.array.len(&txn) as usize
    }

    fn get(&self, index: usize) -> Result<Option<BackendValue>> {
        let slot = {
            let txn = self.shared.doc.transact();
            self.array.get(&txn, index as u32).map(Slot::from)
        };
        slot.map(|s| self.shared.value(&s)).transpose()
    }

    fn values(&self) -> Result<Vec<BackendValue>> {
        let slots: Vec<Slot> = {
            let txn = self.shared.doc.transact();
            self.array.iter(&txn).map(Slot::from).collect()
        };
        slots.iter().map(|s| self.shared.value(s)).collect()
    }

    fn insert(&self, index: usize, values: Vec<Prelim>) -> Result<Vec<BackendValue>> {
        let count = values.len();
        let (stored, update) = {
            let mut txn = self.shared.doc.transact_mut();
            let len = self.array.len(&txn) as usize;
            if index > len {
                return Err(SyncError::IndexOutOfBounds { index, len });
            }
            fill_array(&self.array, &mut txn, index as u32, values)?;
            let stored = self.slots(&txn, index, index + count);
            (stored, txn.encode_update_v1())
        };
        if stored.is_empty() {
            return Ok(Vec::new());
        }
        self.shared.record_update(update);

        let values = stored
            .iter()
            .map(|s| self.shared.value(s))
            .collect::<Result<Vec<_>>>()?;
        self.notify(VectorEvent::Inserted {
            index,
            values: values.clone(),
            is_local: true,
        });
        Ok(values)
    }

    fn remove(&self, index: usize, count: usize) -> Result<Vec<BackendValue>> {
        let (removed, update) = {
            let mut txn = self.shared.doc.transact_mut();
            let len = self.array.len(&txn) as usize;
            if index + count > len {
                return Err(SyncError::IndexOutOfBounds {
                    index: index + count,
                    len,
                });
            }
            let removed = self.slots(&txn, index, index + count);
            if count > 0 {
                self.array.remove_range(&mut txn, index as u32, count as u32);
            }
            (removed, txn.encode_update_v1())
        };
        if removed.is_empty() {
            return Ok(Vec::new());
        }
        self.shared.record_update(update);

        let values: Vec<BackendValue> = removed.iter().map(|s| self.shared.lossy_value(s)).collect();
        self.notify(VectorEvent::Removed {
            index,
            values: values.clone(),
            is_local: true,
        });
        Ok(values)
    }

    fn set(&self, index: usize, value: Prelim) -> Result<BackendValue> {
        let (old, new, update) = {
            let mut txn = self.shared.doc.transact_mut();
            let len = self.array.len(&txn) as usize;
            if index >= len {
                return Err(SyncError::IndexOutOfBounds { index, len });
            }
            let old = self.slots(&txn, index, index + 1).remove(0);
            self.array.remove_range(&mut txn, index as u32, 1);
            insert_into_array(&self.array, &mut txn, index as u32, value)?;
            let new = self.slots(&txn, index, index + 1).remove(0);
            (old, new, txn.encode_update_v1())
        };
        self.shared.record_update(update);

        let stored = self.shared.value(&new)?;
        self.notify(VectorEvent::Set {
            index,
            old_value: self.shared.lossy_value(&old),
            new_value: stored.clone(),
            is_local: true,
        });
        Ok(stored)
    }

    fn add_listener(&self, listener: VectorListener) {
        self.shared.vectors.borrow_mut().push(Registered {
            owner: self.owner,
            target: self.array.clone(),
            callback: listener,
        });
    }

    fn remove_all_listeners(&self) {
        self.shared
            .vectors
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }

    fn same_handle(&self, other: &dyn VectorHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<YrsArray>()
            .is_some_and(|o| o.array == self.array)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A yrs text exposed as a backend text handle. The document counts text
/// offsets in bytes; this handle translates from characters.
pub struct YrsText {
    pub(crate) shared: Rc<Shared>,
    pub(crate) text: TextRef,
    pub(crate) owner: u64,
}

impl TextHandle for YrsText {
    fn text(&self) -> String {
        let txn = self.shared.doc.transact();
        self.text.get_string(&txn)
    }

    fn len(&self) -> usize {
        self.text().chars().count()
    }

    fn insert(&self, index: usize, text: &str) -> Result<()> {
        let update = {
            let mut txn = self.shared.doc.transact_mut();
            let current = self.text.get_string(&txn);
            let Some(offset) = char_to_byte(&current, index) else {
                return Err(SyncError::IndexOutOfBounds {
                    index,
                    len: current.chars().count(),
                });
            };
            if text.is_empty() {
                return Ok(());
            }
            self.text.insert(&mut txn, offset as u32, text);
            txn.encode_update_v1()
        };
        self.shared.record_update(update);
        self.shared.notify_text(
            &self.text,
            &TextEvent::Inserted {
                index,
                text: text.to_string(),
                is_local: true,
            },
        );
        Ok(())
    }

    fn delete(&self, index: usize, count: usize) -> Result<String> {
        let (removed, update) = {
            let mut txn = self.shared.doc.transact_mut();
            let current = self.text.get_string(&txn);
            let range = char_to_byte(&current, index).zip(char_to_byte(&current, index + count));
            let Some((from, to)) = range else {
                return Err(SyncError::IndexOutOfBounds {
                    index: index + count,
                    len: current.chars().count(),
                });
            };
            if from == to {
                return Ok(String::new());
            }
            self.text
                .remove_range(&mut txn, from as u32, (to - from) as u32);
            (current[from..to].to_string(), txn.encode_update_v1())
        };
        self.shared.record_update(update);
        self.shared.notify_text(
            &self.text,
            &TextEvent::Deleted {
                index,
                text: removed.clone(),
                is_local: true,
            },
        );
        Ok(removed)
    }

    fn add_listener(&self, listener: TextListener) {
        self.shared.texts.borrow_mut().push(Registered {
            owner: self.owner,
            target: self.text.clone(),
            callback: listener,
        });
    }

    fn remove_all_listeners(&self) {
        self.shared
            .texts
            .borrow_mut()
            .retain(|l| l.owner != self.owner);
    }

    fn same_handle(&self, other: &dyn TextHandle) -> bool {
        other
            .as_any()
            .downcast_ref::<YrsText>()
            .is_some_and(|o| o.text == self.text)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
