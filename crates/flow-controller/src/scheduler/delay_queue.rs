// Archivo: delay_queue.rs
// Propósito: cola de retardo ordenada por instante de vencimiento, con una
// entrada como máximo por clave.
use std::collections::{BTreeMap, HashMap};
use tokio::time::Instant;

/// Cola `(payload, vencimiento)` ordenada por vencimiento ascendente.
///
/// Programar una clave que ya está pendiente sustituye la entrada anterior.
/// A igual vencimiento se respeta el orden de programación.
#[derive(Debug)]
pub struct DelayQueue<T> {
    entries: BTreeMap<(Instant, u64), (String, T)>,
    index: HashMap<String, (Instant, u64)>,
    seq: u64,
}

impl<T> DelayQueue<T> {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new(), index: HashMap::new(), seq: 0 }
    }

    /// Programa `payload` bajo `key` para `due`. Devuelve el payload
    /// sustituido si la clave ya estaba pendiente.
    pub fn schedule(&mut self, key: &str, payload: T, due: Instant) -> Option<T> {
        let replaced = self.remove(key);
        self.seq += 1;
        let slot = (due, self.seq);
        self.entries.insert(slot, (key.to_string(), payload));
        self.index.insert(key.to_string(), slot);
        replaced
    }

    /// Vencimiento de la entrada más temprana.
    pub fn peek_earliest(&self) -> Option<Instant> {
        self.entries.first_key_value().map(|((due, _), _)| *due)
    }

    /// Extrae la entrada más temprana, venza o no.
    pub fn pop_earliest(&mut self) -> Option<(T, Instant)> {
        let ((due, _), (key, payload)) = self.entries.pop_first()?;
        self.index.remove(&key);
        Some((payload, due))
    }

    /// Extrae la entrada más temprana sólo si ya venció (`due <= now`).
    pub fn pop_due(&mut self, now: Instant) -> Option<(T, Instant)> {
        match self.peek_earliest() {
            Some(due) if due <= now => self.pop_earliest(),
            _ => None,
        }
    }

    /// Retira la entrada pendiente de `key`.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let slot = self.index.remove(key)?;
        self.entries.remove(&slot).map(|(_, payload)| payload)
    }

    /// Vencimiento de la entrada pendiente de `key`.
    pub fn due_of(&self, key: &str) -> Option<Instant> {
        self.index.get(key).map(|(due, _)| *due)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).and_then(|slot| self.entries.get(slot)).map(|(_, payload)| payload)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
