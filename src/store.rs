use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use thiserror::Error as ThisError;
use tokio::time::{Duration, Instant};

/// The Store maps keys to scalar or list values, each with an optional deadline.
///
/// Expiry is lazy: there is no background sweep, a lapsed entry is removed the next time an
/// operation observes it. The store has no interior synchronization and is meant to be owned by
/// the dispatcher, which is the only task allowed to touch it.
#[derive(Debug, Default)]
pub struct Store {
    entries: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Scalar(Bytes),
    List(VecDeque<Bytes>),
}

#[derive(Debug, Clone)]
pub struct Value {
    pub data: Data,
    pub created_at: Instant,
    pub expires_at: Option<Instant>,
}

impl Value {
    pub fn new(data: Data) -> Value {
        Value {
            data,
            created_at: Instant::now(),
            expires_at: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Value {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub enum StoreError {
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,
}

/// Result of a list operation. A list's deadline is checked once the operation has been applied:
/// if it lapsed, the entry is dropped and the computed result discarded.
#[derive(Debug, PartialEq)]
pub enum Outcome<T> {
    Done(T),
    Expired,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.entries.insert(key, value);
    }

    /// Whether `key` is present, without evaluating its deadline.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Replaces whatever is stored at `key` with a fresh scalar.
    pub fn set(&mut self, key: String, data: Bytes, ttl: Option<Duration>) {
        let value = Value::new(Data::Scalar(data));
        let value = match ttl {
            Some(ttl) => value.with_ttl(ttl),
            None => value,
        };

        self.insert(key, value);
    }

    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.live(key).map(|value| &value.data) {
            Some(Data::Scalar(data)) => Ok(Some(data.clone())),
            Some(Data::List(_)) => Err(StoreError::WrongType),
            None => Ok(None),
        }
    }

    /// Appends `values` in order, creating the list if needed. Returns the new length.
    pub fn push_back(
        &mut self,
        key: &str,
        values: Vec<Bytes>,
    ) -> Result<Outcome<usize>, StoreError> {
        let list = self.list_or_default(key)?;
        list.extend(values);
        let len = list.len();

        Ok(self.settle(key, len))
    }

    /// Prepends each of `values` in turn, so the last one ends up at the head.
    pub fn push_front(
        &mut self,
        key: &str,
        values: Vec<Bytes>,
    ) -> Result<Outcome<usize>, StoreError> {
        let list = self.list_or_default(key)?;
        for value in values {
            list.push_front(value);
        }
        let len = list.len();

        Ok(self.settle(key, len))
    }

    pub fn list_len(&mut self, key: &str) -> Result<Outcome<usize>, StoreError> {
        let len = self.list(key)?.map_or(0, |list| list.len());

        Ok(self.settle(key, len))
    }

    /// Removes up to `count` elements from the head. `None` means the key holds no list.
    ///
    /// A list drained to zero elements is deleted.
    pub fn pop_front(
        &mut self,
        key: &str,
        count: usize,
    ) -> Result<Outcome<Option<Vec<Bytes>>>, StoreError> {
        let popped = self.list(key)?.map(|list| {
            let count = count.min(list.len());
            list.drain(..count).collect::<Vec<_>>()
        });

        Ok(self.settle(key, popped))
    }

    /// Returns the elements between `start` and `stop`, both inclusive. Negative indices count
    /// from the end of the list.
    pub fn range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<Bytes>, StoreError> {
        let list = match self.live(key).map(|value| &value.data) {
            Some(Data::List(list)) => list,
            Some(Data::Scalar(_)) => return Err(StoreError::WrongType),
            None => return Ok(vec![]),
        };

        let items = normalize_range(list.len(), start, stop)
            .map(|range| list.range(range).cloned().collect())
            .unwrap_or_default();

        Ok(items)
    }

    /// Returns the entry at `key`, dropping it first if its deadline lapsed.
    fn live(&mut self, key: &str) -> Option<&mut Value> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|value| value.is_expired(now)) {
            self.entries.remove(key);
            return None;
        }

        self.entries.get_mut(key)
    }

    /// Returns the list at `key`, if any. A lapsed scalar is treated as absent; a list's own
    /// deadline is left to [`Store::settle`].
    fn list(&mut self, key: &str) -> Result<Option<&mut VecDeque<Bytes>>, StoreError> {
        let now = Instant::now();
        let lapsed_scalar = self.entries.get(key).is_some_and(|value| {
            matches!(value.data, Data::Scalar(_)) && value.is_expired(now)
        });
        if lapsed_scalar {
            self.entries.remove(key);
        }

        match self.entries.get_mut(key).map(|value| &mut value.data) {
            Some(Data::List(list)) => Ok(Some(list)),
            Some(Data::Scalar(_)) => Err(StoreError::WrongType),
            None => Ok(None),
        }
    }

    fn list_or_default(&mut self, key: &str) -> Result<&mut VecDeque<Bytes>, StoreError> {
        if self.list(key)?.is_none() {
            self.insert(key.to_string(), Value::new(Data::List(VecDeque::new())));
        }

        match self.entries.get_mut(key).map(|value| &mut value.data) {
            Some(Data::List(list)) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    /// Applies the post-operation rules of list commands: a lapsed entry is dropped and the result
    /// discarded, an empty list is dropped.
    fn settle<T>(&mut self, key: &str, result: T) -> Outcome<T> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(value) if value.is_expired(now) => {
                self.entries.remove(key);
                Outcome::Expired
            }
            Some(Value {
                data: Data::List(list),
                ..
            }) if list.is_empty() => {
                self.entries.remove(key);
                Outcome::Done(result)
            }
            _ => Outcome::Done(result),
        }
    }
}

/// Resolves `start..=stop` against a list of `len` elements. Negative indices count from the end
/// and are clamped to 0, `stop` is clamped to the last element.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<RangeInclusive<usize>> {
    let len = len as i64;
    let normalize = |index: i64| if index < 0 { (len + index).max(0) } else { index };

    let start = normalize(start);
    let stop = normalize(stop).min(len - 1);

    if start >= len || start > stop {
        return None;
    }

    Some(start as usize..=stop as usize)
}
