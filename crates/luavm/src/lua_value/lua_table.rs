// Hybrid table: a gapless array part for keys 1..N plus an insertion-ordered map
// - Writing key N+1 appends and pulls N+2, N+3, ... out of the map
// - Writing nil never shrinks anything; it leaves a hole
use indexmap::IndexMap;

use super::{LuaValue, TableRef};

type HashPart = IndexMap<LuaValue, LuaValue, ahash::RandomState>;

pub struct LuaTable {
    /// Values for keys 1..=array.len(); may contain nil holes
    pub(crate) array: Vec<LuaValue>,

    /// Every other key, in first-insertion order. Entries holding nil are holes.
    pub(crate) hash: HashPart,

    metatable: Option<TableRef>,
}

impl LuaTable {
    pub fn new(array_size: usize, hash_size: usize) -> Self {
        LuaTable {
            array: Vec::with_capacity(array_size),
            hash: IndexMap::with_capacity_and_hasher(hash_size, ahash::RandomState::new()),
            metatable: None,
        }
    }

    pub fn get_metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt;
    }

    /// Length = size of the array part. Only meaningful for proper sequences.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.values().all(LuaValue::is_nil)
    }

    #[inline(always)]
    pub fn get_int(&self, key: i64) -> LuaValue {
        if key >= 1 && (key as u64) <= self.array.len() as u64 {
            return self.array[(key - 1) as usize].clone();
        }
        self.get_from_hash(&LuaValue::integer(key))
    }

    /// String-keyed read without going through a caller-built key
    #[inline]
    pub fn get_str(&self, key: &str) -> LuaValue {
        if self.hash.is_empty() {
            return LuaValue::Nil;
        }
        self.get_from_hash(&LuaValue::string(key))
    }

    #[inline(always)]
    fn get_from_hash(&self, key: &LuaValue) -> LuaValue {
        self.hash.get(key).cloned().unwrap_or_default()
    }

    /// Raw read; absence and a stored nil look the same
    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        if let Some(idx) = key.as_array_index()
            && idx <= self.array.len()
        {
            return self.array[idx - 1].clone();
        }
        self.get_from_hash(key)
    }

    /// Whether `key` currently holds a non-nil value
    pub fn contains_key(&self, key: &LuaValue) -> bool {
        !self.raw_get(key).is_nil()
    }

    /// Raw write
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) -> Result<(), &'static str> {
        match &key {
            LuaValue::Nil => return Err("table index is nil"),
            LuaValue::Number(n) if n.is_nan() => return Err("table index is NaN"),
            _ => {}
        }

        if let Some(idx) = key.as_array_index() {
            let len = self.array.len();
            if idx <= len {
                self.array[idx - 1] = value;
                return Ok(());
            }
            if idx == len + 1 {
                if value.is_nil() {
                    // key len+1 is never in the map, so this is an absent key
                    return Ok(());
                }
                self.array.push(value);
                self.migrate_from_hash();
                return Ok(());
            }
        }

        if value.is_nil() {
            if let Some(slot) = self.hash.get_mut(&key) {
                *slot = LuaValue::Nil;
            }
        } else {
            self.hash.insert(key, value);
        }
        Ok(())
    }

    #[inline]
    pub fn set_int(&mut self, key: i64, value: LuaValue) {
        // integer keys are never nil or NaN
        let _ = self.raw_set(LuaValue::integer(key), value);
    }

    #[inline]
    pub fn set_str(&mut self, key: &str, value: LuaValue) {
        let _ = self.raw_set(LuaValue::string(key), value);
    }

    /// Pull keys len+1, len+2, ... out of the map while they are present
    fn migrate_from_hash(&mut self) {
        if self.hash.is_empty() {
            return;
        }
        loop {
            let key = LuaValue::integer(self.array.len() as i64 + 1);
            match self.hash.get(&key) {
                Some(v) if !v.is_nil() => {}
                Some(_) => {
                    // a hole for the next index is dropped so the key lives in one place
                    self.hash.swap_remove(&key);
                    break;
                }
                None => break,
            }
            if let Some(value) = self.hash.swap_remove(&key) {
                self.array.push(value);
            }
        }
    }

    /// Insert at 1-based `pos`, shifting the array up
    pub fn insert(&mut self, pos: usize, value: LuaValue) -> Result<(), &'static str> {
        let len = self.array.len();
        if pos < 1 || pos > len + 1 {
            return Err("position out of bounds");
        }
        self.array.insert(pos - 1, value);
        self.migrate_from_hash();
        Ok(())
    }

    /// Remove at 1-based `pos`, shifting the array down; returns the removed value
    pub fn remove(&mut self, pos: usize) -> Result<LuaValue, &'static str> {
        let len = self.array.len();
        if len == 0 && pos <= 1 {
            return Ok(LuaValue::Nil);
        }
        if pos == len + 1 {
            return Ok(LuaValue::Nil);
        }
        if pos < 1 || pos > len {
            return Err("position out of bounds");
        }
        let value = self.array.remove(pos - 1);
        self.migrate_from_hash();
        Ok(value)
    }

    /// Iteration step: array part first, then the map in insertion order.
    /// Holes are skipped. Unknown keys are an error.
    pub fn next(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, &'static str> {
        let start = match key {
            LuaValue::Nil => 0,
            _ => match key.as_array_index() {
                Some(idx) if idx <= self.array.len() => idx,
                _ => {
                    let pos = self.hash.get_index_of(key).ok_or("invalid key to 'next'")?;
                    return Ok(self.next_in_hash(pos + 1));
                }
            },
        };

        for (i, value) in self.array.iter().enumerate().skip(start) {
            if !value.is_nil() {
                return Ok(Some((LuaValue::integer(i as i64 + 1), value.clone())));
            }
        }
        Ok(self.next_in_hash(0))
    }

    fn next_in_hash(&self, from: usize) -> Option<(LuaValue, LuaValue)> {
        let mut pos = from;
        while let Some((k, v)) = self.hash.get_index(pos) {
            if !v.is_nil() {
                return Some((k.clone(), v.clone()));
            }
            pos += 1;
        }
        None
    }
}

impl Default for LuaTable {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(i: i64) -> LuaValue {
        LuaValue::integer(i)
    }

    #[test]
    fn test_round_trip() {
        let mut t = LuaTable::default();
        t.raw_set(LuaValue::string("a"), num(1)).unwrap();
        t.raw_set(num(-3), LuaValue::string("neg")).unwrap();
        t.raw_set(LuaValue::Number(2.5), LuaValue::Boolean(true)).unwrap();
        assert_eq!(t.raw_get(&LuaValue::string("a")), num(1));
        assert_eq!(t.raw_get(&num(-3)), LuaValue::string("neg"));
        assert_eq!(t.raw_get(&LuaValue::Number(2.5)), LuaValue::Boolean(true));

        t.raw_set(LuaValue::string("a"), LuaValue::Nil).unwrap();
        assert!(t.raw_get(&LuaValue::string("a")).is_nil());
    }

    #[test]
    fn test_contiguous_length() {
        let mut t = LuaTable::default();
        for i in 1..=100 {
            t.set_int(i, num(i * 10));
        }
        assert_eq!(t.len(), 100);
        assert!(t.hash.is_empty());
        assert_eq!(t.get_int(37), num(370));
    }

    #[test]
    fn test_migration() {
        let mut t = LuaTable::default();
        t.set_int(3, num(3));
        t.set_int(2, num(2));
        assert_eq!(t.len(), 0);
        t.set_int(1, num(1));
        assert_eq!(t.len(), 3);
        assert!(t.hash.is_empty());
    }

    #[test]
    fn test_nil_writes() {
        let mut t = LuaTable::default();
        t.set_int(1, num(1));
        t.set_int(2, num(2));
        t.set_int(2, LuaValue::Nil);
        // holes do not shrink the array part
        assert_eq!(t.len(), 2);
        // nil to an absent key is a no-op
        t.raw_set(LuaValue::string("x"), LuaValue::Nil).unwrap();
        assert!(t.hash.is_empty());
        t.set_int(3, LuaValue::Nil);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_invalid_keys() {
        let mut t = LuaTable::default();
        assert_eq!(t.raw_set(LuaValue::Nil, num(1)), Err("table index is nil"));
        assert_eq!(
            t.raw_set(LuaValue::Number(f64::NAN), num(1)),
            Err("table index is NaN")
        );
        assert!(t.raw_get(&LuaValue::Number(f64::NAN)).is_nil());
    }

    #[test]
    fn test_insert_remove() {
        let mut t = LuaTable::default();
        for i in 1..=3 {
            t.set_int(i, num(i));
        }
        t.set_int(5, num(5));
        t.insert(1, num(0)).unwrap();
        // {0,1,2,3} then 5 migrates in
        assert_eq!(t.len(), 5);
        assert_eq!(t.get_int(5), num(5));
        assert_eq!(t.remove(1).unwrap(), num(0));
        assert_eq!(t.len(), 4);
        assert_eq!(t.get_int(1), num(1));
        assert_eq!(t.insert(9, num(9)), Err("position out of bounds"));
        assert_eq!(t.remove(9), Err("position out of bounds"));
        assert!(t.remove(5).unwrap().is_nil());
    }

    #[test]
    fn test_next_visits_every_key_once() {
        let mut t = LuaTable::default();
        t.set_int(1, num(1));
        t.set_int(2, num(2));
        t.raw_set(LuaValue::string("x"), num(3)).unwrap();
        t.raw_set(LuaValue::string("y"), num(4)).unwrap();
        t.set_int(10, num(5));
        t.raw_set(LuaValue::string("x"), LuaValue::Nil).unwrap();

        let mut seen = Vec::new();
        let mut key = LuaValue::Nil;
        while let Some((k, v)) = t.next(&key).unwrap() {
            seen.push(v.as_number().unwrap() as i64);
            key = k;
        }
        assert_eq!(seen, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_next_unknown_key() {
        let t = LuaTable::default();
        assert_eq!(t.next(&LuaValue::string("nope")), Err("invalid key to 'next'"));
    }

    #[test]
    fn test_next_from_hole_key() {
        let mut t = LuaTable::default();
        t.raw_set(LuaValue::string("a"), num(1)).unwrap();
        t.raw_set(LuaValue::string("b"), num(2)).unwrap();
        // clearing the current key during traversal keeps the traversal valid
        let (k, _) = t.next(&LuaValue::Nil).unwrap().unwrap();
        t.raw_set(k.clone(), LuaValue::Nil).unwrap();
        let (k2, v2) = t.next(&k).unwrap().unwrap();
        assert_eq!(k2, LuaValue::string("b"));
        assert_eq!(v2, num(2));
    }
}
