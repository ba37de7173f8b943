//! Hash commands.
//!
//! Fields keep their insertion order; `HDEL` preserves the order of the rest.

use crate::error::{Error, Result};
use crate::storage::{Keyspace, Outcome};
use indexmap::IndexMap;

/// The field/value pairs handed to `HSET`.
///
/// Pairs can come from a single field, a mapping and a list of items. When
/// the same field shows up more than once, items are applied first, then
/// the single field, then the mapping, so the mapping wins.
///
/// ```
/// use lumenkv::storage::HashFields;
///
/// let fields = HashFields::new()
///     .field("name", "ariz")
///     .mapping([("lang", "rust"), ("name", "override")]);
/// assert_eq!(fields.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashFields {
    items: Vec<(String, String)>,
    single: Option<(String, String)>,
    mapping: Vec<(String, String)>,
}

impl HashFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.single = Some((field.into(), value.into()));
        self
    }

    pub fn mapping<K, V>(mut self, mapping: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.mapping
            .extend(mapping.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn items<K, V>(mut self, items: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.items
            .extend(items.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Total number of pairs supplied, duplicates included.
    pub fn len(&self) -> usize {
        self.items.len() + usize::from(self.single.is_some()) + self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All pairs in application order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items
            .iter()
            .chain(self.single.iter())
            .chain(self.mapping.iter())
            .map(|(field, value)| (field.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HashFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        HashFields::new().mapping(iter)
    }
}

impl Keyspace {
    /// HSET key field value [field value ...]
    ///
    /// # Returns
    ///
    /// The number of fields that did not exist before.
    pub fn hset(&mut self, key: &str, fields: &HashFields) -> Result<Outcome<usize>> {
        if fields.is_empty() {
            return Err(Error::invalid("no field/value pairs given to 'hset'"));
        }
        let hash = self.hash_entry(key)?;
        let mut added = 0;
        for (field, value) in fields.pairs() {
            if hash.insert(field.to_string(), value.to_string()).is_none() {
                added += 1;
            }
        }
        Ok(Outcome::changed(added))
    }

    /// HSETNX key field value
    pub fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<Outcome<bool>> {
        if self.hash(key)?.is_some_and(|hash| hash.contains_key(field)) {
            return Ok(Outcome::unchanged(false));
        }
        self.hash_entry(key)?
            .insert(field.to_string(), value.to_string());
        Ok(Outcome::changed(true))
    }

    /// HGET key field
    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self.hash(key)?.and_then(|hash| hash.get(field).cloned()))
    }

    /// HEXISTS key field
    pub fn hexists(&mut self, key: &str, field: &str) -> Result<bool> {
        Ok(self.hash(key)?.is_some_and(|hash| hash.contains_key(field)))
    }

    /// HLEN key
    pub fn hlen(&mut self, key: &str) -> Result<usize> {
        Ok(self.hash(key)?.map_or(0, IndexMap::len))
    }

    /// HKEYS key
    pub fn hkeys(&mut self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .hash(key)?
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// HVALS key
    pub fn hvals(&mut self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .hash(key)?
            .map(|hash| hash.values().cloned().collect())
            .unwrap_or_default())
    }

    /// HGETALL key
    pub fn hgetall(&mut self, key: &str) -> Result<IndexMap<String, String>> {
        Ok(self.hash(key)?.cloned().unwrap_or_default())
    }

    /// HSTRLEN key field - character length of the value, 0 if absent.
    pub fn hstrlen(&mut self, key: &str, field: &str) -> Result<usize> {
        Ok(self
            .hash(key)?
            .and_then(|hash| hash.get(field))
            .map_or(0, |value| value.chars().count()))
    }

    /// HMGET key field [field ...]
    pub fn hmget(&mut self, key: &str, fields: &[impl AsRef<str>]) -> Result<Vec<Option<String>>> {
        let hash = self.hash(key)?;
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|hash| hash.get(field.as_ref()).cloned()))
            .collect())
    }

    /// HDEL key field [field ...]
    pub fn hdel(&mut self, key: &str, fields: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        let Some(hash) = self.hash_mut(key)? else {
            return Ok(Outcome::unchanged(0));
        };
        let removed = fields
            .iter()
            .filter(|field| hash.shift_remove(field.as_ref()).is_some())
            .count();
        self.remove_if_empty(key);
        Ok(Outcome::new(removed, removed > 0))
    }

    /// HINCRBY key field delta
    pub fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> Result<Outcome<i64>> {
        let current = match self.hash(key)?.and_then(|hash| hash.get(field)) {
            Some(raw) => raw.parse::<i64>().map_err(|_| Error::NotInteger)?,
            None => 0,
        };
        let updated = current.checked_add(delta).ok_or(Error::Overflow)?;
        self.hash_entry(key)?
            .insert(field.to_string(), updated.to_string());
        Ok(Outcome::changed(updated))
    }

    /// HINCRBYFLOAT key field delta
    pub fn hincrbyfloat(&mut self, key: &str, field: &str, delta: f64) -> Result<Outcome<f64>> {
        if !delta.is_finite() {
            return Err(Error::NotFloat);
        }
        let current = match self.hash(key)?.and_then(|hash| hash.get(field)) {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| Error::NotFloat)?,
            None => 0.0,
        };
        let updated = current + delta;
        if !updated.is_finite() {
            return Err(Error::NotFloat);
        }
        self.hash_entry(key)?
            .insert(field.to_string(), updated.to_string());
        Ok(Outcome::changed(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SetOptions;

    fn user() -> Keyspace {
        let mut ks = Keyspace::new();
        ks.hset(
            "user",
            &HashFields::new().mapping([("name", "ariz"), ("lang", "rust")]),
        )
        .unwrap();
        ks
    }

    #[test]
    fn test_hset_counts_new_fields() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.hset("h", &HashFields::new().field("a", "1")).unwrap().value, 1);
        assert_eq!(
            ks.hset("h", &HashFields::new().field("a", "2").mapping([("b", "3")]))
                .unwrap()
                .value,
            1
        );
        assert_eq!(ks.hget("h", "a").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_hset_requires_fields() {
        let mut ks = Keyspace::new();
        assert!(matches!(
            ks.hset("h", &HashFields::new()),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(ks.key_type("h"), None);
    }

    #[test]
    fn test_hset_precedence() {
        let mut ks = Keyspace::new();
        let fields = HashFields::new()
            .items([("k", "from-items")])
            .field("k", "from-field")
            .mapping([("k", "from-mapping")]);
        assert_eq!(ks.hset("h", &fields).unwrap().value, 1);
        assert_eq!(ks.hget("h", "k").unwrap(), Some("from-mapping".to_string()));
    }

    #[test]
    fn test_hsetnx() {
        let mut ks = user();
        assert_eq!(ks.hsetnx("user", "name", "x").unwrap(), Outcome::unchanged(false));
        assert!(ks.hsetnx("user", "age", "30").unwrap().value);
        assert_eq!(ks.hget("user", "age").unwrap(), Some("30".to_string()));
    }

    #[test]
    fn test_read_commands_keep_order() {
        let mut ks = user();
        assert_eq!(ks.hlen("user").unwrap(), 2);
        assert_eq!(ks.hkeys("user").unwrap(), vec!["name", "lang"]);
        assert_eq!(ks.hvals("user").unwrap(), vec!["ariz", "rust"]);
        assert!(ks.hexists("user", "lang").unwrap());
        assert_eq!(ks.hstrlen("user", "name").unwrap(), 4);
        assert_eq!(ks.hstrlen("user", "nope").unwrap(), 0);

        let all = ks.hgetall("user").unwrap();
        assert_eq!(
            all.into_iter().collect::<Vec<_>>(),
            vec![
                ("name".to_string(), "ariz".to_string()),
                ("lang".to_string(), "rust".to_string())
            ]
        );
    }

    #[test]
    fn test_hmget() {
        let mut ks = user();
        assert_eq!(
            ks.hmget("user", &["lang", "nope"]).unwrap(),
            vec![Some("rust".to_string()), None]
        );
        assert_eq!(ks.hmget("missing", &["a", "b"]).unwrap(), vec![None, None]);
    }

    #[test]
    fn test_hdel_removes_empty_hash() {
        let mut ks = user();
        assert_eq!(ks.hdel("user", &["name", "nope"]).unwrap().value, 1);
        assert_eq!(ks.hdel("user", &["lang"]).unwrap().value, 1);
        assert_eq!(ks.key_type("user"), None);
        assert_eq!(ks.hdel("user", &["lang"]).unwrap(), Outcome::unchanged(0));
    }

    #[test]
    fn test_hincrby() {
        let mut ks = user();
        assert_eq!(ks.hincrby("user", "visits", 5).unwrap().value, 5);
        assert_eq!(ks.hincrby("user", "visits", -2).unwrap().value, 3);
        assert!(matches!(ks.hincrby("user", "name", 1), Err(Error::NotInteger)));
        assert_eq!(ks.hincrbyfloat("user", "score", 0.5).unwrap().value, 0.5);
        assert!(matches!(ks.hincrbyfloat("user", "name", 1.0), Err(Error::NotFloat)));
    }

    #[test]
    fn test_hash_ops_on_string_fail() {
        let mut ks = Keyspace::new();
        ks.set("s", "x", &SetOptions::default()).unwrap();
        assert!(matches!(
            ks.hset("s", &HashFields::new().field("a", "b")),
            Err(Error::WrongType { .. })
        ));
        assert!(ks.hget("s", "a").is_err());
    }
}
