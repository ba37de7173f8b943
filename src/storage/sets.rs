//! Set commands.

use crate::error::{Error, Result};
use crate::storage::{Keyspace, Outcome};
use rand::seq::IteratorRandom;
use std::collections::HashSet;

impl Keyspace {
    /// SADD key member [member ...]
    ///
    /// # Returns
    ///
    /// The number of members that were not already present.
    pub fn sadd(&mut self, key: &str, members: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        if members.is_empty() {
            return Err(Error::invalid("wrong number of arguments for 'sadd'"));
        }
        let set = self.set_entry(key)?;
        let added = members
            .iter()
            .filter(|member| set.insert(member.as_ref().to_string()))
            .count();
        Ok(Outcome::new(added, added > 0))
    }

    /// SREM key member [member ...]
    pub fn srem(&mut self, key: &str, members: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        let Some(set) = self.set_mut(key)? else {
            return Ok(Outcome::unchanged(0));
        };
        let removed = members
            .iter()
            .filter(|member| set.remove(member.as_ref()))
            .count();
        self.remove_if_empty(key);
        Ok(Outcome::new(removed, removed > 0))
    }

    /// SCARD key
    pub fn scard(&mut self, key: &str) -> Result<usize> {
        Ok(self.set_ref(key)?.map_or(0, HashSet::len))
    }

    /// SISMEMBER key member
    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(self.set_ref(key)?.is_some_and(|set| set.contains(member)))
    }

    /// SMISMEMBER key member [member ...]
    pub fn smismember(&mut self, key: &str, members: &[impl AsRef<str>]) -> Result<Vec<bool>> {
        let set = self.set_ref(key)?;
        Ok(members
            .iter()
            .map(|member| set.is_some_and(|set| set.contains(member.as_ref())))
            .collect())
    }

    /// SMEMBERS key
    pub fn smembers(&mut self, key: &str) -> Result<HashSet<String>> {
        Ok(self.set_ref(key)?.cloned().unwrap_or_default())
    }

    /// SINTER key [key ...]
    pub fn sinter(&mut self, keys: &[impl AsRef<str>]) -> Result<HashSet<String>> {
        self.fold_sets(keys, |acc, next| acc.retain(|member| next.contains(member)))
    }

    /// SUNION key [key ...]
    pub fn sunion(&mut self, keys: &[impl AsRef<str>]) -> Result<HashSet<String>> {
        self.fold_sets(keys, |acc, next| acc.extend(next.iter().cloned()))
    }

    /// SDIFF key [key ...] - members of the first set found in none of the others.
    pub fn sdiff(&mut self, keys: &[impl AsRef<str>]) -> Result<HashSet<String>> {
        self.fold_sets(keys, |acc, next| acc.retain(|member| !next.contains(member)))
    }

    /// SMOVE src dst member
    pub fn smove(&mut self, src: &str, dst: &str, member: &str) -> Result<Outcome<bool>> {
        // Both keys are type-checked before anything moves
        self.set_ref(dst)?;
        let present = self.set_ref(src)?.is_some_and(|set| set.contains(member));
        if !present {
            return Ok(Outcome::unchanged(false));
        }
        if src == dst {
            return Ok(Outcome::unchanged(true));
        }

        if let Some(set) = self.set_mut(src)? {
            set.remove(member);
        }
        self.remove_if_empty(src);
        self.set_entry(dst)?.insert(member.to_string());
        Ok(Outcome::changed(true))
    }

    /// SPOP key - removes one random member.
    pub fn spop(&mut self, key: &str) -> Result<Outcome<Option<String>>> {
        let popped = self.spop_count(key, 1)?;
        Ok(Outcome::new(popped.value.into_iter().next(), popped.mutated))
    }

    /// SPOP key count - removes up to `count` random members.
    pub fn spop_count(&mut self, key: &str, count: usize) -> Result<Outcome<Vec<String>>> {
        let Some(set) = self.set_mut(key)? else {
            return Ok(Outcome::unchanged(Vec::new()));
        };
        let chosen: Vec<String> = set
            .iter()
            .cloned()
            .choose_multiple(&mut rand::thread_rng(), count);
        for member in &chosen {
            set.remove(member);
        }
        self.remove_if_empty(key);
        let mutated = !chosen.is_empty();
        Ok(Outcome::new(chosen, mutated))
    }

    /// SRANDMEMBER key
    pub fn srandmember(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.srandmember_count(key, 1)?.into_iter().next())
    }

    /// SRANDMEMBER key count
    ///
    /// A positive `count` returns up to `count` distinct members; a negative
    /// one returns exactly `|count|` picks that may repeat.
    pub fn srandmember_count(&mut self, key: &str, count: i64) -> Result<Vec<String>> {
        let Some(set) = self.set_ref(key)? else {
            return Ok(Vec::new());
        };
        let mut rng = rand::thread_rng();
        if count >= 0 {
            return Ok(set.iter().cloned().choose_multiple(&mut rng, count as usize));
        }
        Ok((0..count.unsigned_abs())
            .filter_map(|_| set.iter().choose(&mut rng).cloned())
            .collect())
    }

    /// Left fold over the named sets; missing keys count as empty sets.
    fn fold_sets(
        &mut self,
        keys: &[impl AsRef<str>],
        mut combine: impl FnMut(&mut HashSet<String>, &HashSet<String>),
    ) -> Result<HashSet<String>> {
        let Some((first, rest)) = keys.split_first() else {
            return Err(Error::invalid("at least one key is required"));
        };

        let empty = HashSet::new();
        let mut acc = self.set_ref(first.as_ref())?.cloned().unwrap_or_default();
        for key in rest {
            let next = self.set_ref(key.as_ref())?.unwrap_or(&empty);
            combine(&mut acc, next);
        }
        Ok(acc)
    }
}
