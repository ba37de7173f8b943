//! Sorted Set Container
//!
//! Members are unique strings, each carrying an `f64` score. Iteration order
//! is `(score ascending, member ascending)`; the reverse order is its exact
//! mirror.
//!
//! ```text
//!   scores: HashMap<member, score>        O(1) score lookups
//!   ordered: BTreeSet<(score, member)>    ordered walks, ranks, ranges
//! ```
//!
//! Both halves are updated together by every mutating method.
//!
//! Set algebra (`union`, `intersection`, `difference`) always keeps the
//! left operand's score for members present on both sides.

use crate::storage::inclusive_range;
use ordered_float::OrderedFloat;
use rand::seq::IteratorRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A set of unique members ordered by score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(String, f64)>", into = "Vec<(String, f64)>")]
pub struct SortedSet {
    scores: HashMap<String, f64>,
    ordered: BTreeSet<(OrderedFloat<f64>, String)>,
}

impl SortedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn contains(&self, member: &str) -> bool {
        self.scores.contains_key(member)
    }

    pub fn score(&self, member: &str) -> Option<f64> {
        self.scores.get(member).copied()
    }

    /// Inserts or re-scores a member.
    ///
    /// # Returns
    ///
    /// `true` if the member was not present before.
    pub fn insert(&mut self, member: impl Into<String>, score: f64) -> bool {
        let member = member.into();
        let is_new = match self.scores.insert(member.clone(), score) {
            Some(old) => {
                self.ordered.remove(&(OrderedFloat(old), member.clone()));
                false
            }
            None => true,
        };
        self.ordered.insert((OrderedFloat(score), member));
        is_new
    }

    pub fn remove(&mut self, member: &str) -> Option<f64> {
        let score = self.scores.remove(member)?;
        self.ordered.remove(&(OrderedFloat(score), member.to_string()));
        Some(score)
    }

    /// Adds `amount` to the member's score (starting from 0) and returns the new score.
    pub fn incr(&mut self, member: &str, amount: f64) -> f64 {
        let score = self.score(member).unwrap_or(0.0) + amount;
        self.insert(member, score);
        score
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, f64)> + ExactSizeIterator {
        self.ordered
            .iter()
            .map(|(score, member)| (member.as_str(), score.into_inner()))
    }

    /// Ascending walk over members whose score lies in `[min, max]`.
    pub fn range_by_score(&self, min: f64, max: f64) -> impl DoubleEndedIterator<Item = (&str, f64)> {
        let lower = (OrderedFloat(min), String::new());
        let upper = OrderedFloat(max);
        self.ordered
            .range(lower..)
            .take_while(move |(score, _)| *score <= upper)
            .map(|(score, member)| (member.as_str(), score.into_inner()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    /// Number of members with `min <= score <= max`; `0` when `min > max`.
    pub fn count(&self, min: f64, max: f64) -> usize {
        if min > max {
            return 0;
        }
        self.range_by_score(min, max).count()
    }

    /// Zero-based rank of `member`, ascending or descending.
    pub fn rank(&self, member: &str, desc: bool) -> Option<usize> {
        let score = self.score(member)?;
        let key = (OrderedFloat(score), member.to_string());
        let below = self.ordered.range(..&key).count();
        Some(if desc { self.len() - 1 - below } else { below })
    }

    /// Selects an inclusive index window, optionally restricted to a score window first.
    ///
    /// # Arguments
    ///
    /// * `start`, `end` - inclusive indices; negative values count from the end
    /// * `scores` - optional `(min, max)` filter applied before slicing
    /// * `desc` - walk from the highest score down
    pub fn range(
        &self,
        start: i64,
        end: i64,
        scores: Option<(f64, f64)>,
        desc: bool,
    ) -> Vec<(String, f64)> {
        let mut selected: Vec<(&str, f64)> = match scores {
            Some((min, max)) => self.range_by_score(min, max).collect(),
            None => self.iter().collect(),
        };
        if desc {
            selected.reverse();
        }

        match inclusive_range(selected.len(), start, end) {
            Some(window) => selected[window]
                .iter()
                .map(|(member, score)| (member.to_string(), *score))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Removes up to `count` of the lowest-scored members.
    pub fn pop_min(&mut self, count: usize) -> Vec<(String, f64)> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        while popped.len() < count {
            match self.ordered.pop_first() {
                Some((score, member)) => {
                    self.scores.remove(&member);
                    popped.push((member, score.into_inner()));
                }
                None => break,
            }
        }
        popped
    }

    /// Removes up to `count` of the highest-scored members.
    pub fn pop_max(&mut self, count: usize) -> Vec<(String, f64)> {
        let mut popped = Vec::with_capacity(count.min(self.len()));
        while popped.len() < count {
            match self.ordered.pop_last() {
                Some((score, member)) => {
                    self.scores.remove(&member);
                    popped.push((member, score.into_inner()));
                }
                None => break,
            }
        }
        popped
    }

    /// Every member of either set; scores from `self` win.
    pub fn union(&self, other: &SortedSet) -> SortedSet {
        let mut result = self.clone();
        for (member, score) in other.iter() {
            if !result.contains(member) {
                result.insert(member, score);
            }
        }
        result
    }

    /// Members present in both sets, with `self`'s scores.
    pub fn intersection(&self, other: &SortedSet) -> SortedSet {
        self.iter()
            .filter(|(member, _)| other.contains(member))
            .collect()
    }

    /// Members of `self` absent from `other`.
    pub fn difference(&self, other: &SortedSet) -> SortedSet {
        self.iter()
            .filter(|(member, _)| !other.contains(member))
            .collect()
    }

    /// Random members.
    ///
    /// A positive `count` returns up to `count` distinct members; a negative
    /// one returns exactly `|count|` picks that may repeat.
    pub fn random_members(&self, count: i64) -> Vec<(String, f64)> {
        let mut rng = rand::thread_rng();
        let pairs = self.iter().map(|(member, score)| (member.to_string(), score));

        if count >= 0 {
            pairs.choose_multiple(&mut rng, count as usize)
        } else {
            let all: Vec<(String, f64)> = pairs.collect();
            if all.is_empty() {
                return Vec::new();
            }
            (0..count.unsigned_abs())
                .filter_map(|_| all.iter().choose(&mut rng).cloned())
                .collect()
        }
    }
}

impl<'a> FromIterator<(&'a str, f64)> for SortedSet {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut set = SortedSet::new();
        for (member, score) in iter {
            set.insert(member, score);
        }
        set
    }
}

impl From<Vec<(String, f64)>> for SortedSet {
    fn from(pairs: Vec<(String, f64)>) -> Self {
        let mut set = SortedSet::new();
        for (member, score) in pairs {
            set.insert(member, score);
        }
        set
    }
}

impl From<SortedSet> for Vec<(String, f64)> {
    fn from(set: SortedSet) -> Self {
        set.ordered
            .into_iter()
            .map(|(score, member)| (member, score.into_inner()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zset(pairs: &[(&str, f64)]) -> SortedSet {
        pairs.iter().copied().collect()
    }

    fn members(pairs: &[(String, f64)]) -> Vec<&str> {
        pairs.iter().map(|(m, _)| m.as_str()).collect()
    }

    #[test]
    fn test_insert_and_rescore() {
        let mut set = SortedSet::new();
        assert!(set.insert("a", 1.0));
        assert!(!set.insert("a", 5.0));
        assert_eq!(set.len(), 1);
        assert_eq!(set.score("a"), Some(5.0));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![("a", 5.0)]);
    }

    #[test]
    fn test_order_ties_by_member() {
        let set = zset(&[("b", 1.0), ("a", 1.0), ("c", 0.5)]);
        let order: Vec<&str> = set.iter().map(|(m, _)| m).collect();
        assert_eq!(order, vec!["c", "a", "b"]);

        let reversed: Vec<&str> = set.iter().rev().map(|(m, _)| m).collect();
        assert_eq!(reversed, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rank() {
        let set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(set.rank("a", false), Some(0));
        assert_eq!(set.rank("c", false), Some(2));
        assert_eq!(set.rank("c", true), Some(0));
        assert_eq!(set.rank("zz", false), None);
    }

    #[test]
    fn test_count_and_score_window() {
        let set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        assert_eq!(set.count(2.0, 3.0), 2);
        assert_eq!(set.count(f64::NEG_INFINITY, f64::INFINITY), 4);
        assert_eq!(set.count(3.0, 2.0), 0);
    }

    #[test]
    fn test_range_filters_before_slicing() {
        let set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)]);
        assert_eq!(members(&set.range(0, -1, None, false)), vec!["a", "b", "c", "d"]);
        assert_eq!(members(&set.range(0, 1, None, true)), vec!["d", "c"]);
        assert_eq!(
            members(&set.range(1, -1, Some((2.0, 4.0)), false)),
            vec!["c", "d"]
        );
        assert!(set.range(10, 20, None, false).is_empty());
    }

    #[test]
    fn test_pop_min_max() {
        let mut set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);
        assert_eq!(set.pop_min(1), vec![("a".to_string(), 1.0)]);
        assert_eq!(set.pop_max(5), vec![("c".to_string(), 3.0), ("b".to_string(), 2.0)]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_algebra_left_operand_wins() {
        let left = zset(&[("a", 1.0), ("b", 2.0)]);
        let right = zset(&[("b", 20.0), ("c", 30.0)]);

        let union = left.union(&right);
        assert_eq!(union.score("b"), Some(2.0));
        assert_eq!(union.score("c"), Some(30.0));
        assert_eq!(union.len(), 3);

        let inter = left.intersection(&right);
        assert_eq!(inter.iter().collect::<Vec<_>>(), vec![("b", 2.0)]);

        let diff = left.difference(&right);
        assert_eq!(diff.iter().collect::<Vec<_>>(), vec![("a", 1.0)]);
    }

    #[test]
    fn test_random_members() {
        let set = zset(&[("a", 1.0), ("b", 2.0), ("c", 3.0)]);

        let distinct = set.random_members(10);
        assert_eq!(distinct.len(), 3);

        let repeated = set.random_members(-7);
        assert_eq!(repeated.len(), 7);
        assert!(repeated.iter().all(|(m, _)| set.contains(m)));

        assert!(set.random_members(0).is_empty());
        assert!(SortedSet::new().random_members(-3).is_empty());
    }

    #[test]
    fn test_vec_conversion_keeps_order() {
        let set = zset(&[("b", 2.0), ("a", 1.0)]);
        let pairs: Vec<(String, f64)> = set.clone().into();
        assert_eq!(pairs, vec![("a".to_string(), 1.0), ("b".to_string(), 2.0)]);
        assert_eq!(SortedSet::from(pairs), set);
    }
}
