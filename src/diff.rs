//! Identity-keyed list diffing.
//!
//! [`diff`] produces a batch-update script: `Remove` and the source side of
//! `Move` use indices into the old list, `Insert` and the target side of
//! `Move` use indices into the new list, and `Change` names both. Items kept
//! in place are implicit. Keys must be unique within each list.

use std::collections::HashMap;
use std::hash::Hash;

use anyhow::Result;
use crossbeam_channel::select;

use crate::grouping::{flatten, DateBucket, FeedRow};
use crate::live::{LiveValue, Subscription};
use crate::model::LaunchRecord;
use crate::worker::Worker;

/// Stable identity, independent of content.
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;
}

impl Keyed for LaunchRecord {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedRowKey {
    Header(String),
    Launch(String),
}

impl Keyed for FeedRow {
    type Key = FeedRowKey;

    fn key(&self) -> FeedRowKey {
        match self {
            FeedRow::Header(label) => FeedRowKey::Header(label.clone()),
            FeedRow::Launch(launch) => FeedRowKey::Launch(launch.id.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Remove { old_index: usize },
    Insert { new_index: usize },
    Move { old_index: usize, new_index: usize },
    Change { old_index: usize, new_index: usize },
}

/// Computes the script turning `old` into `new`.
///
/// Ops come out grouped as removes, moves, inserts, then changes, each in
/// ascending index order.
pub fn diff<T>(old: &[T], new: &[T]) -> Vec<DiffOp>
where
    T: Keyed + PartialEq,
{
    let old_keys: Vec<T::Key> = old.iter().map(Keyed::key).collect();
    let new_keys: Vec<T::Key> = new.iter().map(Keyed::key).collect();
    let pairs = longest_common_subsequence(&old_keys, &new_keys);

    let mut old_kept = vec![false; old.len()];
    let mut new_kept = vec![false; new.len()];
    for &(i, j) in &pairs {
        old_kept[i] = true;
        new_kept[j] = true;
    }

    let new_positions: HashMap<&T::Key, usize> =
        new_keys.iter().enumerate().map(|(j, key)| (key, j)).collect();
    let old_positions: HashMap<&T::Key, usize> =
        old_keys.iter().enumerate().map(|(i, key)| (key, i)).collect();

    let mut removes = Vec::new();
    let mut moves = Vec::new();
    let mut changes = Vec::new();
    for (i, key) in old_keys.iter().enumerate() {
        if old_kept[i] {
            continue;
        }
        match new_positions.get(key) {
            Some(&j) => {
                moves.push(DiffOp::Move {
                    old_index: i,
                    new_index: j,
                });
                if old[i] != new[j] {
                    changes.push((j, i));
                }
            }
            None => removes.push(DiffOp::Remove { old_index: i }),
        }
    }
    moves.sort_by_key(|op| match op {
        DiffOp::Move { new_index, .. } => *new_index,
        _ => 0,
    });

    let inserts = new_keys
        .iter()
        .enumerate()
        .filter(|(j, key)| !new_kept[*j] && !old_positions.contains_key(key))
        .map(|(j, _)| DiffOp::Insert { new_index: j });

    for &(i, j) in &pairs {
        if old[i] != new[j] {
            changes.push((j, i));
        }
    }
    changes.sort_unstable();

    let mut ops = removes;
    ops.extend(moves);
    ops.extend(inserts);
    ops.extend(changes.into_iter().map(|(j, i)| DiffOp::Change {
        old_index: i,
        new_index: j,
    }));
    ops
}

/// Index pairs `(old, new)` of one longest common subsequence of keys.
fn longest_common_subsequence<K: Eq>(old: &[K], new: &[K]) -> Vec<(usize, usize)> {
    let (n, m) = (old.len(), new.len());
    if n == 0 || m == 0 {
        return Vec::new();
    }
    // lengths[i][j] = LCS length of old[i..] and new[j..]
    let width = m + 1;
    let mut lengths = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lengths[i * width + j] = if old[i] == new[j] {
                lengths[(i + 1) * width + j + 1] + 1
            } else {
                lengths[(i + 1) * width + j].max(lengths[i * width + j + 1])
            };
        }
    }

    let mut pairs = Vec::with_capacity(lengths[0] as usize);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if lengths[(i + 1) * width + j] >= lengths[i * width + j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Replays `ops` against `old`, taking inserted and changed content from `new`.
pub fn apply<T: Clone>(old: &[T], new: &[T], ops: &[DiffOp]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = vec![None; new.len()];
    let mut consumed = vec![false; old.len()];
    for op in ops {
        match *op {
            DiffOp::Remove { old_index } => consumed[old_index] = true,
            DiffOp::Insert { new_index } => slots[new_index] = Some(new[new_index].clone()),
            DiffOp::Move {
                old_index,
                new_index,
            } => {
                consumed[old_index] = true;
                slots[new_index] = Some(old[old_index].clone());
            }
            DiffOp::Change { .. } => {}
        }
    }

    let mut kept = old
        .iter()
        .zip(consumed)
        .filter(|(_, consumed)| !consumed)
        .map(|(item, _)| item.clone());
    for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
        *slot = kept.next();
    }

    for op in ops {
        if let DiffOp::Change { new_index, .. } = *op {
            slots[new_index] = Some(new[new_index].clone());
        }
    }
    slots.into_iter().flatten().collect()
}

/// A grouped snapshot flattened into rows, with the script from the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUpdate {
    pub rows: Vec<FeedRow>,
    pub ops: Vec<DiffOp>,
}

/// Turns successive grouped views into incremental row updates.
pub struct DiffStage {
    output: LiveValue<FeedUpdate>,
    _worker: Worker,
}

impl DiffStage {
    pub fn spawn(grouped: Subscription<Vec<DateBucket>>) -> Result<Self> {
        let output = LiveValue::empty();
        let publisher = output.clone();
        let worker = Worker::spawn("launch-diff", move |shutdown| {
            let mut previous: Option<Vec<FeedRow>> = None;
            'events: loop {
                let buckets = select! {
                    recv(shutdown) -> _ => break 'events,
                    recv(grouped.receiver()) -> msg => match msg {
                        Ok(value) => value,
                        Err(_) => break 'events,
                    },
                };
                let buckets = grouped.try_latest().unwrap_or(buckets);
                let rows = flatten(&buckets);
                let ops = match &previous {
                    Some(old) => diff(old, &rows),
                    None => diff(&[], &rows),
                };
                if previous.is_some() && ops.is_empty() {
                    continue 'events;
                }
                tracing::debug!(rows = rows.len(), ops = ops.len(), "feed rows diffed");
                previous = Some(rows.clone());
                publisher.publish(FeedUpdate { rows, ops });
            }
        })?;
        Ok(Self {
            output,
            _worker: worker,
        })
    }

    pub fn subscribe(&self) -> Subscription<FeedUpdate> {
        self.output.subscribe()
    }
}
