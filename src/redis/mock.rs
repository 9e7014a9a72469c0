//! In-memory [`RedisGateway`] test double.
//!
//! Lets storage and scheduler behavior be exercised deterministically,
//! without a live Redis server, including concurrent lock contention via
//! a single mutex-guarded state map.

use super::{PipelineOp, RedisGateway};
use crate::error::SchedulerResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct State {
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, Vec<String>>,
    locks: HashSet<String>,
}

/// In-memory stand-in for Redis, gated behind `#[cfg(test)]` at the crate
/// boundary via its re-export but usable directly in integration tests too.
#[derive(Default)]
pub struct InMemoryRedisGateway {
    state: Mutex<State>,
}

impl InMemoryRedisGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a list's contents, most-recently-pushed first (matching
    /// `LPUSH`/`LRANGE 0 -1` semantics). Test-only introspection helper.
    pub fn list_contents(&self, key: &str) -> Vec<String> {
        self.state.lock().lists.get(key).cloned().unwrap_or_default()
    }

    pub fn set_contents(&self, key: &str) -> HashSet<String> {
        self.state.lock().sets.get(key).cloned().unwrap_or_default()
    }

    pub fn lock_count(&self) -> usize {
        self.state.lock().locks.len()
    }
}

#[async_trait]
impl RedisGateway for InMemoryRedisGateway {
    async fn hset(&self, key: &str, field: &str, value: &str) -> SchedulerResult<()> {
        let mut state = self.state.lock();
        state
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> SchedulerResult<bool> {
        let mut state = self.state.lock();
        let hash = state.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            Ok(false)
        } else {
            hash.insert(field.to_string(), value.to_string());
            Ok(true)
        }
    }

    async fn hget(&self, key: &str, field: &str) -> SchedulerResult<Option<String>> {
        let state = self.state.lock();
        Ok(state.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hkeys(&self, key: &str) -> SchedulerResult<Vec<String>> {
        let state = self.state.lock();
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn hgetall(&self, key: &str) -> SchedulerResult<Vec<(String, String)>> {
        let state = self.state.lock();
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn cas(&self, lock_key: &str, _lock_value: &str, ops: Vec<PipelineOp>) -> SchedulerResult<bool> {
        let mut state = self.state.lock();
        if state.locks.contains(lock_key) {
            return Ok(false);
        }
        state.locks.insert(lock_key.to_string());

        for op in ops {
            match op {
                PipelineOp::Sadd { key, member } => {
                    state.sets.entry(key).or_default().insert(member);
                }
                PipelineOp::Lpush { key, value } => {
                    state.lists.entry(key).or_default().insert(0, value);
                }
            }
        }

        Ok(true)
    }
}
