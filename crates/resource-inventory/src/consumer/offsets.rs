/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Pending offset buffer shared by the processing loop, shutdown and
//! rebalance callbacks.
//!
//! Offsets are appended as messages finish processing and committed in
//! batches. A commit takes the whole buffer under the lock and commits it
//! with the lock released, so two concurrent commits can never send the same
//! offsets twice: the second one finds the buffer empty. A failed commit puts
//! its offsets back in front of anything stored in the meantime.
//!
//! Shutdown sets a flag before committing; a revocation that observes the
//! flag leaves the commit to the shutdown path.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::ConsumerError;
use crate::metrics;

/// The next offset to consume on one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartitionOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl std::fmt::Display for TopicPartitionOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.partition, self.offset)
    }
}

/// Commits offsets to the broker. Blocking.
pub trait OffsetCommitter: Send + Sync {
    fn commit_offsets(&self, offsets: &[TopicPartitionOffset]) -> Result<(), ConsumerError>;
}

/// Lock id and token passed with authorization writes so a consumer that
/// lost its partition cannot overwrite its successor's work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencingCheck {
    pub lock_id: String,
    pub lock_token: String,
}

/// Reacts to partition assignment changes.
pub trait RebalanceHandler: Send + Sync {
    fn on_assigned(&self, partitions: &[i32]);
    fn on_revoked(
        &self,
        committer: &dyn OffsetCommitter,
        assignment_lost: bool,
    ) -> Result<(), ConsumerError>;
}

#[derive(Debug, Default)]
struct OffsetState {
    pending: Vec<TopicPartitionOffset>,
    shutdown_in_progress: bool,
    lock_id: Option<String>,
    lock_token: Option<String>,
}

#[derive(Debug)]
pub struct OffsetCoordinator {
    group_id: String,
    commit_modulo: i64,
    state: Mutex<OffsetState>,
}

impl OffsetCoordinator {
    pub fn new(group_id: impl Into<String>, commit_modulo: i64) -> Self {
        Self {
            group_id: group_id.into(),
            commit_modulo: commit_modulo.max(1),
            state: Mutex::new(OffsetState::default()),
        }
    }

    /// Buffers the position after `offset` and reports whether a batch
    /// commit is due.
    pub fn store(&self, topic: &str, partition: i32, offset: i64) -> bool {
        self.state.lock().pending.push(TopicPartitionOffset {
            topic: topic.to_string(),
            partition,
            offset: offset + 1,
        });
        offset % self.commit_modulo == 0
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutdown_in_progress
    }

    /// Commits everything buffered. Returns the number of offsets committed;
    /// an empty buffer is a successful no-op.
    pub fn commit<C>(&self, committer: &C) -> Result<usize, ConsumerError>
    where
        C: OffsetCommitter + ?Sized,
    {
        let batch = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return Ok(0);
            }
            std::mem::take(&mut state.pending)
        };

        if let Err(err) = committer.commit_offsets(&batch) {
            let mut state = self.state.lock();
            let newer = std::mem::replace(&mut state.pending, batch);
            state.pending.extend(newer);
            return Err(err);
        }

        let count = batch.len();
        metrics::record_offsets_committed(count);
        info!(
            "offsets committed ([partition:offset]): {}",
            batch
                .iter()
                .map(|tpo| tpo.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        Ok(count)
    }

    /// Flags shutdown and commits what is buffered. Rebalance commits are
    /// skipped from here on.
    pub fn shutdown<C>(&self, committer: &C) -> Result<usize, ConsumerError>
    where
        C: OffsetCommitter + ?Sized,
    {
        let has_offsets = {
            let mut state = self.state.lock();
            state.shutdown_in_progress = true;
            !state.pending.is_empty()
        };
        if has_offsets {
            self.commit(committer)
        } else {
            Ok(0)
        }
    }

    pub fn lock_id(&self) -> Option<String> {
        self.state.lock().lock_id.clone()
    }

    pub fn lock_token(&self) -> Option<String> {
        self.state.lock().lock_token.clone()
    }

    /// Records the token acquired for `lock_id`. Ignored when the
    /// assignment changed while the token was being acquired.
    pub fn set_lock_token(&self, lock_id: &str, token: String) -> bool {
        let mut state = self.state.lock();
        if state.lock_id.as_deref() == Some(lock_id) {
            state.lock_token = Some(token);
            true
        } else {
            false
        }
    }

    /// Returns the lock id that still needs a token, if any.
    pub fn lock_needing_token(&self) -> Option<String> {
        let state = self.state.lock();
        match (&state.lock_id, &state.lock_token) {
            (Some(id), None) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn fencing(&self) -> Option<FencingCheck> {
        let state = self.state.lock();
        match (&state.lock_id, &state.lock_token) {
            (Some(lock_id), Some(lock_token)) => Some(FencingCheck {
                lock_id: lock_id.clone(),
                lock_token: lock_token.clone(),
            }),
            _ => None,
        }
    }

    fn clear_lock(state: &mut OffsetState) {
        state.lock_id = None;
        state.lock_token = None;
    }
}

impl RebalanceHandler for OffsetCoordinator {
    fn on_assigned(&self, partitions: &[i32]) {
        warn!(
            count = partitions.len(),
            ?partitions,
            "consumer rebalance: new partition(s) assigned"
        );
        // A consumer is expected to own one partition; the first one names the lock.
        if let Some(partition) = partitions.first() {
            let lock_id = format!("{}/{}", self.group_id, partition);
            info!(%lock_id, "Lock token will be acquired before processing");
            let mut state = self.state.lock();
            state.lock_id = Some(lock_id);
            state.lock_token = None;
        }
    }

    fn on_revoked(
        &self,
        committer: &dyn OffsetCommitter,
        assignment_lost: bool,
    ) -> Result<(), ConsumerError> {
        let (shutting_down, has_offsets) = {
            let mut state = self.state.lock();
            let observed = (state.shutdown_in_progress, !state.pending.is_empty());
            if observed.0 || !observed.1 {
                Self::clear_lock(&mut state);
            }
            observed
        };

        if shutting_down {
            info!("shutdown in progress, skipping rebalance offset commit");
            return Ok(());
        }
        if !has_offsets {
            debug!("no offsets to commit during rebalance");
            return Ok(());
        }
        if assignment_lost {
            warn!("Assignment lost involuntarily, commit may fail");
        }

        let result = self.commit(committer);
        Self::clear_lock(&mut self.state.lock());
        result.map(|_| ())
    }
}
