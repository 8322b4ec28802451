//! Offset Convergence Monitor - waits until every consumer group reading a
//! topic has committed past its latest message.
//!
//! Only partition 0 is compared. A multi-partition topic can therefore
//! report convergence while other partitions still lag.
//!
//! Without a deadline the wait is unbounded: a group that never advances
//! keeps the caller pending forever. `with_deadline` adds an opt-in bound.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::broker::{BrokerAdmin, ConsumerGroup, TopicOffsets, NO_OFFSET};
use crate::error::EmitError;

/// Committed offset of one consumer group on the watched topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOffset {
    pub group_id: String,
    pub offset: i64,
}

/// Outcome of a completed convergence wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub topic: String,
    /// Topic offset captured when the wait began (`NO_OFFSET` if empty).
    pub target_offset: i64,
    /// Number of group-offset polls performed.
    pub polls: usize,
    /// Groups whose offset took part in the final check.
    pub converged_groups: Vec<String>,
    pub elapsed: Duration,
}

/// True when every group with a recorded offset sits exactly at `target`.
///
/// Groups reporting `NO_OFFSET` do not read the topic and are ignored;
/// with no applicable group the check passes.
pub fn is_converged(target: i64, offsets: &[GroupOffset]) -> bool {
    offsets
        .iter()
        .filter(|group| group.offset != NO_OFFSET)
        .all(|group| group.offset == target)
}

/// Polls the broker's administrative interface until consumer groups
/// converge on a topic's latest offset.
#[derive(Clone)]
pub struct OffsetMonitor {
    admin: Arc<dyn BrokerAdmin>,
    poll_interval: Duration,
    deadline: Option<Duration>,
}

impl OffsetMonitor {
    /// Create a monitor polling every 100 ms with no deadline.
    pub fn new(admin: Arc<dyn BrokerAdmin>) -> Self {
        Self {
            admin,
            poll_interval: Duration::from_millis(100),
            deadline: None,
        }
    }

    /// Set the delay between polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Bound the whole wait. `None` (the default) waits indefinitely.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// The administrative handle this monitor polls.
    pub fn admin(&self) -> &Arc<dyn BrokerAdmin> {
        &self.admin
    }

    /// Wait until every consumer group reading `topic` has committed the
    /// topic's current offset.
    ///
    /// Administrative failures abort the wait with `EmitError::Admin`.
    pub async fn wait_for_convergence(&self, topic: &str) -> Result<ConvergenceReport, EmitError> {
        match self.deadline {
            None => self.converge(topic).await,
            Some(deadline) => tokio::time::timeout(deadline, self.converge(topic))
                .await
                .map_err(|_| EmitError::ConvergenceDeadline {
                    topic: topic.to_string(),
                    waited: deadline,
                })?,
        }
    }

    async fn converge(&self, topic: &str) -> Result<ConvergenceReport, EmitError> {
        let started = Instant::now();

        let target_offset = self
            .admin
            .fetch_topic_offsets(topic)
            .await
            .map_err(EmitError::Admin)?
            .iter()
            .find(|p| p.partition == 0)
            .map_or(NO_OFFSET, |p| p.offset);

        if target_offset == NO_OFFSET {
            debug!(topic, "topic has no messages, nothing to converge on");
            return Ok(ConvergenceReport {
                topic: topic.to_string(),
                target_offset,
                polls: 0,
                converged_groups: Vec::new(),
                elapsed: started.elapsed(),
            });
        }

        // Group membership is listed once and reused for every poll.
        let groups = self
            .admin
            .list_consumer_groups()
            .await
            .map_err(EmitError::Admin)?;

        let mut polls = 0;
        loop {
            polls += 1;
            let offsets = self.group_offsets(topic, &groups).await?;

            if is_converged(target_offset, &offsets) {
                let converged_groups: Vec<String> = offsets
                    .into_iter()
                    .filter(|g| g.offset != NO_OFFSET)
                    .map(|g| g.group_id)
                    .collect();
                info!(
                    topic,
                    target_offset,
                    polls,
                    groups = converged_groups.len(),
                    "consumer groups converged"
                );
                return Ok(ConvergenceReport {
                    topic: topic.to_string(),
                    target_offset,
                    polls,
                    converged_groups,
                    elapsed: started.elapsed(),
                });
            }

            debug!(
                topic,
                target_offset,
                lagging = ?offsets
                    .iter()
                    .filter(|g| g.offset != NO_OFFSET && g.offset != target_offset)
                    .map(|g| (&g.group_id, g.offset))
                    .collect::<Vec<_>>(),
                "waiting for consumer groups"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn group_offsets(
        &self,
        topic: &str,
        groups: &[ConsumerGroup],
    ) -> Result<Vec<GroupOffset>, EmitError> {
        let mut offsets = Vec::with_capacity(groups.len());
        for group in groups {
            let committed = self
                .admin
                .fetch_group_offsets(&group.group_id, topic)
                .await
                .map_err(EmitError::Admin)?;
            offsets.push(GroupOffset {
                group_id: group.group_id.clone(),
                offset: partition_zero(&committed, topic),
            });
        }
        Ok(offsets)
    }
}

fn partition_zero(committed: &[TopicOffsets], topic: &str) -> i64 {
    committed
        .iter()
        .find(|t| t.topic == topic)
        .and_then(|t| t.partitions.iter().find(|p| p.partition == 0))
        .map_or(NO_OFFSET, |p| p.offset)
}
