use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redis key namespace for the ingest task queue.
const NAMESPACE: &str = "traceroot_ingest";

/// Retry policy for a failed ingest task: five attempts, exponential backoff
/// capped at ten minutes, with jitter to avoid a thundering herd when many
/// tasks fail at once (e.g. a ClickHouse blip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub backoff_multiplier: f64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_secs: 10,
            backoff_multiplier: 2.0,
            max_delay_secs: 600,
        }
    }
}

/// One unit of ingest work: a blob already written to the object store,
/// waiting to be downloaded, transformed and inserted into ClickHouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestTask {
    pub id: Uuid,
    pub project_id: String,
    pub object_key: String,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub retry_config: RetryConfig,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl IngestTask {
    pub fn new(project_id: String, object_key: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            object_key,
            created_at: Utc::now(),
            attempts: 0,
            retry_config: RetryConfig::default(),
            next_retry_at: None,
            last_error: None,
        }
    }

    fn calculate_next_retry(&self) -> DateTime<Utc> {
        let base = self.retry_config.initial_delay_secs as f64;
        let raw = base * self.retry_config.backoff_multiplier.powi(self.attempts as i32);
        let capped = raw.min(self.retry_config.max_delay_secs as f64);
        let jitter = capped * 0.1 * rand::random::<f64>();
        Utc::now() + chrono::Duration::seconds((capped + jitter) as i64)
    }

    fn is_exhausted(&self) -> bool {
        self.attempts >= self.retry_config.max_attempts
    }
}

/// Redis-backed task queue: a pending sorted set scored by enqueue time, a
/// per-task lease key enforcing an invisibility window while a worker holds
/// it, a retry sorted set scored by next-attempt time, and a dead-letter
/// sorted set for tasks that exhausted their retries.
#[derive(Clone)]
pub struct TaskQueue {
    redis: MultiplexedConnection,
    lease_secs: u64,
}

impl TaskQueue {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = client.get_multiplexed_async_connection().await?;
        Ok(Self { redis, lease_secs: 3600 })
    }

    fn key(&self, suffix: &str) -> String {
        format!("{NAMESPACE}:{suffix}")
    }

    pub async fn enqueue(&self, task: &IngestTask) -> anyhow::Result<()> {
        let task_key = self.key(&format!("task:{}", task.id));
        let payload = serde_json::to_string(task)?;
        let mut conn = self.redis.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(&task_key, &payload)
            .zadd(self.key("pending"), task.id.to_string(), task.created_at.timestamp());
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Pops the oldest ready task and leases it to `worker_id` for
    /// `lease_secs`. A task that isn't ack'd or nack'd before the lease
    /// expires becomes visible again to the next caller of
    /// [`Self::requeue_expired_leases`], which every worker loop iteration
    /// invokes alongside [`Self::promote_ready_retries`].
    pub async fn dequeue(&self, worker_id: &str) -> anyhow::Result<Option<IngestTask>> {
        self.promote_ready_retries().await?;

        let mut conn = self.redis.clone();
        let pending_key = self.key("pending");
        let ids: Vec<String> = conn.zrange(&pending_key, 0, 0).await?;

        let Some(id) = ids.into_iter().next() else {
            return Ok(None);
        };

        let lease_key = self.key(&format!("lease:{id}"));
        let acquired: bool = conn.set_nx(&lease_key, worker_id).await?;
        if !acquired {
            return Ok(None);
        }
        let deadline = Utc::now().timestamp() + self.lease_secs as i64;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .expire(&lease_key, self.lease_secs as i64)
            .zrem(&pending_key, &id)
            .zadd(self.key("in_flight"), &id, deadline);
        pipe.query_async::<()>(&mut conn).await?;

        let task_key = self.key(&format!("task:{id}"));
        let payload: Option<String> = conn.get(&task_key).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn ack(&self, task: &IngestTask) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.key(&format!("task:{}", task.id)))
            .del(self.key(&format!("lease:{}", task.id)))
            .zrem(self.key("in_flight"), task.id.to_string());
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Records a failed attempt. Schedules a retry if attempts remain,
    /// otherwise moves the task to the dead-letter set.
    pub async fn nack(&self, mut task: IngestTask, error: String) -> anyhow::Result<()> {
        task.attempts += 1;
        task.last_error = Some(error);

        let mut conn = self.redis.clone();
        let task_key = self.key(&format!("task:{}", task.id));
        let lease_key = self.key(&format!("lease:{}", task.id));

        if task.is_exhausted() {
            let payload = serde_json::to_string(&task)?;
            let mut pipe = redis::pipe();
            pipe.atomic()
                .set(&task_key, &payload)
                .zadd(self.key("dead_letter"), task.id.to_string(), Utc::now().timestamp())
                .del(&lease_key)
                .zrem(self.key("in_flight"), task.id.to_string());
            pipe.query_async::<()>(&mut conn).await?;
            tracing::error!(task_id = %task.id, attempts = task.attempts, "ingest task moved to dead-letter queue");
            return Ok(());
        }

        task.next_retry_at = Some(task.calculate_next_retry());
        let payload = serde_json::to_string(&task)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(&task_key, &payload)
            .zadd(self.key("retry"), task.id.to_string(), task.next_retry_at.unwrap().timestamp())
            .del(&lease_key)
            .zrem(self.key("in_flight"), task.id.to_string());
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn promote_ready_retries(&self) -> anyhow::Result<()> {
        let mut conn = self.redis.clone();
        let retry_key = self.key("retry");
        let pending_key = self.key("pending");
        let now = Utc::now().timestamp();

        let ready: Vec<String> = conn.zrangebyscore(&retry_key, 0, now).await?;
        for id in ready {
            let mut pipe = redis::pipe();
            pipe.atomic().zrem(&retry_key, &id).zadd(&pending_key, &id, now);
            pipe.query_async::<()>(&mut conn).await?;
        }
        Ok(())
    }

    /// Sweeps the `in_flight` set for leases past their deadline: a worker
    /// that crashed mid-processing never calls [`Self::ack`]/[`Self::nack`],
    /// so its task would otherwise sit claimed forever even after the Redis
    /// lease key itself expires. Each expired task is requeued through the
    /// same attempt-count/dead-letter branching as a nack, since a stalled
    /// lease is itself a failed attempt.
    pub async fn requeue_expired_leases(&self) -> anyhow::Result<usize> {
        let mut conn = self.redis.clone();
        let in_flight_key = self.key("in_flight");
        let now = Utc::now().timestamp();

        let expired: Vec<String> = conn.zrangebyscore(&in_flight_key, 0, now).await?;
        let mut requeued = 0;
        for id in expired {
            conn.zrem::<_, _, ()>(&in_flight_key, &id).await?;

            let task_key = self.key(&format!("task:{id}"));
            let payload: Option<String> = conn.get(&task_key).await?;
            let Some(json) = payload else {
                // Already ack'd between the ZRANGEBYSCORE read and this check.
                continue;
            };
            let task: IngestTask = serde_json::from_str(&json)?;
            conn.del::<_, ()>(self.key(&format!("lease:{id}"))).await?;

            tracing::warn!(task_id = %task.id, attempts = task.attempts, "lease expired without ack or nack, requeuing");
            self.nack(task, "lease expired before worker acked or nacked the task".to_string()).await?;
            requeued += 1;
        }
        Ok(requeued)
    }

    pub async fn pending_count(&self) -> anyhow::Result<usize> {
        let mut conn = self.redis.clone();
        Ok(conn.zcard(self.key("pending")).await?)
    }

    pub async fn dead_letter_count(&self) -> anyhow::Result<usize> {
        let mut conn = self.redis.clone();
        Ok(conn.zcard(self.key("dead_letter")).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_is_capped_and_monotonic_in_attempts() {
        let mut task = IngestTask::new("proj".to_string(), "events/otel/proj/x.json".to_string());
        task.attempts = 0;
        let first = task.calculate_next_retry();
        task.attempts = 10;
        let later = task.calculate_next_retry();
        assert!(first <= Utc::now() + chrono::Duration::seconds(20));
        assert!(later <= Utc::now() + chrono::Duration::seconds(700));
    }

    #[test]
    fn task_is_exhausted_after_max_attempts() {
        let mut task = IngestTask::new("proj".to_string(), "key".to_string());
        assert!(!task.is_exhausted());
        task.attempts = task.retry_config.max_attempts;
        assert!(task.is_exhausted());
    }
}
