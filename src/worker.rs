use crate::clickhouse_store::ClickhouseStore;
use crate::object_store::ObjectStore;
use crate::otlp::transform_otel_to_clickhouse;
use crate::queue::{IngestTask, TaskQueue};

/// Classification of a failed attempt at processing one task. Fatal errors
/// (bad blob key, malformed payload) are never retried — the blob itself is
/// the problem, and retrying would just burn through attempts on a message
/// that can never succeed. Everything else is retryable.
#[derive(Debug)]
pub enum WorkerError {
    Fatal(String),
    Retryable(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerError::Fatal(m) => write!(f, "fatal: {m}"),
            WorkerError::Retryable(m) => write!(f, "retryable: {m}"),
        }
    }
}

/// Downloads the blob, transforms it, and inserts the result into
/// ClickHouse. Traces are inserted before spans, matching the order the
/// worker loop in §4.6 specifies; both are no-ops on an empty batch.
async fn process_task(object_store: &ObjectStore, ch: &ClickhouseStore, task: &IngestTask) -> Result<(), WorkerError> {
    let blob = object_store
        .get_json(&task.object_key)
        .await
        .map_err(|e| classify_object_store_error(&task.object_key, e))?;

    let (traces, spans) = transform_otel_to_clickhouse(&blob, &task.project_id).map_err(|e| WorkerError::Fatal(e.to_string()))?;

    ch.insert_traces_batch(&traces).await.map_err(|e| WorkerError::Retryable(e.to_string()))?;
    ch.insert_spans_batch(&spans).await.map_err(|e| WorkerError::Retryable(e.to_string()))?;

    Ok(())
}

fn classify_object_store_error(key: &str, e: anyhow::Error) -> WorkerError {
    let msg = e.to_string();
    if msg.contains("NoSuchKey") || msg.contains("NotFound") {
        WorkerError::Fatal(format!("blob {key} not found: {msg}"))
    } else {
        WorkerError::Retryable(msg)
    }
}

/// Runs the consume loop until `queue.dequeue` returns `Ok(None)` for
/// `idle_sleep` in a row with nothing to process, at which point the caller
/// decides whether to poll again. In practice this runs forever inside the
/// worker binary's main loop.
pub async fn run_once(worker_id: &str, queue: &TaskQueue, object_store: &ObjectStore, ch: &ClickhouseStore) -> anyhow::Result<bool> {
    let Some(task) = queue.dequeue(worker_id).await? else {
        return Ok(false);
    };

    tracing::info!(task_id = %task.id, project_id = %task.project_id, key = %task.object_key, "processing ingest task");

    match process_task(object_store, ch, &task).await {
        Ok(()) => {
            queue.ack(&task).await?;
            tracing::info!(task_id = %task.id, "ingest task acked");
        }
        Err(WorkerError::Fatal(msg)) => {
            tracing::error!(task_id = %task.id, error = %msg, "ingest task failed fatally, dead-lettering without retry");
            let mut exhausted = task.clone();
            exhausted.attempts = exhausted.retry_config.max_attempts;
            queue.nack(exhausted, msg).await?;
        }
        Err(WorkerError::Retryable(msg)) => {
            tracing::warn!(task_id = %task.id, error = %msg, "ingest task failed, scheduling retry");
            queue.nack(task, msg).await?;
        }
    }

    Ok(true)
}
