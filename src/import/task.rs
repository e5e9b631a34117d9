//! Imports driven from async code.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::progress::{CancelToken, ChannelSink, ImportProgress};
use super::{ImportRequest, ImportSummary};
use crate::engine::Engine;
use crate::error::{EngineError, Result};

/// An import running on tokio's blocking pool. Progress arrives on a channel;
/// the final result comes from [`ImportTask::join`].
pub struct ImportTask {
    progress: mpsc::UnboundedReceiver<ImportProgress>,
    cancel: CancelToken,
    handle: JoinHandle<Result<ImportSummary>>,
}

impl ImportTask {
    /// Start `request` on `engine`. Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<Engine>, request: ImportRequest) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut sink = ChannelSink(tx);
            engine.import_with_token(&request, &mut sink, &token)
        });
        Self {
            progress: rx,
            cancel,
            handle,
        }
    }

    /// The next progress report, or `None` once the import has finished and
    /// every report has been read.
    pub async fn next_progress(&mut self) -> Option<ImportProgress> {
        self.progress.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<ImportSummary> {
        self.handle
            .await
            .map_err(|e| EngineError::Internal(format!("import task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::progress::Stage;

    #[tokio::test]
    async fn streams_progress_then_joins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.sql");
        std::fs::write(
            &path,
            "CREATE TABLE t (x);\nINSERT INTO t VALUES (1);\nINSERT INTO t VALUES (2);\n",
        )
        .unwrap();

        let engine = Arc::new(Engine::in_memory().unwrap());
        let mut task = ImportTask::spawn(engine.clone(), ImportRequest::new("sqlite", &path));

        let mut seen = Vec::new();
        while let Some(progress) = task.next_progress().await {
            seen.push(progress);
        }
        let summary = task.join().await.unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(seen.first().unwrap().percentage, 0);
        let last = seen.last().unwrap();
        assert_eq!(last.stage, Stage::Completed);
        assert_eq!(last.percentage, 100);

        let out = engine.execute("SELECT count(*) FROM t").unwrap();
        assert_eq!(out.rows, vec![vec![serde_json::json!(2)]]);
    }

    #[tokio::test]
    async fn cancel_before_start_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.sql");
        std::fs::write(&path, "CREATE TABLE t (x);\n").unwrap();

        let engine = Arc::new(Engine::in_memory().unwrap());
        let task = ImportTask::spawn(engine, ImportRequest::new("sqlite", &path));
        task.cancel_token().cancel();
        // The blocking thread may already be past the first check.
        match task.join().await {
            Err(EngineError::Cancelled) | Ok(_) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
