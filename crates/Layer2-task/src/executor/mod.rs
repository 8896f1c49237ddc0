//! Plugin Executor - runs tasks against loaded plugins
//!
//! - `execute`: inline, retries with sleeps, returns the final result
//! - `execute_async`: bounded queue serviced by a fixed worker pool; retries are re-queued
//!   after the backoff delay; results are kept by task id
//!
//! Every plugin call runs in its own spawned task so a panic surfaces as a failed attempt
//! instead of taking down a worker. Each attempt races the call against its deadline and the
//! task's cancellation token.
//!
//! Any failure that reaches the plugin call goes through the task's retry policy. Routing
//! failures (unknown plugin, undeclared type) and cancellation end the task immediately.
//! `stop` finalizes every async task it leaves behind as `Cancelled`.

pub mod adapter;

pub use adapter::{
    AdapterSet, CustomAdapter, DataAdapter, EventAdapter, HttpAdapter, ScheduledAdapter,
    TaskAdapter,
};

use crate::retry::RetryPolicy;
use crate::state::TaskStatus;
use crate::task::{ExecutionResult, ExecutionTask, TaskId};
use plugrun_foundation::{Error, ExecutorSettings, PluginContext, PluginProvider, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Configuration for the executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Async queue capacity
    pub queue_size: usize,

    /// Worker pool size
    pub worker_count: usize,

    /// Maximum concurrently running plugin calls
    pub concurrency_limit: usize,

    /// Used when a task has no timeout of its own
    pub default_timeout: Duration,

    /// Maximum results kept in history
    pub history_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&ExecutorSettings::default())
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(s: &ExecutorSettings) -> Self {
        Self {
            queue_size: s.queue_size,
            worker_count: s.worker_count,
            concurrency_limit: s.concurrency_limit,
            default_timeout: s.default_timeout,
            history_size: s.history_size,
        }
    }
}

/// Counters for external queries
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStats {
    pub submitted: u64,
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub timed_out: u64,
    pub retries: u64,
    pub concurrency_limit: usize,
    pub workers_running: bool,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    timed_out: AtomicU64,
    retries: AtomicU64,
}

/// In-flight task record
struct TaskEntry {
    task: ExecutionTask,
    cancel: CancellationToken,
    /// Inline `execute` call owns finalization
    inline: bool,
}

/// Outcome of a single attempt
enum Attempt {
    Done(Value),
    /// The plugin was called and failed (or timed out)
    Failed(Error),
    /// Never reached the plugin
    Rejected(Error),
}

/// Plugin Executor
pub struct PluginExecutor {
    config: ExecutorConfig,

    /// Plugin instance lookup
    provider: Arc<dyn PluginProvider>,

    adapters: Arc<AdapterSet>,

    /// Parent of every task token
    root: CancellationToken,

    /// Async queue
    sender: mpsc::Sender<TaskId>,
    receiver: Arc<Mutex<mpsc::Receiver<TaskId>>>,

    /// Queued / running / retrying tasks
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,

    /// Finished async results
    results: RwLock<HashMap<TaskId, ExecutionResult>>,

    /// Finished results, oldest first
    history: RwLock<VecDeque<ExecutionResult>>,

    /// Swapped as a whole by `set_concurrency_limit`
    semaphore: parking_lot::RwLock<Arc<Semaphore>>,
    concurrency_limit: AtomicUsize,

    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<CancellationToken>,
    running: AtomicBool,
    counters: Counters,
}

impl PluginExecutor {
    /// Create a new executor
    pub fn new(config: ExecutorConfig, provider: Arc<dyn PluginProvider>) -> Self {
        Self::with_parts(config, provider, AdapterSet::default(), CancellationToken::new())
    }

    /// Create with custom adapters and a parent cancellation token
    pub fn with_parts(
        config: ExecutorConfig,
        provider: Arc<dyn PluginProvider>,
        adapters: AdapterSet,
        parent: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_size.max(1));
        let limit = config.concurrency_limit.max(1);

        Self {
            provider,
            adapters: Arc::new(adapters),
            root: parent.child_token(),
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            tasks: RwLock::new(HashMap::new()),
            results: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            semaphore: parking_lot::RwLock::new(Arc::new(Semaphore::new(limit))),
            concurrency_limit: AtomicUsize::new(limit),
            workers: Mutex::new(Vec::new()),
            shutdown: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            counters: Counters::default(),
            config,
        }
    }

    // ========================================================================
    // Worker pool
    // ========================================================================

    /// Start the worker pool
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyExists("executor is already running".into()));
        }

        let token = CancellationToken::new();
        *self.shutdown.lock().await = token.clone();

        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.worker_count.max(1) {
            let executor = Arc::clone(self);
            let token = token.clone();
            workers.push(tokio::spawn(async move {
                executor.worker_loop(worker_id, token).await;
            }));
        }

        info!(workers = workers.len(), "Executor started");
        Ok(())
    }

    /// Stop workers and wait for in-flight tasks, bounded by `timeout`
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown.lock().await.cancel();

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let joined = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
        let abandoned = self.abandon_pending().await;

        match joined {
            Ok(_) => {
                info!(abandoned, "Executor stopped");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, abandoned, "Executor workers did not drain in time");
                Err(Error::Timeout(format!(
                    "executor workers did not stop within {:?}",
                    timeout
                )))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Empty the queue and finalize every async task still in flight as `Cancelled`
    async fn abandon_pending(&self) -> usize {
        {
            let mut rx = self.receiver.lock().await;
            while rx.try_recv().is_ok() {}
        }

        let ids: Vec<TaskId> = {
            let tasks = self.tasks.read().await;
            tasks
                .iter()
                .filter(|(_, entry)| !entry.inline)
                .map(|(id, entry)| {
                    entry.cancel.cancel();
                    *id
                })
                .collect()
        };

        for id in &ids {
            self.finalize_async(
                *id,
                TaskStatus::Cancelled,
                None,
                Some("executor stopped before the task finished".into()),
            )
            .await;
        }
        ids.len()
    }

    /// Cancel every in-flight task (engine shutdown)
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, token: CancellationToken) {
        trace!(worker_id, "Executor worker started");

        loop {
            let next = {
                // Shutdown wins over queued work
                let mut rx = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    rx = self.receiver.lock() => rx,
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    id = rx.recv() => id,
                }
            };

            match next {
                Some(task_id) => self.run_queued(task_id).await,
                None => break,
            }
        }

        trace!(worker_id, "Executor worker stopped");
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Run a task inline and return its final result
    pub async fn execute(&self, mut task: ExecutionTask) -> Result<ExecutionResult> {
        task.validate()?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let task_id = task.id;
        let cancel = self.root.child_token();
        task.start();
        self.tasks.write().await.insert(
            task_id,
            TaskEntry {
                task: task.clone(),
                cancel: cancel.clone(),
                inline: true,
            },
        );

        debug!(task_id = %task_id, plugin_id = %task.plugin_id, "Executing task inline");

        let policy = task.retry_policy.clone().unwrap_or_else(RetryPolicy::no_retry);

        let (status, data, error) = loop {
            match self.attempt(&task, &cancel).await {
                Attempt::Done(value) => break (TaskStatus::Completed, Some(value), None),
                Attempt::Rejected(err) => break Self::failure(err),
                Attempt::Failed(err) => {
                    if Self::should_retry(&err, &policy, task.retry_count) {
                        task.retry_count += 1;
                        self.counters.retries.fetch_add(1, Ordering::Relaxed);
                        let delay = policy.delay_for_attempt(task.retry_count);
                        self.set_status(task_id, TaskStatus::Retrying, task.retry_count)
                            .await;

                        debug!(task_id = %task_id, attempt = task.retry_count, ?delay, error = %err, "Retrying task");

                        tokio::select! {
                            _ = cancel.cancelled() => break Self::failure(Error::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }

                        self.set_status(task_id, TaskStatus::Running, task.retry_count)
                            .await;
                        continue;
                    }
                    break Self::failure(err);
                }
            }
        };

        self.tasks.write().await.remove(&task_id);
        task.finish(status);
        let result = ExecutionResult::from_task(&task, data, error);
        self.record(&result).await;
        Ok(result)
    }

    /// Enqueue a task and return its id immediately
    pub async fn execute_async(&self, mut task: ExecutionTask) -> Result<TaskId> {
        task.validate()?;

        if !self.is_running() {
            return Err(Error::NotRunning("executor is not running".into()));
        }

        let task_id = task.id;
        task.status = TaskStatus::Queued;

        // Register before sending so a fast worker always finds the entry
        self.tasks.write().await.insert(
            task_id,
            TaskEntry {
                task,
                cancel: self.root.child_token(),
                inline: false,
            },
        );

        match self.sender.try_send(task_id) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task_id, "Task queued");
                Ok(task_id)
            }
            Err(e) => {
                self.tasks.write().await.remove(&task_id);
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!(task_id = %task_id, "Executor queue is full");
                        Err(Error::QueueFull("task queue is full".into()))
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        Err(Error::NotRunning("task queue is closed".into()))
                    }
                }
            }
        }
    }

    /// Worker side of `execute_async`
    async fn run_queued(self: &Arc<Self>, task_id: TaskId) {
        let (task, cancel) = {
            let mut tasks = self.tasks.write().await;
            let Some(entry) = tasks.get_mut(&task_id) else {
                // Cancelled while queued
                return;
            };
            entry.task.start();
            (entry.task.clone(), entry.cancel.clone())
        };

        if cancel.is_cancelled() {
            self.finalize_async(task_id, TaskStatus::Cancelled, None, Some(Error::Cancelled.to_string()))
                .await;
            return;
        }

        match self.attempt(&task, &cancel).await {
            Attempt::Done(value) => {
                self.finalize_async(task_id, TaskStatus::Completed, Some(value), None)
                    .await;
            }
            Attempt::Rejected(err) => {
                let (status, _, error) = Self::failure(err);
                self.finalize_async(task_id, status, None, error).await;
            }
            Attempt::Failed(err) => {
                let policy = task.retry_policy.clone().unwrap_or_else(RetryPolicy::no_retry);

                if Self::should_retry(&err, &policy, task.retry_count) {
                    let attempt = task.retry_count + 1;
                    let delay = policy.delay_for_attempt(attempt);
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    self.set_status(task_id, TaskStatus::Retrying, attempt).await;

                    debug!(task_id = %task_id, attempt, ?delay, error = %err, "Re-queueing task");

                    let executor = Arc::clone(self);
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                executor
                                    .finalize_async(task_id, TaskStatus::Cancelled, None, Some(Error::Cancelled.to_string()))
                                    .await;
                            }
                            _ = tokio::time::sleep(delay) => {
                                executor.requeue(task_id, attempt).await;
                            }
                        }
                    });
                } else {
                    let (status, _, error) = Self::failure(err);
                    self.finalize_async(task_id, status, None, error).await;
                }
            }
        }
    }

    /// Put a retrying task back on the queue without waiting for room
    async fn requeue(&self, task_id: TaskId, attempt: u32) {
        if !self.is_running() {
            self.finalize_async(
                task_id,
                TaskStatus::Cancelled,
                None,
                Some("executor stopped before the task finished".into()),
            )
            .await;
            return;
        }

        self.set_status(task_id, TaskStatus::Queued, attempt).await;
        if let Err(e) = self.sender.try_send(task_id) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "task queue is full",
                mpsc::error::TrySendError::Closed(_) => "task queue is closed",
            };
            warn!(task_id = %task_id, attempt, reason, "Retry could not be queued");
            self.finalize_async(
                task_id,
                TaskStatus::Failed,
                None,
                Some(format!("retry {} not queued: {}", attempt, reason)),
            )
            .await;
        }
    }

    /// Cancellation is final; every other plugin failure follows the policy
    fn should_retry(err: &Error, policy: &RetryPolicy, retry_count: u32) -> bool {
        !matches!(err, Error::Cancelled) && policy.should_retry(retry_count)
    }

    /// Map a terminal error to (status, data, error)
    fn failure(err: Error) -> (TaskStatus, Option<Value>, Option<String>) {
        let status = match err {
            Error::Cancelled => TaskStatus::Cancelled,
            Error::Timeout(_) => TaskStatus::Timeout,
            _ => TaskStatus::Failed,
        };
        (status, None, Some(err.to_string()))
    }

    /// One plugin call raced against its deadline and cancellation
    async fn attempt(&self, task: &ExecutionTask, cancel: &CancellationToken) -> Attempt {
        let plugin = match self.provider.get_plugin(&task.plugin_id).await {
            Some(plugin) => plugin,
            None => {
                return Attempt::Rejected(Error::NotFound(format!("plugin {}", task.plugin_id)))
            }
        };
        if let Err(err) = self.adapters.route(plugin.as_ref(), task) {
            return Attempt::Rejected(err);
        }

        let semaphore = Arc::clone(&self.semaphore.read());
        let _permit = tokio::select! {
            _ = cancel.cancelled() => return Attempt::Rejected(Error::Cancelled),
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return Attempt::Rejected(Error::Internal("executor semaphore closed".into())),
            },
        };

        let timeout = task.timeout.unwrap_or(self.config.default_timeout);
        let ctx = PluginContext::with_parent(task.plugin_id.clone(), cancel)
            .with_deadline(timeout)
            .with_value("taskId", json!(task.id.to_string()))
            .with_value("attempt", json!(task.retry_count + 1));
        let call_token = ctx.cancellation_token().clone();

        let adapters = Arc::clone(&self.adapters);
        let call_task = task.clone();
        let mut handle =
            tokio::spawn(async move { adapters.dispatch(plugin.as_ref(), &ctx, &call_task).await });

        let outcome = tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(join_err) => Err(Error::plugin(
                    task.plugin_id.clone(),
                    format!("task faulted: {}", join_err),
                )),
            },
            _ = tokio::time::sleep(timeout) => {
                call_token.cancel();
                handle.abort();
                Err(Error::Timeout(format!("task {} exceeded {:?}", task.id, timeout)))
            }
            _ = cancel.cancelled() => {
                handle.abort();
                Err(Error::Cancelled)
            }
        };

        match outcome {
            Ok(value) => Attempt::Done(value),
            Err(err) => {
                debug!(task_id = %task.id, plugin_id = %task.plugin_id, error = %err, "Task attempt failed");
                Attempt::Failed(err)
            }
        }
    }

    async fn set_status(&self, task_id: TaskId, status: TaskStatus, retry_count: u32) {
        if let Some(entry) = self.tasks.write().await.get_mut(&task_id) {
            entry.task.status = status;
            entry.task.retry_count = retry_count;
        }
    }

    /// Remove the in-flight entry and publish its result
    async fn finalize_async(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        data: Option<Value>,
        error: Option<String>,
    ) {
        let result = {
            let mut tasks = self.tasks.write().await;
            let Some(entry) = tasks.remove(&task_id) else {
                return;
            };

            let mut task = entry.task;
            task.finish(status);
            let result = ExecutionResult::from_task(&task, data, error);

            // Publish before releasing the task table so lookups never miss both
            self.results.write().await.insert(task_id, result.clone());
            result
        };

        self.record(&result).await;
    }

    async fn record(&self, result: &ExecutionResult) {
        let counter = match result.status {
            TaskStatus::Completed => &self.counters.completed,
            TaskStatus::Cancelled => &self.counters.cancelled,
            TaskStatus::Timeout => &self.counters.timed_out,
            _ => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if result.is_success() {
            debug!(task_id = %result.task_id, duration_ms = result.duration.as_millis() as u64, "Task completed");
        } else {
            warn!(
                task_id = %result.task_id,
                plugin_id = %result.plugin_id,
                status = %result.status,
                retries = result.retry_count,
                error = result.error.as_deref().unwrap_or(""),
                "Task did not complete"
            );
        }

        let mut history = self.history.write().await;
        history.push_back(result.clone());
        while history.len() > self.config.history_size {
            history.pop_front();
        }
    }

    // ========================================================================
    // Control
    // ========================================================================

    /// Cancel a queued, retrying or running task
    pub async fn cancel_execution(&self, task_id: TaskId) -> Result<()> {
        let finalize_now = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&task_id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    let waiting = entry.task.status.is_pending() && !entry.inline;
                    entry.task.status = TaskStatus::Cancelled;
                    waiting
                }
                None => {
                    return if self.results.read().await.contains_key(&task_id) {
                        Err(Error::Validation(format!("task {} already finished", task_id)))
                    } else {
                        Err(Error::NotFound(format!("task {}", task_id)))
                    };
                }
            }
        };

        info!(task_id = %task_id, "Task cancelled");

        if finalize_now {
            self.finalize_async(
                task_id,
                TaskStatus::Cancelled,
                None,
                Some(Error::Cancelled.to_string()),
            )
            .await;
        }

        Ok(())
    }

    /// Replace the concurrency limit (in-flight calls keep their old permits)
    pub fn set_concurrency_limit(&self, limit: usize) -> Result<()> {
        if limit == 0 {
            return Err(Error::InvalidInput(
                "concurrency limit must be greater than 0".into(),
            ));
        }

        *self.semaphore.write() = Arc::new(Semaphore::new(limit));
        self.concurrency_limit.store(limit, Ordering::SeqCst);
        info!(limit, "Executor concurrency limit updated");
        Ok(())
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Result of an async task
    pub async fn get_execution_result(&self, task_id: TaskId) -> Result<ExecutionResult> {
        if let Some(result) = self.results.read().await.get(&task_id) {
            return Ok(result.clone());
        }

        match self.tasks.read().await.get(&task_id) {
            Some(entry) => Err(Error::NotRunning(format!(
                "task {} is still {}",
                task_id, entry.task.status
            ))),
            None => Err(Error::NotFound(format!("task {}", task_id))),
        }
    }

    /// Current state of an in-flight task
    pub async fn get_task(&self, task_id: TaskId) -> Option<ExecutionTask> {
        self.tasks.read().await.get(&task_id).map(|e| e.task.clone())
    }

    /// Tasks currently executing
    pub async fn get_running_tasks(&self) -> Vec<ExecutionTask> {
        self.tasks
            .read()
            .await
            .values()
            .filter(|e| e.task.status.is_running())
            .map(|e| e.task.clone())
            .collect()
    }

    /// Recent results, newest first
    pub async fn get_execution_history(&self, limit: Option<usize>) -> Vec<ExecutionResult> {
        let history = self.history.read().await;
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    pub async fn stats(&self) -> ExecutorStats {
        let (queued, running) = {
            let tasks = self.tasks.read().await;
            (
                tasks.values().filter(|e| e.task.status.is_pending()).count(),
                tasks.values().filter(|e| e.task.status.is_running()).count(),
            )
        };

        ExecutorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            queued,
            running,
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            concurrency_limit: self.concurrency_limit(),
            workers_running: self.is_running(),
        }
    }
}
