use crate::error::{Result, TagCsvError};
use crate::extractor::job::remove_quietly;
use crate::extractor::CancellationToken;
use crate::request::ConversionRequest;
use crate::service::{ConversionResult, ConversionService};
use crate::strategy::ConversionStrategy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

const STARTING: &str = "Starting processing...";
const COMPLETED: &str = "Processing completed successfully";
const CANCELLED: &str = "Processing cancelled by user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

/// Point-in-time copy of the task state handed to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: Option<String>,
    pub status: TaskStatus,
    pub progress: String,
    pub result: Option<ConversionResult>,
}

impl TaskSnapshot {
    fn idle() -> Self {
        Self {
            task_id: None,
            status: TaskStatus::Idle,
            progress: String::new(),
            result: None,
        }
    }
}

#[derive(Debug)]
struct TaskState {
    task_id: Option<String>,
    status: TaskStatus,
    progress: String,
    result: Option<ConversionResult>,
}

impl TaskState {
    fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.task_id.clone(),
            status: self.status,
            progress: self.progress.clone(),
            result: self.result.clone(),
        }
    }

    fn is_current(&self, task_id: &str) -> bool {
        self.task_id.as_deref() == Some(task_id)
    }
}

struct Worker {
    task_id: String,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Runs at most one conversion at a time on a background thread and keeps
/// a status record that callers poll without blocking.
pub struct TaskManager<S: ConversionStrategy> {
    service: Arc<ConversionService<S>>,
    state: Arc<Mutex<TaskState>>,
    worker: Mutex<Option<Worker>>,
}

impl<S: ConversionStrategy> TaskManager<S> {
    pub fn new(service: ConversionService<S>) -> Self {
        Self {
            service: Arc::new(service),
            state: Arc::new(Mutex::new(TaskState {
                task_id: None,
                status: TaskStatus::Idle,
                progress: String::new(),
                result: None,
            })),
            worker: Mutex::new(None),
        }
    }

    /// Start a conversion in the background and return its task id. Rejected
    /// while a previous task is still running or still tearing down.
    pub fn start_conversion(&self, request: ConversionRequest) -> Result<String> {
        let mut worker = self.worker.lock();

        if let Some(ref current) = *worker {
            let running = self.state.lock().status == TaskStatus::Running;
            if running || current.is_alive() {
                return Err(TagCsvError::TaskAlreadyRunning {
                    task_id: current.task_id.clone(),
                });
            }
        }

        let task_id = format!(
            "{}_task_{}",
            self.service.strategy().name(),
            Uuid::new_v4().simple()
        );
        let token = CancellationToken::new();

        {
            let mut state = self.state.lock();
            state.task_id = Some(task_id.clone());
            state.status = TaskStatus::Running;
            state.progress = STARTING.to_string();
            state.result = None;
        }

        let handle = {
            let service = Arc::clone(&self.service);
            let state = Arc::clone(&self.state);
            let token = token.clone();
            let task_id = task_id.clone();

            std::thread::Builder::new()
                .name(format!("tagcsv-{}", service.strategy().name()))
                .spawn(move || {
                    let progress = |message: &str| update_progress(&state, &task_id, message);
                    let result = service.run(&request, &token, &progress);
                    finish(&state, &task_id, &token, result);
                })
        };

        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                let mut state = self.state.lock();
                state.status = TaskStatus::Completed;
                state.progress = format!("Processing failed: {}", e);
                return Err(TagCsvError::Io(e));
            }
        };

        tracing::info!("Started task {}", task_id);
        *worker = Some(Worker {
            task_id: task_id.clone(),
            token,
            handle: Some(handle),
        });

        Ok(task_id)
    }

    /// Snapshot for `task_id`, or an idle snapshot when it is not the
    /// tracked task.
    pub fn get_status(&self, task_id: &str) -> TaskSnapshot {
        let state = self.state.lock();
        if state.is_current(task_id) {
            state.snapshot()
        } else {
            TaskSnapshot::idle()
        }
    }

    pub fn current_status(&self) -> TaskSnapshot {
        self.state.lock().snapshot()
    }

    /// Request cancellation. The status flips to cancelled immediately; the
    /// result is attached once the background thread has torn down.
    pub fn cancel(&self, task_id: &str) -> bool {
        let worker = self.worker.lock();
        let Some(ref current) = *worker else {
            return false;
        };
        if current.task_id != task_id {
            return false;
        }

        let mut state = self.state.lock();
        if state.status != TaskStatus::Running {
            return false;
        }

        current.token.cancel();
        state.status = TaskStatus::Cancelled;
        state.progress = CANCELLED.to_string();
        tracing::info!("Cancellation requested for task {}", task_id);
        true
    }

    /// Whether a background thread is still alive, even if already cancelled.
    pub fn is_busy(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(Worker::is_alive)
    }

    /// Block until the background thread ends. Returns false on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_busy() {
                break;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let handle = self.worker.lock().as_mut().and_then(|w| w.handle.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Conversion thread panicked");
            }
        }
        true
    }
}

fn update_progress(state: &Mutex<TaskState>, task_id: &str, message: &str) {
    let mut state = state.lock();
    if state.is_current(task_id) && state.status == TaskStatus::Running {
        state.progress = message.to_string();
    }
}

fn finish(state: &Mutex<TaskState>, task_id: &str, token: &CancellationToken, result: ConversionResult) {
    let mut state = state.lock();
    if !state.is_current(task_id) {
        return;
    }

    // A late cancel still wins; drop whatever the service merged.
    let result = if token.is_cancelled() && !result.cancelled {
        if let Some(ref merged) = result.merged_path {
            tracing::info!("Discarding {} after late cancellation", merged.display());
            remove_quietly(merged);
        }
        ConversionResult::cancelled(result.outcomes)
    } else {
        result
    };

    if result.cancelled {
        state.status = TaskStatus::Cancelled;
        state.progress = CANCELLED.to_string();
    } else {
        state.status = TaskStatus::Completed;
        state.progress = if result.success {
            COMPLETED.to_string()
        } else {
            format!(
                "Processing failed: {}",
                result.error_summary.as_deref().unwrap_or("unknown error")
            )
        };
    }
    tracing::info!("Task {} finished: {}", task_id, state.progress);
    state.result = Some(result);
}
