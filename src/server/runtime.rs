//! Running units of work as tasks.
//!
//! Some operations of the crypto manager, most prominently status queries,
//! are not answered directly. Instead they are handed to the task runner
//! which performs them in the background and gives the caller a [`Task`]
//! handle. The caller can inspect the task, or wait for its result either
//! by blocking the current thread or by awaiting it.
//!
//! Units of work are plain sync closures. They are run on the blocking
//! thread pool of a Tokio runtime, so waiting for a task from within an
//! async context never starves the runtime of the threads needed to
//! complete it.

use std::{any, fmt, panic};
use std::sync::{Arc, Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use chrono::{DateTime, Utc};
use log::{debug, error};
use tokio::runtime;
use tokio::sync::Notify;
use crate::commons::KmipResult;
use crate::commons::error::Error;


//------------ TaskRunner ----------------------------------------------------

/// Runs units of work as tasks.
///
/// Cloning the runner is cheap, all clones spawn onto the same runtime.
#[derive(Clone)]
pub struct TaskRunner(Arc<Components>);

impl TaskRunner {
    /// Creates a runner with its own multi-threaded runtime.
    ///
    /// At most `threads` units of work run at the same time, further ones
    /// are queued.
    ///
    /// The runner must not be dropped from within an async context, as
    /// Tokio does not allow dropping a runtime there. Use
    /// [`TaskRunner::from_handle`] when already running inside a runtime.
    pub fn new(threads: usize) -> KmipResult<Self> {
        let rt = runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .max_blocking_threads(threads.max(1))
            .thread_name("kmipsim-task")
            .enable_all()
            .build()
            .map_err(|err| {
                Error::custom(format!("Cannot start task runtime: {}", err))
            })?;
        Ok(TaskRunner(Arc::new(Components {
            tokio: rt.handle().clone(),
            _owned: Some(rt),
            next_key: AtomicU64::new(0),
        })))
    }

    /// Creates a runner that spawns onto an existing runtime.
    pub fn from_handle(handle: runtime::Handle) -> Self {
        TaskRunner(Arc::new(Components {
            tokio: handle,
            _owned: None,
            next_key: AtomicU64::new(0),
        }))
    }

    /// Creates a runner for the runtime the caller is running in.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(runtime::Handle::current())
    }

    /// Submits a unit of work and returns the handle to its task.
    ///
    /// The work returns an optional result. A unit of work that panics
    /// completes its task with [`Error::TaskFailed`], as does one that
    /// never runs because the runtime is shutting down.
    pub fn submit<F, T>(&self, name: &str, op: F) -> Task<T>
    where
        F: FnOnce() -> KmipResult<Option<T>> + Send + 'static,
        T: Send + 'static,
    {
        let key = format!(
            "task-{}", self.0.next_key.fetch_add(1, Ordering::Relaxed) + 1
        );
        debug!("Queued task {} ({})", key, name);

        let cell = Arc::new(TaskCell::new(key, name));
        let task = Task { cell: cell.clone() };

        let pending = PendingTask { cell, done: false };
        let _ = self.0.tokio.spawn_blocking(move || pending.run(op));

        task
    }

    /// Runs a unit of work as a task and waits for its result.
    pub async fn run<F, T>(
        &self, name: &str, op: F
    ) -> KmipResult<Option<T>>
    where
        F: FnOnce() -> KmipResult<Option<T>> + Send + 'static,
        T: Clone + Send + 'static,
    {
        self.submit(name, op).result().await
    }

    /// Runs a future to completion on the runner’s runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async context.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.0.tokio.block_on(fut)
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("owns_runtime", &self.0._owned.is_some())
            .finish()
    }
}


//------------ Components ----------------------------------------------------

struct Components {
    /// The Tokio runtime to spawn tasks onto.
    tokio: runtime::Handle,

    /// The runtime itself if we created it.
    ///
    /// Only kept so that it lives as long as the runner.
    _owned: Option<runtime::Runtime>,

    /// The number of the last task handed out.
    next_key: AtomicU64,
}


//------------ Task ----------------------------------------------------------

/// The handle to a submitted unit of work.
pub struct Task<T> {
    cell: Arc<TaskCell<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task { cell: self.cell.clone() }
    }
}

impl<T: Clone> Task<T> {
    /// Returns the current state of the task.
    pub fn info(&self) -> TaskInfo<T> {
        self.cell.info.lock().unwrap().clone()
    }

    pub fn key(&self) -> String {
        self.cell.info.lock().unwrap().key.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.cell.info.lock().unwrap().state.is_finished()
    }

    /// Blocks the current thread until the task has finished.
    ///
    /// Don’t call this from a thread that the task’s runtime needs for
    /// making progress. For async code, use [`Task::result`].
    pub fn wait_for_result(&self) -> KmipResult<Option<T>> {
        let mut info = self.cell.info.lock().unwrap();
        while !info.state.is_finished() {
            info = self.cell.finished.wait(info).unwrap();
        }
        info.outcome()
    }

    /// Waits for the task to finish.
    pub async fn result(&self) -> KmipResult<Option<T>> {
        loop {
            // Register interest before checking so a completion between the
            // check and the await is not lost.
            let notified = self.cell.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let info = self.cell.info.lock().unwrap();
                if info.state.is_finished() {
                    return info.outcome()
                }
            }
            notified.await;
        }
    }
}


//------------ TaskCell ------------------------------------------------------

/// The state shared between a task handle and the unit of work.
struct TaskCell<T> {
    info: Mutex<TaskInfo<T>>,

    /// Signalled for blocking waiters upon completion.
    finished: Condvar,

    /// Signalled for async waiters upon completion.
    notify: Notify,
}

impl<T> TaskCell<T> {
    fn new(key: String, name: &str) -> Self {
        TaskCell {
            info: Mutex::new(TaskInfo {
                key,
                name: name.to_string(),
                state: TaskState::Queued,
                queue_time: Utc::now(),
                start_time: None,
                complete_time: None,
                result: None,
                error: None,
            }),
            finished: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn start(&self) {
        let mut info = self.info.lock().unwrap();
        info.state = TaskState::Running;
        info.start_time = Some(Utc::now());
    }

    fn complete(&self, res: KmipResult<Option<T>>) {
        {
            let mut info = self.info.lock().unwrap();
            info.complete_time = Some(Utc::now());
            match res {
                Ok(result) => {
                    debug!("Task {} ({}) succeeded", info.key, info.name);
                    info.state = TaskState::Success;
                    info.result = result;
                }
                Err(err) => {
                    error!(
                        "Task {} ({}) failed: {}", info.key, info.name, err
                    );
                    info.state = TaskState::Error;
                    info.error = Some(err);
                }
            }
        }
        self.finished.notify_all();
        self.notify.notify_waiters();
    }
}


//------------ PendingTask ---------------------------------------------------

/// The unit of work side of a task until it has run.
///
/// If the runtime drops the work without running it, the task is completed
/// with an error so that waiters are released.
struct PendingTask<T> {
    cell: Arc<TaskCell<T>>,
    done: bool,
}

impl<T> PendingTask<T> {
    fn run<F>(mut self, op: F)
    where
        F: FnOnce() -> KmipResult<Option<T>>,
    {
        self.cell.start();
        let res = panic::catch_unwind(panic::AssertUnwindSafe(op))
            .unwrap_or_else(|payload| {
                Err(Error::TaskFailed(panic_message(payload)))
            });
        self.done = true;
        self.cell.complete(res);
    }
}

impl<T> Drop for PendingTask<T> {
    fn drop(&mut self) {
        if !self.done {
            self.cell.complete(Err(Error::TaskFailed(
                "task runtime is shut down".into()
            )));
        }
    }
}


//------------ TaskInfo ------------------------------------------------------

/// A snapshot of the state of a task.
#[derive(Clone, Debug)]
pub struct TaskInfo<T> {
    pub key: String,
    pub name: String,
    pub state: TaskState,
    pub queue_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub complete_time: Option<DateTime<Utc>>,

    /// The result of a successful task, if it produced one.
    pub result: Option<T>,

    /// The error of a failed task.
    pub error: Option<Error>,
}

impl<T: Clone> TaskInfo<T> {
    fn outcome(&self) -> KmipResult<Option<T>> {
        match self.error.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(self.result.clone()),
        }
    }
}


//------------ TaskState -----------------------------------------------------

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Error => "error",
        })
    }
}


//------------ Helpers -------------------------------------------------------

fn panic_message(payload: Box<dyn any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unit of work panicked".to_string()
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn blocking_wait() {
        let runner = TaskRunner::new(1).unwrap();
        let task = runner.submit("answer", || Ok(Some(42)));
        assert_eq!(task.wait_for_result().unwrap(), Some(42));

        let info = task.info();
        assert_eq!(info.key, "task-1");
        assert_eq!(info.name, "answer");
        assert_eq!(info.state, TaskState::Success);
        assert!(info.start_time.is_some());
        assert!(info.complete_time.is_some());

        let task = runner.submit::<_, u32>("nothing", || Ok(None));
        assert_eq!(task.key(), "task-2");
        assert_eq!(task.wait_for_result().unwrap(), None);
    }

    #[test]
    fn task_waits_for_its_work() {
        let runner = TaskRunner::new(1).unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        let task = runner.submit("gated", move || {
            rx.recv().map_err(Error::custom)?;
            Ok(Some("done".to_string()))
        });
        assert!(!task.is_finished());
        tx.send(()).unwrap();
        assert_eq!(task.wait_for_result().unwrap().as_deref(), Some("done"));
        assert!(task.is_finished());
    }

    #[test]
    fn failing_work() {
        let runner = TaskRunner::new(1).unwrap();
        let task = runner.submit::<_, ()>("fail", || {
            Err(Error::NoDefaultProvider)
        });
        assert_eq!(task.wait_for_result(), Err(Error::NoDefaultProvider));
        assert_eq!(task.info().state, TaskState::Error);
    }

    #[test]
    fn panicking_work() {
        let runner = TaskRunner::new(1).unwrap();
        let task = runner.submit::<_, ()>("panic", || panic!("boom"));
        assert_eq!(
            task.wait_for_result(), Err(Error::TaskFailed("boom".into()))
        );
    }

    #[test]
    fn work_refused_by_stopped_runtime() {
        let rt = runtime::Builder::new_current_thread().build().unwrap();
        let runner = TaskRunner::from_handle(rt.handle().clone());
        drop(rt);

        let task = runner.submit("late", || Ok(Some(1)));
        assert_eq!(
            task.wait_for_result(),
            Err(Error::TaskFailed("task runtime is shut down".into()))
        );
        assert_eq!(task.info().state, TaskState::Error);
        assert!(task.info().start_time.is_none());
    }

    #[tokio::test]
    async fn async_wait() {
        let runner = TaskRunner::current();
        assert_eq!(runner.run("answer", || Ok(Some(7))).await.unwrap(), Some(7));

        let task = runner.submit("twice", || Ok(Some(1)));
        let other = task.clone();
        assert_eq!(task.result().await.unwrap(), Some(1));
        assert_eq!(other.result().await.unwrap(), Some(1));
    }
}
