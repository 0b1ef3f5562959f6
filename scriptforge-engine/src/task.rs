//! Script task scheduling.
//!
//! Tasks wrap script functions for deferred, repeated, or off-main
//! execution. Everything here is built on the three host primitives
//! (`run_on_main`, `schedule_delayed`, `spawn_async`); the manager adds
//! identity, bookkeeping, and cancellation on top.
//!
//! Cancellation is race-safe: every task carries a shared flag checked
//! right before the body runs, so a cancel landing after the host timer has
//! fired but before the body starts still wins. A repeating task whose body
//! errors is reported and keeps its schedule.

use crate::exception::ExceptionBridge;
use crate::registry::ScriptRegistry;
use scriptforge_host_core::{CancelHandle, HostAdapter, Runnable, ScriptError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Identity of a scheduled task. Unique for the engine's lifetime; ids are
/// never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TaskError {
    /// The named script is not loaded, or is past the point of owning
    /// tasks.
    #[error("script '{script}' is not loaded")]
    UnknownScript { script: String },
}

/// A named script function taking no arguments, used as a task body.
#[derive(Clone)]
pub struct TaskCallback {
    name: String,
    fun: Arc<dyn Fn() -> Result<(), ScriptError> + Send + Sync>,
}

impl TaskCallback {
    pub fn new(
        name: impl Into<String>,
        fun: impl Fn() -> Result<(), ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self) -> Result<(), ScriptError> {
        (self.fun)()
    }
}

/// A named script function producing a value off-main, for callback tasks.
#[derive(Clone)]
pub struct ProducerCallback {
    name: String,
    fun: Arc<dyn Fn() -> Result<serde_json::Value, ScriptError> + Send + Sync>,
}

impl ProducerCallback {
    pub fn new(
        name: impl Into<String>,
        fun: impl Fn() -> Result<serde_json::Value, ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self) -> Result<serde_json::Value, ScriptError> {
        (self.fun)()
    }
}

/// A named script function receiving a produced value on the main context.
#[derive(Clone)]
pub struct ValueCallback {
    name: String,
    fun: Arc<dyn Fn(serde_json::Value) -> Result<(), ScriptError> + Send + Sync>,
}

impl ValueCallback {
    pub fn new(
        name: impl Into<String>,
        fun: impl Fn(serde_json::Value) -> Result<(), ScriptError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            fun: Arc::new(fun),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, value: serde_json::Value) -> Result<(), ScriptError> {
        (self.fun)(value)
    }
}

struct TaskEntry {
    script: String,
    cancelled: Arc<AtomicBool>,
    handle: Option<Box<dyn CancelHandle>>,
}

/// State shared between the manager and in-flight task closures.
struct TaskShared {
    host: Arc<dyn HostAdapter>,
    bridge: Arc<ExceptionBridge>,
    scripts: Arc<ScriptRegistry>,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

/// Tracks every live task, keyed by [`TaskId`]. Scheduling requires the
/// owning script to be loading or running.
pub struct TaskManager {
    shared: Arc<TaskShared>,
}

impl TaskManager {
    pub fn new(
        host: Arc<dyn HostAdapter>,
        bridge: Arc<ExceptionBridge>,
        scripts: Arc<ScriptRegistry>,
    ) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                host,
                bridge,
                scripts,
                next_id: AtomicU64::new(1),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Run `callback` on the main context as soon as possible.
    pub fn run_task(&self, script: &str, callback: TaskCallback) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        let work = TaskShared::one_shot_body(&self.shared, id, script.to_string(), callback, cancelled);
        self.shared.host.run_on_main(work);
        Ok(id)
    }

    /// Run `callback` on the worker pool as soon as possible.
    pub fn run_task_async(&self, script: &str, callback: TaskCallback) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        let work = TaskShared::one_shot_body(&self.shared, id, script.to_string(), callback, cancelled);
        self.shared.host.spawn_async(work);
        Ok(id)
    }

    /// Run `callback` on the main context after `delay`.
    pub fn run_task_later(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
    ) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        let body = TaskShared::one_shot_body(&self.shared, id, script.to_string(), callback, cancelled);
        let shared = Arc::clone(&self.shared);
        let handle = self
            .shared
            .host
            .schedule_delayed(Box::new(move || shared.host.run_on_main(body)), delay);
        self.shared.set_handle(id, handle);
        Ok(id)
    }

    /// Run `callback` on the worker pool after `delay`.
    pub fn run_task_later_async(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
    ) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        let body = TaskShared::one_shot_body(&self.shared, id, script.to_string(), callback, cancelled);
        let shared = Arc::clone(&self.shared);
        let handle = self
            .shared
            .host
            .schedule_delayed(Box::new(move || shared.host.spawn_async(body)), delay);
        self.shared.set_handle(id, handle);
        Ok(id)
    }

    /// Run `callback` on the main context every `interval`, first after
    /// `delay`. The schedule survives body errors; it ends only on cancel.
    pub fn schedule_repeating(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
        interval: Duration,
    ) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        TaskShared::arm_repeating(
            &self.shared,
            id,
            script.to_string(),
            callback,
            delay,
            interval,
            false,
            cancelled,
        );
        Ok(id)
    }

    /// Run `callback` on the worker pool every `interval`, first after
    /// `delay`.
    pub fn schedule_repeating_async(
        &self,
        script: &str,
        callback: TaskCallback,
        delay: Duration,
        interval: Duration,
    ) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        TaskShared::arm_repeating(
            &self.shared,
            id,
            script.to_string(),
            callback,
            delay,
            interval,
            true,
            cancelled,
        );
        Ok(id)
    }

    /// Run `producer` on the worker pool, then hand its value to `callback`
    /// on the main context. A producer error is reported and the callback
    /// is skipped.
    pub fn run_with_callback(
        &self,
        script: &str,
        producer: ProducerCallback,
        callback: ValueCallback,
    ) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        let work =
            TaskShared::callback_body(&self.shared, id, script.to_string(), producer, callback, cancelled);
        self.shared.host.spawn_async(work);
        Ok(id)
    }

    /// Like [`run_with_callback`], with the producer starting after `delay`.
    ///
    /// [`run_with_callback`]: TaskManager::run_with_callback
    pub fn run_with_callback_later(
        &self,
        script: &str,
        producer: ProducerCallback,
        callback: ValueCallback,
        delay: Duration,
    ) -> Result<TaskId, TaskError> {
        let (id, cancelled) = self.shared.track(script)?;
        let work =
            TaskShared::callback_body(&self.shared, id, script.to_string(), producer, callback, cancelled);
        let shared = Arc::clone(&self.shared);
        let handle = self
            .shared
            .host
            .schedule_delayed(Box::new(move || shared.host.spawn_async(work)), delay);
        self.shared.set_handle(id, handle);
        Ok(id)
    }

    /// Cancel a task. A run already in progress completes; a run that has
    /// not started never will. Returns whether the task was live.
    pub fn cancel(&self, id: TaskId) -> bool {
        self.shared.cancel(id)
    }

    /// Cancel every task belonging to `script`. Returns how many were live.
    pub fn cancel_script_tasks(&self, script: &str) -> usize {
        let ids: Vec<TaskId> = {
            let tasks = self.shared.tasks.lock().expect("task table poisoned");
            tasks
                .iter()
                .filter(|(_, e)| e.script == script)
                .map(|(id, _)| *id)
                .collect()
        };
        let count = ids.len();
        for id in ids {
            self.shared.cancel(id);
        }
        count
    }

    /// Whether the task is still tracked (scheduled or mid-run).
    pub fn is_active(&self, id: TaskId) -> bool {
        self.shared
            .tasks
            .lock()
            .expect("task table poisoned")
            .contains_key(&id)
    }

    /// Ids of the script's live tasks.
    pub fn tasks_of(&self, script: &str) -> Vec<TaskId> {
        let tasks = self.shared.tasks.lock().expect("task table poisoned");
        let mut ids: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, e)| e.script == script)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn task_count(&self) -> usize {
        self.shared.tasks.lock().expect("task table poisoned").len()
    }
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("live_tasks", &self.task_count())
            .finish()
    }
}

impl TaskShared {
    fn track(&self, script: &str) -> Result<(TaskId, Arc<AtomicBool>), TaskError> {
        let mut tasks = self.tasks.lock().expect("task table poisoned");
        // Checked under the task lock: an unload marks the script before it
        // sweeps tasks, so a schedule racing the sweep either lands in time
        // to be cancelled or sees the script as gone.
        if !self.scripts.is_live(script) {
            return Err(TaskError::UnknownScript {
                script: script.to_string(),
            });
        }
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancelled = Arc::new(AtomicBool::new(false));
        tasks.insert(
            id,
            TaskEntry {
                script: script.to_string(),
                cancelled: Arc::clone(&cancelled),
                handle: None,
            },
        );
        Ok((id, cancelled))
    }

    fn finish(&self, id: TaskId) {
        self.tasks.lock().expect("task table poisoned").remove(&id);
    }

    fn cancel(&self, id: TaskId) -> bool {
        let entry = {
            let mut tasks = self.tasks.lock().expect("task table poisoned");
            tasks.remove(&id)
        };
        match entry {
            Some(entry) => {
                entry.cancelled.store(true, Ordering::SeqCst);
                if let Some(handle) = entry.handle {
                    handle.cancel();
                }
                debug!(script = %entry.script, task = %id, "cancelled task");
                true
            }
            None => false,
        }
    }

    /// Attach the host's cancel handle to a tracked task. The task may
    /// already have finished (the work can run before scheduling returns);
    /// the orphaned handle is then cancelled to release the host timer.
    fn set_handle(&self, id: TaskId, handle: Box<dyn CancelHandle>) {
        let mut tasks = self.tasks.lock().expect("task table poisoned");
        match tasks.get_mut(&id) {
            Some(entry) => entry.handle = Some(handle),
            None => handle.cancel(),
        }
    }

    fn one_shot_body(
        shared: &Arc<Self>,
        id: TaskId,
        script: String,
        callback: TaskCallback,
        cancelled: Arc<AtomicBool>,
    ) -> Runnable {
        let shared = Arc::clone(shared);
        Box::new(move || {
            if !cancelled.load(Ordering::SeqCst) {
                if let Err(error) = callback.call() {
                    shared
                        .bridge
                        .report(&script, callback.name(), &format!("task {id}"), &error);
                }
            }
            shared.finish(id);
        })
    }

    fn callback_body(
        shared: &Arc<Self>,
        id: TaskId,
        script: String,
        producer: ProducerCallback,
        callback: ValueCallback,
        cancelled: Arc<AtomicBool>,
    ) -> Runnable {
        let shared = Arc::clone(shared);
        Box::new(move || {
            if cancelled.load(Ordering::SeqCst) {
                shared.finish(id);
                return;
            }
            match producer.call() {
                Err(error) => {
                    shared
                        .bridge
                        .report(&script, producer.name(), &format!("task {id}"), &error);
                    shared.finish(id);
                }
                Ok(value) => {
                    let inner = Arc::clone(&shared);
                    shared.host.run_on_main(Box::new(move || {
                        if !cancelled.load(Ordering::SeqCst) {
                            if let Err(error) = callback.call(value) {
                                inner.bridge.report(
                                    &script,
                                    callback.name(),
                                    &format!("task {id} callback"),
                                    &error,
                                );
                            }
                        }
                        inner.finish(id);
                    }));
                }
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn arm_repeating(
        shared: &Arc<Self>,
        id: TaskId,
        script: String,
        callback: TaskCallback,
        delay: Duration,
        interval: Duration,
        run_async: bool,
        cancelled: Arc<AtomicBool>,
    ) {
        let timer_shared = Arc::clone(shared);
        let timer_work: Runnable = Box::new(move || {
            let tick_shared = Arc::clone(&timer_shared);
            let body: Runnable = Box::new(move || {
                if cancelled.load(Ordering::SeqCst) {
                    tick_shared.finish(id);
                    return;
                }
                if let Err(error) = callback.call() {
                    tick_shared.bridge.report(
                        &script,
                        callback.name(),
                        &format!("repeating task {id}"),
                        &error,
                    );
                }
                if cancelled.load(Ordering::SeqCst) {
                    tick_shared.finish(id);
                    return;
                }
                TaskShared::arm_repeating(
                    &Arc::clone(&tick_shared),
                    id,
                    script,
                    callback,
                    interval,
                    interval,
                    run_async,
                    cancelled,
                );
            });
            if run_async {
                timer_shared.host.spawn_async(body);
            } else {
                timer_shared.host.run_on_main(body);
            }
        });
        let handle = shared.host.schedule_delayed(timer_work, delay);
        shared.set_handle(id, handle);
    }
}
