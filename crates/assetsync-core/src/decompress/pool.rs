//! Fixed worker threads per task category with completions returned over a channel.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    Io,
    Network,
    Other,
}

impl TaskCategory {
    fn name(self) -> &'static str {
        match self {
            TaskCategory::Io => "io",
            TaskCategory::Network => "net",
            TaskCategory::Other => "other",
        }
    }
}

type Job<T> = Box<dyn FnOnce() -> T + Send + 'static>;

struct Lane<T> {
    jobs: Option<Sender<Job<T>>>,
    workers: Vec<JoinHandle<()>>,
}

/// Runs submitted closures on per-category workers. Results are collected by
/// the owner with [`TaskPool::drain`], never delivered on a worker thread.
///
/// A category's workers are spawned on its first submission.
pub struct TaskPool<T: Send + 'static> {
    workers_per_lane: usize,
    lanes: HashMap<TaskCategory, Lane<T>>,
    done_tx: Sender<T>,
    done_rx: Receiver<T>,
    /// Results of jobs that had to run on the submitting thread.
    ready: Vec<T>,
    outstanding: usize,
}

impl<T: Send + 'static> TaskPool<T> {
    /// `workers` threads per category (at least one).
    pub fn new(workers: usize) -> Self {
        let (done_tx, done_rx) = mpsc::channel::<T>();
        Self {
            workers_per_lane: workers.max(1),
            lanes: HashMap::new(),
            done_tx,
            done_rx,
            ready: Vec::new(),
            outstanding: 0,
        }
    }

    fn spawn_lane(&self, category: TaskCategory) -> std::io::Result<Lane<T>> {
        let (job_tx, job_rx) = mpsc::channel::<Job<T>>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut workers = Vec::with_capacity(self.workers_per_lane);
        for i in 0..self.workers_per_lane {
            let job_rx = Arc::clone(&job_rx);
            let done_tx = self.done_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("assetsync-{}-{}", category.name(), i))
                .spawn(move || worker_loop(job_rx, done_tx))?;
            workers.push(handle);
        }
        tracing::debug!(category = category.name(), workers = workers.len(), "task lane started");
        Ok(Lane {
            jobs: Some(job_tx),
            workers,
        })
    }

    /// Queue `job` on `category`. If the lane cannot take it the job runs on
    /// the calling thread and its result is returned by the next drain.
    pub fn submit<F>(&mut self, category: TaskCategory, job: F)
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.outstanding += 1;
        if !self.lanes.contains_key(&category) {
            match self.spawn_lane(category) {
                Ok(lane) => {
                    self.lanes.insert(category, lane);
                }
                Err(e) => {
                    tracing::error!(category = category.name(), error = %e, "could not start task lane; running inline");
                    self.ready.push(job());
                    return;
                }
            }
        }
        let job: Job<T> = Box::new(job);
        let rejected = match self.lanes.get(&category).and_then(|lane| lane.jobs.as_ref()) {
            Some(tx) => tx.send(job).err().map(|e| e.0),
            None => Some(job),
        };
        if let Some(job) = rejected {
            tracing::error!(category = category.name(), "task lane closed; running inline");
            self.ready.push(job());
        }
    }

    /// Completed results since the last drain.
    pub fn drain(&mut self) -> Vec<T> {
        let mut done = std::mem::take(&mut self.ready);
        done.extend(self.done_rx.try_iter());
        self.outstanding = self.outstanding.saturating_sub(done.len());
        done
    }

    /// Jobs submitted but not yet drained.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Categories whose workers have been started.
    pub fn started_lanes(&self) -> usize {
        self.lanes.len()
    }
}

fn worker_loop<T>(jobs: Arc<Mutex<Receiver<Job<T>>>>, done: Sender<T>) {
    loop {
        let job = {
            let Ok(rx) = jobs.lock() else {
                return;
            };
            match rx.recv() {
                Ok(job) => job,
                Err(_) => return,
            }
        };
        if done.send(job()).is_err() {
            return;
        }
    }
}

impl<T: Send + 'static> Drop for TaskPool<T> {
    fn drop(&mut self) {
        for lane in self.lanes.values_mut() {
            lane.jobs.take();
            for handle in lane.workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
