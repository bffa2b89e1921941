use super::protocol::{self, Reply, Request, Response};
use super::WorkerCommand;
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::executor::TaskHandle;
use crate::pool::{Completion, WorkerPool};
use crate::routing::TaskError;
use crate::task_fn::RemoteTask;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::BufReader;
use std::marker::PhantomData;
use std::process::{Child, ChildStdin, ChildStdout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Delivery = std::result::Result<Reply, String>;

struct Job {
    handle: TaskHandle,
    request: Request,
}

struct Delivered {
    handle: TaskHandle,
    // Err: the worker went away before replying
    reply: Delivery,
    elapsed: Duration,
}

/// Process-backed pool.
///
/// Starts `max_workers` worker processes up front. Each one is driven by a
/// dispatcher thread that pulls jobs from a shared queue, so a worker runs one
/// task at a time and a slow task never blocks the others. Dropping the pool
/// lets queued jobs finish, closes every worker's stdin and waits for it to
/// exit.
pub struct ProcessPool<T, E> {
    jobs: Option<Sender<Job>>,
    delivered_tx: Sender<Delivered>,
    delivered_rx: Receiver<Delivered>,
    dispatchers: Vec<JoinHandle<()>>,
    workers: usize,
    live: Arc<AtomicUsize>,
    _marker: PhantomData<fn() -> (T, E)>,
}

impl<T, E> ProcessPool<T, E> {
    pub fn new(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let command = config.worker_command()?;
        let workers = config.worker_count();
        let live = Arc::new(AtomicUsize::new(0));

        // all workers start before any job is queued; a failure here is fatal
        let mut processes = Vec::with_capacity(workers);
        for _ in 0..workers {
            processes.push(WorkerProcess::spawn(&command, &live)?);
        }

        let (jobs_tx, jobs_rx) = unbounded();
        let (delivered_tx, delivered_rx) = unbounded();

        let mut pool = Self {
            jobs: Some(jobs_tx),
            delivered_tx: delivered_tx.clone(),
            delivered_rx,
            dispatchers: Vec::with_capacity(workers),
            workers,
            live: live.clone(),
            _marker: PhantomData,
        };

        for (index, process) in processes.into_iter().enumerate() {
            let dispatcher = Dispatcher {
                index,
                command: command.clone(),
                process: Some(process),
                jobs: jobs_rx.clone(),
                delivered: delivered_tx.clone(),
                live: live.clone(),
            };

            let thread = thread::Builder::new()
                .name(format!("{}-dispatch-{}", config.thread_name_prefix, index))
                .spawn(move || dispatcher.run())
                .map_err(|e| Error::spawn(format!("dispatcher thread {}: {}", index, e)))?;
            pool.dispatchers.push(thread);
        }

        tracing::debug!(
            workers,
            program = %command.program().display(),
            "process pool started"
        );
        Ok(pool)
    }

    /// Worker processes currently running.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn deliver(&self, handle: TaskHandle, reply: Delivery) {
        // delivered_rx lives as long as self
        let _ = self.delivered_tx.send(Delivered {
            handle,
            reply,
            elapsed: Duration::ZERO,
        });
    }
}

impl<F, I, A> WorkerPool<F, I, A> for ProcessPool<F::Output, F::Error>
where
    F: RemoteTask<I, A>,
    I: Serialize,
    A: Serialize,
    F::Output: DeserializeOwned,
    F::Error: DeserializeOwned,
{
    fn submit(&mut self, func: &Arc<F>, item: I, args: &Arc<A>) -> TaskHandle {
        let handle = TaskHandle::next();

        let item = match serde_json::to_value(&item) {
            Ok(item) => item,
            Err(e) => {
                self.deliver(handle, Ok(Reply::Transfer(format!("encoding item: {}", e))));
                return handle;
            }
        };
        let args = match serde_json::to_value(&**args) {
            Ok(args) => args,
            Err(e) => {
                self.deliver(handle, Ok(Reply::Transfer(format!("encoding args: {}", e))));
                return handle;
            }
        };

        let job = Job {
            handle,
            request: Request {
                id: handle.id(),
                task: func.name().to_string(),
                item,
                args,
            },
        };

        let queued = match &self.jobs {
            Some(jobs) => jobs.send(job).is_ok(),
            None => false,
        };
        if !queued {
            self.deliver(handle, Err("no dispatcher is running".to_string()));
        }

        handle
    }

    fn next_completed(&mut self) -> Result<Completion<F::Output, F::Error>> {
        let delivered = self
            .delivered_rx
            .recv()
            .map_err(|_| Error::executor("process pool completion channel closed"))?;

        Ok(Completion {
            handle: delivered.handle,
            result: decode_reply(delivered.reply),
            elapsed: delivered.elapsed,
        })
    }

    fn workers(&self) -> usize {
        self.workers
    }
}

impl<T, E> Drop for ProcessPool<T, E> {
    fn drop(&mut self) {
        // closing the queue ends every dispatcher loop once it is drained
        drop(self.jobs.take());

        for dispatcher in self.dispatchers.drain(..) {
            if dispatcher.join().is_err() {
                tracing::error!("process pool dispatcher panicked");
            }
        }

        tracing::debug!(live = self.live_workers(), "process pool stopped");
    }
}

impl<T, E> std::fmt::Debug for ProcessPool<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPool")
            .field("workers", &self.workers)
            .field("live_workers", &self.live_workers())
            .finish()
    }
}

fn decode_reply<T, E>(reply: Delivery) -> std::result::Result<T, TaskError<E>>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    match reply {
        Ok(Reply::Ok(value)) => serde_json::from_value(value)
            .map_err(|e| TaskError::Transfer(format!("decoding result: {}", e))),
        Ok(Reply::Err(value)) => match serde_json::from_value(value) {
            Ok(err) => Err(TaskError::Failed(err)),
            Err(e) => Err(TaskError::Transfer(format!("decoding error: {}", e))),
        },
        Ok(Reply::Panic(panic)) => Err(TaskError::Panicked(panic)),
        Ok(Reply::Transfer(msg)) => Err(TaskError::Transfer(msg)),
        Err(msg) => Err(TaskError::WorkerLost(msg)),
    }
}

struct Dispatcher {
    index: usize,
    command: WorkerCommand,
    process: Option<WorkerProcess>,
    jobs: Receiver<Job>,
    delivered: Sender<Delivered>,
    live: Arc<AtomicUsize>,
}

impl Dispatcher {
    fn run(mut self) {
        for job in self.jobs.clone().iter() {
            let started = Instant::now();
            let reply = self.exchange(&job.request);

            if self
                .delivered
                .send(Delivered {
                    handle: job.handle,
                    reply,
                    elapsed: started.elapsed(),
                })
                .is_err()
            {
                break;
            }
        }
    }

    fn exchange(&mut self, request: &Request) -> Delivery {
        let Some(process) = self.process.as_mut() else {
            return Err(format!("worker {} could not be restarted", self.index));
        };

        match process.exchange(request) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                tracing::warn!(
                    worker = self.index,
                    task = request.id,
                    error = %err,
                    "worker process failed mid-task, restarting"
                );

                if let Some(process) = self.process.take() {
                    process.kill();
                }
                self.process = match WorkerProcess::spawn(&self.command, &self.live) {
                    Ok(process) => Some(process),
                    Err(spawn_err) => {
                        tracing::error!(worker = self.index, error = %spawn_err, "worker restart failed");
                        None
                    }
                };

                Err(err.to_string())
            }
        }
    }
}

struct WorkerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    live: Arc<AtomicUsize>,
}

impl WorkerProcess {
    fn spawn(command: &WorkerCommand, live: &Arc<AtomicUsize>) -> Result<Self> {
        let mut child = command.spawn()?;

        match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                live.fetch_add(1, Ordering::SeqCst);
                tracing::trace!(pid = child.id(), "worker process started");
                Ok(Self {
                    child,
                    stdin: Some(stdin),
                    stdout: BufReader::new(stdout),
                    live: live.clone(),
                })
            }
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                Err(Error::spawn("worker stdio was not captured"))
            }
        }
    }

    fn exchange(&mut self, request: &Request) -> Result<Reply> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::executor("worker stdin already closed"))?;
        protocol::write_frame(stdin, request)?;

        match protocol::read_frame::<_, Response>(&mut self.stdout)? {
            Some(response) if response.id == request.id => Ok(response.reply),
            Some(response) => Err(Error::protocol(format!(
                "expected reply to request {}, got {}",
                request.id, response.id
            ))),
            None => {
                let status = match self.child.try_wait() {
                    Ok(Some(status)) => status.to_string(),
                    _ => "stdout closed".to_string(),
                };
                Err(Error::executor(format!("worker exited before replying ({})", status)))
            }
        }
    }

    fn kill(mut self) {
        if let Err(e) = self.child.kill() {
            tracing::debug!(pid = self.child.id(), error = %e, "kill failed; worker already gone");
        }
        // Drop reaps the child
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        // EOF on stdin ends the worker's serve loop
        drop(self.stdin.take());

        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::debug!(pid = self.child.id(), %status, "worker process exited abnormally");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(pid = self.child.id(), error = %e, "failed to reap worker process");
            }
        }

        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
