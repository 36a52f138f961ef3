// Copyright 2020-2023 Tauri Programme within The Commons Conservancy
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The ordered task queue async router handlers run on.
//!
//! Tasks enqueued from one thread execute in submission order; with more
//! than one worker, cross-thread ordering is unspecified. Dropping the
//! dispatcher closes the queue and joins the workers after the remaining
//! tasks drain.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct Dispatcher {
  sender: Option<Sender<Task>>,
  workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
  /// A dispatcher with a single worker: total FIFO execution.
  pub fn new() -> Self {
    Self::with_workers(1)
  }

  pub fn with_workers(count: usize) -> Self {
    let (sender, receiver) = unbounded::<Task>();
    let workers = (0..count.max(1))
      .map(|index| {
        let receiver = receiver.clone();
        thread::Builder::new()
          .name(format!("socket-bridge-dispatcher-{index}"))
          .spawn(move || {
            while let Ok(task) = receiver.recv() {
              task();
            }
          })
          .expect("failed to spawn dispatcher worker")
      })
      .collect();

    Self {
      sender: Some(sender),
      workers,
    }
  }

  /// Enqueue a task. Returns `false` once the dispatcher has shut down.
  pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) -> bool {
    match &self.sender {
      Some(sender) => sender.send(Box::new(task)).is_ok(),
      None => false,
    }
  }
}

impl Default for Dispatcher {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for Dispatcher {
  fn drop(&mut self) {
    // closing the channel lets the workers drain and exit
    self.sender.take();
    let current = thread::current().id();
    for worker in self.workers.drain(..) {
      // a dispatcher dropped from one of its own tasks must not join
      // that worker
      if worker.thread().id() != current {
        let _ = worker.join();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc,
  };

  #[test]
  fn executes_tasks_in_submission_order() {
    let dispatcher = Dispatcher::new();
    let (sender, receiver) = mpsc::channel();
    for index in 0..16 {
      let sender = sender.clone();
      assert!(dispatcher.dispatch(move || {
        sender.send(index).unwrap();
      }));
    }
    let observed: Vec<i32> = (0..16).map(|_| receiver.recv().unwrap()).collect();
    assert_eq!(observed, (0..16).collect::<Vec<_>>());
  }

  #[test]
  fn drop_drains_pending_tasks() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
      let dispatcher = Dispatcher::new();
      for _ in 0..8 {
        let counter = counter.clone();
        dispatcher.dispatch(move || {
          counter.fetch_add(1, Ordering::SeqCst);
        });
      }
    }
    assert_eq!(counter.load(Ordering::SeqCst), 8);
  }
}
