use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_shutdown::Shutdown;
use tracing::{Instrument, debug, info_span};

type MutableJoinSet = Rc<RefCell<JoinSet<()>>>;

#[derive(Debug, Error)]
pub enum TaskBuilderError {
    #[error("Failed to install shutdown signal handler: {0}")]
    Shutdown(String),
}

/// Owns every long-running task of the process and the shared shutdown signal.
pub struct Builder {
    join_set: MutableJoinSet,
    shutdown: Shutdown,
}

impl Builder {
    pub fn new() -> Result<Self, TaskBuilderError> {
        let shutdown = Shutdown::new().map_err(|err| TaskBuilderError::Shutdown(err.to_string()))?;
        Ok(Self {
            join_set: MutableJoinSet::default(),
            shutdown,
        })
    }

    pub fn new_task(&self, name: &'static str) -> Spawner {
        Spawner {
            name,
            join_set: self.join_set.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Cloned into reconcilers so in-flight work can be abandoned on shutdown.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub async fn join_all(self) {
        let join_set = self.join_set.take();
        let _ = join_set.join_all().await;
    }
}

pub struct Spawner {
    name: &'static str,
    join_set: MutableJoinSet,
    shutdown: Shutdown,
}

impl Spawner {
    #[track_caller]
    pub fn spawn<F>(self, task: F)
    where
        F: Future<Output = ()>,
        F: Send + 'static,
    {
        debug!("Spawning task '{}'", self.name);
        let span = info_span!("task", name = self.name);
        self.join_set.borrow_mut().spawn(task.instrument(span));
    }

    #[track_caller]
    pub fn spawn_on_shutdown<F>(self, task: F)
    where
        F: Future<Output = ()>,
        F: Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        self.spawn(async move {
            let () = shutdown.handle().await;
            task.await;
        });
    }
}
