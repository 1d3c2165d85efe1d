//! Actor group with a shared shutdown
//!
//! Every actor is a `(run, interrupt)` pair. All runs start together; as soon
//! as the first one returns, every interrupt is invoked once with that
//! actor's error, and the group then waits for the remaining runs to return.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info};

type RunFuture<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send>>;
type Interrupt<E> = Box<dyn FnOnce(Option<&E>) + Send>;

struct Actor<E> {
    name: String,
    run: RunFuture<E>,
    interrupt: Interrupt<E>,
}

/// A set of actors that live and die together
pub struct RunGroup<E> {
    actors: Vec<Actor<E>>,
}

impl<E> Default for RunGroup<E> {
    fn default() -> Self {
        Self { actors: Vec::new() }
    }
}

impl<E> RunGroup<E>
where
    E: From<JoinError> + Display + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actor
    ///
    /// `interrupt` must make `run` return promptly.
    pub fn add<F, I>(&mut self, name: impl Into<String>, run: F, interrupt: I)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        I: FnOnce(Option<&E>) + Send + 'static,
    {
        self.actors.push(Actor {
            name: name.into(),
            run: Box::pin(run),
            interrupt: Box::new(interrupt),
        });
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Run every actor; returns the result of the first one to return
    pub async fn run(self) -> Result<(), E> {
        if self.actors.is_empty() {
            return Ok(());
        }

        let mut set = JoinSet::new();
        let mut names = Vec::with_capacity(self.actors.len());
        let mut interrupts = Vec::with_capacity(self.actors.len());
        for (index, actor) in self.actors.into_iter().enumerate() {
            names.push(actor.name);
            interrupts.push(actor.interrupt);
            let run = actor.run;
            set.spawn(async move { (index, run.await) });
        }

        let first = match set.join_next().await {
            Some(Ok((index, result))) => {
                match &result {
                    Ok(()) => info!(actor = %names[index], "actor finished, shutting down"),
                    Err(err) => info!(actor = %names[index], err = %err, "actor failed, shutting down"),
                }
                result
            }
            Some(Err(join_err)) => Err(E::from(join_err)),
            None => Ok(()),
        };

        for interrupt in interrupts {
            interrupt(first.as_ref().err());
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(()))) => debug!(actor = %names[index], "actor finished"),
                Ok((index, Err(err))) => debug!(actor = %names[index], err = %err, "actor finished with error"),
                Err(join_err) => debug!(err = %join_err, "actor task failed"),
            }
        }

        first
    }
}
