// This file is part of Relayer.
//
// Relayer is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Relayer is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Relayer.
// If not, see https://www.gnu.org/licenses/.

//! Task trait and helper functions

use async_trait::async_trait;
use futures::{future::try_join_all, Future};
use relayer_utils::handle::flatten_handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Core task trait implemented by the top level Relayer tasks.
#[async_trait]
pub trait Task: Sync + Send + 'static {
    /// Name used when logging the task lifecycle.
    fn name(&self) -> &'static str {
        "task"
    }

    /// Run the task until it completes or the token is cancelled.
    async fn run(self: Box<Self>, shutdown_token: CancellationToken) -> anyhow::Result<()>;
}

/// Spawn a set of tasks and wait for a shutdown signal.
///
/// If any task exits early every other task is cancelled. Returns once all tasks
/// have dropped their shutdown scope.
pub async fn spawn_tasks_with_shutdown<T, R, E>(
    tasks: impl IntoIterator<Item = Box<dyn Task>>,
    signal: T,
) where
    T: Future<Output = Result<R, E>> + Send + 'static,
    E: std::fmt::Debug,
{
    let (shutdown_scope, mut shutdown_wait) = mpsc::channel::<()>(1);
    let shutdown_token = CancellationToken::new();
    let mut shutdown_scope = Some(shutdown_scope);

    let handles = tasks.into_iter().map(|task| {
        let st = shutdown_token.clone();
        let ss = shutdown_scope.clone();
        let name = task.name();
        flatten_handle(tokio::spawn(async move {
            info!("Starting {name}");
            let ret = task.run(st).await;
            match &ret {
                Ok(()) => info!("{name} stopped"),
                Err(e) => error!("{name} failed: {e:?}"),
            }
            drop(ss);
            ret
        }))
    });
    tokio::select! {
        res = try_join_all(handles) => {
            error!("Task exited unexpectedly: {res:?}");
        }
        res = signal => {
            match res {
                Ok(_) => {
                    info!("Received signal, shutting down");
                }
                Err(err) => {
                    error!("Error while waiting for signal: {err:?}");
                }
            }
        }
    }

    shutdown_token.cancel();
    shutdown_scope.take();
    shutdown_wait.recv().await;
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use super::*;

    struct WaitForShutdown(Arc<AtomicBool>);

    #[async_trait]
    impl Task for WaitForShutdown {
        async fn run(self: Box<Self>, shutdown_token: CancellationToken) -> anyhow::Result<()> {
            shutdown_token.cancelled().await;
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailImmediately;

    #[async_trait]
    impl Task for FailImmediately {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(self: Box<Self>, _shutdown_token: CancellationToken) -> anyhow::Result<()> {
            anyhow::bail!("failed")
        }
    }

    #[tokio::test]
    async fn signal_cancels_tasks() {
        let stopped = Arc::new(AtomicBool::new(false));
        let tasks: Vec<Box<dyn Task>> = vec![Box::new(WaitForShutdown(Arc::clone(&stopped)))];
        spawn_tasks_with_shutdown(tasks, async { Ok::<_, ()>(()) }).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failing_task_cancels_others() {
        let stopped = Arc::new(AtomicBool::new(false));
        let tasks: Vec<Box<dyn Task>> = vec![
            Box::new(WaitForShutdown(Arc::clone(&stopped))),
            Box::new(FailImmediately),
        ];
        spawn_tasks_with_shutdown(tasks, futures::future::pending::<Result<(), ()>>()).await;
        assert!(stopped.load(Ordering::SeqCst));
    }
}
