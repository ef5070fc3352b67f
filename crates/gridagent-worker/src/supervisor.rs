//! Top-level lifecycle loop.
//!
//! One task at a time: acquire, then run the execution driver and the lease
//! renewer concurrently and wait for both before looping. Shutdown is
//! polled only between iterations, so an in-flight task always runs to
//! completion before the process exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{sleep, Duration};

use crate::acquire::TaskAcquirer;
use crate::context::TaskContext;
use crate::execute::ExecutionDriver;
use crate::lease::LeaseRenewer;
use crate::runtime::ComputeRuntime;

pub struct Supervisor {
    acquirer: TaskAcquirer,
    driver: ExecutionDriver,
    renewer: LeaseRenewer,
    runtime: Option<Arc<dyn ComputeRuntime>>,
    backoff_base_sec: u64,
    shutdown: Arc<AtomicBool>,
}

/// Raise `flag` on the first graceful-termination signal. The supervisor
/// only reads the flag between iterations.
pub fn spawn_shutdown_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("termination signal received, finishing current iteration");
                flag.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install termination handler");
            }
        }
    });
}

impl Supervisor {
    pub fn new(
        acquirer: TaskAcquirer,
        driver: ExecutionDriver,
        renewer: LeaseRenewer,
        runtime: Option<Arc<dyn ComputeRuntime>>,
        backoff_base_sec: u64,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            acquirer,
            driver,
            renewer,
            runtime,
            backoff_base_sec,
            shutdown,
        }
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!("starting main event loop");

        while !self.shutdown.load(Ordering::SeqCst) {
            match self.acquirer.try_acquire().await? {
                Some(ctx) => {
                    self.run_task(ctx).await?;
                    tracing::debug!("back to main loop");
                }
                None => {
                    // Randomized so an idle fleet does not wake in lockstep.
                    let base = self.backoff_base_sec as f64;
                    let backoff_sec = if base > 0.0 {
                        let mut rng = rand::rng();
                        rng.random_range(base..base * 2.0)
                    } else {
                        0.0
                    };
                    tracing::info!(
                        backoff_sec = backoff_sec,
                        "could not acquire a task from the queue, backing off"
                    );
                    sleep(Duration::from_secs_f64(backoff_sec)).await;
                }
            }
        }

        if let Some(runtime) = &self.runtime {
            match runtime.stop().await {
                Ok(()) => tracing::info!("runtime successfully stopped"),
                Err(e) => tracing::warn!(error = %e, "failed stopping the runtime"),
            }
        }
        Ok(())
    }

    /// Execution and lease renewal share the task slot; awaiting both here
    /// guarantees no renewal write is still in flight when the next
    /// iteration starts.
    async fn run_task(&self, ctx: TaskContext) -> Result<()> {
        let (exec_result, lease_held) =
            tokio::join!(self.driver.run(&ctx), self.renewer.run(&ctx));
        if !lease_held {
            tracing::warn!(task_id = %ctx.task_id, "lease was lost during execution");
        }
        exec_result?;
        tracing::info!(task_id = %ctx.task_id, "finished task");
        Ok(())
    }
}
