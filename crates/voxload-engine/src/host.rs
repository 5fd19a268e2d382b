use crate::signal::{self, VuSignal};
use crate::vu::{run_vu, IterationBudget, VuContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct RunningVu {
    id: usize,
    signal: Arc<watch::Sender<VuSignal>>,
    handle: Option<JoinHandle<()>>,
}

impl RunningVu {
    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

/// Owns the virtual user tasks of a run.
///
/// Retirement is cooperative: a retired VU finishes its conversation and
/// exits on its own. One still running when the drain window closes is
/// halted and stops at its next step boundary.
pub struct VuHost {
    context: Arc<VuContext>,
    budget: IterationBudget,
    drain: Duration,
    active: Vec<RunningVu>,
    retiring: Vec<RunningVu>,
    next_id: usize,
}

impl VuHost {
    pub fn new(context: Arc<VuContext>, budget: IterationBudget, drain: Duration) -> Self {
        Self {
            context,
            budget,
            drain,
            active: Vec::new(),
            retiring: Vec::new(),
            next_id: 1,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Retired VUs that have not exited yet.
    pub fn retiring_count(&self) -> usize {
        self.retiring.iter().filter(|vu| vu.is_running()).count()
    }

    /// Spawn or retire (newest first) until `target` VUs are active.
    pub fn scale_to(&mut self, target: usize) {
        while self.active.len() < target {
            self.spawn_vu();
        }
        while self.active.len() > target {
            self.retire_newest();
        }
    }

    pub fn spawn_vu(&mut self) {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, control) = signal::channel();
        let handle = tokio::spawn(run_vu(
            Arc::clone(&self.context),
            id,
            control,
            self.budget.clone(),
        ));
        tracing::debug!(vu = id, "spawned virtual user");
        self.active.push(RunningVu {
            id,
            signal: Arc::new(tx),
            handle: Some(handle),
        });
    }

    fn retire_newest(&mut self) {
        let Some(vu) = self.active.pop() else {
            return;
        };
        signal::escalate(&vu.signal, VuSignal::Retire);
        tracing::debug!(vu = vu.id, "retiring virtual user");

        let tx = Arc::clone(&vu.signal);
        let drain = self.drain;
        let id = vu.id;
        tokio::spawn(async move {
            tokio::time::sleep(drain).await;
            if tx.receiver_count() > 0 && *tx.borrow() != VuSignal::Halt {
                tracing::info!(vu = id, "graceful drain elapsed, halting virtual user");
            }
            signal::escalate(&tx, VuSignal::Halt);
        });
        self.retiring.push(vu);
    }

    /// Forget retired VUs that have exited.
    pub fn reap(&mut self) {
        self.retiring.retain(RunningVu::is_running);
    }

    /// Wait up to `limit` for every active VU to exit on its own.
    /// Returns `true` when they all did.
    pub async fn wait_idle(&mut self, limit: Duration) -> bool {
        join_until(&mut self.active, Instant::now() + limit).await
    }

    /// Retire everything, wait out the drain window, halt stragglers and
    /// join all tasks.
    pub async fn shutdown(&mut self) {
        self.retire_all();

        if !join_until(&mut self.retiring, Instant::now() + self.drain).await {
            let stragglers = self.retiring.iter().filter(|vu| vu.handle.is_some()).count();
            tracing::info!(
                stragglers,
                "graceful drain window elapsed, halting remaining virtual users"
            );
            self.halt_all().await;
        }
        self.retiring.clear();
        tracing::debug!("all virtual users stopped");
    }

    /// Halt every VU without a drain window and join all tasks. Each VU
    /// still completes the call and chunk cycle it is in.
    pub async fn halt_all(&mut self) {
        self.retire_all();
        for vu in &self.retiring {
            signal::escalate(&vu.signal, VuSignal::Halt);
        }
        for vu in self.retiring.iter_mut() {
            if let Some(handle) = vu.handle.as_mut() {
                let result = handle.await;
                vu.handle = None;
                log_join(vu.id, result);
            }
        }
    }

    /// Move every active VU to the retiring set. The handles stay owned by
    /// the host so an interrupted shutdown can still join them.
    fn retire_all(&mut self) {
        for vu in std::mem::take(&mut self.active) {
            signal::escalate(&vu.signal, VuSignal::Retire);
            self.retiring.push(vu);
        }
    }
}

async fn join_until(vus: &mut [RunningVu], deadline: Instant) -> bool {
    for vu in vus.iter_mut() {
        if let Some(handle) = vu.handle.as_mut() {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(result) => {
                    log_join(vu.id, result);
                    vu.handle = None;
                }
                Err(_) => return false,
            }
        }
    }
    true
}

fn log_join(id: usize, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(vu = id, "virtual user task failed: {e}");
    }
}
