use crate::host::VuHost;
use crate::ramp::RampScheduler;
use crate::vu::{IterationBudget, SharedIterations, VuContext};
use std::future::Future;
use std::sync::Arc;
use voxload_core::config::LoadConfig;
use voxload_core::ExecutorKind;

/// Drive a whole run with the configured executor. Returns once every
/// virtual user has stopped; results live in the context's metrics sink.
pub async fn run_load(context: Arc<VuContext>, load: &LoadConfig) {
    run_load_until(context, load, std::future::pending()).await;
}

/// Like [`run_load`], but when `stop` completes first every virtual user is
/// halted at its next step boundary and joined before returning.
pub async fn run_load_until<F>(context: Arc<VuContext>, load: &LoadConfig, stop: F)
where
    F: Future<Output = ()>,
{
    let budget = match load.executor {
        ExecutorKind::Ramping => IterationBudget::Unbounded,
        ExecutorKind::SharedIterations => {
            IterationBudget::Shared(Arc::new(SharedIterations::new(load.iterations)))
        }
    };
    let mut host = VuHost::new(context, budget, load.graceful_drain());

    let stopped = tokio::select! {
        _ = drive(&mut host, load) => false,
        _ = stop => true,
    };
    if stopped {
        tracing::warn!("stop requested, halting virtual users");
        host.halt_all().await;
    }
}

async fn drive(host: &mut VuHost, load: &LoadConfig) {
    match load.executor {
        ExecutorKind::Ramping => {
            let scheduler = RampScheduler::new(load.duration(), load.max_vus);
            for (index, stage) in scheduler.stages().iter().enumerate() {
                tracing::info!(
                    stage = index + 1,
                    target_vus = stage.target_vus,
                    "stage planned: {:.1}s..{:.1}s",
                    stage.start_offset.as_secs_f64(),
                    stage.end_offset().as_secs_f64()
                );
            }
            scheduler.run(host).await;
        }
        ExecutorKind::SharedIterations => {
            tracing::info!(
                vus = load.max_vus,
                iterations = load.iterations,
                "starting shared iterations"
            );
            host.scale_to(load.max_vus);
            if !host.wait_idle(load.max_duration()).await {
                tracing::warn!(
                    "max duration of {:.1}s reached before all iterations completed",
                    load.max_duration().as_secs_f64()
                );
            }
            host.shutdown().await;
        }
    }
}
