use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle signal sent by the host to one virtual user. Only escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VuSignal {
    Run,
    /// Finish the current conversation, then exit.
    Retire,
    /// Graceful drain is over: stop at the next step boundary.
    Halt,
}

pub fn channel() -> (watch::Sender<VuSignal>, VuControl) {
    let (tx, rx) = watch::channel(VuSignal::Run);
    (tx, VuControl { rx })
}

/// Raise the signal to `signal`; lower or equal values are ignored.
pub fn escalate(tx: &watch::Sender<VuSignal>, signal: VuSignal) {
    tx.send_if_modified(|current| {
        if signal > *current {
            *current = signal;
            true
        } else {
            false
        }
    });
}

/// Receiving side of the lifecycle signal, owned by the VU task.
#[derive(Debug, Clone)]
pub struct VuControl {
    rx: watch::Receiver<VuSignal>,
}

impl VuControl {
    /// A control nobody will ever signal.
    pub fn unmanaged() -> Self {
        let (_tx, control) = channel();
        control
    }

    pub fn current(&self) -> VuSignal {
        *self.rx.borrow()
    }

    pub fn is_halted(&self) -> bool {
        self.current() >= VuSignal::Halt
    }

    /// Sleep for `duration` unless the signal reaches `wake_at` first.
    /// Returns `true` when the full duration elapsed.
    pub async fn pause(&mut self, duration: Duration, wake_at: VuSignal) -> bool {
        if self.current() >= wake_at {
            return false;
        }
        if duration.is_zero() {
            return true;
        }

        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        // sender gone, the signal can no longer change
                        (&mut sleep).await;
                        return true;
                    }
                    if self.current() >= wake_at {
                        return false;
                    }
                }
            }
        }
    }
}
