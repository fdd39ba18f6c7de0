//! Thread that owns the [`GpuManager`] and applies mode requests one at a
//! time, so several producers can ask for switches without sharing the
//! driver connection.

use std::thread::JoinHandle;

use watch::{WatchReceiver, WatchSender};

use crate::driver::MuxDriver;
use crate::manager::{GpuManager, SwitcherMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchRequest {
    /// Initial channel value, never acted upon.
    Idle,
    Mode(SwitcherMode),
    /// Optionally restore dynamic switching, close and stop.
    Shutdown { restore_dynamic: bool },
}

/// What the worker did before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Every applied mode with the protocol's result.
    pub applied: Vec<(SwitcherMode, bool)>,
    pub closed: bool,
}

pub struct SwitchWorker {
    sender: WatchSender<SwitchRequest>,
    thread: JoinHandle<WorkerReport>,
}

impl SwitchWorker {
    /// Start the worker. The manager should already be connected.
    pub fn spawn<D>(manager: GpuManager<D>) -> Self
    where
        D: MuxDriver + Send + 'static,
        D::Connection: Send,
    {
        Self::spawn_with_launch(manager, None)
    }

    /// Apply `launch` on the calling thread, then start the worker. A
    /// shutdown sent right after spawning cannot overwrite the launch mode.
    pub fn spawn_with_launch<D>(mut manager: GpuManager<D>, launch: Option<SwitcherMode>) -> Self
    where
        D: MuxDriver + Send + 'static,
        D::Connection: Send,
    {
        let mut report = WorkerReport::default();
        if let Some(mode) = launch {
            report.applied.push((mode, apply(&mut manager, mode)));
        }
        let (sender, recv) = watch::channel(SwitchRequest::Idle);
        let thread = std::thread::spawn(move || run(manager, recv, report));
        Self { sender, thread }
    }

    pub fn sender(&self) -> &WatchSender<SwitchRequest> {
        &self.sender
    }

    /// Queue a mode. Only the most recent unread request is kept.
    pub fn request(&self, mode: SwitcherMode) {
        self.sender.send(SwitchRequest::Mode(mode));
    }

    /// Ask the worker to stop and wait for it.
    pub fn shutdown(self, restore_dynamic: bool) -> WorkerReport {
        self.sender.send(SwitchRequest::Shutdown { restore_dynamic });
        self.join()
    }

    /// Wait for a shutdown sent through [`sender`](Self::sender).
    pub fn join(self) -> WorkerReport {
        match self.thread.join() {
            Ok(report) => report,
            Err(_) => {
                log::error!("Switch worker panicked");
                WorkerReport::default()
            }
        }
    }
}

fn apply<D: MuxDriver>(manager: &mut GpuManager<D>, mode: SwitcherMode) -> bool {
    let ok = manager.request_mode(mode);
    if ok {
        log::info!("Switched to {mode}");
    } else {
        log::error!("Switching to {mode} failed");
    }
    ok
}

fn run<D: MuxDriver>(
    mut manager: GpuManager<D>,
    mut recv: WatchReceiver<SwitchRequest>,
    mut report: WorkerReport,
) -> WorkerReport {
    loop {
        match recv.wait() {
            SwitchRequest::Idle => {}
            SwitchRequest::Mode(mode) => {
                let ok = apply(&mut manager, mode);
                report.applied.push((mode, ok));
            }
            SwitchRequest::Shutdown { restore_dynamic } => {
                if restore_dynamic && manager.is_connected() {
                    let ok = manager.request_mode(SwitcherMode::SetDynamic);
                    report.applied.push((SwitcherMode::SetDynamic, ok));
                }
                report.closed = manager.close();
                return report;
            }
        }
    }
}
