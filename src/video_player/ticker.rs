// SPDX-License-Identifier: MPL-2.0
//! Internal tick source for the video pump.
//!
//! A tokio task fires the pump every `1 / fps`. Missed ticks are skipped
//! rather than queued, so a slow decode drops frames instead of bursting.
//! A tick blocks on the session lock and the decoder, so on a multi-thread
//! runtime it runs under `block_in_place` and the worker's other tasks move
//! to another thread while it decodes.

use super::video_pump::{TickOutcome, VideoPump};
use crate::error::{Error, Result};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub(crate) struct Ticker {
    task: JoinHandle<()>,
}

impl Ticker {
    /// Spawns the tick loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] when called outside a tokio runtime.
    pub(crate) fn spawn(pump: Arc<VideoPump>, cycle: CancellationToken) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
        let period = pump.interval();
        let offload = runtime.runtime_flavor() == RuntimeFlavor::MultiThread;

        let task = runtime.spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = cycle.cancelled() => break,
                    _ = ticks.tick() => {}
                }

                let outcome = if offload {
                    tokio::task::block_in_place(|| pump.tick())
                } else {
                    pump.tick()
                };
                match outcome {
                    Ok(TickOutcome::EndOfStream | TickOutcome::Skipped) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!("Video pump stopped: {err}");
                        break;
                    }
                }
            }
            tracing::debug!("Ticker finished");
        });

        Ok(Self { task })
    }

    /// Stops the loop. A tick already running completes first.
    pub(crate) fn stop(self) {
        self.task.abort();
    }
}
