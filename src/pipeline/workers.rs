//! # Frame Workers
//!
//! One thread per frame pipeline. The thread runs the initial harvest, then
//! consumes the frame's mutation stream in order and re-harvests once per
//! batch that may carry new anchors.

use std::sync::atomic::Ordering;
use std::thread;

use tracing::{debug, warn};

use crate::watcher::MutationWatcher;

use super::{FrameHarvester, HarvestCounters};

/// What one frame worker did over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub label: String,
    pub passes: u64,
    pub links_added: u64,
    pub store_errors: u64,
}

fn run_pass(harvester: &FrameHarvester, counters: &HarvestCounters, report: &mut WorkerReport) {
    report.passes += 1;
    counters.passes.fetch_add(1, Ordering::Relaxed);
    match harvester.harvest() {
        Ok(outcome) => {
            let added = outcome.added as u64;
            report.links_added += added;
            counters.links_added.fetch_add(added, Ordering::Relaxed);
            if outcome.added > 0 {
                debug!(
                    "harvest frame={} added={} total={}",
                    report.label, outcome.added, outcome.total
                );
            }
        }
        Err(err) => {
            report.store_errors += 1;
            counters.store_errors.fetch_add(1, Ordering::Relaxed);
            warn!("harvest failed frame={}: {err}", report.label);
        }
    }
}

/// Spawn the event loop for one frame. The watcher must already be attached
/// so nothing inserted after the initial harvest is missed.
pub fn spawn_frame_worker(
    harvester: FrameHarvester,
    watcher: MutationWatcher,
    counters: HarvestCounters,
) -> thread::JoinHandle<WorkerReport> {
    thread::spawn(move || {
        let mut report = WorkerReport {
            label: harvester.label().to_string(),
            ..WorkerReport::default()
        };
        run_pass(&harvester, &counters, &mut report);
        for _batch in watcher.relevant_batches() {
            counters.batches.fetch_add(1, Ordering::Relaxed);
            run_pass(&harvester, &counters, &mut report);
        }
        debug!(
            "frame worker finished frame={} passes={} added={}",
            report.label, report.passes, report.links_added
        );
        report
    })
}
