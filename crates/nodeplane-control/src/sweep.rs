//! Periodic full reconcile of every connected node
//!
//! Heals drift left behind by pushes that failed while a node was offline
//! or slow. Disabled unless [`SweepConfig::interval`] is non-zero.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SweepConfig;
use crate::reconcile::{ReconcileReport, Reconciler};

pub struct ResyncSweep {
    reconciler: Arc<Reconciler>,
    config: SweepConfig,
}

impl ResyncSweep {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let config = reconciler.sweep_config().clone();
        Self { reconciler, config }
    }

    /// Reconcile every node that is connected right now, one after another
    pub async fn run_once(&self) -> Vec<ReconcileReport> {
        let nodes = self.reconciler.dispatcher().connected_nodes();
        let mut reports = Vec::with_capacity(nodes.len());

        for node_id in nodes {
            match self.reconciler.reconcile_node(node_id).await {
                Ok(report) => {
                    if !report.is_clean() {
                        warn!(node_id, errors = ?report.errors, "Sweep reconcile reported errors");
                    }
                    reports.push(report);
                }
                Err(e) => warn!(node_id, error = %e, "Sweep reconcile failed"),
            }
        }

        debug!(nodes = reports.len(), "Resync sweep finished");
        reports
    }

    /// Start the periodic loop; `None` when the sweep is disabled
    ///
    /// Aborting the returned handle stops the sweep.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if !self.config.sweep_enabled() {
            debug!("Resync sweep disabled");
            return None;
        }

        let period = self.config.interval;
        info!(interval_secs = period.as_secs(), "Resync sweep started");

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; nodes are reconciled on connect anyway
            interval.tick().await;

            loop {
                interval.tick().await;
                self.run_once().await;
            }
        }))
    }
}
