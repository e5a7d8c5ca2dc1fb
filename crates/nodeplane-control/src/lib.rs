//! Control plane for relay node orchestration
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod link;
pub mod pending_requests;
pub mod reconcile;
pub mod registry;
pub mod resync;
pub mod subscription;
pub mod sweep;
pub mod task_tracker;

pub use config::{DispatcherConfig, SweepConfig};
pub use dispatcher::Dispatcher;
pub use error::{Applied, ControlError, ControlResult, DispatchError, SyncOutcome};
pub use link::{LinkTarget, SHADOWSOCKS_METHOD};
pub use pending_requests::PendingRequests;
pub use reconcile::{
    CertSpec, ClientPatch, ClientSpec, DeletedInbound, InboundPatch, InboundSpec, ReconcileReport,
    Reconciler, TrafficSummary,
};
pub use registry::{ConnectionRegistry, NodeSession};
pub use subscription::{Subscription, SubscriptionLink};
pub use sweep::ResyncSweep;
pub use task_tracker::TaskTracker;
