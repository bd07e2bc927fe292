//! Process-wide registries shared by every connection handler.
//!
//! Each registry is a `DashMap`; handles are cloned out before any socket
//! write so no shard guard is ever held across an `.await`.

pub mod clients;
pub mod replicas;
pub mod subscriptions;

pub use clients::{ClientHandle, ClientId, ClientRegistry};
pub use replicas::{FanOutReport, Replica, ReplicaRegistry};
pub use subscriptions::SubscriptionRegistry;
