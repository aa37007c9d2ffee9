//! Service registry and discovery.
//!
//! - [`Directory`] is the registry protocol (register / list / remove).
//! - [`Registry`] announces this process's instances and keeps them alive
//!   with one heartbeat task per `(service, port)` pair.
//! - [`Discovery`] resolves a logical service name to healthy instances.

pub mod directory;
pub mod discovery;
pub mod error;
pub mod instance;
pub mod net;
pub mod registry;

pub use directory::{Directory, InMemoryDirectory, NacosConfig, NacosDirectory};
pub use discovery::{Discovery, FirstOfList, Selector};
pub use error::RegistryError;
pub use instance::{DEFAULT_CLUSTER, ServiceInstance};
pub use net::local_ip;
pub use registry::{DEFAULT_HEARTBEAT_INTERVAL, Registry};
