pub mod accounts;
pub mod blocklist;
pub mod containment_engine;
pub mod middleware;

#[cfg(test)]
pub(crate) mod tests;

pub use accounts::{AccountRegistry, ContainmentState, MemoryAccountRegistry, Role};
pub use blocklist::{BlockedAddress, IpBlocklist};
pub use containment_engine::{normalize_ip, ContainmentEngine};
pub use middleware::{ClientAddress, GatewayState};
