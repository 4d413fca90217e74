pub mod block;
pub mod doh;
#[cfg(feature = "mock")]
pub mod mock;
pub mod prelude;
pub mod registry;
pub mod static_ip;
pub mod udp;

pub use block::{Block, BlockMode};
pub use doh::Doh;
pub use prelude::{ResolveError, Resolver};
pub use registry::ResolverRegistry;
pub use static_ip::{StaticIpv4, StaticIpv6};
pub use udp::Udp;
