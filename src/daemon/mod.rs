//! Chain daemon integration.
//!
//! - `traits`: the [`ChainDaemon`] seam and its wire types
//! - `rpc`: syscoind JSON-RPC client
//! - `mock`: scripted daemon for tests
//! - `chain`: governance queries built on top of raw calls

pub mod chain;
pub mod mock;
pub mod rpc;
pub mod traits;

pub use chain::{ChainQueries, NetworkParams};
pub use mock::MockChainDaemon;
pub use rpc::{JsonRpcDaemon, RpcCredentials};
pub use traits::{ChainDaemon, DaemonError, DaemonResult};
