//! Chain access
//!
//! - [`rpc`]: wire types and transport for the chain account service
//! - [`gateway`]: typed per-chain façade with timeouts and parsing
//! - [`cursor`]: confirmation-safe traversal of block headers

pub mod cursor;
pub mod error;
pub mod gateway;
pub mod rpc;
pub mod types;

pub use cursor::TraversalCursor;
pub use error::{CursorError, GatewayError};
pub use gateway::{ChainGateway, DEFAULT_NETWORK};
pub use rpc::{ChainAccountRpc, JsonRpcChainAccount};
pub use types::{BlockHeader, ChainTransaction, HeaderQuery};
