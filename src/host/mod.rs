//! Host integration: lifecycle hooks, RPC procedures and their HTTP routes

pub mod adapter;
pub mod http;
pub mod rpc;

pub use adapter::{HostAdapter, JoinAttemptResponse};
pub use http::{host_router, HostApiState};
pub use rpc::{GetServerInfoRequest, GetServerInfoResponse, RpcError, RpcRouter};
