//! Work source / sink trait

use crate::model::{RpcError, WorkTemplate, DATA_LEN};

/// The two calls a miner makes against a work-issuing service.
///
/// Implementations block for the duration of the round trip; each device
/// thread owns its own handle or shares one behind an `Arc`.
pub trait WorkApi: Send + Sync {
    /// Fetches and decodes a fresh work unit.
    fn get_work(&self) -> Result<WorkTemplate, RpcError>;

    /// Submits a header with the winning nonce patched in. Returns whether
    /// the service accepted it.
    fn submit_work(&self, data: &[u8; DATA_LEN]) -> Result<bool, RpcError>;
}

impl<T: WorkApi + ?Sized> WorkApi for std::sync::Arc<T> {
    fn get_work(&self) -> Result<WorkTemplate, RpcError> {
        (**self).get_work()
    }

    fn submit_work(&self, data: &[u8; DATA_LEN]) -> Result<bool, RpcError> {
        (**self).submit_work(data)
    }
}
