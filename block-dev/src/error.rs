use alloc::string::String;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("block device is not open")]
    NotOpen,
    #[error("block {block_id} is out of range (device has {block_count} blocks)")]
    OutOfRange { block_id: usize, block_count: usize },
    #[error("buffer of {found} bytes, a block is {expected} bytes")]
    BufferSize { expected: usize, found: usize },
    #[error("no store named {0:?}")]
    NotFound(String),
    /// 宿主后端（文件等）报告的错误
    #[error("backend error: {0}")]
    Backend(String),
}
