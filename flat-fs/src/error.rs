use block_dev::DeviceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such file")]
    NotFound,
    #[error("file already exists")]
    AlreadyExists,
    #[error("directory table is full")]
    DirectoryFull,
    #[error("no free inode")]
    NoFreeInodes,
    #[error("too many open files")]
    TooManyOpenFiles,
    #[error("invalid file handle")]
    InvalidHandle,
    #[error("offset is outside of the file")]
    InvalidOffset,
    #[error("a file can not be truncated to a larger length")]
    InvalidLength,
    #[error("no free data block")]
    StoreFull,
    #[error("file name is longer than {} bytes", crate::NAME_MAX_LEN)]
    NameTooLong,
    #[error("file name is empty or contains NUL")]
    InvalidName,
    #[error("file is still open")]
    FileInUse,
    #[error("file exceeds the addressable size")]
    FileTooLarge,
    #[error("bitmap index {index} is out of range [0, {len})")]
    OutOfRange { index: usize, len: usize },
    #[error("device does not hold a valid store")]
    InvalidStore,
    #[error("unsupported store of {block_count} blocks")]
    UnsupportedGeometry { block_count: usize },
    #[error("I/O error: {0}")]
    Io(#[from] DeviceError),
}

pub type Result<T> = core::result::Result<T, Error>;
