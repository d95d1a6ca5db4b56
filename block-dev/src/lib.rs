//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! [`BlockStore`] 则是一组具名块设备（镜像）的集合，负责创建与打开它们。
//! 块大小是固定的 [`BLOCK_SIZE`]，块数由具体的存储后端决定。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::sync::Arc;
use core::any::Any;

mod error;
mod memory;

pub use self::{
    error::DeviceError,
    memory::{MemoryDisk, MemoryStore},
};

/// 块大小（字节）
pub const BLOCK_SIZE: usize = 4096;
/// 默认的设备块数
pub const DISK_BLOCKS: usize = 15000;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 设备的总块数，在设备的生命周期内不变
    fn block_count(&self) -> usize;

    fn is_open(&self) -> bool;

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError>;

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError>;

    /// 关闭设备，此后的读写都会失败
    fn close(&self) -> Result<(), DeviceError>;
}

/// 具名块设备的集合
pub trait BlockStore {
    /// 创建（或覆盖）一个全零的设备，创建后设备处于关闭状态
    fn create_store(&self, name: &str) -> Result<(), DeviceError>;

    fn open_store(&self, name: &str) -> Result<Arc<dyn BlockDevice>, DeviceError>;
}

/// 检查一次块访问是否合法：设备已打开、块号在范围内、缓冲区恰为一块
pub fn check_access(
    is_open: bool,
    block_id: usize,
    block_count: usize,
    buf_len: usize,
) -> Result<(), DeviceError> {
    if !is_open {
        return Err(DeviceError::NotOpen);
    }
    if block_id >= block_count {
        return Err(DeviceError::OutOfRange {
            block_id,
            block_count,
        });
    }
    if buf_len != BLOCK_SIZE {
        return Err(DeviceError::BufferSize {
            expected: BLOCK_SIZE,
            found: buf_len,
        });
    }

    Ok(())
}
