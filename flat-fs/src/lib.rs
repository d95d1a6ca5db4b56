#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* flat-fs 的整体架构，自上而下 */

// 文件读写层：基于句柄的读、写、定位、截断
mod vfs;

// 会话层：挂载、卸载、创建、删除，以及数据块的分配与寻址
mod fs;

// 打开文件表：固定容量的句柄表
mod file_table;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

mod error;

pub use block_dev::{BLOCK_SIZE, BlockDevice, BlockStore, DISK_BLOCKS, DeviceError};

pub use self::{
    error::{Error, Result},
    file_table::FileHandle,
    fs::{FileSystem, FsStat},
    layout::{BlockAddr, Bitmap},
    vfs::{OpenFlag, Stat},
};

pub const MAGIC: u32 = 0x464c_4154;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// inode 数量，也是目录项的数量
pub const INODE_COUNT: usize = 64;
pub const DIR_ENTRY_COUNT: usize = INODE_COUNT;
/// 可同时打开的句柄数
pub const OPEN_FILE_LIMIT: usize = 32;
/// 文件名最大字节数
pub const NAME_MAX_LEN: usize = 15;

/// 直接索引个数
pub const DIRECT_COUNT: usize = 10;
/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = BLOCK_SIZE / 4;

type DataBlock = [u8; BLOCK_SIZE];
