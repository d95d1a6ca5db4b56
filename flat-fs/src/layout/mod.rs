//! # 磁盘数据结构层
//!
//! flat-fs 的磁盘布局，每个元数据结构恰好占据一块：
//! 超级块 | 目录表 | 索引节点位图 | 数据块位图 | 索引节点表 | 数据块区域
//!
//! 元数据在挂载时整体读入内存，在卸载时整体写回；
//! 所有整数均以小端序存储，块内未使用的字节一律写零。

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{BlockAddr, DiskInode, IndirectBlock, InodeTable};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirEntry, Directory};

#[inline]
fn get_u32(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
