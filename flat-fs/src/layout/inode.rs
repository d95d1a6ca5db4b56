//! 索引节点与间接索引块
//! - 直接索引：inode 内的 [`DIRECT_COUNT`] 个块编号，各自指向一个**数据块**
//! - 一级：整个块连续存储**块编号**，每个编号都指向一个**数据块**
//! - 二级：整个块连续存储**块编号**，每个编号都指向一个一级索引块
//!
//! ## 块索引编码
//!
//! - x+1 级块索引模 x 级块的**可编号数量**，可得**最后**一块 x 的内部索引
//! - x+1 级块索引除以 x 级块的**可编号数量**，可得 x 级块的位置
//!
//! 块编号 0 表示未分配：0 号块是超级块，永远不会成为数据块。

use super::{get_u32, get_u64, put_u32, put_u64};
use crate::{BLOCK_SIZE, DIRECT_COUNT, DataBlock, INDIRECT_COUNT, INODE_COUNT};

/// 一级索引块可编号数量
const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引块可编号数量
const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;
/// 用上二级索引时的编号容量
const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT2_COUNT;

const _: () = assert!(INODE_COUNT * DiskInode::SIZE <= BLOCK_SIZE);

/// 文件内逻辑块号到索引位置的翻译结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAddr {
    /// 直接索引的下标
    Direct(usize),
    /// 一级索引块内的下标
    Single(usize),
    /// 二级索引块内的下标，以及其指向的一级索引块内的下标
    Double(usize, usize),
    OutOfRange,
}

impl BlockAddr {
    /// 单个文件最多可编号的数据块数
    pub const MAX_BLOCKS: usize = INDIRECT2_CAP;

    pub fn locate(block_index: usize) -> Self {
        if block_index < DIRECT_CAP {
            Self::Direct(block_index)
        } else if block_index < INDIRECT1_CAP {
            // 剔去直接索引的部分
            Self::Single(block_index - DIRECT_CAP)
        } else if block_index < INDIRECT2_CAP {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT1_CAP;
            Self::Double(index / INDIRECT1_COUNT, index % INDIRECT1_COUNT)
        } else {
            Self::OutOfRange
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    #[default]
    Free,
    Regular,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskInode {
    pub kind: InodeKind,
    /// 文件大小（字节）
    pub size: u64,
    /// 直接索引块，包含 DIRECT_COUNT 个块编号，
    /// 存储容量：DIRECT_CAP * BLOCK_SIZE 字节
    pub direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引块
    pub indirect1: u32,
    /// 指向一个二级索引块
    pub indirect2: u32,
}

impl DiskInode {
    /// 磁盘上每个 inode 恒占 64 字节
    pub const SIZE: usize = 64;

    #[inline]
    pub fn init(&mut self) {
        *self = Self {
            kind: InodeKind::Regular,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.kind == InodeKind::Free
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size as usize
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: usize) -> usize {
        size.div_ceil(BLOCK_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据块** 和 **索引块**(`IndirectBlock`)
    pub fn count_total_block(size: usize) -> usize {
        let data_blocks = Self::count_data_block(size);
        let mut total = data_blocks;

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_CAP {
            total += 1;
        }

        // 超出一级索引，使用二级索引块及其下的一级索引块
        if data_blocks > INDIRECT1_CAP {
            total += 1 + (data_blocks - INDIRECT1_CAP).div_ceil(INDIRECT_COUNT);
        }

        total
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut direct = [0; DIRECT_COUNT];
        for (i, pointer) in direct.iter_mut().enumerate() {
            *pointer = get_u32(bytes, 16 + i * 4);
        }

        Self {
            kind: match get_u32(bytes, 0) {
                1 => InodeKind::Regular,
                _ => InodeKind::Free,
            },
            size: get_u64(bytes, 8),
            direct,
            indirect1: get_u32(bytes, 56),
            indirect2: get_u32(bytes, 60),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes.fill(0);
        let kind = match self.kind {
            InodeKind::Free => 0,
            InodeKind::Regular => 1,
        };
        put_u32(bytes, 0, kind);
        put_u64(bytes, 8, self.size);
        for (i, &pointer) in self.direct.iter().enumerate() {
            put_u32(bytes, 16 + i * 4, pointer);
        }
        put_u32(bytes, 56, self.indirect1);
        put_u32(bytes, 60, self.indirect2);
    }
}

/// inode 表，整体占据一块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeTable {
    inodes: [DiskInode; INODE_COUNT],
}

impl Default for InodeTable {
    fn default() -> Self {
        Self {
            inodes: [DiskInode::default(); INODE_COUNT],
        }
    }
}

impl InodeTable {
    #[inline]
    pub fn get(&self, inode_id: u32) -> Option<&DiskInode> {
        self.inodes.get(inode_id as usize)
    }

    #[inline]
    pub fn get_mut(&mut self, inode_id: u32) -> Option<&mut DiskInode> {
        self.inodes.get_mut(inode_id as usize)
    }

    pub fn from_block(block: &DataBlock) -> Self {
        let mut table = Self::default();
        for (inode, bytes) in table
            .inodes
            .iter_mut()
            .zip(block.chunks_exact(DiskInode::SIZE))
        {
            *inode = DiskInode::decode(bytes);
        }
        table
    }

    pub fn to_block(&self) -> DataBlock {
        let mut block = [0; BLOCK_SIZE];
        for (inode, bytes) in self
            .inodes
            .iter()
            .zip(block.chunks_exact_mut(DiskInode::SIZE))
        {
            inode.encode(bytes);
        }
        block
    }
}

/// 间接索引块：整个块连续存储块编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock([u32; INDIRECT_COUNT]);

impl Default for IndirectBlock {
    fn default() -> Self {
        Self([0; INDIRECT_COUNT])
    }
}

impl IndirectBlock {
    #[inline]
    pub fn get(&self, slot: usize) -> u32 {
        self.0[slot]
    }

    #[inline]
    pub fn set(&mut self, slot: usize, block_id: u32) {
        self.0[slot] = block_id;
    }

    pub fn from_block(block: &DataBlock) -> Self {
        let mut indirect = Self::default();
        for (slot, bytes) in indirect.0.iter_mut().zip(block.chunks_exact(4)) {
            *slot = get_u32(bytes, 0);
        }
        indirect
    }

    pub fn to_block(&self) -> DataBlock {
        let mut block = [0; BLOCK_SIZE];
        for (&slot, bytes) in self.0.iter().zip(block.chunks_exact_mut(4)) {
            put_u32(bytes, 0, slot);
        }
        block
    }
}
