use super::{get_u32, put_u32};
use crate::{BLOCK_BITS, BLOCK_SIZE, DataBlock, INODE_COUNT, MAGIC};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它元数据块
///
/// 创建时写入一次，挂载时读取一次，此后其中的块号不再改变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub block_size: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub directory_block: u32,
    pub inode_bitmap_block: u32,
    pub data_bitmap_block: u32,
    pub inode_table_block: u32,
    pub inode_count: u32,
    /// 元数据占据的前若干块，永不分配给文件
    pub reserved_blocks: u32,
}

impl SuperBlock {
    pub const BLOCK_ID: usize = 0;

    /// 元数据按固定顺序紧随超级块之后
    pub fn new(total_blocks: u32) -> Self {
        Self {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            total_blocks,
            directory_block: 1,
            inode_bitmap_block: 2,
            data_bitmap_block: 3,
            inode_table_block: 4,
            inode_count: INODE_COUNT as u32,
            reserved_blocks: 5,
        }
    }

    /// 能否在`total_blocks`块的设备上建立文件系统：
    /// 至少要有一个数据块，且数据块位图不能超出一块
    #[inline]
    pub fn fits(total_blocks: usize) -> bool {
        let reserved = Self::new(0).reserved_blocks as usize;
        total_blocks > reserved && total_blocks <= BLOCK_BITS
    }

    pub fn is_valid(&self) -> bool {
        let total = self.total_blocks as usize;
        let metadata = [
            self.directory_block,
            self.inode_bitmap_block,
            self.data_bitmap_block,
            self.inode_table_block,
        ];
        let distinct = metadata
            .iter()
            .enumerate()
            .all(|(i, block)| !metadata[..i].contains(block));

        self.magic == MAGIC
            && self.block_size as usize == BLOCK_SIZE
            && self.inode_count as usize == INODE_COUNT
            && Self::fits(total)
            && distinct
            && metadata
                .iter()
                .all(|&block| block != 0 && block < self.reserved_blocks)
    }

    pub fn from_block(block: &DataBlock) -> Self {
        Self {
            magic: get_u32(block, 0),
            block_size: get_u32(block, 4),
            total_blocks: get_u32(block, 8),
            directory_block: get_u32(block, 12),
            inode_bitmap_block: get_u32(block, 16),
            data_bitmap_block: get_u32(block, 20),
            inode_table_block: get_u32(block, 24),
            inode_count: get_u32(block, 28),
            reserved_blocks: get_u32(block, 32),
        }
    }

    pub fn to_block(&self) -> DataBlock {
        let mut block = [0; BLOCK_SIZE];
        put_u32(&mut block, 0, self.magic);
        put_u32(&mut block, 4, self.block_size);
        put_u32(&mut block, 8, self.total_blocks);
        put_u32(&mut block, 12, self.directory_block);
        put_u32(&mut block, 16, self.inode_bitmap_block);
        put_u32(&mut block, 20, self.data_bitmap_block);
        put_u32(&mut block, 24, self.inode_table_block);
        put_u32(&mut block, 28, self.inode_count);
        put_u32(&mut block, 32, self.reserved_blocks);
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_superblock() {
        let super_block = SuperBlock::new(15000);
        let block = super_block.to_block();
        assert!(block[36..].iter().all(|&b| b == 0));

        let read = SuperBlock::from_block(&block);
        assert_eq!(read, super_block);
        assert!(read.is_valid());
    }

    #[test]
    fn rejects_garbage() {
        assert!(!SuperBlock::from_block(&[0; BLOCK_SIZE]).is_valid());

        let mut super_block = SuperBlock::new(15000);
        super_block.data_bitmap_block = super_block.directory_block;
        assert!(!super_block.is_valid());

        let mut super_block = SuperBlock::new(15000);
        super_block.inode_table_block = 9;
        assert!(!super_block.is_valid());
    }

    #[test]
    fn geometry() {
        assert!(!SuperBlock::fits(5));
        assert!(SuperBlock::fits(6));
        assert!(SuperBlock::fits(BLOCK_BITS));
        assert!(!SuperBlock::fits(BLOCK_BITS + 1));
        assert!(!SuperBlock::new(40000).is_valid());
    }
}
