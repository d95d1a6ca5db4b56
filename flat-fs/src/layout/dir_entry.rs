use super::{get_u32, put_u32};
use crate::{BLOCK_SIZE, DIR_ENTRY_COUNT, DataBlock, Error, NAME_MAX_LEN, Result};

const _: () = assert!(DIR_ENTRY_COUNT * DirEntry::SIZE <= BLOCK_SIZE);

/// 文件系统项的元信息：文件名到 inode 编号的绑定
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    used: bool,
    inode_id: u32,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
}

impl DirEntry {
    /// 元信息大小恒为24字节
    pub const SIZE: usize = 24;

    /// 检查名字能否存入目录项
    pub fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.contains('\0') {
            return Err(Error::InvalidName);
        }
        if name.len() > NAME_MAX_LEN {
            return Err(Error::NameTooLong);
        }
        Ok(())
    }

    /// 调用者需事先用 [`DirEntry::validate_name`] 检查名字
    #[inline]
    pub fn new(name: &str, inode_id: u32) -> Self {
        let bytes = name.as_bytes();
        let mut raw = [0; NAME_MAX_LEN + 1];
        raw[..bytes.len()].copy_from_slice(bytes);

        Self {
            used: true,
            inode_id,
            name: raw,
        }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }

    #[inline]
    pub fn is_used(&self) -> bool {
        self.used
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..NAME_MAX_LEN].copy_from_slice(&bytes[8..8 + NAME_MAX_LEN]);

        Self {
            used: get_u32(bytes, 0) != 0,
            inode_id: get_u32(bytes, 4),
            name,
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes.fill(0);
        put_u32(bytes, 0, self.used as u32);
        put_u32(bytes, 4, self.inode_id);
        bytes[8..8 + NAME_MAX_LEN].copy_from_slice(&self.name[..NAME_MAX_LEN]);
    }
}

/// 扁平的目录表，固定容量，线性查找
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: [DirEntry; DIR_ENTRY_COUNT],
}

impl Default for Directory {
    fn default() -> Self {
        Self {
            entries: [DirEntry::default(); DIR_ENTRY_COUNT],
        }
    }
}

impl Directory {
    /// 通过名字获取目录项的槽位与 inode ID
    pub fn find_by_name(&self, name: &str) -> Option<(usize, u32)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| entry.is_used() && entry.name() == name)
            .map(|(slot, entry)| (slot, entry.inode_id))
    }

    pub fn find_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|entry| !entry.is_used())
    }

    #[inline]
    pub fn insert(&mut self, slot: usize, entry: DirEntry) {
        self.entries[slot] = entry;
    }

    /// 清空槽位并返回原先的目录项
    #[inline]
    pub fn remove(&mut self, slot: usize) -> DirEntry {
        core::mem::take(&mut self.entries[slot])
    }

    /// 按槽位顺序遍历在用的目录项
    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|entry| entry.is_used())
    }

    pub fn from_block(block: &DataBlock) -> Self {
        let mut directory = Self::default();
        for (entry, bytes) in directory
            .entries
            .iter_mut()
            .zip(block.chunks_exact(DirEntry::SIZE))
        {
            *entry = DirEntry::decode(bytes);
        }
        directory
    }

    pub fn to_block(&self) -> DataBlock {
        let mut block = [0; BLOCK_SIZE];
        for (entry, bytes) in self
            .entries
            .iter()
            .zip(block.chunks_exact_mut(DirEntry::SIZE))
        {
            entry.encode(bytes);
        }
        block
    }
}
