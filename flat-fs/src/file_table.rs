//! # 打开文件表
//!
//! 固定容量的句柄表。每个句柄是 inode 上一个独立的游标，
//! 多个句柄可以指向同一个 inode，但互不共享偏移量。

use crate::{Error, OPEN_FILE_LIMIT, Result};

/// 打开文件的句柄，即其在打开文件表中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FileHandle(usize);

impl FileHandle {
    #[inline]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode_id: u32,
    /// **文件**内的偏移量
    pub offset: usize,
}

#[derive(Debug)]
pub struct FileTable {
    slots: [Option<OpenFile>; OPEN_FILE_LIMIT],
}

impl Default for FileTable {
    fn default() -> Self {
        Self {
            slots: [None; OPEN_FILE_LIMIT],
        }
    }
}

impl FileTable {
    /// 占用第一个空闲槽位，游标置零
    pub fn open(&mut self, inode_id: u32) -> Result<FileHandle> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(Error::TooManyOpenFiles)?;
        *slot = Some(OpenFile {
            inode_id,
            offset: 0,
        });

        Ok(FileHandle(index))
    }

    pub fn close(&mut self, handle: FileHandle) -> Result<OpenFile> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or(Error::InvalidHandle)
    }

    pub fn get(&self, handle: FileHandle) -> Result<&OpenFile> {
        self.slots
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(Error::InvalidHandle)
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidHandle)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// 是否有打开的句柄指向`inode_id`
    pub fn is_referenced(&self, inode_id: u32) -> bool {
        self.iter().any(|file| file.inode_id == inode_id)
    }

    /// 文件被截断后，把指向它的所有游标限制在新长度以内
    pub fn clamp_offsets(&mut self, inode_id: u32, len: usize) {
        self.slots
            .iter_mut()
            .flatten()
            .filter(|file| file.inode_id == inode_id)
            .for_each(|file| file.offset = file.offset.min(len));
    }

    pub fn clear(&mut self) {
        self.slots.fill(None);
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpenFile> {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_close() {
        let mut table = FileTable::default();
        let a = table.open(3).unwrap();
        let b = table.open(3).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(table.iter().filter(|file| file.inode_id == 3).count(), 2);

        table.close(a).unwrap();
        assert!(matches!(table.close(a), Err(Error::InvalidHandle)));
        assert!(matches!(table.get(a), Err(Error::InvalidHandle)));
        assert!(table.is_referenced(3));

        // 空出的槽位会被复用
        assert_eq!(table.open(4).unwrap(), a);
    }

    #[test]
    fn out_of_range_handle() {
        let mut table = FileTable::default();
        let handle = FileHandle::new(OPEN_FILE_LIMIT);
        assert!(matches!(table.get(handle), Err(Error::InvalidHandle)));
        assert!(matches!(table.close(handle), Err(Error::InvalidHandle)));
    }

    #[test]
    fn capacity() {
        let mut table = FileTable::default();
        for _ in 0..OPEN_FILE_LIMIT {
            table.open(0).unwrap();
        }
        assert!(table.is_full());
        assert!(matches!(table.open(1), Err(Error::TooManyOpenFiles)));

        table.clear();
        assert!(!table.is_referenced(0));
        assert!(table.open(1).is_ok());
    }

    #[test]
    fn independent_offsets() {
        let mut table = FileTable::default();
        let a = table.open(7).unwrap();
        let b = table.open(7).unwrap();
        let c = table.open(8).unwrap();
        table.get_mut(a).unwrap().offset = 100;
        table.get_mut(b).unwrap().offset = 10;
        table.get_mut(c).unwrap().offset = 100;

        table.clamp_offsets(7, 50);
        assert_eq!(table.get(a).unwrap().offset, 50);
        assert_eq!(table.get(b).unwrap().offset, 10);
        assert_eq!(table.get(c).unwrap().offset, 100);
    }
}
