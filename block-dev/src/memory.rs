//! 内存中的块设备，关闭后镜像仍保留在 [`MemoryStore`] 中。

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use crate::{BLOCK_SIZE, BlockDevice, BlockStore, DeviceError, check_access};

type Image = Arc<Mutex<Vec<u8>>>;

#[derive(Debug)]
pub struct MemoryStore {
    block_count: usize,
    images: Mutex<BTreeMap<String, Image>>,
}

#[derive(Debug)]
pub struct MemoryDisk {
    image: Image,
    block_count: usize,
    open: AtomicBool,
}

impl MemoryStore {
    pub fn new(block_count: usize) -> Self {
        Self {
            block_count,
            images: Mutex::new(BTreeMap::new()),
        }
    }

    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// 对名为`name`的镜像做只读访问，便于观察设备内容
    pub fn inspect<V>(&self, name: &str, f: impl FnOnce(&[u8]) -> V) -> Option<V> {
        let image = self.images.lock().get(name).cloned()?;
        let image = image.lock();
        Some(f(&image))
    }
}

impl BlockStore for MemoryStore {
    fn create_store(&self, name: &str) -> Result<(), DeviceError> {
        let image = Arc::new(Mutex::new(vec![0; self.block_count * BLOCK_SIZE]));
        self.images.lock().insert(name.to_string(), image);
        Ok(())
    }

    fn open_store(&self, name: &str) -> Result<Arc<dyn BlockDevice>, DeviceError> {
        let image = self
            .images
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| DeviceError::NotFound(name.to_string()))?;

        Ok(Arc::new(MemoryDisk::new(image, self.block_count)))
    }
}

impl MemoryDisk {
    fn new(image: Image, block_count: usize) -> Self {
        Self {
            image,
            block_count,
            open: AtomicBool::new(true),
        }
    }
}

impl BlockDevice for MemoryDisk {
    #[inline]
    fn block_count(&self) -> usize {
        self.block_count
    }

    #[inline]
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_access(self.is_open(), block_id, self.block_count, buf.len())?;
        let start = block_id * BLOCK_SIZE;
        buf.copy_from_slice(&self.image.lock()[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), DeviceError> {
        check_access(self.is_open(), block_id, self.block_count, buf.len())?;
        let start = block_id * BLOCK_SIZE;
        self.image.lock()[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn close(&self) -> Result<(), DeviceError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Err(DeviceError::NotOpen);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write() {
        let store = MemoryStore::new(8);
        store.create_store("disk").unwrap();
        let disk = store.open_store("disk").unwrap();

        let block = [0x42; BLOCK_SIZE];
        disk.write_block(3, &block).unwrap();
        let mut buf = [0; BLOCK_SIZE];
        disk.read_block(3, &mut buf).unwrap();
        assert_eq!(buf, block);

        disk.read_block(4, &mut buf).unwrap();
        assert_eq!(buf, [0; BLOCK_SIZE]);
    }

    #[test]
    fn out_of_range() {
        let store = MemoryStore::new(8);
        store.create_store("disk").unwrap();
        let disk = store.open_store("disk").unwrap();

        let mut buf = [0; BLOCK_SIZE];
        assert!(matches!(
            disk.read_block(8, &mut buf),
            Err(DeviceError::OutOfRange {
                block_id: 8,
                block_count: 8
            })
        ));
        assert!(matches!(
            disk.write_block(0, &buf[..16]),
            Err(DeviceError::BufferSize { .. })
        ));
    }

    #[test]
    fn closed_disk_keeps_image() {
        let store = MemoryStore::new(4);
        store.create_store("disk").unwrap();

        let disk = store.open_store("disk").unwrap();
        disk.write_block(1, &[7; BLOCK_SIZE]).unwrap();
        disk.close().unwrap();
        assert!(!disk.is_open());
        assert!(matches!(
            disk.write_block(1, &[0; BLOCK_SIZE]),
            Err(DeviceError::NotOpen)
        ));
        assert!(matches!(disk.close(), Err(DeviceError::NotOpen)));

        let disk = store.open_store("disk").unwrap();
        let mut buf = [0; BLOCK_SIZE];
        disk.read_block(1, &mut buf).unwrap();
        assert_eq!(buf, [7; BLOCK_SIZE]);
    }

    #[test]
    fn missing_store() {
        let store = MemoryStore::new(4);
        assert!(matches!(
            store.open_store("nope"),
            Err(DeviceError::NotFound(_))
        ));
    }
}
