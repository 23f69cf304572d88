use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{xxh3_64, Xxh3};

use crate::core::IndexDocument;
use crate::error::{IndexError, IoContext, Result};

/// 快照文件 Header
const MAGIC: u32 = 0x4C44_5831; // "LDX1"
const VERSION_CURRENT: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 8 + 8; // magic + version + state + data_len + checksum

/// 一个 root 的全部已提交文档（按集合顺序）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub generation: u64,
    pub documents: Vec<IndexDocument>,
}

#[derive(Debug)]
pub enum SnapshotLoad {
    Missing,
    Loaded(IndexSnapshot),
    /// 文件存在但校验失败（截断、版本不符、checksum 错）
    Corrupt(String),
}

/// 原子快照存储（atomic replacement）
///
/// 落盘流程：
/// 1) 写 `<name>.tmp` 的 INCOMPLETE header（len/checksum 先置 0）
/// 2) `bincode::serialize_into(file)` 流式写 body，边写边算 xxh3 / data_len
/// 3) seek 回开头覆盖 COMMITTED header
/// 4) fsync(tmpfile)
/// 5) rename(tmp, target)：原子替换（POSIX 保证）
/// 6) fsync(dir)
///
/// 任一步崩溃 target 都保持旧内容；加载时 header 或 checksum 任何不一致都判为 Corrupt。
pub struct SnapshotStore {
    path: PathBuf,
}

struct ChecksumWriter<'a, W: Write> {
    inner: &'a mut W,
    hasher: Xxh3,
    bytes: u64,
}

impl<'a, W: Write> ChecksumWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            hasher: Xxh3::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, u64) {
        (self.bytes, self.hasher.digest())
    }
}

impl<'a, W: Write> Write for ChecksumWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn encode_header(state: u32, data_len: u64, checksum: u64) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
    header[8..12].copy_from_slice(&state.to_le_bytes());
    header[12..20].copy_from_slice(&data_len.to_le_bytes());
    header[20..28].copy_from_slice(&checksum.to_le_bytes());
    header
}

fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

impl SnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!("{name}.tmp"))
    }

    /// 加载并校验 magic/version/state/len/checksum
    pub fn load(&self) -> Result<SnapshotLoad> {
        if !self.path.exists() {
            return Ok(SnapshotLoad::Missing);
        }
        let data = std::fs::read(&self.path).at(&self.path.display())?;
        Ok(decode(&data))
    }

    /// 原子写入；返回落盘字节数
    pub fn write_atomic(&self, snap: &IndexSnapshot, sync: bool) -> Result<u64> {
        let loc = self.path.display();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).at(&loc)?;
        }

        let tmp_path = self.tmp_path();
        let mut file = File::create(&tmp_path).at(&tmp_path.display())?;
        file.write_all(&encode_header(STATE_INCOMPLETE, 0, 0))
            .at(&tmp_path.display())?;

        let (data_len, checksum) = {
            let mut cw = ChecksumWriter::new(&mut file);
            bincode::serialize_into(&mut cw, snap)
                .map_err(|e| IndexError::corrupted(tmp_path.display().to_string(), e.to_string()))?;
            cw.finish()
        };

        file.seek(SeekFrom::Start(0)).at(&tmp_path.display())?;
        file.write_all(&encode_header(STATE_COMMITTED, data_len, checksum))
            .at(&tmp_path.display())?;
        if sync {
            file.sync_all().at(&tmp_path.display())?;
        }
        drop(file);

        std::fs::rename(&tmp_path, &self.path).at(&loc)?;
        if sync {
            sync_parent_dir(&self.path);
        }

        tracing::debug!(
            "Snapshot written: {:?} docs={} bytes={}",
            self.path,
            snap.documents.len(),
            HEADER_SIZE as u64 + data_len
        );
        Ok(HEADER_SIZE as u64 + data_len)
    }

    /// rename 到 target 位置（两阶段提交的 commit 步骤）
    pub fn promote_to(&self, target: &SnapshotStore, sync: bool) -> Result<()> {
        std::fs::rename(&self.path, &target.path).at(&target.path.display())?;
        if sync {
            sync_parent_dir(&target.path);
        }
        Ok(())
    }

    /// 删除快照及残留 tmp（不存在视为成功）
    pub fn remove(&self) -> Result<()> {
        for p in [self.path.clone(), self.tmp_path()] {
            match std::fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IndexError::io(p.display().to_string(), e)),
            }
        }
        Ok(())
    }

    /// 只清理崩溃残留的 tmp 文件
    pub fn remove_stale_tmp(&self) -> bool {
        std::fs::remove_file(self.tmp_path()).is_ok()
    }
}

fn decode(data: &[u8]) -> SnapshotLoad {
    if data.len() < HEADER_SIZE {
        return SnapshotLoad::Corrupt("snapshot too small".to_string());
    }
    let u32_at = |off: usize| {
        let mut b = [0u8; 4];
        b.copy_from_slice(&data[off..off + 4]);
        u32::from_le_bytes(b)
    };
    let u64_at = |off: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&data[off..off + 8]);
        u64::from_le_bytes(b)
    };

    let magic = u32_at(0);
    let version = u32_at(4);
    let state = u32_at(8);
    let data_len = u64_at(12);
    let stored_checksum = u64_at(20);

    if magic != MAGIC {
        return SnapshotLoad::Corrupt(format!("magic mismatch: {magic:#x} != {MAGIC:#x}"));
    }
    if version != VERSION_CURRENT {
        return SnapshotLoad::Corrupt(format!(
            "version mismatch: {version} != {VERSION_CURRENT}"
        ));
    }
    if state != STATE_COMMITTED {
        return SnapshotLoad::Corrupt("snapshot state INCOMPLETE".to_string());
    }

    let body = &data[HEADER_SIZE..];
    if body.len() as u64 != data_len {
        return SnapshotLoad::Corrupt(format!(
            "data length mismatch: {} != {}",
            body.len(),
            data_len
        ));
    }
    let computed = xxh3_64(body);
    if computed != stored_checksum {
        return SnapshotLoad::Corrupt(format!(
            "checksum mismatch: {computed:#x} != {stored_checksum:#x}"
        ));
    }

    match bincode::deserialize::<IndexSnapshot>(body) {
        Ok(snap) => SnapshotLoad::Loaded(snap),
        Err(e) => SnapshotLoad::Corrupt(format!("deserialize failed: {e}")),
    }
}
