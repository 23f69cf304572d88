use std::fmt;

use serde::Serialize;

use crate::storage::IndexStatus;

/// 单个 LayeredIndex 的状态快照
#[derive(Clone, Debug, Serialize)]
pub struct IndexReport {
    /// 规范 root（`file:///.../<version>/`）
    pub root: String,
    /// base store 状态
    pub status: IndexStatus,
    /// base 已提交文档数
    pub committed_docs: usize,
    /// base pending 缓冲条数（未 tx_store）
    pub pending_changes: usize,
    /// dirty key 数
    pub dirty_keys: usize,
    /// 当前 overlay（无 transient 会话时为 None）
    pub overlay: Option<OverlayStats>,
    /// 屏蔽集合大小
    pub suppressed_keys: usize,
    /// 累计创建过的 overlay 数
    pub overlays_created: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OverlayStats {
    pub epoch: u64,
    pub documents: usize,
    pub flushes: u64,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           layerdex Index Report                  ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ {:<48} ║", self.root)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Base store:                                      ║")?;
        writeln!(f, "║   status:       {:>10}                       ║", self.status.as_str())?;
        writeln!(f, "║   committed:    {:>10}                       ║", self.committed_docs)?;
        writeln!(f, "║   pending:      {:>10}                       ║", self.pending_changes)?;
        writeln!(f, "║   dirty keys:   {:>10}                       ║", self.dirty_keys)?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Overlay:                                         ║")?;
        match &self.overlay {
            Some(o) => {
                writeln!(f, "║   epoch:        {:>10}                       ║", o.epoch)?;
                writeln!(f, "║   documents:    {:>10}                       ║", o.documents)?;
                writeln!(f, "║   flushes:      {:>10}                       ║", o.flushes)?;
            }
            None => writeln!(f, "║   (none)                                         ║")?,
        }
        writeln!(f, "║   suppressed:   {:>10}                       ║", self.suppressed_keys)?;
        writeln!(f, "║   created:      {:>10}                       ║", self.overlays_created)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_renders_overlay_section() {
        let mut r = IndexReport {
            root: "file:///tmp/idx/1/".to_string(),
            status: IndexStatus::Valid,
            committed_docs: 3,
            pending_changes: 0,
            dirty_keys: 1,
            overlay: None,
            suppressed_keys: 0,
            overlays_created: 0,
        };
        assert!(r.to_string().contains("(none)"));

        r.overlay = Some(OverlayStats {
            epoch: 2,
            documents: 5,
            flushes: 1,
        });
        let text = r.to_string();
        assert!(text.contains("valid"));
        assert!(text.contains("epoch:"));
        assert!(!text.contains("(none)"));
    }
}
