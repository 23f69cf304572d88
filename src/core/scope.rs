/// 调用方所处的更新作用域。
///
/// `Transient`：投机性编辑批次（例如编辑器中未保存的内容），写入只进 overlay，
/// 永不进入 base store 的事务。由调用方在每次调用时显式传入。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum UpdateScope {
    #[default]
    Durable,
    Transient,
}

impl UpdateScope {
    pub fn is_transient(self) -> bool {
        matches!(self, UpdateScope::Transient)
    }
}

impl From<bool> for UpdateScope {
    fn from(transient: bool) -> Self {
        if transient {
            UpdateScope::Transient
        } else {
            UpdateScope::Durable
        }
    }
}
