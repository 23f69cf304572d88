use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    /// 参与匹配
    pub searchable: bool,
    /// 出现在查询结果里
    pub stored: bool,
}

/// 以 primary key 标识的字段袋。同一字段名允许多值。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    primary_key: String,
    fields: Vec<Field>,
}

impl IndexDocument {
    /// 查询里引用 primary key 的伪字段名
    pub const PRIMARY_KEY_FIELD: &'static str = "_pk";

    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            fields: Vec::new(),
        }
    }

    pub fn add_pair(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        searchable: bool,
        stored: bool,
    ) {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
            searchable,
            stored,
        });
    }

    /// builder 形式：searchable + stored
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_pair(name, value, true, true);
        self
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub(crate) fn searchable_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.searchable && f.name == name)
            .map(|f| f.value.as_str())
    }

    /// 结果投影：只保留 stored 字段；`fields_to_load` 非空时再按名字过滤。
    pub(crate) fn project(&self, fields_to_load: &[&str]) -> IndexDocument {
        let fields = self
            .fields
            .iter()
            .filter(|f| f.stored)
            .filter(|f| fields_to_load.is_empty() || fields_to_load.contains(&f.name.as_str()))
            .cloned()
            .collect();
        IndexDocument {
            primary_key: self.primary_key.clone(),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_drops_unstored_and_unrequested_fields() {
        let mut doc = IndexDocument::new("a")
            .with_field("text", "foo")
            .with_field("kind", "class");
        doc.add_pair("hidden", "x", true, false);

        let all = doc.project(&[]);
        assert_eq!(all.fields().len(), 2);
        assert_eq!(all.value("hidden"), None);

        let some = doc.project(&["kind"]);
        assert_eq!(some.primary_key(), "a");
        assert_eq!(some.value("kind"), Some("class"));
        assert_eq!(some.value("text"), None);
    }

    #[test]
    fn value_outlives_the_lookup_name() {
        let doc = IndexDocument::new("a")
            .with_field("kind", "class")
            .with_field("kind", "method");
        let first = {
            let name = String::from("kind");
            doc.value(&name)
        };
        assert_eq!(first, Some("class"));
        assert_eq!(doc.values("kind").count(), 2);
        assert_eq!(doc.value("missing"), None);
    }
}
