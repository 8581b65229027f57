use std::collections::BTreeMap;
use std::fmt;

use entity_model::{CollectionKind, IdentityToken, Scalar};
use serde::{Deserialize, Serialize};

// ============================================================================
// 旧值
// ============================================================================

/// 身份令牌集合，保留原集合的有序/无序形态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdCollection {
    pub kind: CollectionKind,
    pub ids: Vec<IdentityToken>,
}

impl IdCollection {
    pub fn new(kind: CollectionKind, ids: Vec<IdentityToken>) -> Self {
        Self { kind, ids }
    }

    pub fn contains(&self, id: &IdentityToken) -> bool {
        self.ids.contains(id)
    }
}

/// diff 中记录的旧值
///
/// 只保存标量和身份令牌，从不持有实体对象本身
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum OldValue {
    #[default]
    Null,
    Scalar(Scalar),
    Reference(IdentityToken),
    Collection(IdCollection),
}

impl OldValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, OldValue::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            OldValue::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&IdentityToken> {
        match self {
            OldValue::Reference(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&IdCollection> {
        match self {
            OldValue::Collection(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for OldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OldValue::Null => write!(f, "null"),
            OldValue::Scalar(s) => write!(f, "{}", s),
            OldValue::Reference(id) => write!(f, "{}", id),
            OldValue::Collection(c) => {
                let ids: Vec<String> = c.ids.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", ids.join(", "))
            }
        }
    }
}

// ============================================================================
// 属性变更
// ============================================================================

/// 单个属性的变更：属性名 + 旧值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    pub old_value: OldValue,
}

impl AttributeChange {
    pub fn new(name: impl Into<String>, old_value: OldValue) -> Self {
        Self { name: name.into(), old_value }
    }
}

/// AttributeChanges - 一个实体的属性级 diff
///
/// 顶层变更按属性名去重并保持记录顺序；嵌入式属性的变更按属性名保存为嵌套的 diff。
/// 嵌套属性可以用点分路径访问，例如 `address.city`
///
/// # 示例
/// ```ignore
/// let mut changes = AttributeChanges::new();
/// changes.add(AttributeChange::new("age", OldValue::Scalar(Scalar::Int(30))));
/// assert!(changes.is_changed("age"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeChanges {
    changes: Vec<AttributeChange>,
    embedded: BTreeMap<String, AttributeChanges>,
}

impl AttributeChanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录变更，同名属性已存在时替换旧值
    pub fn add(&mut self, change: AttributeChange) {
        match self.changes.iter_mut().find(|c| c.name == change.name) {
            Some(existing) => existing.old_value = change.old_value,
            None => self.changes.push(change),
        }
    }

    /// 记录嵌入式属性的嵌套变更，同名已存在时合并
    pub fn add_embedded(&mut self, name: impl Into<String>, nested: AttributeChanges) {
        let name = name.into();
        match self.embedded.get_mut(&name) {
            Some(existing) => existing.merge_with(nested),
            None => {
                self.embedded.insert(name, nested);
            }
        }
    }

    pub fn changes(&self) -> &[AttributeChange] {
        &self.changes
    }

    pub fn embedded(&self) -> &BTreeMap<String, AttributeChanges> {
        &self.embedded
    }

    /// 所有发生变更的属性名，嵌入式属性以点分路径展开
    pub fn attributes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.changes.iter().map(|c| c.name.clone()).collect();
        for (name, nested) in &self.embedded {
            names.extend(nested.attributes().into_iter().map(|n| format!("{}.{}", name, n)));
        }
        names
    }

    /// 属性（或点分路径指向的嵌套属性）是否发生变更
    pub fn is_changed(&self, path: &str) -> bool {
        if self.changes.iter().any(|c| c.name == path) || self.embedded.contains_key(path) {
            return true;
        }
        match path.split_once('.') {
            Some((head, rest)) => self.embedded.get(head).map(|n| n.is_changed(rest)).unwrap_or(false),
            None => false,
        }
    }

    /// 属性旧值；未变更的属性返回 None
    pub fn old_value(&self, path: &str) -> Option<&OldValue> {
        if let Some(change) = self.changes.iter().find(|c| c.name == path) {
            return Some(&change.old_value);
        }
        let (head, rest) = path.split_once('.')?;
        self.embedded.get(head)?.old_value(rest)
    }

    /// 引用属性的旧身份令牌
    pub fn old_reference_id(&self, path: &str) -> Option<&IdentityToken> {
        self.old_value(path).and_then(OldValue::as_reference)
    }

    /// 集合属性的旧身份令牌集合
    pub fn old_collection(&self, path: &str) -> Option<&IdCollection> {
        self.old_value(path).and_then(OldValue::as_collection)
    }

    /// 嵌入式属性的嵌套 diff
    pub fn nested_changes(&self, name: &str) -> Option<&AttributeChanges> {
        self.embedded.get(name)
    }

    /// 合并另一个 diff：同名属性以传入的旧值为准，嵌套 diff 按属性名递归合并
    pub fn merge_with(&mut self, other: AttributeChanges) {
        for change in other.changes {
            self.add(change);
        }
        for (name, nested) in other.embedded {
            self.add_embedded(name, nested);
        }
    }

    /// 只合并属性名：未出现过的属性记为旧值 null，已有条目保持不变
    ///
    /// 用于新建实体，diff 只说明哪些属性有值，不携带值本身
    pub fn merge_names(&mut self, other: &AttributeChanges) {
        let incoming =
            other.changes.iter().map(|c| c.name.as_str()).chain(other.embedded.keys().map(String::as_str));
        for name in incoming {
            if !self.changes.iter().any(|c| c.name == name) && !self.embedded.contains_key(name) {
                self.changes.push(AttributeChange::new(name, OldValue::Null));
            }
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.embedded.is_empty()
    }

    /// 顶层变更数加嵌入式属性数
    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len() + self.embedded.len()
    }
}

impl fmt::Display for AttributeChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for change in &self.changes {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", change.name, change.old_value)?;
            first = false;
        }
        for (name, nested) in &self.embedded {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, nested)?;
            first = false;
        }
        write!(f, "}}")
    }
}

impl FromIterator<AttributeChange> for AttributeChanges {
    fn from_iter<I: IntoIterator<Item = AttributeChange>>(iter: I) -> Self {
        let mut changes = AttributeChanges::new();
        for change in iter {
            changes.add(change);
        }
        changes
    }
}
