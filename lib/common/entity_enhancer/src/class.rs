use syn::{ImplItemFn, ItemImpl, ItemStruct, Type};

use crate::attrs::{parse_field_attrs, parse_struct_attrs, FieldAttrs, StructAttrs};
use crate::error::EnhanceError;

// ============================================================================
// 实体类型模型
// ============================================================================

/// 从结构体定义解析出的实体类型
#[derive(Debug, Clone)]
pub struct EntityClass {
    /// 结构体标识符
    pub ident: String,
    /// 带模块路径的显示名，用于日志和错误信息
    pub display_name: String,
    pub attrs: StructAttrs,
    pub fields: Vec<EntityField>,
}

#[derive(Debug, Clone)]
pub struct EntityField {
    pub name: String,
    pub ty: Type,
    pub attrs: FieldAttrs,
}

impl EntityClass {
    pub fn from_struct(item: &ItemStruct, module_path: &str) -> Result<Self, EnhanceError> {
        let ident = item.ident.to_string();
        let display_name =
            if module_path.is_empty() { ident.clone() } else { format!("{}::{}", module_path, ident) };
        let to_error = |e: syn::Error| EnhanceError::Attribute {
            class: display_name.clone(),
            message: e.to_string(),
        };

        let attrs = parse_struct_attrs(&item.attrs).map_err(to_error)?;

        let mut fields = Vec::new();
        for field in item.fields.iter() {
            // 元组结构体没有可追踪的命名字段
            let Some(name) = field.ident.as_ref() else {
                continue;
            };
            fields.push(EntityField {
                name: name.to_string(),
                ty: field.ty.clone(),
                attrs: parse_field_attrs(&field.attrs).map_err(to_error)?,
            });
        }

        Ok(Self { ident, display_name, attrs, fields })
    }

    pub fn field(&self, name: &str) -> Option<&EntityField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 字段的 setter 是否需要改写
    ///
    /// 条目与 transient 字段从不追踪；`annotated_only` 时只追踪标注了 `property` 的字段
    pub fn is_tracked(&self, field: &EntityField) -> bool {
        if field.attrs.entry || field.attrs.transient {
            return false;
        }
        !self.attrs.annotated_only || field.attrs.property
    }
}

// ============================================================================
// 增强单元
// ============================================================================

/// 一次增强处理的对象：实体结构体及同一作用域内它的所有固有 impl 块
pub struct ClassUnit<'a> {
    pub class: EntityClass,
    pub item: &'a mut ItemStruct,
    pub impls: Vec<&'a mut ItemImpl>,
}

impl<'a> ClassUnit<'a> {
    /// 所有固有方法
    pub fn methods(&self) -> Vec<&ImplItemFn> {
        self.impls
            .iter()
            .flat_map(|imp| imp.items.iter())
            .filter_map(|item| match item {
                syn::ImplItem::Fn(method) => Some(method),
                _ => None,
            })
            .collect()
    }

    pub fn methods_mut(&mut self) -> Vec<&mut ImplItemFn> {
        self.impls
            .iter_mut()
            .flat_map(|imp| imp.items.iter_mut())
            .filter_map(|item| match item {
                syn::ImplItem::Fn(method) => Some(method),
                _ => None,
            })
            .collect()
    }
}

/// impl 块是否为 `impl Name { .. }` 形式的固有实现
pub fn is_inherent_impl_of(imp: &ItemImpl, ident: &str) -> bool {
    if imp.trait_.is_some() {
        return false;
    }
    match &*imp.self_ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident == ident)
            .unwrap_or(false),
        _ => false,
    }
}
