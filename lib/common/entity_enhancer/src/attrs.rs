use syn::punctuated::Punctuated;
use syn::{Attribute, Expr, ExprLit, Lit, Meta, Token};

/// 实体辅助属性名：`#[entity(...)]`
pub const ENTITY_ATTR: &str = "entity";

/// 增强完成后写入结构体的标记
pub const SETTERS_ENHANCED: &str = "setters_enhanced";

// ============================================================================
// 结构体级属性
// ============================================================================

/// 结构体上的 `#[entity(...)]` 配置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructAttrs {
    /// 实体名称，缺省为结构体名
    pub name: Option<String>,
    /// 被本类型替换的原始实体名称
    pub replaces: Option<String>,
    pub embeddable: bool,
    /// 软删除标记字段
    pub soft_delete: Option<String>,
    /// 只追踪显式标注 `#[entity(property)]` 的字段
    pub annotated_only: bool,
    pub setters_enhanced: bool,
}

/// 字段上的 `#[entity(...)]` 配置
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAttrs {
    pub entry: bool,
    pub id: bool,
    pub transient: bool,
    pub read_only: bool,
    pub reference: bool,
    pub collection: bool,
    pub embedded: bool,
    pub property: bool,
}

/// 解析结构体上所有 `#[entity(...)]`
///
/// # 示例
/// ```ignore
/// #[entity(name = "Customer", soft_delete = "deleted_at", annotated_only)]
/// ```
pub fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<StructAttrs> {
    let mut result = StructAttrs::default();

    for meta in entity_metas(attrs)? {
        match &meta {
            Meta::Path(path) => {
                let key = path_key(path);
                match key.as_str() {
                    "embeddable" => result.embeddable = true,
                    "annotated_only" => result.annotated_only = true,
                    SETTERS_ENHANCED => result.setters_enhanced = true,
                    _ => return Err(unknown(&meta, &key)),
                }
            }
            Meta::NameValue(nv) => {
                let key = path_key(&nv.path);
                let value = string_value(&nv.value)?;
                match key.as_str() {
                    "name" => result.name = Some(value),
                    "replaces" => result.replaces = Some(value),
                    "soft_delete" => result.soft_delete = Some(value),
                    _ => return Err(unknown(&meta, &key)),
                }
            }
            Meta::List(list) => {
                return Err(syn::Error::new_spanned(list, "nested lists are not supported in #[entity]"));
            }
        }
    }

    Ok(result)
}

/// 解析字段上所有 `#[entity(...)]`
pub fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for meta in entity_metas(attrs)? {
        let Meta::Path(path) = &meta else {
            return Err(syn::Error::new_spanned(&meta, "field options of #[entity] are plain flags"));
        };
        let key = path_key(path);
        match key.as_str() {
            "entry" => result.entry = true,
            "id" => result.id = true,
            "transient" => result.transient = true,
            "read_only" => result.read_only = true,
            "reference" => result.reference = true,
            "collection" => result.collection = true,
            "embedded" => result.embedded = true,
            "property" => result.property = true,
            _ => return Err(unknown(&meta, &key)),
        }
    }

    Ok(result)
}

/// 结构体是否带有 `#[derive(Entity)]`（也接受 `entity_derive::Entity` 路径）
pub fn has_entity_derive(attrs: &[Attribute]) -> bool {
    attrs.iter().filter(|attr| attr.path().is_ident("derive")).any(|attr| {
        attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
            .map(|paths| {
                paths
                    .iter()
                    .any(|p| p.segments.last().map(|s| s.ident == "Entity").unwrap_or(false))
            })
            .unwrap_or(false)
    })
}

/// 增强标记属性 `#[entity(setters_enhanced)]`
pub fn setters_enhanced_marker() -> Attribute {
    syn::parse_quote!(#[entity(setters_enhanced)])
}

fn entity_metas(attrs: &[Attribute]) -> syn::Result<Vec<Meta>> {
    let mut metas = Vec::new();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(ENTITY_ATTR)) {
        let nested = attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)?;
        metas.extend(nested);
    }
    Ok(metas)
}

fn path_key(path: &syn::Path) -> String {
    path.get_ident().map(|ident| ident.to_string()).unwrap_or_default()
}

fn string_value(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit { lit: Lit::Str(s), .. }) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn unknown(meta: &Meta, key: &str) -> syn::Error {
    syn::Error::new_spanned(meta, format!("unknown #[entity] option `{}`", key))
}
