use syn::{GenericArgument, PathArguments, Type};

/// 无法表达"未设置"状态的基本类型
pub const PRIMITIVE_TYPES: &[&str] = &[
    "bool", "char", "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128",
    "usize", "f32", "f64",
];

/// 按字段类型推断的属性种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Reference,
    Collection,
}

/// 类型为基本类型时返回其名称
pub fn primitive_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Group(group) => primitive_name(&group.elem),
        Type::Paren(paren) => primitive_name(&paren.elem),
        Type::Path(type_path) if type_path.qself.is_none() => {
            let ident = type_path.path.get_ident()?.to_string();
            PRIMITIVE_TYPES.contains(&ident.as_str()).then_some(ident)
        }
        _ => None,
    }
}

/// 根据字段类型推断种类
///
/// `Arc<E>` 或 `Option<Arc<E>>` 为引用，`Vec<Arc<E>>` 与 `EntitySet<E>` 为集合，其余为标量。
/// 嵌入式字段无法从类型上区分，需显式标注 `#[entity(embedded)]`
pub fn infer_kind(ty: &Type) -> FieldKind {
    let ty = unwrap_option(ty).unwrap_or(ty);
    match last_segment(ty) {
        Some((name, _)) if name == "Arc" => FieldKind::Reference,
        Some((name, _)) if name == "EntitySet" => FieldKind::Collection,
        Some((name, Some(inner))) if name == "Vec" => match last_segment(inner) {
            Some((inner_name, _)) if inner_name == "Arc" => FieldKind::Collection,
            _ => FieldKind::Scalar,
        },
        _ => FieldKind::Scalar,
    }
}

/// `Option<T>` 中的 T
pub fn unwrap_option(ty: &Type) -> Option<&Type> {
    match last_segment(ty) {
        Some((name, inner)) if name == "Option" => inner,
        _ => None,
    }
}

/// 类型路径最后一段的名称与第一个类型参数
fn last_segment(ty: &Type) -> Option<(String, Option<&Type>)> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let first_arg = match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    };
    Some((segment.ident.to_string(), first_arg))
}
