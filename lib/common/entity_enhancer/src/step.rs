use std::collections::HashMap;

use proc_macro2::Span;
use syn::{FnArg, Ident, ImplItemFn, LitStr, Pat, ReturnType, Type};

use crate::attrs::setters_enhanced_marker;
use crate::class::{ClassUnit, EntityClass};
use crate::error::EnhanceError;
use crate::options::EnhancerOptions;
use crate::types::primitive_name;

/// 单个实体类型的增强结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 已带增强标记，未做改动
    AlreadyEnhanced,
    /// 改写了这些字段的 setter
    Enhanced { setters: Vec<String> },
}

// ============================================================================
// 增强步骤接口
// ============================================================================

/// EnhancingStep - 构建期对实体类型的一步改写
pub trait EnhancingStep {
    /// 步骤名称，用于日志
    fn enhancing_type(&self) -> &'static str;

    fn is_already_enhanced(&self, unit: &ClassUnit<'_>) -> bool;

    /// 执行改写，返回被改写的 setter 对应的字段名
    fn execute_internal(&self, unit: &mut ClassUnit<'_>) -> Result<Vec<String>, EnhanceError>;

    /// 跳过已增强的类型，其余交给 `execute_internal`
    fn execute(&self, unit: &mut ClassUnit<'_>) -> Result<StepOutcome, EnhanceError> {
        if self.is_already_enhanced(unit) {
            tracing::debug!("{}: {} is already enhanced", self.enhancing_type(), unit.class.display_name);
            return Ok(StepOutcome::AlreadyEnhanced);
        }

        let setters = self.execute_internal(unit)?;
        tracing::debug!(
            "{}: enhanced {} setters of {}",
            self.enhancing_type(),
            setters.len(),
            unit.class.display_name
        );
        Ok(StepOutcome::Enhanced { setters })
    }
}

// ============================================================================
// Setter 增强
// ============================================================================

/// SettersEnhancingStep - 改写 setter，使其在赋值前后读取属性并调用 `fire_listeners`
///
/// 改写后的 setter 形如：
/// ```ignore
/// pub fn set_name(&mut self, name: Option<String>) {
///     let __prev = ::entity_model::ToValue::to_value(&self.name());
///     (|| { self.name = name; })();
///     let __new = ::entity_model::ToValue::to_value(&self.name());
///     ::entity_model::fire_listeners(&*self, "name", __prev, __new);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SettersEnhancingStep {
    options: EnhancerOptions,
}

impl SettersEnhancingStep {
    pub fn new(options: EnhancerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EnhancerOptions {
        &self.options
    }

    fn enhance_setters(&self, unit: &mut ClassUnit<'_>) -> Result<Vec<String>, EnhanceError> {
        let getters = self.collect_getters(unit);
        let class = unit.class.clone();
        let mut enhanced = Vec::new();

        for method in unit.methods_mut() {
            let Some(field_name) = self.setter_field(method) else {
                continue;
            };
            // setter 名称没有对应的字段声明时保持原样
            let Some(field) = class.field(&field_name) else {
                continue;
            };
            if !class.is_tracked(field) {
                tracing::trace!("Skip untracked field {}.{}", class.display_name, field_name);
                continue;
            }

            check_field_type(&class, &field_name, setter_param_type(method))?;

            let getter = getters.get(&field_name).ok_or_else(|| EnhanceError::MissingGetter {
                class: class.display_name.clone(),
                field: field_name.clone(),
            })?;

            rewrite_setter(method, &field_name, getter);
            enhanced.push(field_name);
        }

        Ok(enhanced)
    }

    /// 持久化提供者内部方法只在 crate 内可见
    fn enhance_protected_for_persistent_methods(&self, unit: &mut ClassUnit<'_>) {
        let prefix = self.options.persistence_prefix.as_str();
        for method in unit.methods_mut() {
            if method.sig.ident.to_string().starts_with(prefix) {
                method.vis = syn::parse_quote!(pub(crate));
            }
        }
    }

    fn enhance_marker(&self, unit: &mut ClassUnit<'_>) {
        unit.item.attrs.push(setters_enhanced_marker());
    }

    /// setter 形态：`set_<field>(&mut self, value: T)`，无返回值
    fn setter_field(&self, method: &ImplItemFn) -> Option<String> {
        let name = method.sig.ident.to_string();
        let field = name.strip_prefix(self.options.setter_prefix.as_str())?;
        if field.is_empty() || !matches!(method.sig.output, ReturnType::Default) {
            return None;
        }

        let mut inputs = method.sig.inputs.iter();
        match inputs.next() {
            Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_some() => {}
            _ => return None,
        }
        match (inputs.next(), inputs.next()) {
            (Some(FnArg::Typed(arg)), None) if matches!(*arg.pat, Pat::Ident(_)) => Some(field.to_string()),
            _ => None,
        }
    }

    /// 字段名 -> getter 方法名；同时存在 `name()` 与 `get_name()` 时取前者
    fn collect_getters(&self, unit: &ClassUnit<'_>) -> HashMap<String, Ident> {
        let mut getters = HashMap::new();
        for method in unit.methods() {
            if !is_getter_signature(method) {
                continue;
            }
            let name = method.sig.ident.to_string();
            match name.strip_prefix(self.options.getter_prefix.as_str()) {
                Some(field) if unit.class.field(field).is_some() => {
                    getters.entry(field.to_string()).or_insert_with(|| method.sig.ident.clone());
                }
                _ => {
                    if unit.class.field(&name).is_some() {
                        getters.insert(name, method.sig.ident.clone());
                    }
                }
            }
        }
        getters
    }
}

impl EnhancingStep for SettersEnhancingStep {
    fn enhancing_type(&self) -> &'static str {
        "Setters Enhancer"
    }

    fn is_already_enhanced(&self, unit: &ClassUnit<'_>) -> bool {
        unit.class.attrs.setters_enhanced
    }

    fn execute_internal(&self, unit: &mut ClassUnit<'_>) -> Result<Vec<String>, EnhanceError> {
        let setters = self.enhance_setters(unit)?;
        self.enhance_protected_for_persistent_methods(unit);
        self.enhance_marker(unit);
        Ok(setters)
    }
}

// ============================================================================
// 辅助函数
// ============================================================================

fn check_field_type(class: &EntityClass, field: &str, param: Option<&Type>) -> Result<(), EnhanceError> {
    let declared = class.field(field).map(|f| &f.ty);
    for ty in param.into_iter().chain(declared) {
        if let Some(primitive) = primitive_name(ty) {
            return Err(EnhanceError::PrimitiveField {
                class: class.display_name.clone(),
                field: field.to_string(),
                ty: primitive,
            });
        }
    }
    Ok(())
}

fn setter_param_type(method: &ImplItemFn) -> Option<&Type> {
    method.sig.inputs.iter().find_map(|arg| match arg {
        FnArg::Typed(typed) => Some(&*typed.ty),
        FnArg::Receiver(_) => None,
    })
}

/// getter 形态：`fn x(&self) -> T`
fn is_getter_signature(method: &ImplItemFn) -> bool {
    let mut inputs = method.sig.inputs.iter();
    let receiver_ok = matches!(
        inputs.next(),
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none()
    );
    receiver_ok && inputs.next().is_none() && !matches!(method.sig.output, ReturnType::Default)
}

fn rewrite_setter(method: &mut ImplItemFn, field: &str, getter: &Ident) {
    let original = method.block.clone();
    let property = LitStr::new(field, Span::call_site());
    method.block = syn::parse_quote!({
        let __prev = ::entity_model::ToValue::to_value(&self.#getter());
        (|| #original)();
        let __new = ::entity_model::ToValue::to_value(&self.#getter());
        ::entity_model::fire_listeners(&*self, #property, __prev, __new);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn setter(step: &SettersEnhancingStep, method: ImplItemFn) -> Option<String> {
        step.setter_field(&method)
    }

    #[test]
    fn test_setter_shape() {
        let step = SettersEnhancingStep::default();

        assert_eq!(
            setter(&step, parse_quote!(pub fn set_name(&mut self, name: Option<String>) {})).as_deref(),
            Some("name")
        );
        // 不可变接收者
        assert_eq!(setter(&step, parse_quote!(fn set_name(&self, name: Option<String>) {})), None);
        // 有返回值
        assert_eq!(setter(&step, parse_quote!(fn set_name(&mut self, n: Option<String>) -> bool { true })), None);
        // 两个参数
        assert_eq!(setter(&step, parse_quote!(fn set_name(&mut self, a: String, b: String) {})), None);
        // 关联函数
        assert_eq!(setter(&step, parse_quote!(fn set_name(name: String) {})), None);
    }

    #[test]
    fn test_custom_setter_prefix() {
        let step = SettersEnhancingStep::new(EnhancerOptions {
            setter_prefix: "with_".to_string(),
            ..EnhancerOptions::default()
        });
        assert_eq!(
            setter(&step, parse_quote!(fn with_name(&mut self, name: Option<String>) {})).as_deref(),
            Some("name")
        );
        assert_eq!(setter(&step, parse_quote!(fn set_name(&mut self, name: Option<String>) {})), None);
    }

    #[test]
    fn test_getter_signature() {
        assert!(is_getter_signature(&parse_quote!(fn name(&self) -> &Option<String> { &self.name })));
        assert!(!is_getter_signature(&parse_quote!(fn name(&mut self) -> &Option<String> { &self.name })));
        assert!(!is_getter_signature(&parse_quote!(fn name(&self) {})));
    }

    #[test]
    fn test_rewrite_setter_body() {
        let mut method: ImplItemFn = parse_quote! {
            pub fn set_name(&mut self, name: Option<String>) {
                self.name = name;
            }
        };
        let getter: Ident = parse_quote!(name);

        rewrite_setter(&mut method, "name", &getter);

        assert_eq!(method.block.stmts.len(), 4);
        let rendered = quote::quote!(#method).to_string();
        assert!(rendered.contains("fire_listeners"));
        assert!(rendered.contains("\"name\""));
        assert!(rendered.contains("self . name = name"));
    }
}
