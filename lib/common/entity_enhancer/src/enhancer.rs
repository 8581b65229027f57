use std::fs;
use std::path::Path;

use quote::ToTokens;
use syn::Item;

use crate::attrs::has_entity_derive;
use crate::class::{is_inherent_impl_of, ClassUnit, EntityClass};
use crate::error::EnhanceError;
use crate::step::{EnhancingStep, StepOutcome};

/// 一次增强的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnhanceReport {
    /// 本次改写的实体类型及其被改写的 setter 字段
    pub enhanced: Vec<(String, Vec<String>)>,
    /// 已带增强标记而跳过的实体类型
    pub skipped: Vec<String>,
}

impl EnhanceReport {
    pub fn setters_of(&self, class: &str) -> Option<&[String]> {
        self.enhanced.iter().find(|(name, _)| name == class).map(|(_, setters)| setters.as_slice())
    }

    pub fn total_setters(&self) -> usize {
        self.enhanced.iter().map(|(_, setters)| setters.len()).sum()
    }

    fn absorb(&mut self, other: EnhanceReport) {
        self.enhanced.extend(other.enhanced);
        self.skipped.extend(other.skipped);
    }
}

// ============================================================================
// 语法树级入口
// ============================================================================

/// 对一组条目执行增强，递归处理内联模块
///
/// 实体类型为同一作用域内带 `#[derive(Entity)]` 的结构体，它的 setter 只在同一作用域的固有 impl 块中查找
pub fn enhance_items(
    items: &mut [Item],
    module_path: &str,
    step: &dyn EnhancingStep,
) -> Result<EnhanceReport, EnhanceError> {
    let mut report = EnhanceReport::default();

    for item in items.iter_mut() {
        if let Item::Mod(module) = item {
            if let Some((_, content)) = module.content.as_mut() {
                let nested_path = if module_path.is_empty() {
                    module.ident.to_string()
                } else {
                    format!("{}::{}", module_path, module.ident)
                };
                report.absorb(enhance_items(content, &nested_path, step)?);
            }
        }
    }

    let classes = items
        .iter()
        .filter_map(|item| match item {
            Item::Struct(s) if has_entity_derive(&s.attrs) => Some(EntityClass::from_struct(s, module_path)),
            _ => None,
        })
        .collect::<Result<Vec<_>, _>>()?;

    for class in classes {
        let mut struct_item = None;
        let mut impls = Vec::new();
        for item in items.iter_mut() {
            match item {
                Item::Struct(s) if s.ident == class.ident => struct_item = Some(s),
                Item::Impl(imp) if is_inherent_impl_of(imp, &class.ident) => impls.push(imp),
                _ => {}
            }
        }
        let Some(struct_item) = struct_item else {
            continue;
        };

        let display_name = class.display_name.clone();
        let mut unit = ClassUnit { class, item: struct_item, impls };
        match step.execute(&mut unit)? {
            StepOutcome::AlreadyEnhanced => report.skipped.push(display_name),
            StepOutcome::Enhanced { setters } => report.enhanced.push((display_name, setters)),
        }
    }

    Ok(report)
}

pub fn enhance_file(file: &mut syn::File, step: &dyn EnhancingStep) -> Result<EnhanceReport, EnhanceError> {
    enhance_items(&mut file.items, "", step)
}

// ============================================================================
// 源码与文件入口（供构建脚本和命令行使用）
// ============================================================================

/// 增强一段源码，返回改写后的源码
pub fn enhance_source(
    source: &str,
    origin: &str,
    step: &dyn EnhancingStep,
) -> Result<(String, EnhanceReport), EnhanceError> {
    let mut file = syn::parse_file(source).map_err(|e| EnhanceError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })?;

    let report = enhance_file(&mut file, step)?;
    Ok((file.into_token_stream().to_string(), report))
}

/// 读取 `input`，增强后写入 `output`
pub fn enhance_path(input: &Path, output: &Path, step: &dyn EnhancingStep) -> Result<EnhanceReport, EnhanceError> {
    let source = fs::read_to_string(input).map_err(|source| EnhanceError::Io {
        path: input.display().to_string(),
        source,
    })?;

    let (enhanced, report) = enhance_source(&source, &input.display().to_string(), step)?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| EnhanceError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    fs::write(output, enhanced).map_err(|source| EnhanceError::Io {
        path: output.display().to_string(),
        source,
    })?;

    tracing::info!(
        "Enhanced {} -> {}: {} classes, {} setters",
        input.display(),
        output.display(),
        report.enhanced.len(),
        report.total_setters()
    );
    Ok(report)
}
