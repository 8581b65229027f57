//! 实体 setter 增强
//!
//! 在构建期改写实体类型的 setter，使每次赋值后都通过 `entity_model::fire_listeners`
//! 通知属性监听器。可由 `entity_derive::enhance` 属性宏在编译期调用，
//! 也可在构建脚本或命令行中直接处理源文件。

pub mod attrs;
pub mod class;
pub mod enhancer;
pub mod error;
pub mod options;
pub mod step;
pub mod types;

pub use attrs::{has_entity_derive, parse_field_attrs, parse_struct_attrs, FieldAttrs, StructAttrs};
pub use class::{ClassUnit, EntityClass, EntityField};
pub use enhancer::{enhance_file, enhance_items, enhance_path, enhance_source, EnhanceReport};
pub use error::EnhanceError;
pub use options::EnhancerOptions;
pub use step::{EnhancingStep, SettersEnhancingStep, StepOutcome};
pub use types::{infer_kind, primitive_name, unwrap_option, FieldKind};
