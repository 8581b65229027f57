use entity_enhancer::{
    infer_kind, parse_field_attrs, parse_struct_attrs, EnhancerOptions, FieldKind, SettersEnhancingStep,
    StructAttrs,
};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Data, DeriveInput, Fields, Ident, ItemMod, Meta, Token, Type};

/// Entity derive macro - 自动实现 `entity_model::ManagedEntity`
///
/// # 属性
/// - `#[entity(name = "Customer")]` - 实体名称（默认为结构体名）
/// - `#[entity(replaces = "Customer")]` - 扩展并替换的原始实体
/// - `#[entity(embeddable)]` - 嵌入式值对象，额外生成 `ToValue`/`FromValue`
/// - `#[entity(soft_delete = "deleted_at")]` - 软删除标记字段
/// - `#[entity(annotated_only)]` - 只追踪标注了 `property` 的字段
/// - `#[entity(entry)]` - 实体条目字段（必需）
/// - `#[entity(id)]` - 主键字段（默认为 `id`）
/// - `#[entity(transient)]` - 不属于实体元数据的字段
/// - `#[entity(read_only)]` / `reference` / `collection` / `embedded` / `property`
///
/// # 示例
/// ```ignore
/// use entity_model::EntityEntry;
///
/// #[derive(Debug, Clone, entity_derive::Entity)]
/// struct Owner {
///     #[entity(entry)]
///     entry: EntityEntry,
///     id: i64,
///     name: Option<String>,
///     #[entity(transient)]
///     cached_label: String,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_entity(&input).unwrap_or_else(syn::Error::into_compile_error).into()
}

/// 对内联模块执行 setter 增强
///
/// 模块内带 `#[derive(Entity)]` 的结构体，其同模块固有 impl 中的 setter 会被改写为
/// 赋值后调用 `entity_model::fire_listeners`。增强失败时以编译错误中止构建。
///
/// # 示例
/// ```ignore
/// #[entity_derive::enhance]
/// mod model {
///     #[derive(Debug, Clone, entity_derive::Entity)]
///     pub struct Owner { /* ... */ }
///
///     impl Owner {
///         pub fn name(&self) -> &Option<String> { &self.name }
///         pub fn set_name(&mut self, name: Option<String>) { self.name = name; }
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn enhance(args: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(args);
    let mut module = parse_macro_input!(item as ItemMod);
    match expand_enhance(args, &mut module) {
        Ok(()) => quote!(#module).into(),
        Err(err) => err.into_compile_error().into(),
    }
}

// ============================================================================
// #[derive(Entity)]
// ============================================================================

struct Property<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    kind: TokenStream2,
    read_only: bool,
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(name, "Entity can only be derived for structs"));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(name, "Entity requires a struct with named fields"));
    };

    let struct_attrs = parse_struct_attrs(&input.attrs)?;

    // 解析字段
    let mut entry_field: Option<&Ident> = None;
    let mut id_field: Option<&Ident> = None;
    let mut properties = Vec::new();
    for field in fields.named.iter() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = parse_field_attrs(&field.attrs)?;

        if attrs.entry {
            if entry_field.is_some() {
                return Err(syn::Error::new_spanned(ident, "only one field may be marked #[entity(entry)]"));
            }
            entry_field = Some(ident);
            continue;
        }
        if attrs.transient {
            continue;
        }

        let is_id = attrs.id || (id_field.is_none() && ident == "id");
        if is_id {
            id_field = Some(ident);
        }

        properties.push(Property {
            ident,
            ty: &field.ty,
            kind: property_kind(&attrs, &field.ty),
            read_only: attrs.read_only || is_id,
        });
    }

    let entry_field = entry_field.ok_or_else(|| {
        syn::Error::new_spanned(name, "Entity requires a field of type EntityEntry marked #[entity(entry)]")
    })?;
    if id_field.is_none() && !struct_attrs.embeddable {
        return Err(syn::Error::new_spanned(
            name,
            "Entity requires a key field named `id` or marked #[entity(id)]",
        ));
    }

    let meta = generate_meta(name, &struct_attrs, &properties);
    let key_body = match id_field {
        Some(id) => quote! { ::entity_model::ToKey::to_key(&self.#id) },
        None => quote! { None },
    };
    let get_arms = generate_get_arms(&properties);
    let set_arms = generate_set_arms(&properties);
    let enhanced = struct_attrs.setters_enhanced;

    let marker_impl = if enhanced {
        quote! {
            impl #impl_generics ::entity_model::SettersEnhanced for #name #ty_generics #where_clause {}
        }
    } else {
        quote! {}
    };

    let embeddable_impl = if struct_attrs.embeddable {
        generate_embeddable_impl(input)
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #impl_generics ::entity_model::ManagedEntity for #name #ty_generics #where_clause {
            fn meta(&self) -> &'static ::entity_model::EntityMeta {
                #meta
            }

            fn entry(&self) -> &::entity_model::EntityEntry {
                &self.#entry_field
            }

            fn entry_mut(&mut self) -> &mut ::entity_model::EntityEntry {
                &mut self.#entry_field
            }

            fn key(&self) -> Option<::entity_model::KeyValue> {
                #key_body
            }

            fn get_value(&self, property: &str) -> Option<::entity_model::Value> {
                match property {
                    #(#get_arms)*
                    _ => None,
                }
            }

            #[allow(unused_variables)]
            fn set_value(
                &mut self,
                property: &str,
                value: ::entity_model::Value,
            ) -> Result<(), ::entity_model::ModelError> {
                match property {
                    #(#set_arms)*
                    _ => Err(::entity_model::ModelError::UnknownProperty {
                        entity: ::entity_model::ManagedEntity::meta(self).name.to_string(),
                        property: property.to_string(),
                    }),
                }
            }

            fn setters_enhanced(&self) -> bool {
                #enhanced
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }

            fn into_any_arc(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }
        }

        #marker_impl

        #embeddable_impl
    })
}

fn property_kind(attrs: &entity_enhancer::FieldAttrs, ty: &Type) -> TokenStream2 {
    if attrs.embedded {
        return quote!(::entity_model::PropertyKind::Embedded);
    }
    if attrs.collection {
        return quote!(::entity_model::PropertyKind::Collection);
    }
    if attrs.reference {
        return quote!(::entity_model::PropertyKind::Reference);
    }
    match infer_kind(ty) {
        FieldKind::Reference => quote!(::entity_model::PropertyKind::Reference),
        FieldKind::Collection => quote!(::entity_model::PropertyKind::Collection),
        FieldKind::Scalar => quote!(::entity_model::PropertyKind::Scalar),
    }
}

fn generate_meta(name: &Ident, attrs: &StructAttrs, properties: &[Property<'_>]) -> TokenStream2 {
    let entity_name = attrs.name.clone().unwrap_or_else(|| name.to_string());
    let replaces = option_str(attrs.replaces.as_deref());
    let soft_delete = option_str(attrs.soft_delete.as_deref());
    let embeddable = attrs.embeddable;

    let property_metas = properties.iter().map(|p| {
        let property_name = p.ident.to_string();
        let kind = &p.kind;
        let read_only = p.read_only;
        quote! {
            ::entity_model::PropertyMeta { name: #property_name, kind: #kind, read_only: #read_only }
        }
    });

    quote! {
        static PROPERTIES: &[::entity_model::PropertyMeta] = &[#(#property_metas),*];
        static META: ::entity_model::EntityMeta = ::entity_model::EntityMeta {
            name: #entity_name,
            replaces: #replaces,
            embeddable: #embeddable,
            soft_delete: #soft_delete,
            properties: PROPERTIES,
        };
        &META
    }
}

fn option_str(value: Option<&str>) -> TokenStream2 {
    match value {
        Some(v) => quote!(Some(#v)),
        None => quote!(None),
    }
}

fn generate_get_arms(properties: &[Property<'_>]) -> Vec<TokenStream2> {
    properties
        .iter()
        .map(|p| {
            let ident = p.ident;
            let property_name = ident.to_string();
            quote! {
                #property_name => Some(::entity_model::ToValue::to_value(&self.#ident)),
            }
        })
        .collect()
}

fn generate_set_arms(properties: &[Property<'_>]) -> Vec<TokenStream2> {
    properties
        .iter()
        .map(|p| {
            let ident = p.ident;
            let ty = p.ty;
            let property_name = ident.to_string();
            if p.read_only {
                return quote! {
                    #property_name => Err(::entity_model::ModelError::ReadOnlyProperty {
                        entity: ::entity_model::ManagedEntity::meta(self).name.to_string(),
                        property: #property_name.to_string(),
                    }),
                };
            }
            quote! {
                #property_name => {
                    let actual = value.kind_name();
                    match <#ty as ::entity_model::FromValue>::from_value(value) {
                        Some(converted) => {
                            self.#ident = converted;
                            Ok(())
                        }
                        None => Err(::entity_model::ModelError::type_mismatch(
                            #property_name,
                            stringify!(#ty),
                            actual,
                        )),
                    }
                }
            }
        })
        .collect()
}

/// 嵌入式值对象以 `Value::Embedded` 形式参与属性读写
fn generate_embeddable_impl(input: &DeriveInput) -> TokenStream2 {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    quote! {
        impl #impl_generics ::entity_model::ToValue for #name #ty_generics #where_clause {
            fn to_value(&self) -> ::entity_model::Value {
                ::entity_model::Value::Embedded(::std::sync::Arc::new(::std::clone::Clone::clone(self)))
            }
        }

        impl #impl_generics ::entity_model::FromValue for #name #ty_generics #where_clause {
            fn from_value(value: ::entity_model::Value) -> Option<Self> {
                match value {
                    ::entity_model::Value::Embedded(embedded) => {
                        ::entity_model::ManagedEntity::as_any(&*embedded)
                            .downcast_ref::<Self>()
                            .cloned()
                    }
                    _ => None,
                }
            }
        }
    }
}

// ============================================================================
// #[enhance]
// ============================================================================

fn expand_enhance(args: TokenStream2, module: &mut ItemMod) -> syn::Result<()> {
    let options = parse_enhance_options(args)?;
    let module_name = module.ident.to_string();
    let module_span = module.ident.span();

    let Some((_, items)) = module.content.as_mut() else {
        return Err(syn::Error::new(module_span, "#[enhance] requires an inline module"));
    };

    let step = SettersEnhancingStep::new(options);
    entity_enhancer::enhance_items(items, &module_name, &step)
        .map(|_| ())
        .map_err(|e| syn::Error::new(module_span, e.to_string()))
}

/// `#[enhance(setter_prefix = "with_", getter_prefix = "get_")]`
fn parse_enhance_options(args: TokenStream2) -> syn::Result<EnhancerOptions> {
    let mut options = EnhancerOptions::default();
    if args.is_empty() {
        return Ok(options);
    }

    let metas = syn::parse::Parser::parse2(Punctuated::<Meta, Token![,]>::parse_terminated, args)?;
    for meta in metas {
        let Meta::NameValue(nv) = &meta else {
            return Err(syn::Error::new_spanned(&meta, "expected `key = \"value\"`"));
        };
        let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(value), .. }) = &nv.value else {
            return Err(syn::Error::new_spanned(&nv.value, "expected a string literal"));
        };
        let key = nv.path.get_ident().map(|i| i.to_string()).unwrap_or_default();
        match key.as_str() {
            "setter_prefix" => options.setter_prefix = value.value(),
            "getter_prefix" => options.getter_prefix = value.value(),
            "persistence_prefix" => options.persistence_prefix = value.value(),
            _ => return Err(syn::Error::new_spanned(&nv.path, format!("unknown #[enhance] option `{}`", key))),
        }
    }
    Ok(options)
}
