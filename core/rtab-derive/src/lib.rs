//! rtab Derive — procedural macros for rtab table descriptions.
//!
//! Provides `#[derive(Description)]`, which turns a struct into a table layout.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{Data, DeriveInput, Expr, Fields, LitInt, parse_macro_input};

/// Derive macro for declarative table descriptions.
///
/// # Example
///
/// ```ignore
/// #[derive(Description)]
/// pub struct Particle {
///     #[rtab(pos = 0)]
///     pub id: i64,
///     pub name: [u8; 16],
///     #[rtab(default = 1.0)]
///     pub energy: f64,
///     pub momentum: [f32; 3],
/// }
/// ```
///
/// Generates:
/// - `Description` — one column per field, typed by the field's `ColumnDescribe` impl
/// - `IntoRow` — field values in column position order
///
/// Fields without `pos` fill the free positions in declaration order, the same rule
/// `Schema::from_column_spec` applies.
#[proc_macro_derive(Description, attributes(rtab))]
pub fn derive_description(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

struct FieldAttrs {
    pos: Option<usize>,
    default: Option<Expr>,
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Description can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Description can only be derived for structs",
            ));
        }
    };
    if fields.is_empty() {
        return Err(syn::Error::new_spanned(name, "a table needs at least one column"));
    }

    let attrs = fields
        .iter()
        .map(|f| field_attrs(&f.attrs))
        .collect::<syn::Result<Vec<_>>>()?;
    let requested: Vec<Option<usize>> = attrs.iter().map(|a| a.pos).collect();
    let positions = assign_positions(&requested).map_err(|msg| syn::Error::new(Span::call_site(), msg))?;

    let columns = fields.iter().zip(&attrs).zip(&positions).map(|((f, a), pos)| {
        let column = f.ident.as_ref().map(|i| i.to_string()).unwrap_or_default();
        let ty = &f.ty;
        let default = a.default.as_ref().map(|expr| quote! { .with_default(#expr) });
        quote! {
            (
                #column.to_string(),
                <#ty as ::rtab_core::schema::ColumnDescribe>::column_spec()
                    .with_pos(#pos)
                    #default
            )
        }
    });

    let mut by_position: Vec<(usize, &syn::Field)> = positions.iter().copied().zip(fields.iter()).collect();
    by_position.sort_by_key(|(pos, _)| *pos);
    let values = by_position.iter().map(|(_, f)| {
        let ident = &f.ident;
        let ty = &f.ty;
        quote! { <#ty as ::rtab_core::schema::ColumnDescribe>::to_value(&self.#ident) }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::rtab_core::schema::Description for #name #ty_generics #where_clause {
            fn columns() -> ::std::vec::Vec<(::std::string::String, ::rtab_core::schema::ColumnSpec)> {
                ::std::vec![#(#columns),*]
            }
        }

        impl #impl_generics ::rtab_core::schema::IntoRow for #name #ty_generics #where_clause {
            fn into_row(&self) -> ::std::vec::Vec<::rtab_core::schema::Value> {
                ::std::vec![#(#values),*]
            }
        }
    })
}

fn field_attrs(attrs: &[syn::Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs {
        pos: None,
        default: None,
    };
    for attr in attrs.iter().filter(|a| a.path().is_ident("rtab")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("pos") {
                let lit: LitInt = meta.value()?.parse()?;
                out.pos = Some(lit.base10_parse()?);
                Ok(())
            } else if meta.path.is_ident("default") {
                out.default = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `pos = N` or `default = value`"))
            }
        })?;
    }
    Ok(out)
}

/// Explicit positions are kept; the rest fill the free slots in order.
fn assign_positions(requested: &[Option<usize>]) -> Result<Vec<usize>, String> {
    let n = requested.len();
    let mut taken = vec![false; n];
    for pos in requested.iter().flatten() {
        if *pos >= n {
            return Err(format!("pos = {pos} is out of range for {n} columns"));
        }
        if taken[*pos] {
            return Err(format!("pos = {pos} is used by more than one field"));
        }
        taken[*pos] = true;
    }
    let mut free = (0..n).filter(|p| !taken[*p]);
    requested
        .iter()
        .map(|pos| match pos {
            Some(pos) => Ok(*pos),
            None => free.next().ok_or_else(|| "no free column position left".to_string()),
        })
        .collect()
}
