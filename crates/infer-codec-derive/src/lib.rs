//! `#[derive(Codec)]` for the message types of the streaming transport.
//!
//! Struct fields are encoded in declaration order. Enums write a `u32`
//! variant index followed by the variant's fields. Generic items are not
//! supported.

use proc_macro::TokenStream;
use proc_macro2::{Delimiter, Group, Ident, Literal, Span, TokenStream as TokenStream2, TokenTree};
use quote::quote;

struct Field {
    name: Option<Ident>,
    ty: TokenStream2,
}

enum Fields {
    Named(Vec<Field>),
    Tuple(Vec<Field>),
    Unit,
}

struct Variant {
    name: Ident,
    fields: Fields,
}

enum Body {
    Struct(Fields),
    Enum(Vec<Variant>),
}

fn is_punct(token: Option<&TokenTree>, c: char) -> bool {
    matches!(token, Some(TokenTree::Punct(p)) if p.as_char() == c)
}

// Skip `#[...]` attributes (doc comments included) and a `pub`/`pub(...)`
// visibility starting at `i`.
fn skip_attrs_and_vis(tokens: &[TokenTree], mut i: usize) -> usize {
    loop {
        if is_punct(tokens.get(i), '#') {
            i += 2;
            continue;
        }
        if let Some(TokenTree::Ident(id)) = tokens.get(i) {
            if id == "pub" {
                i += 1;
                if let Some(TokenTree::Group(g)) = tokens.get(i) {
                    if g.delimiter() == Delimiter::Parenthesis {
                        i += 1;
                    }
                }
                continue;
            }
        }
        return i;
    }
}

// Tokens of one type up to the next top-level `,`. Tracks `<>` nesting so
// `Result<A, B>` stays whole.
fn collect_type(tokens: &[TokenTree], mut i: usize) -> (TokenStream2, usize) {
    let mut depth = 0usize;
    let mut out = Vec::new();
    while let Some(token) = tokens.get(i) {
        if let TokenTree::Punct(p) = token {
            match p.as_char() {
                ',' if depth == 0 => break,
                '<' => depth += 1,
                '>' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        out.push(token.clone());
        i += 1;
    }
    (out.into_iter().collect(), i)
}

fn parse_fields(group: &Group, named: bool) -> Vec<Field> {
    let tokens: Vec<_> = group.stream().into_iter().collect();
    let mut fields = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        i = skip_attrs_and_vis(&tokens, i);
        let name = if named {
            let Some(TokenTree::Ident(name)) = tokens.get(i) else {
                break;
            };
            // name ':'
            i += 2;
            Some(name.clone())
        } else {
            None
        };
        let (ty, end) = collect_type(&tokens, i);
        i = end + 1;
        if !ty.is_empty() {
            fields.push(Field { name, ty });
        }
    }
    fields
}

fn parse_group_fields(token: Option<&TokenTree>) -> Fields {
    match token {
        Some(TokenTree::Group(g)) if g.delimiter() == Delimiter::Brace => Fields::Named(parse_fields(g, true)),
        Some(TokenTree::Group(g)) if g.delimiter() == Delimiter::Parenthesis => {
            Fields::Tuple(parse_fields(g, false))
        }
        _ => Fields::Unit,
    }
}

fn parse_variants(group: &Group) -> Vec<Variant> {
    let tokens: Vec<_> = group.stream().into_iter().collect();
    let mut variants = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        i = skip_attrs_and_vis(&tokens, i);
        let Some(TokenTree::Ident(name)) = tokens.get(i) else {
            break;
        };
        i += 1;
        let fields = parse_group_fields(tokens.get(i));
        if !matches!(fields, Fields::Unit) {
            i += 1;
        }
        if is_punct(tokens.get(i), ',') {
            i += 1;
        }
        variants.push(Variant {
            name: name.clone(),
            fields,
        });
    }
    variants
}

fn parse_item(input: TokenStream2) -> Result<(Ident, Body), &'static str> {
    let tokens: Vec<_> = input.into_iter().collect();
    let keyword = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id == "struct" || id == "enum"))
        .ok_or("Codec can only be derived for a struct or an enum")?;
    let Some(TokenTree::Ident(name)) = tokens.get(keyword + 1) else {
        return Err("expected a type name");
    };
    if is_punct(tokens.get(keyword + 2), '<') {
        return Err("Codec cannot be derived for generic types");
    }

    let body_token = tokens.get(keyword + 2);
    let body = if matches!(&tokens[keyword], TokenTree::Ident(id) if id == "struct") {
        Body::Struct(parse_group_fields(body_token))
    } else {
        match body_token {
            Some(TokenTree::Group(g)) if g.delimiter() == Delimiter::Brace => Body::Enum(parse_variants(g)),
            _ => return Err("expected an enum body"),
        }
    };
    Ok((name.clone(), body))
}

fn bindings(count: usize) -> Vec<Ident> {
    (0..count)
        .map(|i| Ident::new(&format!("f{i}"), Span::call_site()))
        .collect()
}

fn decode_fields(fields: &Fields) -> TokenStream2 {
    match fields {
        Fields::Named(fields) => {
            let decodes = fields.iter().map(|f| {
                let name = &f.name;
                let ty = &f.ty;
                quote! { #name: <#ty as ::infer_codec::Codec>::decode(buf, pos)?, }
            });
            quote! { { #(#decodes)* } }
        }
        Fields::Tuple(fields) => {
            let decodes = fields.iter().map(|f| {
                let ty = &f.ty;
                quote! { <#ty as ::infer_codec::Codec>::decode(buf, pos)?, }
            });
            quote! { ( #(#decodes)* ) }
        }
        Fields::Unit => quote! {},
    }
}

fn encode_struct(fields: &Fields) -> TokenStream2 {
    let accessors: Vec<TokenStream2> = match fields {
        Fields::Named(fields) => fields
            .iter()
            .map(|f| {
                let name = &f.name;
                quote! { self.#name }
            })
            .collect(),
        Fields::Tuple(fields) => (0..fields.len())
            .map(|i| {
                let index = Literal::usize_unsuffixed(i);
                quote! { self.#index }
            })
            .collect(),
        Fields::Unit => Vec::new(),
    };
    quote! { #(::infer_codec::Codec::encode(&#accessors, buf);)* }
}

fn encode_variant(item: &Ident, index: u32, variant: &Variant) -> TokenStream2 {
    let name = &variant.name;
    let (pattern, bound) = match &variant.fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.iter().filter_map(|f| f.name.clone()).collect();
            (quote! { #item::#name { #(#names),* } }, names)
        }
        Fields::Tuple(fields) => {
            let names = bindings(fields.len());
            (quote! { #item::#name ( #(#names),* ) }, names)
        }
        Fields::Unit => (quote! { #item::#name }, Vec::new()),
    };
    quote! {
        #pattern => {
            ::infer_codec::Codec::encode(&#index, buf);
            #(::infer_codec::Codec::encode(#bound, buf);)*
        }
    }
}

#[proc_macro_derive(Codec)]
pub fn derive_codec(input: TokenStream) -> TokenStream {
    let (name, body) = match parse_item(input.into()) {
        Ok(item) => item,
        Err(message) => return quote! { compile_error!(#message); }.into(),
    };

    let (encode_body, decode_body) = match &body {
        Body::Struct(fields) => {
            let decoded = decode_fields(fields);
            (encode_struct(fields), quote! { Ok(Self #decoded) })
        }
        Body::Enum(variants) => {
            let encode_arms = variants
                .iter()
                .enumerate()
                .map(|(i, v)| encode_variant(&name, i as u32, v));
            let decode_arms = variants.iter().enumerate().map(|(i, v)| {
                let index = i as u32;
                let vname = &v.name;
                let decoded = decode_fields(&v.fields);
                quote! { #index => Ok(#name::#vname #decoded), }
            });
            (
                quote! {
                    match self {
                        #(#encode_arms)*
                    }
                },
                quote! {
                    match <u32 as ::infer_codec::Codec>::decode(buf, pos)? {
                        #(#decode_arms)*
                        other => Err(::infer_codec::DecodeError::InvalidVariant(other)),
                    }
                },
            )
        }
    };

    quote! {
        impl ::infer_codec::Codec for #name {
            fn encode(&self, buf: &mut Vec<u8>) {
                #encode_body
            }

            fn decode(buf: &[u8], pos: &mut usize) -> Result<Self, ::infer_codec::DecodeError> {
                #decode_body
            }
        }
    }
    .into()
}
