//! Structural type model: construction, union invariants, display, and
//! the assignability relation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use crate::frontend::ast::{TypeExpr, TypeExprKind};
use crate::link::ModuleEnv;

/// Checker-side type. Unions are kept flattened, de-duplicated by
/// structural key, and of length >= 2; the [`Type::union`] constructor
/// maintains those invariants.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Any,
    Never,
    Nil,
    Number,
    String,
    Boolean,
    Enum {
        name: String,
        items: Vec<String>,
    },
    Struct {
        fields: BTreeMap<String, Type>,
    },
    /// Compile-time value of a struct declaration: carries the instance
    /// type and the `.new` constructor parameters.
    StructCtor {
        name: String,
        instance: Box<Type>,
        ctor_params: Vec<Type>,
    },
    Func {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    Union(Vec<Type>),
}

impl Type {
    /// Build a union: flatten nested unions, drop structural duplicates,
    /// and collapse empty/singleton member lists.
    #[must_use]
    pub fn union(types: Vec<Type>) -> Type {
        let mut flat = Vec::new();
        for ty in types {
            flatten_into(ty, &mut flat);
        }
        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for ty in flat {
            if seen.insert(ty.key()) {
                members.push(ty);
            }
        }
        match members.len() {
            0 => Type::Never,
            1 => members.remove(0),
            _ => Type::Union(members),
        }
    }

    /// `nil`, or a union with a `nil` member.
    #[must_use]
    pub fn is_nilable(&self) -> bool {
        match self {
            Type::Nil => true,
            Type::Union(members) => members.iter().any(|member| matches!(member, Type::Nil)),
            _ => false,
        }
    }

    /// Drop the `nil` member of a union, re-collapsing as needed.
    #[must_use]
    pub fn remove_nil(&self) -> Type {
        match self {
            Type::Nil => Type::Never,
            Type::Union(members) => Type::union(
                members
                    .iter()
                    .filter(|member| !matches!(member, Type::Nil))
                    .cloned()
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Stable structural key used for union de-duplication. The display
    /// form is structural and deterministic, so it doubles as the key.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

fn flatten_into(ty: Type, out: &mut Vec<Type>) {
    match ty {
        Type::Union(members) => {
            for member in members {
                flatten_into(member, out);
            }
        }
        other => out.push(other),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => f.write_str("any"),
            Type::Never => f.write_str("never"),
            Type::Nil => f.write_str("nil"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Boolean => f.write_str("boolean"),
            Type::Enum { name, .. } => f.write_str(name),
            Type::Struct { fields } => {
                f.write_str("{")?;
                for (index, (name, ty)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                f.write_str("}")
            }
            Type::StructCtor { name, .. } => write!(f, "typeof({name})"),
            Type::Func { params, ret } => {
                f.write_str("fn(")?;
                for (index, param) in params.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "): {ret}")
            }
            Type::Union(members) => {
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                Ok(())
            }
        }
    }
}

/// Directional structural assignability: `src` may flow into `dst`.
///
/// Union sources decompose before union destinations so that reflexivity
/// holds for union types; everything else follows the variant-by-variant
/// rules (width subtyping on structs, contravariant parameters and
/// covariant returns on functions, nominal matching for enums and struct
/// constructors).
#[must_use]
pub fn assignable(src: &Type, dst: &Type) -> bool {
    match (src, dst) {
        (_, Type::Any) | (Type::Any | Type::Never, _) => true,
        (Type::Union(members), _) => members.iter().all(|member| assignable(member, dst)),
        (_, Type::Union(members)) => members.iter().any(|member| assignable(src, member)),
        (Type::Enum { name: src_name, .. }, Type::Enum { name: dst_name, .. }) => {
            src_name == dst_name
        }
        (Type::StructCtor { name: src_name, .. }, Type::StructCtor { name: dst_name, .. }) => {
            src_name == dst_name
        }
        (Type::Struct { fields: src_fields }, Type::Struct { fields: dst_fields }) => dst_fields
            .iter()
            .all(|(name, dst_ty)| {
                src_fields
                    .get(name)
                    .is_some_and(|src_ty| assignable(src_ty, dst_ty))
            }),
        (
            Type::Func {
                params: src_params,
                ret: src_ret,
            },
            Type::Func {
                params: dst_params,
                ret: dst_ret,
            },
        ) => {
            src_params.len() == dst_params.len()
                && src_params
                    .iter()
                    .zip(dst_params)
                    .all(|(src_param, dst_param)| assignable(dst_param, src_param))
                && assignable(src_ret, dst_ret)
        }
        (Type::Nil, Type::Nil)
        | (Type::Number, Type::Number)
        | (Type::String, Type::String)
        | (Type::Boolean, Type::Boolean) => true,
        _ => false,
    }
}

/// Registered struct declaration: instance fields plus the constructor
/// parameters in declaration order.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub fields: BTreeMap<String, Type>,
    pub ctor_params: Vec<Type>,
}

/// Name-resolution context shared by the checker and the export-signature
/// builder.
pub(crate) struct TypeContext<'a> {
    pub enums: &'a HashMap<String, Vec<String>>,
    pub structs: &'a HashMap<String, StructDef>,
    pub env: Option<&'a ModuleEnv>,
}

/// Build a checker type from a source type expression. Unknown names fall
/// back to `any`.
pub(crate) fn resolve_type_expr(ctx: &TypeContext<'_>, expr: &TypeExpr) -> Type {
    match &expr.kind {
        TypeExprKind::Name(name) => resolve_type_name(ctx, name),
        TypeExprKind::Struct(fields) => Type::Struct {
            fields: fields
                .iter()
                .map(|(name, ty)| (name.clone(), resolve_type_expr(ctx, ty)))
                .collect(),
        },
        TypeExprKind::Union { left, right } => Type::union(vec![
            resolve_type_expr(ctx, left),
            resolve_type_expr(ctx, right),
        ]),
        TypeExprKind::Func { params, ret } => Type::Func {
            params: params
                .iter()
                .map(|param| resolve_type_expr(ctx, param))
                .collect(),
            ret: Box::new(
                ret.as_deref()
                    .map_or(Type::Any, |ret| resolve_type_expr(ctx, ret)),
            ),
        },
    }
}

fn resolve_type_name(ctx: &TypeContext<'_>, name: &str) -> Type {
    match name {
        "any" => Type::Any,
        "never" => Type::Never,
        "nil" => Type::Nil,
        "number" => Type::Number,
        "string" => Type::String,
        "boolean" => Type::Boolean,
        _ => {
            if let Some(items) = ctx.enums.get(name) {
                return Type::Enum {
                    name: name.to_string(),
                    items: items.clone(),
                };
            }
            if let Some(def) = ctx.structs.get(name) {
                return Type::Struct {
                    fields: def.fields.clone(),
                };
            }
            if let Some(env) = ctx.env {
                match env.imported_types.get(name) {
                    Some(ty @ Type::Enum { .. }) => return ty.clone(),
                    Some(Type::StructCtor { instance, .. }) => return (**instance).clone(),
                    _ => {}
                }
            }
            Type::Any
        }
    }
}
