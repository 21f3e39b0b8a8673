//! Export signature builder: the types a module presents to its importers.

use std::collections::{BTreeMap, HashMap};

use crate::diagnostics::Diagnostic;
use crate::frontend::ast::{Program, StmtKind};

use super::types::{resolve_type_expr, StructDef, Type, TypeContext};

/// Build the `exported name -> type` map for one unit. Functions become
/// `func`, structs become their constructor value, enums their enum type,
/// and `let` declarations their annotated type (or `any`). Duplicate
/// exported names are collected as errors alongside the map.
#[must_use]
pub fn export_signatures(program: &Program) -> (BTreeMap<String, Type>, Vec<Diagnostic>) {
    let mut enums: HashMap<String, Vec<String>> = HashMap::new();
    let mut structs: HashMap<String, StructDef> = HashMap::new();
    let mut exports = BTreeMap::new();
    let mut errors = Vec::new();

    let mut record = |exports: &mut BTreeMap<String, Type>,
                      errors: &mut Vec<Diagnostic>,
                      name: &str,
                      span,
                      ty: Type| {
        if exports.contains_key(name) {
            errors.push(Diagnostic::error(
                format!("Duplicate export '{name}'"),
                Some(span),
            ));
            return;
        }
        exports.insert(name.to_string(), ty);
    };

    for stmt in &program.body.statements {
        match &stmt.kind {
            StmtKind::Enum(decl) => {
                let items: Vec<_> = decl.items.iter().map(|item| item.name.clone()).collect();
                enums.insert(decl.name.clone(), items.clone());
                if decl.exported {
                    record(
                        &mut exports,
                        &mut errors,
                        &decl.name,
                        decl.name_span,
                        Type::Enum {
                            name: decl.name.clone(),
                            items,
                        },
                    );
                }
            }
            StmtKind::Struct(decl) => {
                let ctx = TypeContext {
                    enums: &enums,
                    structs: &structs,
                    env: None,
                };
                let fields: BTreeMap<_, _> = decl
                    .fields
                    .iter()
                    .map(|field| (field.name.clone(), resolve_type_expr(&ctx, &field.ty)))
                    .collect();
                let ctor_params: Vec<_> = decl
                    .fields
                    .iter()
                    .map(|field| fields[&field.name].clone())
                    .collect();
                structs.insert(
                    decl.name.clone(),
                    StructDef {
                        fields: fields.clone(),
                        ctor_params: ctor_params.clone(),
                    },
                );
                if decl.exported {
                    record(
                        &mut exports,
                        &mut errors,
                        &decl.name,
                        decl.name_span,
                        Type::StructCtor {
                            name: decl.name.clone(),
                            instance: Box::new(Type::Struct { fields }),
                            ctor_params,
                        },
                    );
                }
            }
            StmtKind::Function(decl) if decl.exported => {
                let ctx = TypeContext {
                    enums: &enums,
                    structs: &structs,
                    env: None,
                };
                let params: Vec<_> = decl
                    .params
                    .iter()
                    .map(|param| {
                        param
                            .annotation
                            .as_ref()
                            .map_or(Type::Any, |annotation| resolve_type_expr(&ctx, annotation))
                    })
                    .collect();
                let ret = decl
                    .ret
                    .as_ref()
                    .map_or(Type::Any, |annotation| resolve_type_expr(&ctx, annotation));
                record(
                    &mut exports,
                    &mut errors,
                    &decl.name,
                    decl.name_span,
                    Type::Func {
                        params,
                        ret: Box::new(ret),
                    },
                );
            }
            StmtKind::Let(decl) if decl.exported => {
                let ctx = TypeContext {
                    enums: &enums,
                    structs: &structs,
                    env: None,
                };
                let ty = decl
                    .annotation
                    .as_ref()
                    .map_or(Type::Any, |annotation| resolve_type_expr(&ctx, annotation));
                record(&mut exports, &mut errors, &decl.name, decl.name_span, ty);
            }
            _ => {}
        }
    }

    (exports, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FileId;
    use crate::frontend::lexer::tokenize;
    use crate::frontend::parser::parse;

    fn signatures(source: &str) -> (BTreeMap<String, Type>, Vec<Diagnostic>) {
        let (tokens, sink) = tokenize(source, FileId(0));
        assert!(sink.is_empty(), "lex errors: {:?}", sink.as_slice());
        let program = parse(&tokens, FileId(0)).expect("source parses");
        export_signatures(&program)
    }

    #[test]
    fn exported_declarations_get_signature_types() {
        let (exports, errors) = signatures(
            "module m\nexport enum E { A, B }\nexport struct P { x: number }\nexport fn f(a: number): E { return E.A }\nexport let limit: number = 10\nlet hidden = 1",
        );
        assert!(errors.is_empty());
        assert_eq!(exports.len(), 4);
        assert!(matches!(exports.get("E"), Some(Type::Enum { .. })));
        assert!(matches!(exports.get("P"), Some(Type::StructCtor { .. })));
        assert!(matches!(exports.get("limit"), Some(Type::Number)));
        let Some(Type::Func { params, ret }) = exports.get("f") else {
            panic!("expected function signature");
        };
        assert_eq!(params, &[Type::Number]);
        assert!(matches!(**ret, Type::Enum { .. }));
        assert!(!exports.contains_key("hidden"));
    }

    #[test]
    fn unannotated_export_let_is_any() {
        let (exports, _) = signatures("module m\nexport let config = 1");
        assert_eq!(exports.get("config"), Some(&Type::Any));
    }

    #[test]
    fn duplicate_exports_are_collected() {
        let (exports, errors) = signatures(
            "module m\nexport fn f(): number { return 1 }\nexport let f = 2",
        );
        assert_eq!(exports.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Duplicate export 'f'"));
    }

    #[test]
    fn struct_signatures_resolve_earlier_declarations() {
        let (exports, errors) = signatures(
            "module m\nenum Kind { A }\nexport struct Node { kind: Kind, weight: number }",
        );
        assert!(errors.is_empty());
        let Some(Type::StructCtor { instance, .. }) = exports.get("Node") else {
            panic!("expected struct ctor");
        };
        let Type::Struct { fields } = &**instance else {
            panic!("expected struct instance");
        };
        assert!(matches!(fields.get("kind"), Some(Type::Enum { .. })));
    }
}
