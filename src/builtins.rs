//! Builtin type catalogue: named constructors for the primitive, container
//! and exception types of the compiled subset, and pure predicates over the
//! type model. Nothing here mutates existing types; constructors allocate
//! fresh nodes and predicates only read resolved structure.

use crate::env::Environment;
use crate::types::{TypeArena, TypeId, TypeNode};

// Type constructors

pub fn none_type(arena: &mut TypeArena) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "NoneType".to_string(),
        params: Vec::new(),
    })
}

pub fn bool_type(arena: &mut TypeArena) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "bool".to_string(),
        params: Vec::new(),
    })
}

/// Integer of a still-unknown width.
pub fn int_type(arena: &mut TypeArena) -> TypeId {
    let width = arena.fresh_var();
    int_type_with(arena, width)
}

pub fn int_type_with(arena: &mut TypeArena, width: TypeId) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "int".to_string(),
        params: vec![("width".to_string(), width)],
    })
}

pub fn int_type_of_width(arena: &mut TypeArena, width: u64) -> TypeId {
    let width = arena.width(width);
    int_type_with(arena, width)
}

pub fn float_type(arena: &mut TypeArena) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "float".to_string(),
        params: Vec::new(),
    })
}

pub fn str_type(arena: &mut TypeArena) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "str".to_string(),
        params: Vec::new(),
    })
}

pub fn list_type(arena: &mut TypeArena) -> TypeId {
    let elt = arena.fresh_var();
    list_type_of(arena, elt)
}

pub fn list_type_of(arena: &mut TypeArena, elt: TypeId) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "list".to_string(),
        params: vec![("elt".to_string(), elt)],
    })
}

pub fn range_type(arena: &mut TypeArena) -> TypeId {
    let elt = arena.fresh_var();
    range_type_of(arena, elt)
}

pub fn range_type_of(arena: &mut TypeArena, elt: TypeId) -> TypeId {
    arena.alloc(TypeNode::Mono {
        name: "range".to_string(),
        params: vec![("elt".to_string(), elt)],
    })
}

pub fn exception_type(arena: &mut TypeArena, name: &str) -> TypeId {
    arena.alloc(TypeNode::Exception {
        name: name.to_string(),
    })
}

// Builtin callables

pub fn fn_bool(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "bool")
}

pub fn fn_int(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "int")
}

pub fn fn_float(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "float")
}

pub fn fn_list(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "list")
}

pub fn fn_range(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "range")
}

pub fn fn_len(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "len")
}

pub fn fn_round(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "round")
}

pub fn fn_print(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "print")
}

/// The decorator marking a function as a unit of compiled code.
pub fn fn_kernel(arena: &mut TypeArena) -> TypeId {
    builtin_function(arena, "kernel")
}

pub fn fn_exception(arena: &mut TypeArena, name: &str) -> TypeId {
    arena.alloc(TypeNode::ExceptionConstructor {
        name: name.to_string(),
    })
}

fn builtin_function(arena: &mut TypeArena, name: &str) -> TypeId {
    arena.alloc(TypeNode::BuiltinFunction(name.to_string()))
}

/// Global typing environment containing the recognized builtin callables.
pub fn prelude(arena: &mut TypeArena) -> Environment {
    let mut env = Environment::new();
    let bindings: [(&str, TypeId); 9] = [
        ("bool", fn_bool(arena)),
        ("int", fn_int(arena)),
        ("float", fn_float(arena)),
        ("list", fn_list(arena)),
        ("range", fn_range(arena)),
        ("len", fn_len(arena)),
        ("round", fn_round(arena)),
        ("print", fn_print(arena)),
        ("kernel", fn_kernel(arena)),
    ];
    for (name, ty) in bindings {
        env.insert(name, ty);
    }
    for exception in ["Exception", "IndexError", "ValueError", "ZeroDivisionError"] {
        let constructor = fn_exception(arena, exception);
        env.insert(exception, constructor);
    }
    env
}

// Predicates

pub fn is_mono(arena: &TypeArena, t: TypeId, name: &str) -> bool {
    matches!(arena.get(t), TypeNode::Mono { name: n, .. } if n == name)
}

/// Value of a named parameter of a Mono type.
pub fn mono_param(arena: &TypeArena, t: TypeId, param: &str) -> Option<TypeId> {
    match arena.get(t) {
        TypeNode::Mono { params, .. } => params
            .iter()
            .find(|(name, _)| name == param)
            .map(|(_, value)| *value),
        _ => None,
    }
}

pub fn is_none(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "NoneType")
}

pub fn is_bool(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "bool")
}

pub fn is_int(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "int")
}

pub fn is_float(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "float")
}

pub fn is_str(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "str")
}

pub fn is_list(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "list")
}

pub fn is_range(arena: &TypeArena, t: TypeId) -> bool {
    is_mono(arena, t, "range")
}

pub fn is_numeric(arena: &TypeArena, t: TypeId) -> bool {
    is_int(arena, t) || is_float(arena, t)
}

pub fn is_exception(arena: &TypeArena, t: TypeId) -> bool {
    matches!(arena.get(t), TypeNode::Exception { .. })
}

pub fn is_exception_constructor(arena: &TypeArena, t: TypeId) -> bool {
    matches!(arena.get(t), TypeNode::ExceptionConstructor { .. })
}

pub fn is_builtin_function(arena: &TypeArena, t: TypeId, name: &str) -> bool {
    matches!(arena.get(t), TypeNode::BuiltinFunction(n) if n == name)
}

pub fn is_function(arena: &TypeArena, t: TypeId) -> bool {
    matches!(arena.get(t), TypeNode::Function(_))
}

pub fn is_instance(arena: &TypeArena, t: TypeId) -> bool {
    matches!(arena.get(t), TypeNode::Instance { .. })
}

/// Concrete bit-width of an integer type, if both the type and its width
/// have been resolved.
pub fn get_int_width(arena: &TypeArena, t: TypeId) -> Option<u64> {
    let width = mono_param(arena, t, "width")?;
    if !is_int(arena, t) {
        return None;
    }
    arena.width_value(width)
}

pub fn is_iterable(arena: &TypeArena, t: TypeId) -> bool {
    is_list(arena, t) || is_range(arena, t)
}

pub fn get_iterable_elt(arena: &TypeArena, t: TypeId) -> Option<TypeId> {
    if is_iterable(arena, t) {
        mono_param(arena, t, "elt")
    } else {
        None
    }
}

pub fn is_collection(arena: &TypeArena, t: TypeId) -> bool {
    matches!(arena.get(t), TypeNode::Tuple(_)) || is_list(arena, t)
}

/// True if any reachable component of `t` is a list or a function type.
/// Used downstream to choose reference vs. value passing semantics.
pub fn is_mutable(arena: &TypeArena, t: TypeId) -> bool {
    let mut mutable = false;
    arena.for_each_component(t, &mut |arena, component| {
        if is_list(arena, component) || is_function(arena, component) {
            mutable = true;
        }
    });
    mutable
}

/// Attribute lookup that also covers the builtin `range` type, whose
/// `start`/`stop`/`step` attributes all share the element type, and falls
/// back from an instance to its constructor's table so class-level methods
/// resolve through instances.
pub fn attribute_of(arena: &TypeArena, t: TypeId, name: &str) -> Option<TypeId> {
    if is_range(arena, t) {
        return match name {
            "start" | "stop" | "step" => mono_param(arena, t, "elt"),
            _ => None,
        };
    }
    if let Some(ty) = arena.attribute(t, name) {
        return Some(ty);
    }
    arena
        .constructor_of(t)
        .and_then(|ctor| arena.attribute(ctor, name))
}

/// Whether `t` is a type attribute access is meaningful on at all.
pub fn has_attribute_table(arena: &TypeArena, t: TypeId) -> bool {
    is_range(arena, t) || arena.attributes(t).is_some()
}
