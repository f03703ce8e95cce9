//! Arena-allocated type nodes and the unification algorithm.
//!
//! Types are addressed by [`TypeId`] into a [`TypeArena`] owned by the
//! compilation. Binding a type variable writes a [`TypeNode::Link`] redirect
//! into its arena slot, so every holder of the variable's id observes the
//! binding; [`TypeArena::find`] follows and compresses redirect chains.
//!
//! Unification is structural and only ever mutates variable slots: two
//! non-variable nodes unify by checking their heads and recursing into their
//! components. A failed unification reports the innermost incompatible pair
//! of sub-types and leaves every binding made before the divergence intact,
//! which keeps failures local to the expression that caused them.
//!
//! There is no occurs check: the type language cannot express a variable
//! inside its own binding, so redirect cycles cannot form.

use serde::{Deserialize, Serialize};

/// Handle to a type node inside a [`TypeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(u32);

impl TypeId {
    pub fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a function is invoked at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionFlavor {
    /// Ordinary function compiled into the kernel.
    Plain,
    /// Remote procedure call into the host; `service` is the ObjectMap handle
    /// the runtime dispatcher uses to locate the host callable.
    Rpc { service: i32 },
    /// Named low-level system call with no body of its own.
    Syscall { name: String },
}

/// A function type: ordered required and optional parameters plus a return
/// type. Two function types unify only if their flavors match and their
/// parameter names agree positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionType {
    pub args: Vec<(String, TypeId)>,
    pub optargs: Vec<(String, TypeId)>,
    pub ret: TypeId,
    pub flavor: FunctionFlavor,
}

impl FunctionType {
    pub fn arity(&self) -> usize {
        self.args.len() + self.optargs.len()
    }
}

/// A single type node. `Var`/`Link` together implement mutable union-find
/// slots; the remaining variants are resolved type heads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeNode {
    /// Unbound type variable.
    Var,
    /// Bound type variable; transitively resolved by `find`.
    Link(TypeId),
    /// Type-level integer constant, used for int bit-widths. Widths go
    /// through the same variable machinery, so an unknown width is a `Var`
    /// sitting in width position.
    Width(u64),
    /// Monomorphic named type with ordered named parameters.
    Mono {
        name: String,
        params: Vec<(String, TypeId)>,
    },
    /// Fixed-arity heterogeneous sequence.
    Tuple(Vec<TypeId>),
    Function(FunctionType),
    /// Callable builtin marker (`len`, `range`, `kernel`, ...).
    BuiltinFunction(String),
    /// Nominal exception instance type.
    Exception { name: String },
    /// Callable producing `Exception { name }`.
    ExceptionConstructor { name: String },
    /// Nominal type of an embedded host class instance. The attribute table
    /// is populated incrementally by the embedding driver.
    Instance {
        name: String,
        attributes: Vec<(String, TypeId)>,
        constructor: Option<TypeId>,
    },
    /// "The constructor of instance type T" for an embedded host class.
    Constructor {
        name: String,
        instance: TypeId,
        attributes: Vec<(String, TypeId)>,
    },
}

/// The minimal pair of incompatible sub-types found during a failed
/// unification. The types actually passed to `unify` are reported separately
/// by the caller for diagnostic context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeConflict {
    pub left: TypeId,
    pub right: TypeId,
}

/// Arena owning every type node of one compilation.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TypeArena {
    nodes: Vec<TypeNode>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, node: TypeNode) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn fresh_var(&mut self) -> TypeId {
        self.alloc(TypeNode::Var)
    }

    pub fn width(&mut self, value: u64) -> TypeId {
        self.alloc(TypeNode::Width(value))
    }

    /// Representative of `t`, following and compressing redirect chains.
    pub fn find(&mut self, t: TypeId) -> TypeId {
        let rep = self.resolve(t);
        // Compress the chain so later lookups are O(1).
        let mut cursor = t;
        while let TypeNode::Link(next) = self.nodes[cursor.index()] {
            self.nodes[cursor.index()] = TypeNode::Link(rep);
            cursor = next;
        }
        rep
    }

    /// Representative of `t` without mutating the arena.
    pub fn resolve(&self, t: TypeId) -> TypeId {
        let mut cursor = t;
        while let TypeNode::Link(next) = self.nodes[cursor.index()] {
            cursor = next;
        }
        cursor
    }

    /// Resolved node for `t`.
    pub fn get(&self, t: TypeId) -> &TypeNode {
        &self.nodes[self.resolve(t).index()]
    }

    pub fn is_var(&self, t: TypeId) -> bool {
        matches!(self.get(t), TypeNode::Var)
    }

    pub fn width_value(&self, t: TypeId) -> Option<u64> {
        match self.get(t) {
            TypeNode::Width(value) => Some(*value),
            _ => None,
        }
    }

    /// Unify two types, binding variables so both resolve to one structure.
    ///
    /// Symmetric and idempotent: unifying a type with itself, or two types
    /// already made equal, is a no-op.
    pub fn unify(&mut self, a: TypeId, b: TypeId) -> Result<(), TypeConflict> {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return Ok(());
        }

        match (&self.nodes[ra.index()], &self.nodes[rb.index()]) {
            (TypeNode::Var, _) => {
                self.nodes[ra.index()] = TypeNode::Link(rb);
                return Ok(());
            }
            (_, TypeNode::Var) => {
                self.nodes[rb.index()] = TypeNode::Link(ra);
                return Ok(());
            }
            _ => {}
        }

        let conflict = TypeConflict { left: ra, right: rb };
        let pairs: Vec<(TypeId, TypeId)> =
            match (&self.nodes[ra.index()], &self.nodes[rb.index()]) {
                (TypeNode::Width(m), TypeNode::Width(n)) => {
                    if m == n {
                        Vec::new()
                    } else {
                        return Err(conflict);
                    }
                }
                (
                    TypeNode::Mono { name: na, params: pa },
                    TypeNode::Mono { name: nb, params: pb },
                ) => {
                    let keys_match = pa.len() == pb.len()
                        && pa.iter().zip(pb.iter()).all(|((ka, _), (kb, _))| ka == kb);
                    if na != nb || !keys_match {
                        return Err(conflict);
                    }
                    pa.iter()
                        .zip(pb.iter())
                        .map(|((_, va), (_, vb))| (*va, *vb))
                        .collect()
                }
                (TypeNode::Tuple(ea), TypeNode::Tuple(eb)) => {
                    if ea.len() != eb.len() {
                        return Err(conflict);
                    }
                    ea.iter().zip(eb.iter()).map(|(x, y)| (*x, *y)).collect()
                }
                (TypeNode::Function(fa), TypeNode::Function(fb)) => {
                    let names_match = |xs: &[(String, TypeId)], ys: &[(String, TypeId)]| {
                        xs.len() == ys.len()
                            && xs.iter().zip(ys.iter()).all(|((ka, _), (kb, _))| ka == kb)
                    };
                    if fa.flavor != fb.flavor
                        || !names_match(&fa.args, &fb.args)
                        || !names_match(&fa.optargs, &fb.optargs)
                    {
                        return Err(conflict);
                    }
                    fa.args
                        .iter()
                        .chain(fa.optargs.iter())
                        .zip(fb.args.iter().chain(fb.optargs.iter()))
                        .map(|((_, va), (_, vb))| (*va, *vb))
                        .chain(std::iter::once((fa.ret, fb.ret)))
                        .collect()
                }
                (TypeNode::BuiltinFunction(na), TypeNode::BuiltinFunction(nb)) if na == nb => {
                    Vec::new()
                }
                (TypeNode::Exception { name: na }, TypeNode::Exception { name: nb })
                    if na == nb =>
                {
                    Vec::new()
                }
                (
                    TypeNode::ExceptionConstructor { name: na },
                    TypeNode::ExceptionConstructor { name: nb },
                ) if na == nb => Vec::new(),
                (TypeNode::Instance { name: na, .. }, TypeNode::Instance { name: nb, .. })
                    if na == nb =>
                {
                    Vec::new()
                }
                (
                    TypeNode::Constructor { name: na, .. },
                    TypeNode::Constructor { name: nb, .. },
                ) if na == nb => Vec::new(),
                _ => return Err(conflict),
            };

        for (x, y) in pairs {
            self.unify(x, y)?;
        }
        Ok(())
    }

    /// Structural equality between resolved types. Two distinct unbound
    /// variables are unequal; nominal types compare by name.
    pub fn types_equal(&self, a: TypeId, b: TypeId) -> bool {
        let ra = self.resolve(a);
        let rb = self.resolve(b);
        if ra == rb {
            return true;
        }
        match (&self.nodes[ra.index()], &self.nodes[rb.index()]) {
            (TypeNode::Width(m), TypeNode::Width(n)) => m == n,
            (
                TypeNode::Mono { name: na, params: pa },
                TypeNode::Mono { name: nb, params: pb },
            ) => {
                na == nb
                    && pa.len() == pb.len()
                    && pa
                        .iter()
                        .zip(pb.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && self.types_equal(*va, *vb))
            }
            (TypeNode::Tuple(ea), TypeNode::Tuple(eb)) => {
                ea.len() == eb.len()
                    && ea.iter().zip(eb.iter()).all(|(x, y)| self.types_equal(*x, *y))
            }
            (TypeNode::Function(fa), TypeNode::Function(fb)) => {
                let lists_equal = |xs: &[(String, TypeId)], ys: &[(String, TypeId)]| {
                    xs.len() == ys.len()
                        && xs
                            .iter()
                            .zip(ys.iter())
                            .all(|((ka, va), (kb, vb))| ka == kb && self.types_equal(*va, *vb))
                };
                fa.flavor == fb.flavor
                    && lists_equal(&fa.args, &fb.args)
                    && lists_equal(&fa.optargs, &fb.optargs)
                    && self.types_equal(fa.ret, fb.ret)
            }
            (TypeNode::BuiltinFunction(na), TypeNode::BuiltinFunction(nb)) => na == nb,
            (TypeNode::Exception { name: na }, TypeNode::Exception { name: nb }) => na == nb,
            (
                TypeNode::ExceptionConstructor { name: na },
                TypeNode::ExceptionConstructor { name: nb },
            ) => na == nb,
            (TypeNode::Instance { name: na, .. }, TypeNode::Instance { name: nb, .. }) => {
                na == nb
            }
            (TypeNode::Constructor { name: na, .. }, TypeNode::Constructor { name: nb, .. }) => {
                na == nb
            }
            _ => false,
        }
    }

    /// Append a stable byte encoding of the resolved structure of `t`.
    ///
    /// Two unified variables encode identically (by representative index);
    /// nominal types encode by name so attribute-table growth does not
    /// disturb the encoding.
    pub fn write_structure(&self, t: TypeId, out: &mut Vec<u8>) {
        fn write_str(s: &str, out: &mut Vec<u8>) {
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }

        let rep = self.resolve(t);
        match &self.nodes[rep.index()] {
            TypeNode::Var => {
                out.push(0);
                out.extend_from_slice(&rep.0.to_le_bytes());
            }
            TypeNode::Link(_) => unreachable!("resolve returned a link"),
            TypeNode::Width(value) => {
                out.push(1);
                out.extend_from_slice(&value.to_le_bytes());
            }
            TypeNode::Mono { name, params } => {
                out.push(2);
                write_str(name, out);
                for (param, value) in params {
                    write_str(param, out);
                    self.write_structure(*value, out);
                }
            }
            TypeNode::Tuple(elts) => {
                out.push(3);
                out.extend_from_slice(&(elts.len() as u32).to_le_bytes());
                for elt in elts {
                    self.write_structure(*elt, out);
                }
            }
            TypeNode::Function(function) => {
                out.push(4);
                match &function.flavor {
                    FunctionFlavor::Plain => out.push(0),
                    FunctionFlavor::Rpc { service } => {
                        out.push(1);
                        out.extend_from_slice(&service.to_le_bytes());
                    }
                    FunctionFlavor::Syscall { name } => {
                        out.push(2);
                        write_str(name, out);
                    }
                }
                for (name, ty) in function.args.iter().chain(function.optargs.iter()) {
                    write_str(name, out);
                    self.write_structure(*ty, out);
                }
                out.push(b'>');
                self.write_structure(function.ret, out);
            }
            TypeNode::BuiltinFunction(name) => {
                out.push(5);
                write_str(name, out);
            }
            TypeNode::Exception { name } => {
                out.push(6);
                write_str(name, out);
            }
            TypeNode::ExceptionConstructor { name } => {
                out.push(7);
                write_str(name, out);
            }
            TypeNode::Instance { name, .. } => {
                out.push(8);
                write_str(name, out);
            }
            TypeNode::Constructor { name, .. } => {
                out.push(9);
                write_str(name, out);
            }
        }
    }

    /// Post-order walk over `t` and its components (type parameters, tuple
    /// elements, function parameters and return). Attribute tables are not
    /// components; they may refer back to the type itself.
    pub fn for_each_component(&self, t: TypeId, f: &mut impl FnMut(&TypeArena, TypeId)) {
        let rep = self.resolve(t);
        match &self.nodes[rep.index()] {
            TypeNode::Mono { params, .. } => {
                for (_, value) in params {
                    self.for_each_component(*value, f);
                }
            }
            TypeNode::Tuple(elts) => {
                for elt in elts {
                    self.for_each_component(*elt, f);
                }
            }
            TypeNode::Function(function) => {
                for (_, ty) in function.args.iter().chain(function.optargs.iter()) {
                    self.for_each_component(*ty, f);
                }
                self.for_each_component(function.ret, f);
            }
            _ => {}
        }
        f(self, rep);
    }

    /// Attribute table of a nominal type, if it has one.
    pub fn attributes(&self, t: TypeId) -> Option<&[(String, TypeId)]> {
        match self.get(t) {
            TypeNode::Instance { attributes, .. } | TypeNode::Constructor { attributes, .. } => {
                Some(attributes)
            }
            _ => None,
        }
    }

    pub fn attribute(&self, t: TypeId, name: &str) -> Option<TypeId> {
        self.attributes(t)?
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, ty)| *ty)
    }

    /// Install or replace an attribute on an Instance or Constructor type.
    pub fn set_attribute(&mut self, t: TypeId, name: &str, ty: TypeId) {
        let rep = self.resolve(t);
        let attributes = match &mut self.nodes[rep.index()] {
            TypeNode::Instance { attributes, .. } | TypeNode::Constructor { attributes, .. } => {
                attributes
            }
            _ => return,
        };
        match attributes.iter_mut().find(|(attr, _)| attr == name) {
            Some((_, slot)) => *slot = ty,
            None => attributes.push((name.to_string(), ty)),
        }
    }

    /// Constructor back-reference of an Instance type.
    pub fn constructor_of(&self, t: TypeId) -> Option<TypeId> {
        match self.get(t) {
            TypeNode::Instance { constructor, .. } => *constructor,
            _ => None,
        }
    }

    /// Install the constructor back-reference of an Instance type. Used once
    /// per embedded class, right after both halves of the pair are allocated.
    pub fn set_constructor(&mut self, instance: TypeId, ctor: TypeId) {
        let rep = self.resolve(instance);
        if let TypeNode::Instance { constructor, .. } = &mut self.nodes[rep.index()] {
            *constructor = Some(ctor);
        }
    }
}
