//! Human-readable type formatting for diagnostics.

use std::collections::HashMap;

use super::arena::{FunctionFlavor, TypeArena, TypeId, TypeNode};

/// Renders types for diagnostic messages. Unbound variables are assigned
/// short quoted names (`'a`, `'b`, ...) that stay stable for the lifetime of
/// one printer, so a single diagnostic names the same variable consistently.
#[derive(Debug)]
pub struct TypePrinter<'a> {
    arena: &'a TypeArena,
    var_names: HashMap<TypeId, String>,
}

impl<'a> TypePrinter<'a> {
    pub fn new(arena: &'a TypeArena) -> Self {
        Self {
            arena,
            var_names: HashMap::new(),
        }
    }

    pub fn name(&mut self, t: TypeId) -> String {
        let rep = self.arena.resolve(t);
        match self.arena.get(rep) {
            TypeNode::Var => self.var_name(rep),
            TypeNode::Link(_) => unreachable!("resolve returned a link"),
            TypeNode::Width(value) => value.to_string(),
            TypeNode::Mono { name, params } => {
                if params.is_empty() {
                    name.clone()
                } else {
                    let rendered: Vec<String> = params
                        .iter()
                        .map(|(param, value)| format!("{}={}", param, self.name(*value)))
                        .collect();
                    format!("{}({})", name, rendered.join(", "))
                }
            }
            TypeNode::Tuple(elts) => {
                let rendered: Vec<String> = elts.iter().map(|elt| self.name(*elt)).collect();
                format!("({})", rendered.join(", "))
            }
            TypeNode::Function(function) => {
                let mut parts: Vec<String> = function
                    .args
                    .iter()
                    .map(|(name, ty)| format!("{}:{}", name, self.name(*ty)))
                    .collect();
                parts.extend(
                    function
                        .optargs
                        .iter()
                        .map(|(name, ty)| format!("?{}:{}", name, self.name(*ty))),
                );
                let signature = format!("({})->{}", parts.join(", "), self.name(function.ret));
                match &function.flavor {
                    FunctionFlavor::Plain => signature,
                    FunctionFlavor::Rpc { service } => format!("rpc#{}{}", service, signature),
                    FunctionFlavor::Syscall { name } => format!("syscall[{}]{}", name, signature),
                }
            }
            TypeNode::BuiltinFunction(name) => format!("<function {}>", name),
            TypeNode::Exception { name } => name.clone(),
            TypeNode::ExceptionConstructor { name } => format!("<constructor {}>", name),
            TypeNode::Instance { name, .. } => name.clone(),
            TypeNode::Constructor { name, .. } => format!("<constructor {}>", name),
        }
    }

    fn var_name(&mut self, rep: TypeId) -> String {
        if let Some(name) = self.var_names.get(&rep) {
            return name.clone();
        }
        let mut index = self.var_names.len();
        let mut letters = String::new();
        loop {
            letters.insert(0, (b'a' + (index % 26) as u8) as char);
            index /= 26;
            if index == 0 {
                break;
            }
            index -= 1;
        }
        let name = format!("'{}", letters);
        self.var_names.insert(rep, name.clone());
        name
    }
}
