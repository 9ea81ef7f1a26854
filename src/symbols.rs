//! The symbol table.
//!
//! Entries live in a single owned arena and are referred to by
//! [`SymbolId`] handles. Each scope category keeps its own index list, so
//! dropping a function's locals is a matter of clearing two lists; the
//! arena itself is reused for the whole file.

use log::debug;
use thin_vec::ThinVec;
use thiserror::Error;

use crate::types::{BaseKind, Type, TypeError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("invalid redeclaration of '{0}'")]
    Redeclaration(String),
}

/// Handle to an arena entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of thing a symbol names, with the data only that kind needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Structure {
    /// A scalar variable or struct member. For locals and parameters the
    /// offset is %rbp-relative (assigned at function preamble time); for
    /// members it is the byte offset within the composite.
    Variable { offset: i32 },
    Function { exit_label: usize, param_count: usize },
    /// A global array; the symbol's type is a pointer to the element type.
    Array { elements: usize },
    /// A struct definition; `size` is the laid-out byte length.
    Composite { size: u32 },
    /// A named enumeration constant.
    EnumMember { value: i64 },
}

/// Which scope list a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Global,
    Struct,
    Enum,
    Member,
    Param,
    Local,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    /// The struct definition entry for struct-typed symbols.
    pub composite: Option<SymbolId>,
    pub structure: Structure,
    pub storage: Storage,
    /// Parameters for functions, member entries for struct definitions.
    pub members: ThinVec<SymbolId>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    arena: Vec<Symbol>,
    globals: Vec<SymbolId>,
    locals: Vec<SymbolId>,
    params: Vec<SymbolId>,
    structs: Vec<SymbolId>,
    enums: Vec<SymbolId>,
    members: Vec<SymbolId>,
    active_function: Option<SymbolId>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.arena[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.arena[id.index()]
    }

    /// Add a symbol to the list its storage selects, refusing a name
    /// already declared in the same scope. Members are checked against the
    /// open member list, locals and parameters against both local lists,
    /// globals against globals and struct names against struct names.
    pub fn add(
        &mut self,
        name: &str,
        ty: Type,
        structure: Structure,
        storage: Storage,
        composite: Option<SymbolId>,
    ) -> Result<SymbolId, SymbolError> {
        let clash = match storage {
            Storage::Global => self.find_global(name),
            Storage::Local | Storage::Param => self.find_local(name),
            Storage::Member => self.find_member(name),
            Storage::Struct => self.find_struct(name),
            Storage::Enum => self.find_enum(name),
        };
        if clash.is_some() {
            return Err(SymbolError::Redeclaration(name.to_string()));
        }

        debug!("declaring '{}' as {} ({:?})", name, ty, storage);
        let id = SymbolId(self.arena.len() as u32);
        self.arena.push(Symbol {
            name: name.to_string(),
            ty,
            composite,
            structure,
            storage,
            members: ThinVec::new(),
        });
        match storage {
            Storage::Global => self.globals.push(id),
            Storage::Local => self.locals.push(id),
            Storage::Param => self.params.push(id),
            Storage::Struct => self.structs.push(id),
            Storage::Enum => self.enums.push(id),
            Storage::Member => self.members.push(id),
        }
        Ok(id)
    }

    fn find_in(&self, list: &[SymbolId], name: &str) -> Option<SymbolId> {
        list.iter().copied().find(|&id| self.get(id).name == name)
    }

    /// Scope-ordered lookup: the active function's parameters first, then
    /// locals, then globals, so inner names shadow outer ones.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.find_local(name).or_else(|| self.find_global(name))
    }

    /// Parameters of the active function (or still being collected) and
    /// locals only.
    pub fn find_local(&self, name: &str) -> Option<SymbolId> {
        if let Some(function) = self.active_function {
            let params: Vec<SymbolId> = self.get(function).members.iter().copied().collect();
            if let Some(id) = self.find_in(&params, name) {
                return Some(id);
            }
        }
        self.find_in(&self.params, name)
            .or_else(|| self.find_in(&self.locals, name))
    }

    pub fn find_global(&self, name: &str) -> Option<SymbolId> {
        self.find_in(&self.globals, name)
    }

    pub fn find_struct(&self, name: &str) -> Option<SymbolId> {
        self.find_in(&self.structs, name)
    }

    pub fn find_enum(&self, name: &str) -> Option<SymbolId> {
        self.find_in(&self.enums, name)
    }

    pub fn find_member(&self, name: &str) -> Option<SymbolId> {
        self.find_in(&self.members, name)
    }

    pub fn active_function(&self) -> Option<SymbolId> {
        self.active_function
    }

    pub fn set_active_function(&mut self, id: Option<SymbolId>) {
        self.active_function = id;
    }

    /// Move the collected parameter list out (ownership passes to the
    /// function symbol).
    pub fn take_params(&mut self) -> ThinVec<SymbolId> {
        self.params.drain(..).collect()
    }

    /// Move the open member list out (ownership passes to the struct).
    pub fn take_members(&mut self) -> ThinVec<SymbolId> {
        self.members.drain(..).collect()
    }

    pub fn local_ids(&self) -> Vec<SymbolId> {
        self.locals.clone()
    }

    /// Forget the current function's locals and parameters. Handles into
    /// the cleared lists must not be used afterwards.
    pub fn free_locals(&mut self) {
        self.locals.clear();
        self.params.clear();
        self.active_function = None;
    }

    /// Reset the whole table for a fresh file.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.globals.clear();
        self.locals.clear();
        self.params.clear();
        self.structs.clear();
        self.enums.clear();
        self.members.clear();
        self.active_function = None;
    }

    /// Size in bytes of a value of type `ty`, consulting the composite
    /// entry for bare struct types.
    pub fn type_size(&self, ty: Type, composite: Option<SymbolId>) -> Result<u32, TypeError> {
        if ty.base() == BaseKind::Struct && !ty.is_pointer() {
            let id = composite.ok_or(TypeError::NoSize(ty))?;
            return match self.get(id).structure {
                Structure::Composite { size } => Ok(size),
                _ => Err(TypeError::NoSize(ty)),
            };
        }
        ty.primitive_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable() -> Structure {
        Structure::Variable { offset: 0 }
    }

    #[test]
    fn duplicate_globals_are_refused() {
        let mut table = SymbolTable::new();
        table.add("a", Type::INT, variable(), Storage::Global, None).unwrap();
        assert_eq!(
            table.add("a", Type::LONG, variable(), Storage::Global, None),
            Err(SymbolError::Redeclaration("a".to_string()))
        );
    }

    #[test]
    fn locals_shadow_globals() {
        let mut table = SymbolTable::new();
        let global = table.add("a", Type::INT, variable(), Storage::Global, None).unwrap();
        let local = table.add("a", Type::LONG, variable(), Storage::Local, None).unwrap();
        assert_eq!(table.find("a"), Some(local));
        table.free_locals();
        assert_eq!(table.find("a"), Some(global));
    }

    #[test]
    fn duplicate_locals_and_params_collide() {
        let mut table = SymbolTable::new();
        table.add("x", Type::INT, variable(), Storage::Param, None).unwrap();
        assert!(table.add("x", Type::INT, variable(), Storage::Local, None).is_err());
        assert!(table.add("x", Type::INT, variable(), Storage::Param, None).is_err());
    }

    #[test]
    fn active_function_parameters_are_visible() {
        let mut table = SymbolTable::new();
        let func = table
            .add(
                "f",
                Type::INT,
                Structure::Function { exit_label: 1, param_count: 1 },
                Storage::Global,
                None,
            )
            .unwrap();
        let param = table.add("p", Type::INT, variable(), Storage::Param, None).unwrap();
        let params = table.take_params();
        table.get_mut(func).members = params;
        table.set_active_function(Some(func));
        assert_eq!(table.find("p"), Some(param));
        table.free_locals();
        assert_eq!(table.find("p"), None);
    }

    #[test]
    fn members_live_in_their_own_scope() {
        let mut table = SymbolTable::new();
        table.add("a", Type::INT, variable(), Storage::Global, None).unwrap();
        // A member may reuse a global's name, but not another member's.
        table.add("a", Type::INT, variable(), Storage::Member, None).unwrap();
        assert!(table.add("a", Type::CHAR, variable(), Storage::Member, None).is_err());
        let members = table.take_members();
        assert_eq!(members.len(), 1);
        assert!(table.find_member("a").is_none());
    }

    #[test]
    fn struct_sizes_come_from_the_composite() {
        let mut table = SymbolTable::new();
        let def = table
            .add("vec", Type::STRUCT, Structure::Composite { size: 16 }, Storage::Struct, None)
            .unwrap();
        assert_eq!(table.type_size(Type::STRUCT, Some(def)), Ok(16));
        assert!(table.type_size(Type::STRUCT, None).is_err());
        assert_eq!(table.type_size(Type::LONG, None), Ok(8));
    }

    #[test]
    fn clear_resets_everything() {
        let mut table = SymbolTable::new();
        table.add("a", Type::INT, variable(), Storage::Global, None).unwrap();
        table.clear();
        assert!(table.find("a").is_none());
        table.add("a", Type::INT, variable(), Storage::Global, None).unwrap();
    }
}
