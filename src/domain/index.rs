use crate::domain::callgraph::FunctionId;
use crate::domain::program::FunctionDecl;
use std::collections::{HashMap, HashSet};

/// Name lookup tables over every declared function.
/// Lookups return every candidate; callers decide how to narrow them.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    // Key: fn name (free functions only)
    pub global_functions: HashMap<String, Vec<FunctionId>>,

    // Key: (TypeName, MethodName); trait impl methods are also keyed by trait
    pub type_methods: HashMap<(String, String), Vec<FunctionId>>,

    // Acceleration map: MethodName -> every method with that name
    pub method_lookup: HashMap<String, Vec<FunctionId>>,

    // Every type or trait name that owns at least one method
    pub types: HashSet<String>,
}

impl SymbolIndex {
    pub fn build(functions: &[FunctionDecl]) -> Self {
        let mut index = SymbolIndex::default();
        for (i, decl) in functions.iter().enumerate() {
            let id = FunctionId::from_index(i);
            match &decl.impl_type {
                Some(type_name) => {
                    index
                        .type_methods
                        .entry((type_name.clone(), decl.name.clone()))
                        .or_default()
                        .push(id);
                    index.method_lookup.entry(decl.name.clone()).or_default().push(id);
                    index.types.insert(type_name.clone());
                    if let Some(trait_name) = &decl.trait_name {
                        index
                            .type_methods
                            .entry((trait_name.clone(), decl.name.clone()))
                            .or_default()
                            .push(id);
                        index.types.insert(trait_name.clone());
                    }
                }
                None => {
                    index.global_functions.entry(decl.name.clone()).or_default().push(id);
                }
            }
        }
        index
    }

    pub fn free_functions(&self, name: &str) -> &[FunctionId] {
        self.global_functions.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn methods_of(&self, type_name: &str, method_name: &str) -> &[FunctionId] {
        self.type_methods
            .get(&(type_name.to_string(), method_name.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// Find all methods with a given name (for conservative resolution).
    pub fn find_methods_by_name(&self, method_name: &str) -> &[FunctionId] {
        self.method_lookup.get(method_name).map_or(&[], Vec::as_slice)
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.types.contains(name)
    }
}
