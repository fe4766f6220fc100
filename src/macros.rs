// ABOUTME: Registry of `@macro`-declared callables, keyed by name.
//! Registry of `@macro`-declared callables.

use std::collections::HashMap;

use crate::directive::Instruction;

#[derive(Debug, Clone)]
pub struct MacroDef {
    pub name: String,
    pub parameter_names: Vec<String>,
    pub body: Vec<Instruction>,
    pub origin_file: String,
    pub origin_path: String,
    pub origin_line: usize,
}

#[derive(Default)]
pub struct MacroRegistry {
    macros: HashMap<String, MacroDef>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        MacroRegistry {
            macros: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.macros.clear();
    }

    /// Registers `def`. On a name collision, returns the origin of the
    /// existing declaration instead of overwriting it.
    pub fn define(&mut self, def: MacroDef) -> Result<(), (String, usize)> {
        if let Some(existing) = self.macros.get(&def.name) {
            return Err((existing.origin_file.clone(), existing.origin_line));
        }
        self.macros.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    /// Owned snapshot of declared names, for building a `is_known_macro`
    /// closure without holding a borrow of the registry itself.
    pub fn names(&self) -> impl Iterator<Item = String> + '_ {
        self.macros.keys().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, line: usize) -> MacroDef {
        MacroDef {
            name: name.to_string(),
            parameter_names: vec![],
            body: vec![],
            origin_file: "a.txt".to_string(),
            origin_path: String::new(),
            origin_line: line,
        }
    }

    #[test]
    fn redeclaration_reports_the_original_site() {
        let mut reg = MacroRegistry::new();
        reg.define(def("Foo", 1)).unwrap();
        let err = reg.define(def("Foo", 9)).unwrap_err();
        assert_eq!(err, ("a.txt".to_string(), 1));
    }

    #[test]
    fn names_snapshot_is_independent_of_the_registry() {
        let mut reg = MacroRegistry::new();
        reg.define(def("Foo", 1)).unwrap();
        let names: Vec<String> = reg.names().collect();
        assert_eq!(names, vec!["Foo".to_string()]);
    }
}
