// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::HashMap;

use tame_engine::module::Module;

/// Optional label resolver for profiling scopes.
///
/// Return `None` to fall back to the default labels, which name the element the scope runs on.
pub trait LabelResolver {
    /// Resolve a label for an entry-block scope.
    ///
    /// `entry` is the entry key as printed by the engine, e.g. `ONACTION(look)`.
    fn entry_label(&mut self, _element: &str, _entry: &str, _module: &Module) -> Option<String> {
        None
    }

    /// Resolve a label for a function scope.
    fn function_label(&mut self, _element: &str, _name: &str, _module: &Module) -> Option<String> {
        None
    }
}

/// Default resolver that labels scopes by the element they run on.
#[derive(Default, Debug)]
pub struct DefaultLabelResolver;

impl LabelResolver for DefaultLabelResolver {}

/// Resolver that labels scopes by the element that defines the running block.
///
/// Blocks and functions are often inherited; this resolver walks the lineage so that every
/// object sharing an archetype's handler reports under one label.
#[derive(Default, Debug)]
pub struct ModuleSymbolResolver {
    entry_cache: HashMap<(String, String), String>,
    function_cache: HashMap<(String, String), String>,
}

impl LabelResolver for ModuleSymbolResolver {
    fn entry_label(&mut self, element: &str, entry: &str, module: &Module) -> Option<String> {
        let key = (String::from(element), String::from(entry));
        if let Some(label) = self.entry_cache.get(&key) {
            return Some(label.clone());
        }
        let owner = module
            .lineage(element)
            .find(|e| e.blocks().any(|(k, _)| k.to_string() == entry))?;
        let label = format!("entry:{}:{entry}", owner.identity());
        self.entry_cache.insert(key, label.clone());
        Some(label)
    }

    fn function_label(&mut self, element: &str, name: &str, module: &Module) -> Option<String> {
        let key = (String::from(element), String::from(name));
        if let Some(label) = self.function_cache.get(&key) {
            return Some(label.clone());
        }
        let owner = module
            .lineage(element)
            .find(|e| e.function(name).is_some())?;
        let label = format!("func:{}.{name}", owner.identity());
        self.function_cache.insert(key, label.clone());
        Some(label)
    }
}

pub(crate) fn default_entry_label(element: &str, entry: &str) -> String {
    format!("entry:{element}:{entry}")
}

pub(crate) fn default_function_label(element: &str, name: &str) -> String {
    format!("func:{element}.{name}")
}
