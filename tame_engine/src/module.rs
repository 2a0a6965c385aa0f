// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The compiled, immutable module: header, world, actions and elements.
//!
//! A [`Module`] is assembled once (by a compiler, the module decoder, or by hand through this API)
//! and then shared read-only by every [`ModuleContext`] built from it. Lineage is the only
//! relationship established after elements are added, via [`Module::link_parent`].
//!
//! [`ModuleContext`]: crate::context::ModuleContext

use core::cell::OnceCell;
use core::fmt;
use std::collections::BTreeMap;

use crate::block::Block;
use crate::codec;
use crate::element::{Action, BlockEntry, Element, ElementKind, FunctionEntry, check_identity};
use crate::format::Digest;
use crate::value::fold_identity;

/// Header attribute naming the runaway operation threshold.
pub const HEADER_RUNAWAY_MAX: &str = "tame_runaway_max";
/// Header attribute naming the function depth threshold.
pub const HEADER_FUNCTION_DEPTH_MAX: &str = "tame_funcdepth_max";

/// A structural error raised while building or linking a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModuleError {
    /// An identity is empty or contains characters other than letters, digits and `_`.
    BadIdentity {
        /// The offending identity.
        identity: String,
    },
    /// An identity is one of the reserved words.
    ReservedIdentity {
        /// The offending identity.
        identity: String,
    },
    /// An identity is already used by another element (or action).
    DuplicateIdentity {
        /// The offending identity.
        identity: String,
    },
    /// An archetype was turned back into a concrete element.
    ArchetypeCleared {
        /// The element.
        identity: String,
    },
    /// The world cannot be an archetype or take part in lineage.
    WorldLineage,
    /// A parent must be an element of the same kind.
    LineageKindMismatch {
        /// The child.
        child: String,
        /// The requested parent.
        parent: String,
    },
    /// Linking the parent would close a cycle.
    CircularLineage {
        /// The child.
        identity: String,
    },
    /// The element already has a different parent.
    ParentAlreadySet {
        /// The child.
        identity: String,
    },
    /// An identity named no element.
    UnknownElement {
        /// The missing identity.
        identity: String,
    },
    /// A capability was attached to an element kind that does not support it.
    PermissionMisconfigured {
        /// The element.
        identity: String,
    },
    /// Module blocks may not carry list constants.
    ListConstant,
}

impl fmt::Display for ModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadIdentity { identity } => write!(f, "bad identity `{identity}`"),
            Self::ReservedIdentity { identity } => {
                write!(f, "`{identity}` is a reserved identity")
            }
            Self::DuplicateIdentity { identity } => {
                write!(f, "identity `{identity}` is already in use")
            }
            Self::ArchetypeCleared { identity } => {
                write!(f, "archetype `{identity}` cannot become concrete")
            }
            Self::WorldLineage => write!(f, "the world cannot have lineage or be an archetype"),
            Self::LineageKindMismatch { child, parent } => {
                write!(f, "`{parent}` is not the same kind of element as `{child}`")
            }
            Self::CircularLineage { identity } => {
                write!(f, "lineage of `{identity}` would be circular")
            }
            Self::ParentAlreadySet { identity } => {
                write!(f, "`{identity}` already has a parent")
            }
            Self::UnknownElement { identity } => write!(f, "unknown element `{identity}`"),
            Self::PermissionMisconfigured { identity } => {
                write!(f, "capability not supported on `{identity}`")
            }
            Self::ListConstant => write!(f, "list constants are not allowed in modules"),
        }
    }
}

impl core::error::Error for ModuleError {}

/// Free-form string attributes stored ahead of the module payload.
///
/// The header is outside the digest, so tooling can annotate a module without invalidating save
/// states.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    attributes: BTreeMap<String, String>,
}

impl Header {
    /// Creates an empty header.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an attribute. Keys are case-insensitive.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(&fold_identity(key)).map(String::as_str)
    }

    /// Sets an attribute, returning the previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        self.attributes.insert(fold_identity(key), value.into())
    }

    /// Iterates attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// A compiled module.
#[derive(Clone, Debug)]
pub struct Module {
    header: Header,
    world: Element,
    actions: BTreeMap<String, Action>,
    elements: BTreeMap<String, Element>,
    digest: OnceCell<Digest>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    /// Creates an empty module holding only the world.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header: Header::new(),
            world: Element::world(),
            actions: BTreeMap::new(),
            elements: BTreeMap::new(),
            digest: OnceCell::new(),
        }
    }

    /// Returns the header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the header for editing.
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Returns the world.
    #[must_use]
    pub fn world(&self) -> &Element {
        &self.world
    }

    /// Returns the world for editing.
    pub fn world_mut(&mut self) -> &mut Element {
        self.digest.take();
        &mut self.world
    }

    /// Adds an action.
    pub fn add_action(&mut self, action: Action) -> Result<(), ModuleError> {
        if self.actions.contains_key(action.identity()) {
            return Err(ModuleError::DuplicateIdentity {
                identity: action.identity().into(),
            });
        }
        self.digest.take();
        self.actions.insert(action.identity().into(), action);
        Ok(())
    }

    /// Adds a player, room, object or container.
    pub fn add_element(&mut self, element: Element) -> Result<(), ModuleError> {
        if element.kind() == ElementKind::World {
            return Err(ModuleError::ReservedIdentity {
                identity: element.identity().into(),
            });
        }
        check_identity(element.identity())?;
        if self.elements.contains_key(element.identity()) {
            return Err(ModuleError::DuplicateIdentity {
                identity: element.identity().into(),
            });
        }
        self.digest.take();
        self.elements.insert(element.identity().into(), element);
        Ok(())
    }

    /// Returns an action by identity.
    #[must_use]
    pub fn action(&self, identity: &str) -> Option<&Action> {
        self.actions.get(&fold_identity(identity))
    }

    /// Iterates actions in identity order.
    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    /// Returns an element (including the world) by identity.
    #[must_use]
    pub fn element(&self, identity: &str) -> Option<&Element> {
        let identity = fold_identity(identity);
        if identity == self.world.identity() {
            return Some(&self.world);
        }
        self.elements.get(&identity)
    }

    /// Returns a non-world element for editing.
    pub fn element_mut(&mut self, identity: &str) -> Option<&mut Element> {
        self.digest.take();
        self.elements.get_mut(&fold_identity(identity))
    }

    /// Iterates the non-world elements of `kind` in identity order.
    pub fn elements(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(move |e| e.kind() == kind)
    }

    /// Sets the parent of `child`.
    ///
    /// Relinking to the same parent is accepted. Fails without changing anything if the parent is
    /// missing, of another kind, would close a cycle, or if `child` already has another parent.
    pub fn link_parent(&mut self, child: &str, parent: &str) -> Result<(), ModuleError> {
        let child = fold_identity(child);
        let parent = fold_identity(parent);
        let c = self.element(&child).ok_or_else(|| ModuleError::UnknownElement {
            identity: child.clone(),
        })?;
        let p = self.element(&parent).ok_or_else(|| ModuleError::UnknownElement {
            identity: parent.clone(),
        })?;
        if c.kind() == ElementKind::World || p.kind() == ElementKind::World {
            return Err(ModuleError::WorldLineage);
        }
        if c.kind() != p.kind() {
            return Err(ModuleError::LineageKindMismatch { child, parent });
        }
        match c.parent() {
            Some(existing) if existing == parent => return Ok(()),
            Some(_) => return Err(ModuleError::ParentAlreadySet { identity: child }),
            None => {}
        }
        if self.lineage(&parent).any(|e| e.identity() == child) {
            return Err(ModuleError::CircularLineage { identity: child });
        }
        self.digest.take();
        if let Some(c) = self.elements.get_mut(&child) {
            c.link_parent(parent);
        }
        Ok(())
    }

    /// Iterates `identity` and then its ancestors, nearest first.
    pub fn lineage<'a>(&'a self, identity: &str) -> impl Iterator<Item = &'a Element> + 'a {
        let mut next = self.element(identity);
        core::iter::from_fn(move || {
            let current = next?;
            next = current.parent().and_then(|p| self.elements.get(p));
            Some(current)
        })
    }

    /// Resolves the block for `entry` on `identity` or its nearest ancestor that defines one.
    #[must_use]
    pub fn resolve_block(&self, identity: &str, entry: &BlockEntry) -> Option<&Block> {
        self.lineage(identity).find_map(|e| e.block(entry))
    }

    /// Resolves function `name` on `identity` or its nearest ancestor that defines one.
    #[must_use]
    pub fn resolve_function(&self, identity: &str, name: &str) -> Option<&FunctionEntry> {
        let name = fold_identity(name);
        self.lineage(identity).find_map(|e| e.function(&name))
    }

    /// Returns the digest of the module payload, computing it on first use.
    pub fn digest(&self) -> Result<Digest, ModuleError> {
        if let Some(d) = self.digest.get() {
            return Ok(*d);
        }
        let d = codec::digest_payload(&codec::encode_payload(self)?);
        let _ = self.digest.set(d);
        Ok(d)
    }

    pub(crate) fn set_cached_digest(&mut self, digest: Digest) {
        self.digest = OnceCell::from(digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::element::BlockEntryType;

    fn rooms(ids: &[&str]) -> Module {
        let mut m = Module::new();
        for id in ids {
            m.add_element(Element::new(ElementKind::Room, id).unwrap())
                .unwrap();
        }
        m
    }

    #[test]
    fn duplicate_identities_are_rejected_across_kinds() {
        let mut m = rooms(&["hall"]);
        assert_eq!(
            m.add_element(Element::new(ElementKind::Object, "Hall").unwrap()),
            Err(ModuleError::DuplicateIdentity {
                identity: "hall".into()
            })
        );
    }

    #[test]
    fn circular_lineage_fails_without_mutation() {
        let mut m = rooms(&["a", "b", "c"]);
        m.link_parent("a", "b").unwrap();
        m.link_parent("b", "c").unwrap();
        assert_eq!(
            m.link_parent("c", "a"),
            Err(ModuleError::CircularLineage {
                identity: "c".into()
            })
        );
        assert_eq!(m.element("c").unwrap().parent(), None);
        assert!(matches!(
            m.link_parent("a", "a"),
            Err(ModuleError::ParentAlreadySet { .. })
        ));
        let mut m = rooms(&["x"]);
        assert!(matches!(
            m.link_parent("x", "x"),
            Err(ModuleError::CircularLineage { .. })
        ));
    }

    #[test]
    fn parent_is_write_once() {
        let mut m = rooms(&["a", "b", "c"]);
        m.link_parent("a", "b").unwrap();
        m.link_parent("a", "b").unwrap();
        assert_eq!(
            m.link_parent("a", "c"),
            Err(ModuleError::ParentAlreadySet {
                identity: "a".into()
            })
        );
    }

    #[test]
    fn lineage_must_match_kind_and_skip_world() {
        let mut m = rooms(&["hall"]);
        m.add_element(Element::new(ElementKind::Object, "lamp").unwrap())
            .unwrap();
        assert!(matches!(
            m.link_parent("lamp", "hall"),
            Err(ModuleError::LineageKindMismatch { .. })
        ));
        assert_eq!(m.link_parent("hall", "world"), Err(ModuleError::WorldLineage));
    }

    #[test]
    fn own_block_wins_over_inherited() {
        let mut m = Module::new();
        let entry = BlockEntry::new(BlockEntryType::Init);
        let mut base = Element::new(ElementKind::Room, "base").unwrap();
        base.set_archetype(true).unwrap();
        base.add_block(entry.clone(), Asm::block(|a| {
            a.text_str("base");
        }));
        base.add_function(FunctionEntry::new("f", &[], Block::new()));
        m.add_element(base).unwrap();
        m.add_element(Element::new(ElementKind::Room, "mid").unwrap())
            .unwrap();
        let mut leaf = Element::new(ElementKind::Room, "leaf").unwrap();
        leaf.add_block(entry.clone(), Asm::block(|a| {
            a.text_str("leaf");
        }));
        m.add_element(leaf).unwrap();
        m.link_parent("mid", "base").unwrap();
        m.link_parent("leaf", "mid").unwrap();

        let leaf_block = m.resolve_block("leaf", &entry).unwrap();
        assert_eq!(leaf_block, m.element("leaf").unwrap().block(&entry).unwrap());
        let mid_block = m.resolve_block("mid", &entry).unwrap();
        assert_eq!(mid_block, m.element("base").unwrap().block(&entry).unwrap());
        assert!(m.resolve_function("LEAF", "F").is_some());
        assert_eq!(
            m.lineage("leaf").map(Element::identity).collect::<Vec<_>>(),
            ["leaf", "mid", "base"]
        );
    }

    #[test]
    fn header_keys_are_case_insensitive() {
        let mut h = Header::new();
        h.set("Tame_Runaway_Max", "10");
        assert_eq!(h.get(HEADER_RUNAWAY_MAX), Some("10"));
    }
}
