// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Static element definitions: the world, players, rooms, objects, containers and actions.
//!
//! Elements are one tagged type rather than a hierarchy. Per-variant capabilities (permission
//! tables on players and rooms, declared names and tags on objects) are optional records that the
//! constructors only accept on the variants that support them.

use core::fmt;
use core::hash::{Hash, Hasher};

use hashbrown::HashMap;

use crate::block::Block;
use crate::module::ModuleError;
use crate::value::{Value, fold_identity};
use std::collections::BTreeSet;

/// Identity of the implicit world element.
pub const WORLD_IDENTITY: &str = "world";

/// Words that cannot be used as element identities.
pub const RESERVED_IDENTITIES: [&str; 3] = ["player", "room", "world"];

/// The variant of an [`Element`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementKind {
    /// The singleton world.
    World,
    /// A player.
    Player,
    /// A room.
    Room,
    /// An object.
    Object,
    /// A container.
    Container,
}

impl ElementKind {
    /// Returns the stable wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::World,
            1 => Self::Player,
            2 => Self::Room,
            3 => Self::Object,
            4 => Self::Container,
            _ => return None,
        })
    }

    /// Returns `true` if elements of this kind may hold objects.
    #[must_use]
    pub const fn holds_objects(self) -> bool {
        !matches!(self, Self::Object)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::World => "world",
            Self::Player => "player",
            Self::Room => "room",
            Self::Object => "object",
            Self::Container => "container",
        })
    }
}

/// A typed reference to a live element, as held by frames and the ownership map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementRef {
    /// Element variant.
    pub kind: ElementKind,
    /// Case-folded identity.
    pub identity: String,
}

impl ElementRef {
    /// Creates a reference.
    #[must_use]
    pub fn new(kind: ElementKind, identity: &str) -> Self {
        Self {
            kind,
            identity: fold_identity(identity),
        }
    }

    /// The world.
    #[must_use]
    pub fn world() -> Self {
        Self::new(ElementKind::World, WORLD_IDENTITY)
    }

    /// Returns the script value referencing this element.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::element(self.kind, &self.identity)
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identity)
    }
}

/// Trigger tag of a [`BlockEntry`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockEntryType {
    /// Runs once per context when a new game is initialized.
    Init,
    /// Runs on the world after every `INIT`.
    Start,
    /// `(action)`: the action was invoked.
    OnAction,
    /// `(action, object)`: a ditransitive action was invoked with `object` as the second target.
    OnActionWith,
    /// `(action)`: a ditransitive action was invoked with any other second target.
    OnActionWithOther,
    /// `(action, mode)`: a modal action was invoked.
    OnModalAction,
    /// `(action)` or `()`: no handler took the action.
    OnUnhandledAction,
    /// `(action)` or `()`: the action was forbidden.
    OnForbiddenAction,
    /// `()`: this player or room gained focus.
    OnFocus,
    /// `()`: this player or room lost focus.
    OnUnfocus,
    /// Object browsed while held by the world.
    OnWorldBrowse,
    /// Object browsed while held by a player.
    OnPlayerBrowse,
    /// Object browsed while held by a room.
    OnRoomBrowse,
    /// Object browsed while held by a container.
    OnContainerBrowse,
    /// Object browsed, any holder.
    OnElementBrowse,
    /// World: after a command whose action was handled.
    AfterSuccessfulCommand,
    /// World: after a command whose action was not handled.
    AfterFailedCommand,
    /// World: after every command.
    AfterEveryCommand,
}

impl BlockEntryType {
    const ALL: [Self; 18] = [
        Self::Init,
        Self::Start,
        Self::OnAction,
        Self::OnActionWith,
        Self::OnActionWithOther,
        Self::OnModalAction,
        Self::OnUnhandledAction,
        Self::OnForbiddenAction,
        Self::OnFocus,
        Self::OnUnfocus,
        Self::OnWorldBrowse,
        Self::OnPlayerBrowse,
        Self::OnRoomBrowse,
        Self::OnContainerBrowse,
        Self::OnElementBrowse,
        Self::AfterSuccessfulCommand,
        Self::AfterFailedCommand,
        Self::AfterEveryCommand,
    ];

    /// Returns the stable wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(usize::from(tag)).copied()
    }

    /// Returns the script-facing name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Start => "START",
            Self::OnAction => "ONACTION",
            Self::OnActionWith => "ONACTIONWITH",
            Self::OnActionWithOther => "ONACTIONWITHOTHER",
            Self::OnModalAction => "ONMODALACTION",
            Self::OnUnhandledAction => "ONUNHANDLEDACTION",
            Self::OnForbiddenAction => "ONFORBIDDENACTION",
            Self::OnFocus => "ONFOCUS",
            Self::OnUnfocus => "ONUNFOCUS",
            Self::OnWorldBrowse => "ONWORLDBROWSE",
            Self::OnPlayerBrowse => "ONPLAYERBROWSE",
            Self::OnRoomBrowse => "ONROOMBROWSE",
            Self::OnContainerBrowse => "ONCONTAINERBROWSE",
            Self::OnElementBrowse => "ONELEMENTBROWSE",
            Self::AfterSuccessfulCommand => "AFTERSUCCESSFULCOMMAND",
            Self::AfterFailedCommand => "AFTERFAILEDCOMMAND",
            Self::AfterEveryCommand => "AFTEREVERYCOMMAND",
        }
    }
}

/// A block dispatch key: trigger tag plus matching values.
///
/// Equality and hashing are structural. Entry values are identities and literals taken from
/// compiled modules; a NaN float would never match itself and so never be found.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockEntry {
    entry_type: BlockEntryType,
    values: Vec<Value>,
}

impl Eq for BlockEntry {}

impl Hash for BlockEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry_type.hash(state);
        self.values.hash(state);
    }
}

impl BlockEntry {
    /// Creates an entry with no matching values.
    #[must_use]
    pub fn new(entry_type: BlockEntryType) -> Self {
        Self {
            entry_type,
            values: Vec::new(),
        }
    }

    /// Creates an entry with matching values.
    #[must_use]
    pub fn with_values(entry_type: BlockEntryType, values: Vec<Value>) -> Self {
        Self { entry_type, values }
    }

    /// `ONACTION(action)`.
    #[must_use]
    pub fn on_action(action: &str) -> Self {
        Self::with_values(BlockEntryType::OnAction, vec![Value::action(action)])
    }

    /// `ONACTIONWITH(action, object)`.
    #[must_use]
    pub fn on_action_with(action: &str, object: &str) -> Self {
        Self::with_values(
            BlockEntryType::OnActionWith,
            vec![Value::action(action), Value::object(object)],
        )
    }

    /// `ONMODALACTION(action, mode)`.
    #[must_use]
    pub fn on_modal_action(action: &str, mode: &str) -> Self {
        Self::with_values(
            BlockEntryType::OnModalAction,
            vec![Value::action(action), Value::string(fold_identity(mode))],
        )
    }

    /// Returns the trigger tag.
    #[must_use]
    pub fn entry_type(&self) -> BlockEntryType {
        self.entry_type
    }

    /// Returns the matching values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl fmt::Display for BlockEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.entry_type.name())?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

/// A named function defined on an element.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionEntry {
    /// Case-folded function name.
    pub name: String,
    /// Case-folded argument names, bound as locals in order.
    pub arguments: Vec<String>,
    /// Function body.
    pub block: Block,
}

impl FunctionEntry {
    /// Creates a function entry.
    #[must_use]
    pub fn new(name: &str, arguments: &[&str], block: Block) -> Self {
        Self {
            name: fold_identity(name),
            arguments: arguments.iter().map(|a| fold_identity(a)).collect(),
            block,
        }
    }
}

/// Whether a [`PermissionTable`] lists forbidden or allowed actions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PermissionMode {
    /// Listed actions are forbidden; all others are allowed.
    Forbid,
    /// Listed actions are allowed; all others are forbidden.
    Allow,
}

/// Action restrictions attached to a player or room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionTable {
    /// Interpretation of `actions`.
    pub mode: PermissionMode,
    /// Case-folded action identities.
    pub actions: BTreeSet<String>,
}

impl PermissionTable {
    /// Creates a table.
    #[must_use]
    pub fn new(mode: PermissionMode, actions: &[&str]) -> Self {
        Self {
            mode,
            actions: actions.iter().map(|a| fold_identity(a)).collect(),
        }
    }

    /// Returns `true` if `action` may be performed.
    #[must_use]
    pub fn permits(&self, action: &str) -> bool {
        let listed = self.actions.contains(action);
        match self.mode {
            PermissionMode::Forbid => !listed,
            PermissionMode::Allow => listed,
        }
    }
}

/// Returns `Ok` if `identity` is usable for an element or action.
pub(crate) fn check_identity(identity: &str) -> Result<(), ModuleError> {
    let mut chars = identity.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        return Err(ModuleError::BadIdentity {
            identity: identity.into(),
        });
    }
    if RESERVED_IDENTITIES.contains(&fold_identity(identity).as_str()) {
        return Err(ModuleError::ReservedIdentity {
            identity: identity.into(),
        });
    }
    Ok(())
}

/// A static element definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    kind: ElementKind,
    identity: String,
    archetype: bool,
    parent: Option<String>,
    blocks: HashMap<BlockEntry, Block>,
    functions: HashMap<String, FunctionEntry>,
    permissions: Option<PermissionTable>,
    names: BTreeSet<String>,
    tags: BTreeSet<String>,
}

impl Element {
    /// Creates a non-world element.
    pub fn new(kind: ElementKind, identity: &str) -> Result<Self, ModuleError> {
        if kind == ElementKind::World {
            return Err(ModuleError::ReservedIdentity {
                identity: identity.into(),
            });
        }
        check_identity(identity)?;
        Ok(Self::bare(kind, fold_identity(identity)))
    }

    /// Creates the world element.
    #[must_use]
    pub fn world() -> Self {
        Self::bare(ElementKind::World, WORLD_IDENTITY.into())
    }

    fn bare(kind: ElementKind, identity: String) -> Self {
        Self {
            kind,
            identity,
            archetype: false,
            parent: None,
            blocks: HashMap::new(),
            functions: HashMap::new(),
            permissions: None,
            names: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Returns the element variant.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Returns the case-folded identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns a typed reference to this element.
    #[must_use]
    pub fn to_ref(&self) -> ElementRef {
        ElementRef {
            kind: self.kind,
            identity: self.identity.clone(),
        }
    }

    /// Returns `true` for archetypes.
    #[must_use]
    pub fn is_archetype(&self) -> bool {
        self.archetype
    }

    /// Sets the archetype flag. The flag can be set but never cleared, and never on the world.
    pub fn set_archetype(&mut self, archetype: bool) -> Result<(), ModuleError> {
        if self.kind == ElementKind::World {
            return Err(ModuleError::WorldLineage);
        }
        if self.archetype && !archetype {
            return Err(ModuleError::ArchetypeCleared {
                identity: self.identity.clone(),
            });
        }
        self.archetype = archetype;
        Ok(())
    }

    /// Returns the identity of the parent element, if linked.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub(crate) fn link_parent(&mut self, parent: String) {
        self.parent = Some(parent);
    }

    /// Adds (or replaces) the block for `entry`.
    pub fn add_block(&mut self, entry: BlockEntry, block: Block) {
        self.blocks.insert(entry, block);
    }

    /// Returns this element's own block for `entry`, ignoring lineage.
    #[must_use]
    pub fn block(&self, entry: &BlockEntry) -> Option<&Block> {
        self.blocks.get(entry)
    }

    /// Iterates over this element's own blocks.
    pub fn blocks(&self) -> impl Iterator<Item = (&BlockEntry, &Block)> {
        self.blocks.iter()
    }

    /// Adds (or replaces) a function.
    pub fn add_function(&mut self, function: FunctionEntry) {
        self.functions.insert(function.name.clone(), function);
    }

    /// Returns this element's own function `name`, ignoring lineage.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&FunctionEntry> {
        self.functions.get(name)
    }

    /// Iterates over this element's own functions.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.functions.values()
    }

    /// Attaches a permission table. Only players and rooms restrict actions.
    pub fn set_permissions(&mut self, table: PermissionTable) -> Result<(), ModuleError> {
        if !matches!(self.kind, ElementKind::Player | ElementKind::Room) {
            return Err(ModuleError::PermissionMisconfigured {
                identity: self.identity.clone(),
            });
        }
        self.permissions = Some(table);
        Ok(())
    }

    /// Returns the permission table, if any.
    #[must_use]
    pub fn permissions(&self) -> Option<&PermissionTable> {
        self.permissions.as_ref()
    }

    /// Declares a name an object can be referred to by.
    pub fn add_name(&mut self, name: &str) -> Result<(), ModuleError> {
        self.require_object()?;
        self.names.insert(fold_identity(name));
        Ok(())
    }

    /// Declares a tag on an object.
    pub fn add_tag(&mut self, tag: &str) -> Result<(), ModuleError> {
        self.require_object()?;
        self.tags.insert(fold_identity(tag));
        Ok(())
    }

    /// Declared object names.
    #[must_use]
    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Declared object tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    fn require_object(&self) -> Result<(), ModuleError> {
        if self.kind == ElementKind::Object {
            Ok(())
        } else {
            Err(ModuleError::PermissionMisconfigured {
                identity: self.identity.clone(),
            })
        }
    }
}

/// How an action takes its targets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// No targets.
    General,
    /// One object.
    Transitive,
    /// One or two objects.
    Ditransitive,
    /// One mode, taken from the action's extra strings.
    Modal,
    /// Free text, bound to a local variable.
    Open,
}

impl ActionKind {
    /// Returns the stable wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::General,
            1 => Self::Transitive,
            2 => Self::Ditransitive,
            3 => Self::Modal,
            4 => Self::Open,
            _ => return None,
        })
    }
}

/// An action definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    identity: String,
    kind: ActionKind,
    /// Strict actions do not fall back to the transitive handler when a second target is absent.
    pub strict: bool,
    /// Reversed ditransitive actions swap their two targets before dispatch.
    pub reversed: bool,
    /// Case-folded command names that map to this action.
    pub names: BTreeSet<String>,
    /// Conjunctions (ditransitive), modes (modal) or the target variable name (open).
    pub extra_strings: Vec<String>,
}

impl Action {
    /// Creates an action.
    pub fn new(identity: &str, kind: ActionKind) -> Result<Self, ModuleError> {
        check_identity(identity)?;
        Ok(Self {
            identity: fold_identity(identity),
            kind,
            strict: false,
            reversed: false,
            names: BTreeSet::new(),
            extra_strings: Vec::new(),
        })
    }

    /// Returns the case-folded identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the action kind.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Adds a command name.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.names.insert(fold_identity(name));
        self
    }

    /// Adds an extra string (conjunction, mode or open-target variable).
    #[must_use]
    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extra_strings.push(fold_identity(extra));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_and_malformed_identities_are_rejected() {
        assert!(matches!(
            Element::new(ElementKind::Room, "Player"),
            Err(ModuleError::ReservedIdentity { .. })
        ));
        assert!(matches!(
            Element::new(ElementKind::Object, "9lives"),
            Err(ModuleError::BadIdentity { .. })
        ));
        assert!(matches!(
            Element::new(ElementKind::Object, ""),
            Err(ModuleError::BadIdentity { .. })
        ));
        assert_eq!(
            Element::new(ElementKind::Object, "Brass_Lamp").map(|e| e.identity().to_owned()),
            Ok(String::from("brass_lamp"))
        );
    }

    #[test]
    fn archetype_is_one_way() {
        let mut e = Element::new(ElementKind::Object, "thing").unwrap();
        e.set_archetype(true).unwrap();
        e.set_archetype(true).unwrap();
        assert!(matches!(
            e.set_archetype(false),
            Err(ModuleError::ArchetypeCleared { .. })
        ));
        assert_eq!(Element::world().set_archetype(true), Err(ModuleError::WorldLineage));
    }

    #[test]
    fn permission_tables_only_on_players_and_rooms() {
        let table = PermissionTable::new(PermissionMode::Forbid, &["jump"]);
        let mut obj = Element::new(ElementKind::Object, "lamp").unwrap();
        assert!(obj.set_permissions(table.clone()).is_err());
        let mut room = Element::new(ElementKind::Room, "cellar").unwrap();
        room.set_permissions(table).unwrap();
        assert!(!room.permissions().unwrap().permits("jump"));
        assert!(room.permissions().unwrap().permits("look"));
    }

    #[test]
    fn allow_tables_invert() {
        let t = PermissionTable::new(PermissionMode::Allow, &["Look"]);
        assert!(t.permits("look"));
        assert!(!t.permits("jump"));
    }

    #[test]
    fn block_entries_hash_structurally() {
        let mut e = Element::new(ElementKind::Room, "hall").unwrap();
        e.add_block(BlockEntry::on_action("Look"), Block::new());
        assert!(e.block(&BlockEntry::on_action("look")).is_some());
        assert!(e.block(&BlockEntry::on_action("jump")).is_none());
        assert_eq!(BlockEntry::on_action("look").to_string(), "ONACTION(look)");
    }

    #[test]
    fn entry_type_tags_are_stable() {
        for tag in 0..18_u8 {
            let t = BlockEntryType::from_tag(tag).unwrap();
            assert_eq!(t.tag(), tag);
        }
        assert_eq!(BlockEntryType::from_tag(18), None);
    }
}
