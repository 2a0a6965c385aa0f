// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime ownership: which element holds which object, object names and tags, the room stack of
//! every player, and the current player.
//!
//! The map only records state. Focus blocks and other side effects of switching players or rooms
//! are run by the interpreter around these calls.

use std::collections::BTreeSet;

use hashbrown::HashMap;

use crate::element::{ElementKind, ElementRef};
use crate::value::fold_identity;

/// Ownership and focus state of one module context.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnershipMap {
    names: WordSets,
    tags: WordSets,
    owner: HashMap<String, ElementRef>,
    held: HashMap<ElementRef, BTreeSet<String>>,
    room_stacks: HashMap<String, Vec<String>>,
    current_player: Option<String>,
}

impl OwnershipMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `object` into `holder`, removing it from its previous holder.
    pub fn add_object(&mut self, holder: &ElementRef, object: &str) {
        self.remove_object(object);
        self.owner.insert(object.into(), holder.clone());
        self.held
            .entry(holder.clone())
            .or_default()
            .insert(object.into());
    }

    /// Removes `object` from its holder, if any.
    pub fn remove_object(&mut self, object: &str) {
        if let Some(prev) = self.owner.remove(object)
            && let Some(set) = self.held.get_mut(&prev)
        {
            set.remove(object);
            if set.is_empty() {
                self.held.remove(&prev);
            }
        }
    }

    /// Moves every object held by `from` into `to`.
    pub fn move_objects(&mut self, from: &ElementRef, to: &ElementRef) {
        if from == to {
            return;
        }
        for object in self.objects_held(from) {
            self.add_object(to, &object);
        }
    }

    /// Returns the holder of `object`.
    #[must_use]
    pub fn owner(&self, object: &str) -> Option<&ElementRef> {
        self.owner.get(object)
    }

    /// Returns `true` if `holder` directly holds `object`.
    #[must_use]
    pub fn has_object(&self, holder: &ElementRef, object: &str) -> bool {
        self.held.get(holder).is_some_and(|s| s.contains(object))
    }

    /// Returns the objects `holder` holds, in identity order.
    #[must_use]
    pub fn objects_held(&self, holder: &ElementRef) -> Vec<String> {
        self.held
            .get(holder)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns how many objects `holder` holds.
    #[must_use]
    pub fn object_count(&self, holder: &ElementRef) -> usize {
        self.held.get(holder).map_or(0, BTreeSet::len)
    }

    /// Adds a name to `object`.
    pub fn add_name(&mut self, object: &str, name: &str) {
        add_word(&mut self.names, object, name);
    }

    /// Removes a name from `object`.
    pub fn remove_name(&mut self, object: &str, name: &str) {
        remove_word(&mut self.names, object, name);
    }

    /// Returns `true` if `object` has `name`.
    #[must_use]
    pub fn has_name(&self, object: &str, name: &str) -> bool {
        has_word(&self.names, object, &fold_identity(name))
    }

    /// Adds a tag to `object`.
    pub fn add_tag(&mut self, object: &str, tag: &str) {
        add_word(&mut self.tags, object, tag);
    }

    /// Removes a tag from `object`.
    pub fn remove_tag(&mut self, object: &str, tag: &str) {
        remove_word(&mut self.tags, object, tag);
    }

    /// Returns `true` if `object` has `tag`.
    #[must_use]
    pub fn has_tag(&self, object: &str, tag: &str) -> bool {
        has_word(&self.tags, object, &fold_identity(tag))
    }

    /// Returns the names of `object`.
    #[must_use]
    pub fn names(&self, object: &str) -> Option<&BTreeSet<String>> {
        self.names.get(object)
    }

    /// Returns the tags of `object`.
    #[must_use]
    pub fn tags(&self, object: &str) -> Option<&BTreeSet<String>> {
        self.tags.get(object)
    }

    /// Pushes `room` onto the room stack of `player`.
    pub fn push_room(&mut self, player: &str, room: &str) {
        self.room_stacks
            .entry(player.into())
            .or_default()
            .push(room.into());
    }

    /// Pops the current room of `player`.
    pub fn pop_room(&mut self, player: &str) -> Option<String> {
        let stack = self.room_stacks.get_mut(player)?;
        let room = stack.pop();
        if stack.is_empty() {
            self.room_stacks.remove(player);
        }
        room
    }

    /// Replaces the current room of `player` with `room`, returning the room it replaced.
    pub fn swap_room(&mut self, player: &str, room: &str) -> Option<String> {
        let prev = self.pop_room(player);
        self.push_room(player, room);
        prev
    }

    /// Returns the current (innermost) room of `player`.
    #[must_use]
    pub fn room_of(&self, player: &str) -> Option<&str> {
        self.room_stacks
            .get(player)
            .and_then(|s| s.last())
            .map(String::as_str)
    }

    /// Returns the full room stack of `player`, outermost first.
    #[must_use]
    pub fn room_stack(&self, player: &str) -> &[String] {
        self.room_stacks
            .get(player)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Sets or clears the current player.
    pub fn set_current_player(&mut self, player: Option<&str>) {
        self.current_player = player.map(String::from);
    }

    /// Returns the current player.
    #[must_use]
    pub fn current_player(&self) -> Option<&str> {
        self.current_player.as_deref()
    }

    /// Returns the current room of the current player.
    #[must_use]
    pub fn current_room(&self) -> Option<&str> {
        self.room_of(self.current_player.as_deref()?)
    }

    /// Returns the objects named `name` that the current player can reach.
    ///
    /// The current player's inventory is searched first, then the current room, then the world;
    /// the first of those holding any match supplies the whole result.
    #[must_use]
    pub fn accessible_objects_by_name(&self, name: &str) -> Vec<String> {
        let name = fold_identity(name);
        let mut holders = Vec::with_capacity(3);
        if let Some(p) = self.current_player() {
            holders.push(ElementRef::new(ElementKind::Player, p));
        }
        if let Some(r) = self.current_room() {
            holders.push(ElementRef::new(ElementKind::Room, r));
        }
        holders.push(ElementRef::world());

        for holder in &holders {
            let found: Vec<String> = self
                .held
                .get(holder)
                .into_iter()
                .flatten()
                .filter(|o| has_word(&self.names, o, &name))
                .cloned()
                .collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    pub(crate) fn owners(&self) -> impl Iterator<Item = (&String, &ElementRef)> {
        self.owner.iter()
    }

    pub(crate) fn named_objects(&self) -> impl Iterator<Item = &String> {
        self.names.keys().chain(self.tags.keys())
    }

    pub(crate) fn room_stacks(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.room_stacks.iter()
    }
}

type WordSets = HashMap<String, BTreeSet<String>>;

// Names and tags are case-folded; an object with none left has no entry.
fn add_word(sets: &mut WordSets, object: &str, word: &str) {
    sets.entry(object.into())
        .or_default()
        .insert(fold_identity(word));
}

fn remove_word(sets: &mut WordSets, object: &str, word: &str) {
    if let Some(set) = sets.get_mut(object) {
        set.remove(&fold_identity(word));
        if set.is_empty() {
            sets.remove(object);
        }
    }
}

fn has_word(sets: &WordSets, object: &str, folded: &str) -> bool {
    sets.get(object).is_some_and(|s| s.contains(folded))
}
