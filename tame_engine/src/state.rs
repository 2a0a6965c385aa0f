// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Save-state codec.
//!
//! Layout:
//!
//! ```text
//! "TSAV"
//! version:     u8 (STATE_VERSION)
//! digest:      20 bytes, must equal the digest of the module being restored into
//! world:       variables
//! players, rooms, objects, containers: uleb count, (identity str, variables)*
//! ownership:   names and tags, owners, room stacks, current player
//!
//! variables:   uleb count, (name str, value)*
//! value:       kind tag, then the scalar payload, or for lists:
//!              uleb id, 1, uleb len, value*     first occurrence of an instance
//!              uleb id, 0                       later occurrences
//! ```
//!
//! List ids are assigned in write order. The id of a list is registered before its elements are
//! written, so a list that (directly or indirectly) contains itself is written once.

use core::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::codec::{read_scalar_payload, write_scalar_payload};
use crate::context::ModuleContext;
use crate::element::{ElementKind, ElementRef, WORLD_IDENTITY};
use crate::format::{DecodeError, MAX_NESTING, Reader, Writer};
use crate::ownership::OwnershipMap;
use crate::value::{ListRef, Value, ValueKind};

/// Magic bytes at the start of a save state.
pub const STATE_MAGIC: &[u8; 4] = b"TSAV";
/// The save-state format version this crate reads and writes.
pub const STATE_VERSION: u8 = 0x01;

const CONTEXT_KINDS: [ElementKind; 4] = [
    ElementKind::Player,
    ElementKind::Room,
    ElementKind::Object,
    ElementKind::Container,
];

/// Assigns ids to list instances as they are first written.
#[derive(Debug, Default)]
struct SaveRefs {
    next: u64,
    ids: HashMap<*const RefCell<Vec<Value>>, u64>,
}

/// Maps ids back to the list instances rebuilt so far.
#[derive(Debug, Default)]
struct LoadRefs {
    lists: HashMap<u64, ListRef>,
}

pub(crate) fn write_state(ctx: &ModuleContext) -> Vec<u8> {
    let mut w = Writer::new();
    let mut refs = SaveRefs::default();
    w.write_bytes(STATE_MAGIC);
    w.write_u8(STATE_VERSION);
    w.write_bytes(ctx.digest());

    if let Ok(world) = ctx.context(WORLD_IDENTITY) {
        write_variables(&mut w, &mut refs, world.variables());
    }
    for kind in CONTEXT_KINDS {
        let live = ctx.live_elements(kind);
        w.write_len(live.len());
        for e in live {
            w.write_str(&e.identity);
            if let Ok(c) = ctx.context(&e.identity) {
                write_variables(&mut w, &mut refs, c.variables());
            }
        }
    }
    write_ownership(&mut w, ctx.ownership());
    w.into_vec()
}

pub(crate) fn read_state(ctx: &mut ModuleContext, bytes: &[u8]) -> Result<(), DecodeError> {
    let mut r = Reader::new(bytes);
    let mut refs = LoadRefs::default();
    r.expect_magic(STATE_MAGIC)?;
    let version = r.read_u8()?;
    if version != STATE_VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }
    if r.read_digest()? != *ctx.digest() {
        return Err(DecodeError::ModuleMismatch);
    }

    let mut variables = vec![(
        String::from(WORLD_IDENTITY),
        read_variables(&mut r, &mut refs)?,
    )];
    for kind in CONTEXT_KINDS {
        for _ in 0..r.read_len()? {
            let identity = r.read_string()?;
            require_live(ctx, kind, &identity)?;
            variables.push((identity, read_variables(&mut r, &mut refs)?));
        }
    }
    let ownership = read_ownership(&mut r, ctx)?;
    if !r.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    ctx.replace_state(variables, ownership);
    Ok(())
}

fn require_live(ctx: &ModuleContext, kind: ElementKind, identity: &str) -> Result<(), DecodeError> {
    match ctx.context(identity) {
        Ok(c) if c.element().kind == kind => Ok(()),
        _ => Err(DecodeError::UnknownElement {
            identity: identity.into(),
        }),
    }
}

fn write_variables<'a>(
    w: &mut Writer,
    refs: &mut SaveRefs,
    variables: impl Iterator<Item = (&'a str, &'a Value)>,
) {
    let mut sorted: Vec<(&str, &Value)> = variables.collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    w.write_len(sorted.len());
    for (name, value) in sorted {
        w.write_str(name);
        write_value(w, refs, value);
    }
}

fn read_variables(
    r: &mut Reader<'_>,
    refs: &mut LoadRefs,
) -> Result<HashMap<String, Value>, DecodeError> {
    let count = r.read_len()?;
    let mut out = HashMap::with_capacity(count);
    for _ in 0..count {
        let name = r.read_string()?;
        let value = read_value(r, refs, 0)?;
        out.insert(name, value);
    }
    Ok(out)
}

fn write_value(w: &mut Writer, refs: &mut SaveRefs, value: &Value) {
    w.write_u8(value.kind().tag());
    let Value::List(list) = value else {
        write_scalar_payload(w, value);
        return;
    };
    let key = Rc::as_ptr(list);
    if let Some(id) = refs.ids.get(&key) {
        w.write_uleb(*id);
        w.write_u8(0);
        return;
    }
    let id = refs.next;
    refs.next += 1;
    refs.ids.insert(key, id);
    w.write_uleb(id);
    w.write_u8(1);
    let items = list.borrow();
    w.write_len(items.len());
    for item in items.iter() {
        write_value(w, refs, item);
    }
}

fn read_value(
    r: &mut Reader<'_>,
    refs: &mut LoadRefs,
    depth: usize,
) -> Result<Value, DecodeError> {
    let tag = r.read_u8()?;
    let kind = ValueKind::from_tag(tag).ok_or(DecodeError::UnknownTag { what: "value", tag })?;
    if kind != ValueKind::List {
        return read_scalar_payload(r, kind);
    }
    let id = r.read_uleb()?;
    match r.read_u8()? {
        0 => refs
            .lists
            .get(&id)
            .map(|l| Value::List(Rc::clone(l)))
            .ok_or(DecodeError::BadReference { id }),
        1 => {
            if depth >= MAX_NESTING {
                return Err(DecodeError::NestingTooDeep);
            }
            if refs.lists.contains_key(&id) {
                return Err(DecodeError::BadReference { id });
            }
            let list: ListRef = Rc::new(RefCell::new(Vec::new()));
            refs.lists.insert(id, Rc::clone(&list));
            let len = r.read_len()?;
            for _ in 0..len {
                let item = read_value(r, refs, depth + 1)?;
                list.borrow_mut().push(item);
            }
            Ok(Value::List(list))
        }
        tag => Err(DecodeError::UnknownTag {
            what: "list reference",
            tag,
        }),
    }
}

fn write_ownership(w: &mut Writer, map: &OwnershipMap) {
    let objects: BTreeSet<&String> = map.named_objects().collect();
    w.write_len(objects.len());
    for object in objects {
        w.write_str(object);
        for set in [map.names(object), map.tags(object)] {
            let set = set.cloned().unwrap_or_default();
            w.write_len(set.len());
            for s in &set {
                w.write_str(s);
            }
        }
    }

    let mut owners: Vec<(&String, &ElementRef)> = map.owners().collect();
    owners.sort();
    w.write_len(owners.len());
    for (object, holder) in owners {
        w.write_str(object);
        w.write_u8(holder.kind.tag());
        w.write_str(&holder.identity);
    }

    let mut stacks: Vec<(&String, &Vec<String>)> = map.room_stacks().collect();
    stacks.sort();
    w.write_len(stacks.len());
    for (player, rooms) in stacks {
        w.write_str(player);
        w.write_len(rooms.len());
        for room in rooms {
            w.write_str(room);
        }
    }

    match map.current_player() {
        Some(p) => {
            w.write_bool(true);
            w.write_str(p);
        }
        None => w.write_bool(false),
    }
}

fn read_ownership(r: &mut Reader<'_>, ctx: &ModuleContext) -> Result<OwnershipMap, DecodeError> {
    let mut map = OwnershipMap::new();

    for _ in 0..r.read_len()? {
        let object = r.read_string()?;
        require_live(ctx, ElementKind::Object, &object)?;
        for _ in 0..r.read_len()? {
            map.add_name(&object, r.read_str()?);
        }
        for _ in 0..r.read_len()? {
            map.add_tag(&object, r.read_str()?);
        }
    }

    for _ in 0..r.read_len()? {
        let object = r.read_string()?;
        require_live(ctx, ElementKind::Object, &object)?;
        let tag = r.read_u8()?;
        let kind = match ElementKind::from_tag(tag) {
            Some(k) if k.holds_objects() => k,
            _ => {
                return Err(DecodeError::UnknownTag {
                    what: "holder kind",
                    tag,
                });
            }
        };
        let holder = r.read_string()?;
        require_live(ctx, kind, &holder)?;
        map.add_object(&ElementRef::new(kind, &holder), &object);
    }

    for _ in 0..r.read_len()? {
        let player = r.read_string()?;
        require_live(ctx, ElementKind::Player, &player)?;
        for _ in 0..r.read_len()? {
            let room = r.read_str()?;
            require_live(ctx, ElementKind::Room, room)?;
            map.push_room(&player, room);
        }
    }

    if r.read_bool()? {
        let player = r.read_str()?;
        require_live(ctx, ElementKind::Player, player)?;
        map.set_current_player(Some(player));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use crate::module::Module;

    fn ctx() -> ModuleContext {
        let mut m = Module::new();
        m.add_element(Element::new(ElementKind::Player, "me").unwrap())
            .unwrap();
        m.add_element(Element::new(ElementKind::Room, "hall").unwrap())
            .unwrap();
        m.add_element(Element::new(ElementKind::Object, "lamp").unwrap())
            .unwrap();
        ModuleContext::with_seed(Rc::new(m), 7).unwrap()
    }

    #[test]
    fn shared_lists_stay_shared() {
        let mut c = ctx();
        let shared = Value::list(vec![Value::Integer(1)]);
        let twin = Value::list(vec![Value::Integer(1)]);
        c.context_mut("world").unwrap().set("a", shared.clone());
        c.context_mut("me").unwrap().set("b", shared);
        c.context_mut("hall").unwrap().set("c", twin);
        let bytes = c.save_state();

        let mut d = ctx();
        d.load_state(&bytes).unwrap();
        let a = d.context("world").unwrap().get("a").unwrap().clone();
        let b = d.context("me").unwrap().get("b").unwrap().clone();
        let t = d.context("hall").unwrap().get("c").unwrap().clone();
        assert!(Rc::ptr_eq(a.as_list().unwrap(), b.as_list().unwrap()));
        assert!(!Rc::ptr_eq(a.as_list().unwrap(), t.as_list().unwrap()));
        a.as_list().unwrap().borrow_mut().push(Value::Integer(2));
        assert_eq!(b.length(), 2);
        assert_eq!(t.length(), 1);
    }

    #[test]
    fn self_containing_list_is_written_once() {
        let l = Value::new_list();
        l.as_list().unwrap().borrow_mut().push(l.clone());
        let mut w = Writer::new();
        let mut refs = SaveRefs::default();
        write_value(&mut w, &mut refs, &l);
        let bytes = w.into_vec();
        let list_tag = ValueKind::List.tag();
        assert_eq!(bytes, [list_tag, 0, 1, 1, list_tag, 0, 0]);

        let mut r = Reader::new(&bytes);
        let back = read_value(&mut r, &mut LoadRefs::default(), 0).unwrap();
        let inner = back.as_list().unwrap().borrow()[0].clone();
        assert!(Rc::ptr_eq(back.as_list().unwrap(), inner.as_list().unwrap()));
        // Break the cycles so the test does not leak.
        back.as_list().unwrap().borrow_mut().clear();
        l.as_list().unwrap().borrow_mut().clear();
    }

    #[test]
    fn ownership_round_trips() {
        let mut c = ctx();
        let o = c.ownership_mut();
        o.set_current_player(Some("me"));
        o.push_room("me", "hall");
        o.add_object(&ElementRef::new(ElementKind::Player, "me"), "lamp");
        o.add_tag("lamp", "lit");
        let bytes = c.save_state();
        let mut d = ctx();
        d.load_state(&bytes).unwrap();
        assert_eq!(d.ownership(), c.ownership());
    }

    #[test]
    fn stripped_objects_leave_no_trace_in_the_save() {
        let fresh = ctx().save_state();
        let mut c = ctx();
        c.ownership_mut().remove_name("lamp", "lamp");
        c.ownership_mut().add_tag("lamp", "lit");
        c.ownership_mut().remove_tag("lamp", "lit");
        assert_eq!(c.save_state(), fresh);
    }

    #[test]
    fn wrong_module_is_rejected_and_state_kept() {
        let mut other = Module::new();
        other
            .add_element(Element::new(ElementKind::Room, "elsewhere").unwrap())
            .unwrap();
        let o = ModuleContext::with_seed(Rc::new(other), 1).unwrap();
        let bytes = o.save_state();

        let mut c = ctx();
        c.context_mut("me").unwrap().set("x", Value::Integer(5));
        assert_eq!(c.load_state(&bytes), Err(DecodeError::ModuleMismatch));
        assert_eq!(c.context("me").unwrap().get("x"), Some(&Value::Integer(5)));
    }

    #[test]
    fn list_nesting_is_bounded_on_load() {
        let mut nested = Value::Integer(0);
        for _ in 0..MAX_NESTING {
            nested = Value::list(vec![nested]);
        }
        let mut c = ctx();
        c.context_mut("world").unwrap().set("a", nested);
        let bytes = c.save_state();
        let mut d = ctx();
        d.load_state(&bytes).unwrap();
        assert_eq!(d.context("world").unwrap().get("a"), c.context("world").unwrap().get("a"));

        // Swap world variable `a` for a list chain far deeper than the limit.
        let mut c = ctx();
        c.context_mut("world").unwrap().set("a", Value::Integer(0));
        c.context_mut("me").unwrap().set("x", Value::Integer(5));
        let bytes = c.save_state();
        let value_at = STATE_MAGIC.len() + 1 + crate::format::DIGEST_LEN + 3;
        assert_eq!(&bytes[value_at..value_at + 2], &[ValueKind::Integer.tag(), 0]);
        let mut w = Writer::new();
        for id in 0..200_000_u64 {
            w.write_u8(ValueKind::List.tag());
            w.write_uleb(id);
            w.write_u8(1);
            w.write_len(1);
        }
        let mut spliced = bytes[..value_at].to_vec();
        spliced.extend_from_slice(&w.into_vec());
        spliced.extend_from_slice(&bytes[value_at..]);

        assert_eq!(c.load_state(&spliced), Err(DecodeError::NestingTooDeep));
        assert_eq!(c.context("me").unwrap().get("x"), Some(&Value::Integer(5)));
    }

    #[test]
    fn dangling_reference_is_rejected() {
        let bytes = [ValueKind::List.tag(), 9, 0];
        let mut r = Reader::new(&bytes);
        assert_eq!(
            read_value(&mut r, &mut LoadRefs::default(), 0),
            Err(DecodeError::BadReference { id: 9 })
        );
    }
}
