// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Module file codec.
//!
//! Layout:
//!
//! ```text
//! "TAME"
//! header:   uleb count, (key str, value str)*
//! version:  u8 (MODULE_VERSION)
//! digest:   20 bytes, SHA-1 of the payload bytes
//! payload:  uleb length, then
//!           world body
//!           actions, players, rooms, objects, containers   (uleb count, entry*)
//!           parent maps for players, rooms, objects, containers (uleb count, (child, parent)*)
//! ```
//!
//! Every table is written in a canonical order (identities, entry keys and function names sorted)
//! so that equal modules always produce equal payloads and therefore equal digests.

use sha1::{Digest as _, Sha1};

use crate::block::{Block, Operation, SubBlock};
use crate::element::{
    Action, ActionKind, BlockEntry, BlockEntryType, Element, ElementKind, FunctionEntry,
    PermissionMode, PermissionTable, WORLD_IDENTITY,
};
use crate::format::{DIGEST_LEN, DecodeError, Digest, MAX_NESTING, Reader, Writer};
use crate::module::{Module, ModuleError};
use crate::opcode::Opcode;
use crate::value::{Value, ValueKind};

/// Magic bytes at the start of a module file.
pub const MODULE_MAGIC: &[u8; 4] = b"TAME";
/// The module format version this crate reads and writes.
pub const MODULE_VERSION: u8 = 0x01;

const LINEAGE_KINDS: [ElementKind; 4] = [
    ElementKind::Player,
    ElementKind::Room,
    ElementKind::Object,
    ElementKind::Container,
];

/// Encodes `module` into a module file.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, ModuleError> {
    let payload = encode_payload(module)?;
    let digest = digest_payload(&payload);

    let mut w = Writer::new();
    w.write_bytes(MODULE_MAGIC);
    w.write_len(module.header().len());
    for (k, v) in module.header().iter() {
        w.write_str(k);
        w.write_str(v);
    }
    w.write_u8(MODULE_VERSION);
    w.write_bytes(&digest);
    w.write_len(payload.len());
    w.write_bytes(&payload);
    Ok(w.into_vec())
}

/// Decodes a module file, verifying its digest.
pub fn decode_module(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut r = Reader::new(bytes);
    r.expect_magic(MODULE_MAGIC)?;

    let mut module = Module::new();
    let attrs = r.read_len()?;
    for _ in 0..attrs {
        let k = r.read_str()?;
        let v = r.read_string()?;
        module.header_mut().set(k, v);
    }

    let version = r.read_u8()?;
    if version != MODULE_VERSION {
        return Err(DecodeError::UnsupportedVersion { version });
    }
    let digest = r.read_digest()?;
    let len = r.read_len()?;
    let payload = r.read_bytes(len)?;
    if !r.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    if digest_payload(payload) != digest {
        return Err(DecodeError::DigestMismatch);
    }

    let mut p = Reader::new(payload);
    read_payload(&mut p, &mut module)?;
    if !p.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }
    module.set_cached_digest(digest);
    Ok(module)
}

pub(crate) fn digest_payload(payload: &[u8]) -> Digest {
    let mut hasher = Sha1::new();
    hasher.update(payload);
    let out = hasher.finalize();
    let mut digest = [0_u8; DIGEST_LEN];
    digest.copy_from_slice(&out);
    digest
}

pub(crate) fn encode_payload(module: &Module) -> Result<Vec<u8>, ModuleError> {
    let mut w = Writer::new();
    write_element_body(&mut w, module.world())?;

    let actions: Vec<&Action> = module.actions().collect();
    w.write_len(actions.len());
    for a in actions {
        write_action(&mut w, a);
    }

    for kind in LINEAGE_KINDS {
        let elements: Vec<&Element> = module.elements(kind).collect();
        w.write_len(elements.len());
        for e in elements {
            w.write_str(e.identity());
            write_element_body(&mut w, e)?;
        }
    }

    for kind in LINEAGE_KINDS {
        let links: Vec<(&str, &str)> = module
            .elements(kind)
            .filter_map(|e| Some((e.identity(), e.parent()?)))
            .collect();
        w.write_len(links.len());
        for (child, parent) in links {
            w.write_str(child);
            w.write_str(parent);
        }
    }
    Ok(w.into_vec())
}

fn read_payload(r: &mut Reader<'_>, module: &mut Module) -> Result<(), DecodeError> {
    read_element_body(r, module.world_mut())?;

    let actions = r.read_len()?;
    for _ in 0..actions {
        let a = read_action(r)?;
        module.add_action(a)?;
    }

    for kind in LINEAGE_KINDS {
        let count = r.read_len()?;
        for _ in 0..count {
            let identity = r.read_str()?;
            let mut e = Element::new(kind, identity)?;
            read_element_body(r, &mut e)?;
            module.add_element(e)?;
        }
    }

    for kind in LINEAGE_KINDS {
        let count = r.read_len()?;
        for _ in 0..count {
            let child = r.read_str()?;
            let parent = r.read_str()?;
            match module.element(child) {
                Some(e) if e.kind() == kind => {}
                _ => {
                    return Err(DecodeError::UnknownElement {
                        identity: child.into(),
                    });
                }
            }
            module.link_parent(child, parent)?;
        }
    }
    Ok(())
}

fn write_action(w: &mut Writer, a: &Action) {
    w.write_str(a.identity());
    w.write_u8(a.kind().tag());
    w.write_bool(a.strict);
    w.write_bool(a.reversed);
    w.write_len(a.names.len());
    for n in &a.names {
        w.write_str(n);
    }
    w.write_len(a.extra_strings.len());
    for s in &a.extra_strings {
        w.write_str(s);
    }
}

fn read_action(r: &mut Reader<'_>) -> Result<Action, DecodeError> {
    let identity = r.read_str()?;
    let tag = r.read_u8()?;
    let kind = ActionKind::from_tag(tag).ok_or(DecodeError::UnknownTag {
        what: "action kind",
        tag,
    })?;
    let mut a = Action::new(identity, kind)?;
    a.strict = r.read_bool()?;
    a.reversed = r.read_bool()?;
    for _ in 0..r.read_len()? {
        a = a.with_name(r.read_str()?);
    }
    for _ in 0..r.read_len()? {
        a = a.with_extra(r.read_str()?);
    }
    Ok(a)
}

fn write_element_body(w: &mut Writer, e: &Element) -> Result<(), ModuleError> {
    w.write_bool(e.is_archetype());

    let mut blocks = Vec::new();
    for (entry, block) in e.blocks() {
        let mut key = Writer::new();
        write_entry(&mut key, entry)?;
        blocks.push((key.into_vec(), block));
    }
    blocks.sort_by(|a, b| a.0.cmp(&b.0));
    w.write_len(blocks.len());
    for (key, block) in blocks {
        w.write_bytes(&key);
        write_block(w, block)?;
    }

    let mut functions: Vec<&FunctionEntry> = e.functions().collect();
    functions.sort_by(|a, b| a.name.cmp(&b.name));
    w.write_len(functions.len());
    for f in functions {
        w.write_str(&f.name);
        w.write_len(f.arguments.len());
        for arg in &f.arguments {
            w.write_str(arg);
        }
        write_block(w, &f.block)?;
    }

    match e.permissions() {
        None => w.write_u8(0),
        Some(t) => {
            w.write_u8(1);
            w.write_u8(match t.mode {
                PermissionMode::Forbid => 0,
                PermissionMode::Allow => 1,
            });
            w.write_len(t.actions.len());
            for a in &t.actions {
                w.write_str(a);
            }
        }
    }

    for set in [e.names(), e.tags()] {
        w.write_len(set.len());
        for s in set {
            w.write_str(s);
        }
    }
    Ok(())
}

fn read_element_body(r: &mut Reader<'_>, e: &mut Element) -> Result<(), DecodeError> {
    if r.read_bool()? {
        e.set_archetype(true)?;
    }

    for _ in 0..r.read_len()? {
        let entry = read_entry(r)?;
        let block = read_block(r, 0)?;
        e.add_block(entry, block);
    }

    for _ in 0..r.read_len()? {
        let name = r.read_string()?;
        let mut arguments = Vec::new();
        for _ in 0..r.read_len()? {
            arguments.push(r.read_string()?);
        }
        let block = read_block(r, 0)?;
        e.add_function(FunctionEntry {
            name,
            arguments,
            block,
        });
    }

    match r.read_u8()? {
        0 => {}
        1 => {
            let mode = match r.read_u8()? {
                0 => PermissionMode::Forbid,
                1 => PermissionMode::Allow,
                tag => {
                    return Err(DecodeError::UnknownTag {
                        what: "permission mode",
                        tag,
                    });
                }
            };
            let mut table = PermissionTable::new(mode, &[]);
            for _ in 0..r.read_len()? {
                table.actions.insert(r.read_string()?);
            }
            e.set_permissions(table)?;
        }
        tag => {
            return Err(DecodeError::UnknownTag {
                what: "permission flag",
                tag,
            });
        }
    }

    for _ in 0..r.read_len()? {
        e.add_name(r.read_str()?)?;
    }
    for _ in 0..r.read_len()? {
        e.add_tag(r.read_str()?)?;
    }
    Ok(())
}

fn write_entry(w: &mut Writer, entry: &BlockEntry) -> Result<(), ModuleError> {
    w.write_u8(entry.entry_type().tag());
    w.write_len(entry.values().len());
    for v in entry.values() {
        write_constant(w, v)?;
    }
    Ok(())
}

fn read_entry(r: &mut Reader<'_>) -> Result<BlockEntry, DecodeError> {
    let tag = r.read_u8()?;
    let entry_type = BlockEntryType::from_tag(tag).ok_or(DecodeError::UnknownTag {
        what: "block entry",
        tag,
    })?;
    let mut values = Vec::new();
    for _ in 0..r.read_len()? {
        values.push(read_constant(r)?);
    }
    Ok(BlockEntry::with_values(entry_type, values))
}

fn write_block(w: &mut Writer, block: &Block) -> Result<(), ModuleError> {
    w.write_len(block.len());
    for op in block.operations() {
        w.write_u8(op.opcode().byte());
        let operands = u8::from(op.operand0().is_some()) | (u8::from(op.operand1().is_some()) << 1);
        w.write_u8(operands);
        w.write_u8(op.block_mask());
        for v in [op.operand0(), op.operand1()].into_iter().flatten() {
            write_constant(w, v)?;
        }
        for slot in SubBlock::ALL {
            if let Some(b) = op.block(slot) {
                write_block(w, b)?;
            }
        }
    }
    Ok(())
}

fn read_block(r: &mut Reader<'_>, depth: usize) -> Result<Block, DecodeError> {
    if depth > MAX_NESTING {
        return Err(DecodeError::NestingTooDeep);
    }
    let count = r.read_len()?;
    let mut block = Block::new();
    for _ in 0..count {
        let byte = r.read_u8()?;
        let opcode = Opcode::from_byte(byte).ok_or(DecodeError::UnknownTag {
            what: "opcode",
            tag: byte,
        })?;
        let operands = r.read_u8()?;
        if operands & !0b11 != 0 {
            return Err(DecodeError::UnknownTag {
                what: "operand flags",
                tag: operands,
            });
        }
        let mask = r.read_u8()?;
        if mask & !0b1_1111 != 0 {
            return Err(DecodeError::UnknownTag {
                what: "sub-block mask",
                tag: mask,
            });
        }
        let mut op = Operation::new(opcode);
        if operands & 1 != 0 {
            op = op.with_operand0(read_constant(r)?);
        }
        if operands & 2 != 0 {
            op = op.with_operand1(read_constant(r)?);
        }
        for slot in SubBlock::ALL {
            if Operation::mask_has(mask, slot) {
                op = op.with_block(slot, read_block(r, depth + 1)?);
            }
        }
        block.push(op);
    }
    Ok(block)
}

fn write_constant(w: &mut Writer, v: &Value) -> Result<(), ModuleError> {
    if v.is_reference_kind() {
        return Err(ModuleError::ListConstant);
    }
    w.write_u8(v.kind().tag());
    write_scalar_payload(w, v);
    Ok(())
}

fn read_constant(r: &mut Reader<'_>) -> Result<Value, DecodeError> {
    let tag = r.read_u8()?;
    let kind = ValueKind::from_tag(tag).ok_or(DecodeError::UnknownTag { what: "value", tag })?;
    if kind == ValueKind::List {
        return Err(DecodeError::Module(ModuleError::ListConstant));
    }
    read_scalar_payload(r, kind)
}

/// Writes the payload of a non-list value. The caller has already written the kind tag.
pub(crate) fn write_scalar_payload(w: &mut Writer, v: &Value) {
    match v {
        Value::Boolean(b) => w.write_bool(*b),
        Value::Integer(i) => w.write_sleb(*i),
        Value::Float(f) => w.write_f64(*f),
        Value::String(s)
        | Value::Object(s)
        | Value::Player(s)
        | Value::Room(s)
        | Value::Container(s)
        | Value::World(s)
        | Value::Action(s)
        | Value::Variable(s) => w.write_str(s),
        Value::List(_) => {}
    }
}

/// Reads the payload of a non-list value of `kind`.
pub(crate) fn read_scalar_payload(r: &mut Reader<'_>, kind: ValueKind) -> Result<Value, DecodeError> {
    Ok(match kind {
        ValueKind::Boolean => Value::Boolean(r.read_bool()?),
        ValueKind::Integer => Value::Integer(r.read_sleb()?),
        ValueKind::Float => Value::float(r.read_f64()?),
        ValueKind::String => Value::String(r.read_string()?),
        ValueKind::Object => Value::object(r.read_str()?),
        ValueKind::Player => Value::player(r.read_str()?),
        ValueKind::Room => Value::room(r.read_str()?),
        ValueKind::Container => Value::container(r.read_str()?),
        ValueKind::World => {
            let id = r.read_str()?;
            if id != WORLD_IDENTITY {
                return Err(DecodeError::UnknownElement { identity: id.into() });
            }
            Value::world()
        }
        ValueKind::Action => Value::action(r.read_str()?),
        ValueKind::Variable => Value::variable(r.read_str()?),
        ValueKind::List => {
            return Err(DecodeError::UnknownTag {
                what: "scalar value",
                tag: kind.tag(),
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Asm;
    use crate::operator::ArithmeticOperator;

    fn sample() -> Module {
        let mut m = Module::new();
        m.header_mut().set("title", "Sample");
        m.add_action(Action::new("look", ActionKind::General).unwrap().with_name("l"))
            .unwrap();
        let mut hall = Element::new(ElementKind::Room, "hall").unwrap();
        hall.add_block(
            BlockEntry::on_action("look"),
            Asm::block(|a| {
                a.if_else(
                    |c| {
                        c.push(1.5).push(2_i64).arith(ArithmeticOperator::Less);
                    },
                    |s| {
                        s.text_str("yes");
                    },
                    |f| {
                        f.text_str("no");
                    },
                );
            }),
        );
        m.add_element(hall).unwrap();
        let mut lamp = Element::new(ElementKind::Object, "lamp").unwrap();
        lamp.add_name("brass lamp").unwrap();
        m.add_element(lamp).unwrap();
        m
    }

    #[test]
    fn module_round_trips_with_same_digest() {
        let m = sample();
        let bytes = encode_module(&m).unwrap();
        let back = decode_module(&bytes).unwrap();
        assert_eq!(back.digest(), m.digest());
        assert_eq!(back.header().get("title"), Some("Sample"));
        assert_eq!(
            back.element("hall").unwrap().block(&BlockEntry::on_action("look")),
            m.element("hall").unwrap().block(&BlockEntry::on_action("look"))
        );
        assert_eq!(encode_module(&back).unwrap(), bytes);
    }

    #[test]
    fn tampered_payload_fails_digest() {
        let bytes = encode_module(&sample()).unwrap();
        let mut bad = bytes.clone();
        let last = bad.len() - 1;
        bad[last] ^= 0x01;
        assert_eq!(decode_module(&bad).err(), Some(DecodeError::DigestMismatch));
    }

    #[test]
    fn list_constants_are_rejected() {
        let mut m = Module::new();
        m.world_mut()
            .add_block(BlockEntry::new(BlockEntryType::Start), Asm::block(|a| {
                a.push(Value::new_list());
            }));
        assert_eq!(encode_module(&m), Err(ModuleError::ListConstant));
    }

    fn nested_ifs(levels: usize) -> Vec<u8> {
        let mut block = Block::new();
        for _ in 0..levels {
            let mut outer = Block::new();
            outer.push(Operation::new(Opcode::If).with_block(SubBlock::Success, block));
            block = outer;
        }
        let mut w = Writer::new();
        write_block(&mut w, &block).unwrap();
        w.into_vec()
    }

    #[test]
    fn sub_block_nesting_is_bounded() {
        let bytes = nested_ifs(MAX_NESTING);
        assert!(read_block(&mut Reader::new(&bytes), 0).is_ok());

        let bytes = nested_ifs(MAX_NESTING + 1);
        assert_eq!(
            read_block(&mut Reader::new(&bytes), 0),
            Err(DecodeError::NestingTooDeep)
        );

        // Far past the limit: rejected without recursing through every level.
        let mut bytes = Vec::new();
        for _ in 0..200_000 {
            bytes.extend_from_slice(&[1, Opcode::If as u8, 0, SubBlock::Success.bit()]);
        }
        assert_eq!(
            read_block(&mut Reader::new(&bytes), 0),
            Err(DecodeError::NestingTooDeep)
        );
    }

    #[test]
    fn version_is_checked() {
        let mut bytes = encode_module(&Module::new()).unwrap();
        // No header attributes: magic, count byte, then the version.
        bytes[5] = 0x7f;
        assert_eq!(
            decode_module(&bytes).err(),
            Some(DecodeError::UnsupportedVersion { version: 0x7f })
        );
    }
}
