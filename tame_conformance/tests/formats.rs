// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Byte-level checks for module files and save states.

use std::rc::Rc;

use tame_conformance::{SEED, cellar, on_look};
use tame_engine::asm::Asm;
use tame_engine::codec::{MODULE_MAGIC, MODULE_VERSION, decode_module, encode_module};
use tame_engine::context::ModuleContext;
use tame_engine::element::WORLD_IDENTITY;
use tame_engine::format::DecodeError;
use tame_engine::module::Module;
use tame_engine::state::{STATE_MAGIC, STATE_VERSION};
use tame_engine::value::Value;

/// SHA-1 of fifteen zero bytes: the payload of a module holding only an empty world.
const EMPTY_PAYLOAD_DIGEST: [u8; 20] = [
    0xbb, 0xa0, 0x4f, 0x69, 0x85, 0xf5, 0x60, 0x44, 0x6c, 0x12, 0x2d, 0x23, 0x5e, 0xd2, 0xe5, 0x1b,
    0xf7, 0xc1, 0x08, 0x64,
];

#[test]
fn empty_module_golden_bytes() {
    let bytes = encode_module(&Module::new()).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(MODULE_MAGIC);
    expected.push(0); // header attributes
    expected.push(MODULE_VERSION);
    expected.extend_from_slice(&EMPTY_PAYLOAD_DIGEST);
    expected.push(15); // payload length
    // world: archetype, blocks, functions, permissions, names, tags
    expected.extend_from_slice(&[0; 6]);
    // actions, then four element tables, then four parent maps
    expected.extend_from_slice(&[0; 9]);
    assert_eq!(bytes, expected);
}

#[test]
fn digest_survives_a_round_trip() {
    let mut m = cellar().unwrap();
    m.header_mut().set("title", "The Cellar");
    on_look(
        &mut m,
        Asm::block(|a| {
            a.text_str("Damp walls.");
        }),
    );
    let bytes = encode_module(&m).unwrap();
    let decoded = decode_module(&bytes).unwrap();
    assert_eq!(decoded.digest().unwrap(), m.digest().unwrap());
    assert_eq!(decoded.header().get("title"), Some("The Cellar"));
    assert_eq!(encode_module(&decoded).unwrap(), bytes);
}

#[test]
fn any_tampered_payload_byte_fails_the_digest() {
    let bytes = encode_module(&cellar().unwrap()).unwrap();
    // The payload is the tail of the file.
    for i in bytes.len() - 16..bytes.len() {
        let mut tampered = bytes.clone();
        tampered[i] ^= 0x01;
        assert_eq!(
            decode_module(&tampered).err(),
            Some(DecodeError::DigestMismatch),
            "byte {i} was not covered by the digest"
        );
    }
}

#[test]
fn truncated_and_foreign_modules_are_rejected() {
    let bytes = encode_module(&cellar().unwrap()).unwrap();
    assert!(decode_module(&bytes[..bytes.len() - 1]).is_err());
    assert_eq!(decode_module(b"NOPE").err(), Some(DecodeError::BadMagic));

    let mut future = bytes.clone();
    future[MODULE_MAGIC.len() + 1] = MODULE_VERSION + 1;
    assert_eq!(
        decode_module(&future).err(),
        Some(DecodeError::UnsupportedVersion {
            version: MODULE_VERSION + 1
        })
    );
}

#[test]
fn shared_list_state_golden_bytes() {
    let mut ctx = ModuleContext::with_seed(Rc::new(Module::new()), SEED).unwrap();
    let list = Value::list(vec![Value::Integer(1)]);
    let world = ctx.context_mut(WORLD_IDENTITY).unwrap();
    world.set("l", list.clone());
    world.set("m", list);

    let mut expected = Vec::new();
    expected.extend_from_slice(STATE_MAGIC);
    expected.push(STATE_VERSION);
    expected.extend_from_slice(ctx.digest());
    expected.push(2); // world variables
    // "l": list tag, id 0, first occurrence, one Integer(1)
    expected.extend_from_slice(&[1, b'l', 4, 0, 1, 1, 1, 1]);
    // "m": list tag, id 0, back-reference
    expected.extend_from_slice(&[1, b'm', 4, 0, 0]);
    // players, rooms, objects, containers
    expected.extend_from_slice(&[0; 4]);
    // names and tags, owners, room stacks, no current player
    expected.extend_from_slice(&[0; 4]);
    assert_eq!(ctx.save_state(), expected);
}

#[test]
fn shared_lists_stay_shared_and_distinct_lists_stay_distinct() {
    let (mut ctx, _) = tame_conformance::start(cellar().unwrap()).unwrap();
    let shared = Value::list(vec![Value::Integer(1), Value::string("a")]);
    let twin = Value::list(vec![Value::Integer(1), Value::string("a")]);
    {
        let hero = ctx.context_mut("hero").unwrap();
        hero.set("a", shared.clone());
        hero.set("b", twin);
    }
    ctx.context_mut(WORLD_IDENTITY).unwrap().set("c", shared);

    let saved = ctx.save_state();
    let (mut restored, _) = tame_conformance::start(cellar().unwrap()).unwrap();
    restored.load_state(&saved).unwrap();

    let list = |ctx: &ModuleContext, who: &str, name: &str| {
        Rc::clone(
            ctx.context(who)
                .unwrap()
                .get(name)
                .and_then(Value::as_list)
                .unwrap(),
        )
    };
    let a = list(&restored, "hero", "a");
    let b = list(&restored, "hero", "b");
    let c = list(&restored, WORLD_IDENTITY, "c");
    assert!(Rc::ptr_eq(&a, &c));
    assert!(!Rc::ptr_eq(&a, &b));
    assert_eq!(*a.borrow(), *b.borrow());

    a.borrow_mut().push(Value::Boolean(true));
    assert_eq!(c.borrow().len(), 3);
    assert_eq!(b.borrow().len(), 2);
    assert_eq!(restored.ownership().current_room(), Some("cellar"));
}

#[test]
fn state_from_another_module_is_rejected_without_changes() {
    let (mut ctx, _) = tame_conformance::start(cellar().unwrap()).unwrap();
    ctx.context_mut("hero").unwrap().set("x", Value::Integer(9));

    let mut other = cellar().unwrap();
    on_look(&mut other, Asm::block(|_| {}));
    let (donor, _) = tame_conformance::start(other).unwrap();

    assert_eq!(
        ctx.load_state(&donor.save_state()).err(),
        Some(DecodeError::ModuleMismatch)
    );
    assert_eq!(
        ctx.context("hero").unwrap().get("x"),
        Some(&Value::Integer(9))
    );

    let saved = ctx.save_state();
    assert!(ctx.load_state(&saved[..saved.len() - 1]).is_err());
    assert_eq!(
        ctx.context("hero").unwrap().get("x"),
        Some(&Value::Integer(9))
    );
}
