// Copyright 2026 the Tame Engine Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use std::rc::Rc;
use tame_engine::asm::Asm;
use tame_engine::codec::{decode_module, encode_module};
use tame_engine::context::ModuleContext;
use tame_engine::element::{
    Action, ActionKind, BlockEntry, BlockEntryType, Element, ElementKind, FunctionEntry,
    WORLD_IDENTITY,
};
use tame_engine::module::{HEADER_RUNAWAY_MAX, Module};
use tame_engine::operator::ArithmeticOperator as Op;
use tame_engine::request::{ActionInvocation, RequestOptions};
use tame_engine::value::Value;

/// Entry point for `tame_engine` wind-tunnel benchmarks.
///
/// Scenarios cover the interpreter loop on its own, dispatch through the focus chain and
/// lineage, and the two binary formats.
fn bench_engine(c: &mut Criterion) {
    bench_counting_loop(c);
    bench_recursive_calls(c);
    bench_inherited_dispatch(c);
    bench_module_codec(c);
    bench_save_state(c);
}

fn base_module() -> Module {
    let mut m = Module::new();
    m.header_mut().set(HEADER_RUNAWAY_MAX, "0");
    m.add_action(Action::new("go", ActionKind::General).unwrap())
        .unwrap();
    m.add_element(Element::new(ElementKind::Player, "hero").unwrap())
        .unwrap();
    m.add_element(Element::new(ElementKind::Room, "hall").unwrap())
        .unwrap();
    m.world_mut().add_block(
        BlockEntry::new(BlockEntryType::Start),
        Asm::block(|a| {
            a.push(Value::player("hero")).set_player();
            a.push(Value::room("hall")).push_room();
        }),
    );
    m
}

fn started(m: Module) -> ModuleContext {
    let mut ctx = ModuleContext::with_seed(Rc::new(m), 1).unwrap();
    let r = tame_engine::initialize(&mut ctx, RequestOptions::default());
    assert!(r.failure().is_none(), "{r:?}");
    ctx
}

fn go(ctx: &mut ModuleContext) {
    let r = tame_engine::process_action(
        ctx,
        &ActionInvocation::general("go"),
        RequestOptions::default(),
    );
    black_box(r);
}

/// A `FOR` loop summing `0..n` into a world variable.
///
/// Measures raw dispatch: every iteration is a handful of pushes, pops and arithmetic.
fn bench_counting_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("counting_loop");
    for &n in &[10_i64, 100, 1_000] {
        let mut m = base_module();
        m.world_mut().add_block(
            BlockEntry::on_action("go"),
            Asm::block(|a| {
                a.push(0_i64).pop_value("total");
                a.for_loop(
                    |i| {
                        i.push(0_i64).pop_value("i");
                    },
                    |c| {
                        c.push_var("i").push(n).arith(Op::Less);
                    },
                    |s| {
                        s.push_var("i").push(1_i64).arith(Op::Add).pop_value("i");
                    },
                    |b| {
                        b.push_var("total")
                            .push_var("i")
                            .arith(Op::Add)
                            .pop_value("total");
                    },
                );
            }),
        );
        let mut ctx = started(m);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| go(&mut ctx));
        });
    }
    group.finish();
}

/// Naive Fibonacci through a world function.
///
/// Dominated by frame setup, argument binding and the `Return` unwinding path.
fn bench_recursive_calls(c: &mut Criterion) {
    let mut group = c.benchmark_group("recursive_calls");
    for &n in &[5_i64, 10, 15] {
        let mut m = base_module();
        m.world_mut().add_function(FunctionEntry::new(
            "fib",
            &["n"],
            Asm::block(|a| {
                a.if_else(
                    |c| {
                        c.push_var("n").push(2_i64).arith(Op::Less);
                    },
                    |t| {
                        t.push_var("n").ret();
                    },
                    |f| {
                        f.push_var("n").push(1_i64).arith(Op::Subtract).call("fib");
                        f.push_var("n").push(2_i64).arith(Op::Subtract).call("fib");
                        f.arith(Op::Add).ret();
                    },
                );
            }),
        ));
        m.world_mut().add_block(
            BlockEntry::on_action("go"),
            Asm::block(|a| {
                a.push(n).call("fib").pop();
            }),
        );
        let mut ctx = started(m);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| go(&mut ctx));
        });
    }
    group.finish();
}

/// A handler found on the far end of a room archetype chain of `depth` ancestors.
///
/// Measures block resolution through lineage plus the after-command passes.
fn bench_inherited_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("inherited_dispatch");
    for &depth in &[1_usize, 8, 32] {
        let mut m = base_module();
        let mut parent = String::from("hall");
        for i in 0..depth {
            let id = format!("kind{i}");
            let mut e = Element::new(ElementKind::Room, &id).unwrap();
            e.set_archetype(true).unwrap();
            m.add_element(e).unwrap();
            m.link_parent(&parent, &id).unwrap();
            parent = id;
        }
        m.element_mut(&parent).unwrap().add_block(
            BlockEntry::on_action("go"),
            Asm::block(|a| {
                a.text_str("You go.");
            }),
        );
        m.world_mut().add_block(
            BlockEntry::new(BlockEntryType::AfterEveryCommand),
            Asm::block(|_| {}),
        );
        let mut ctx = started(m);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| go(&mut ctx));
        });
    }
    group.finish();
}

fn wide_module(elements: usize) -> Module {
    let mut m = base_module();
    for i in 0..elements {
        let mut e = Element::new(ElementKind::Object, &format!("thing{i}")).unwrap();
        e.add_name(&format!("thing number {i}")).unwrap();
        e.add_block(
            BlockEntry::on_action("go"),
            Asm::block(|a| {
                a.push(Value::object(&format!("thing{i}")))
                    .push(Value::room("hall"))
                    .give_object();
            }),
        );
        m.add_element(e).unwrap();
    }
    m
}

/// Encoding (including the payload digest) and verified decoding of a module.
fn bench_module_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("module_codec");
    for &n in &[10_usize, 100, 1_000] {
        let m = wide_module(n);
        let bytes = encode_module(&m).unwrap();
        group.bench_with_input(BenchmarkId::new("encode", n), &n, |b, _| {
            b.iter(|| black_box(encode_module(black_box(&m)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("decode", n), &n, |b, _| {
            b.iter(|| black_box(decode_module(black_box(&bytes)).unwrap()));
        });
    }
    group.finish();
}

/// Save and load of a state whose world holds `n` variables sharing one list.
fn bench_save_state(c: &mut Criterion) {
    let mut group = c.benchmark_group("save_state");
    for &n in &[10_usize, 100, 1_000] {
        let mut ctx = started(wide_module(16));
        let shared = Value::list((0..64).map(Value::Integer).collect());
        let world = ctx.context_mut(WORLD_IDENTITY).unwrap();
        for i in 0..n {
            world.set(&format!("v{i}"), shared.clone());
        }
        let bytes = ctx.save_state();
        group.bench_with_input(BenchmarkId::new("save", n), &n, |b, _| {
            b.iter(|| black_box(ctx.save_state()));
        });
        group.bench_with_input(BenchmarkId::new("load", n), &n, |b, _| {
            b.iter(|| ctx.load_state(black_box(&bytes)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_engine);
criterion_main!(benches);
