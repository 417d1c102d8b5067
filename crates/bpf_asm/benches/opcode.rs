//! Opcode decode and rendering benchmarks.

use std::fmt::Write;

use bpf_asm::{AluOp, AtomicOp, Class, JumpOp, Mode, OpCode, Size, Source};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Benchmark facet decoding across the full opcode byte space.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("opcode/decode");

    group.throughput(Throughput::Elements(256));
    group.bench_function("full_byte_space", |b| {
        b.iter(|| {
            let mut decodable = 0usize;
            for raw in 0u8..=255 {
                let op = OpCode::from_raw(black_box(raw));
                if op.mode().is_some() || op.alu_op().is_some() || op.jump_op().is_some() {
                    decodable += 1;
                }
            }
            decodable
        })
    });

    group.finish();
}

/// Benchmark mnemonic rendering.
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("opcode/render");

    let ops = [
        OpCode::load_imm(Size::DWord),
        OpCode::load_mem(Size::Word),
        OpCode::store_mem(Size::DWord)
            .set_mode(Mode::Atomic)
            .set_atomic_op(AtomicOp::CmpXchg),
        OpCode::alu(AluOp::Add, Class::Alu32),
        OpCode::alu(AluOp::Swap, Class::Alu64),
        OpCode::jump(JumpOp::Jeq, Class::Jump32).set_source(Source::Reg),
        OpCode::jump(JumpOp::Exit, Class::Jump),
        OpCode::INVALID,
    ];

    group.throughput(Throughput::Elements(ops.len() as u64));
    group.bench_function("mnemonics", |b| {
        let mut out = String::with_capacity(256);
        b.iter(|| {
            out.clear();
            for op in ops {
                write!(&mut out, "{}", black_box(op)).unwrap();
            }
            out.len()
        })
    });

    group.finish();
}

/// Benchmark builder and setter chains.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("opcode/build");

    group.bench_function("atomic_chain", |b| {
        b.iter(|| {
            OpCode::store_mem(black_box(Size::DWord))
                .set_mode(Mode::Atomic)
                .set_atomic_op(AtomicOp::FetchOr)
                .raw_opcode()
        })
    });

    group.bench_function("jump_chain", |b| {
        b.iter(|| {
            OpCode::jump(black_box(JumpOp::Jsgt), Class::Jump32)
                .set_source(Source::Reg)
                .raw_opcode()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_render, bench_build);
criterion_main!(benches);
