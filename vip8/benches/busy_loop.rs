use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vip8::prelude::*;

/// Counting loop exercising load, add, compare-skip and jump.
#[rustfmt::skip]
const BUSY_LOOP: &[u8] = &[
    0x60, 0x00, // 0x200: LD V0, 0
    0x70, 0x01, // 0x202: ADD V0, 1
    0x30, 0x40, // 0x204: SE V0, 0x40
    0x12, 0x02, // 0x206: JP 0x202
    0x12, 0x00, // 0x208: JP 0x200
];

fn criterion_benchmark(c: &mut Criterion) {
    {
        let mut vm = Vip8Vm::new(Vip8Conf::default());
        vm.load_program(BUSY_LOOP).unwrap();

        c.bench_function("busy loop", |b| {
            b.iter(|| {
                let step_count = black_box(1000_usize);
                black_box(vm.run_steps(step_count))
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
