use criterion::{criterion_group, criterion_main, Criterion};
use gossamer_cpu::state::{pvr, spr};
use gossamer_cpu::Cpu;
use memory::AddressMap;

fn fixture() -> (Cpu, AddressMap) {
    let cpu = Cpu::new(pvr::MPC750, false, 16_705_000).unwrap();
    let mut bus = AddressMap::new();
    bus.add_ram(0, 0x10000).unwrap();
    (cpu, bus)
}

fn load_code(bus: &mut AddressMap, addr: u32, code: &[u32]) {
    let bytes: Vec<u8> = code.iter().flat_map(|w| w.to_be_bytes()).collect();
    bus.load(addr, &bytes);
}

/// The canonical interpreter over a tight ALU loop.
fn bench_alu_loop(c: &mut Criterion) {
    let code = [
        0x3860_0000u32, // li r3, 0
        0x3863_0001,    // addi r3, r3, 1
        0x7C63_2214,    // add r3, r3, r4
        0x5463_083C,    // rlwinm r3, r3, 1, 0, 30
        0x4200_FFF4,    // bdnz -12
        0x4E80_0020,    // blr
    ];

    c.bench_function("interp_alu_loop_1k", |b| {
        let (mut cpu, mut bus) = fixture();
        load_code(&mut bus, 0x1000, &code);
        b.iter(|| {
            cpu.state.pc = 0x1000;
            cpu.state.spr[spr::CTR] = 1000;
            cpu.state.spr[spr::LR] = 0x4000;
            cpu.run_until(&mut bus, 0x4000)
        })
    });
}

fn bench_threaded_loop(c: &mut Criterion) {
    let code = [
        0x3860_0000u32,
        0x3863_0001,
        0x4200_FFFC, // bdnz -4
        0x4E80_0020,
    ];

    c.bench_function("threaded_loop_1k", |b| {
        let (mut cpu, mut bus) = fixture();
        load_code(&mut bus, 0x1000, &code);
        b.iter(|| {
            cpu.state.pc = 0x1000;
            cpu.state.spr[spr::CTR] = 1000;
            cpu.state.spr[spr::LR] = 0x4000;
            while cpu.state.pc != 0x4000 {
                if !cpu.step_block_threaded(&mut bus) {
                    cpu.step(&mut bus);
                }
            }
            cpu.state.gpr[3]
        })
    });
}

criterion_group!(benches, bench_alu_loop, bench_threaded_loop);
criterion_main!(benches);
