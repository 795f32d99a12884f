//! Benchmarks for the quantization hot path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quaver_mp3::bitcount::count_bits;
use quaver_mp3::noise::Comparator;
use quaver_mp3::quantize::{init_xrpow, outer_loop, GranuleWork, QuantizeCtx, SeedMemory};
use quaver_mp3::tables::bands;
use quaver_mp3::types::{BlockType, GranuleInfo, GranulePsy, Scalefac, Xmin, GRANULE_SIZE};

fn test_granule() -> GranulePsy {
    let mut xr = Box::new([0.0f64; GRANULE_SIZE]);
    let mut state = 0x2545_f491_4f6c_dd1du64;
    for (i, v) in xr.iter_mut().enumerate() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let noise = ((state >> 32) as f64 / u32::MAX as f64) * 2.0 - 1.0;
        *v = noise * 12.0 / (1.0 + (i as f64 / 80.0).powi(2));
    }
    let mut xmin = Xmin::default();
    for v in xmin.l.iter_mut() {
        *v = 1e-4;
    }
    GranulePsy {
        xr,
        xmin,
        pe: 500.0,
        block_type: BlockType::Norm,
        mixed_block: false,
    }
}

fn benchmark_count_bits(c: &mut Criterion) {
    let psy = test_granule();
    let mut work = GranuleWork::new();
    init_xrpow(&mut work, &psy.xr);
    let b = bands(0);

    c.bench_function("count_bits", |bch| {
        bch.iter(|| {
            let mut gi = GranuleInfo {
                global_gain: black_box(190),
                ..Default::default()
            };
            let mut ix = [0i32; GRANULE_SIZE];
            black_box(count_bits(&mut gi, &work.xrpow, &mut ix, &b))
        })
    });
}

fn benchmark_outer_loop(c: &mut Criterion) {
    let psy = test_granule();
    let ctx = QuantizeCtx {
        bands: bands(0),
        lsf: false,
        comparator: Comparator::new(0),
        noise_shaping: 1,
        noise_shaping_amp: 0,
        noise_shaping_stop: 0,
        tolerate_top: true,
        sfb21_stop: false,
        experimental_z: false,
        vbr_active: false,
    };

    c.bench_function("outer_loop", |bch| {
        bch.iter(|| {
            let mut work = GranuleWork::new();
            init_xrpow(&mut work, &psy.xr);
            let mut gi = GranuleInfo::reset_for(BlockType::Norm, false, false);
            let mut sf = Scalefac::default();
            let mut seed = SeedMemory::default();
            black_box(outer_loop(
                &ctx,
                &mut gi,
                &mut sf,
                &mut work,
                &psy,
                &psy.xmin,
                black_box(1500),
                &mut seed,
                0,
            ))
        })
    });
}

criterion_group!(benches, benchmark_count_bits, benchmark_outer_loop);
criterion_main!(benches);
