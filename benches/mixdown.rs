//! Mixdown Benchmarks
//!
//! The render path: effective gain lookup and bus summing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use remote_studio::mixer::{AudioSourceId, BusName, MixerConfig, MixerStore, SendUpdate, SourceConfig, SourceTarget};
use remote_studio::routing::mixdown;

const FRAME_SIZES: &[usize] = &[480, 960, 1920];
const SOURCE_COUNTS: &[usize] = &[1, 4, 16];

fn mixer_with(sources: usize) -> (MixerConfig, Vec<AudioSourceId>) {
    let store = MixerStore::default();
    let mut ids = vec![AudioSourceId::Mic];
    for n in 1..sources {
        let id = AudioSourceId::remote(format!("presenter-{}", n));
        store.ensure_source(&id, SourceConfig::remote_default());
        ids.push(id);
    }
    let _ = store.set_send(&SourceTarget::Remotes, BusName::Main, SendUpdate::gain(0.8));
    let _ = store.set_send(
        &SourceTarget::Source(AudioSourceId::Mic),
        BusName::Main,
        SendUpdate::enable(true),
    );
    (MixerConfig::clone(&store.snapshot()), ids)
}

fn sine(len: usize, freq: f32) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * freq * std::f32::consts::TAU / 48000.0).sin() * 0.5)
        .collect()
}

fn bench_mixdown(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixdown");

    for &sources in SOURCE_COUNTS {
        for &frame in FRAME_SIZES {
            let (config, ids) = mixer_with(sources);
            let signals: Vec<Vec<f32>> = (0..sources).map(|n| sine(frame, 220.0 * (n + 1) as f32)).collect();
            let inputs: Vec<(AudioSourceId, &[f32])> = ids
                .iter()
                .cloned()
                .zip(signals.iter().map(Vec::as_slice))
                .collect();
            let mut out = vec![0.0f32; frame];

            group.throughput(Throughput::Elements((frame * sources) as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("{}_sources", sources), frame),
                &frame,
                |b, _| {
                    b.iter(|| {
                        mixdown(&config, BusName::Monitor, black_box(&inputs), &mut out);
                        black_box(&out);
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_effective_gain(c: &mut Criterion) {
    let (config, ids) = mixer_with(16);
    c.bench_function("effective_gain_16_sources", |b| {
        b.iter(|| {
            let mut total = 0.0;
            for id in &ids {
                for bus in BusName::ALL {
                    total += config.effective_gain(black_box(id), bus);
                }
            }
            black_box(total)
        })
    });
}

criterion_group!(benches, bench_mixdown, bench_effective_gain);
criterion_main!(benches);
