use criterion::{criterion_group, criterion_main, Criterion};
use swathprep::filter::GaussianTimeFilter;
use swathprep::series::{AncillarySeries, Blend};

fn heading_series(n: usize) -> AncillarySeries<1> {
    let times: Vec<f64> = (0..n).map(|i| i as f64 * 0.1).collect();
    let values: Vec<[f64; 1]> = (0..n)
        .map(|i| [(350.0 + i as f64 * 0.01) % 360.0])
        .collect();
    AncillarySeries::from_parts(&times, &values)
}

pub fn interp_pass(c: &mut Criterion) {
    let series = heading_series(100_000);

    c.bench_function("heading_interp_pass", |b| {
        b.iter(|| {
            let mut cursor = 0;
            let mut t = 0.0;
            while t < 10_000.0 {
                series.interp(t, &mut cursor, &[Blend::Heading]);
                t += 0.37;
            }
        })
    });
}

pub fn gaussian_filter(c: &mut Criterion) {
    let series = heading_series(20_000);
    let filter = GaussianTimeFilter::new(1.0);

    c.bench_function("gaussian_filter", |b| {
        b.iter(|| {
            let mut s = series.clone();
            filter.apply(&mut s, &[Blend::Heading]);
        })
    });
}

criterion_group!(benches, interp_pass, gaussian_filter);
criterion_main!(benches);
