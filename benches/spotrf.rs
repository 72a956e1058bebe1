use criterion::{criterion_group, criterion_main, Criterion};

use panel_potrf::{reference, workspace, KernelSet, SMat};

fn spd(n: usize) -> SMat {
    SMat::from_fn(n, n, |i, j| {
        if i == j {
            n as f32
        } else {
            1.0 / (1.0 + i.abs_diff(j) as f32)
        }
    })
}

pub fn cholesky(c: &mut Criterion) {
    for n in [8, 11, 16, 64, 199, 256, 512] {
        c.bench_function(&format!("heap-req-{n}"), |b| {
            b.iter(|| workspace::heap_req(n, n).unwrap())
        });

        for ks in [KernelSet::Panel4, KernelSet::Panel8, KernelSet::Panel12] {
            let name = format!("{ks:?}").to_lowercase();

            c.bench_function(&format!("{name}-spotrf-l-{n}"), |b| {
                let mat = spd(n);
                let mut out = SMat::zeros(n, n);
                b.iter(|| ks.spotrf_l(n, &mat, 0, 0, &mut out, 0, 0).unwrap())
            });

            c.bench_function(&format!("{name}-spotrf-u-{n}"), |b| {
                let mat = spd(n);
                let mut out = SMat::zeros(n, n);
                b.iter(|| ks.spotrf_u(n, &mat, 0, 0, &mut out, 0, 0).unwrap())
            });

            c.bench_function(&format!("{name}-spotrf-l-mn-{n}"), |b| {
                let mat = spd(n);
                let mut out = SMat::zeros(n, n / 2 + 1);
                b.iter(|| {
                    ks.spotrf_l_mn(n, n / 2 + 1, &mat, 0, 0, &mut out, 0, 0)
                        .unwrap()
                })
            });
        }

        if n <= 256 {
            c.bench_function(&format!("reference-potrf-l-{n}"), |b| {
                let mat = spd(n);
                let mut out = SMat::zeros(n, n);
                b.iter(|| reference::potrf_l(n, &mat, 0, 0, &mut out, 0, 0).unwrap())
            });
        }
    }
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(1))
        .measurement_time(std::time::Duration::from_secs(2))
        .sample_size(10);
    targets = cholesky
);
criterion_main!(benches);
