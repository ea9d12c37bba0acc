use std::{fmt::Write as _, fs, path::PathBuf};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pysnip::{BundleOptions, Bundler};
use tempfile::TempDir;

/// Write a project of `modules` helper modules, each calling into the next,
/// plus an entry file that calls the first one
fn synthetic_project(modules: usize) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");

    for i in 0..modules {
        let mut source = String::new();
        if i + 1 < modules {
            writeln!(source, "from mod_{} import step_{}", i + 1, i + 1).expect("write to string");
        }
        for j in 0..10 {
            writeln!(source, "def unused_{j}(x):\n    return x + {j}\n").expect("write to string");
        }
        if i + 1 < modules {
            writeln!(source, "def step_{i}(x):\n    return step_{}(x) + {i}\n", i + 1)
                .expect("write to string");
        } else {
            writeln!(source, "def step_{i}(x):\n    return x\n").expect("write to string");
        }
        fs::write(dir.path().join(format!("mod_{i}.py")), source).expect("Failed to write module");
    }

    let entry = dir.path().join("main.py");
    fs::write(&entry, "import mod_0\n\nprint(mod_0.step_0(1))\n").expect("Failed to write entry");
    (dir, entry)
}

fn benchmark_bundling(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundling");
    group.sample_size(20);

    for modules in [10, 50] {
        let (_dir, entry) = synthetic_project(modules);
        let bundler = Bundler::new(BundleOptions::default());

        group.bench_with_input(BenchmarkId::new("call_chain", modules), &entry, |b, entry| {
            b.iter(|| bundler.bundle(entry).expect("Bundling failed"));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_bundling);
criterion_main!(benches);
