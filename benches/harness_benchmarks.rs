//! Performance benchmarks for the conformance harness
//!
//! Run with: cargo bench
//!
//! Host start-up dominates real runs, so these cover the harness's own
//! per-test overhead:
//! - Fixture metadata parsing
//! - Prelude and driver rendering
//! - Outcome aggregation under contention
//! - Report rendering

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use conformance_harness::harness::HarnessApi;
use conformance_harness::reporter::{reporter_for, OutputFormat};
use conformance_harness::{Aggregator, FixtureMetadata, Outcome, RunStatus, TestDescriptor, TestRecord};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const SPUTNIK_FIXTURE: &str = r#"// Copyright 2009 the Sputnik authors.  All rights reserved.
// This code is governed by the BSD license found in the LICENSE file.

/**
 * @name: S15.4.4.20_A1_T1;
 * @section: 15.4.4.20, 15.4.4.20-9-c-ii;
 * @description: Array.prototype.filter applied to a sparse array;
 * @precondition: (fnExists(Array.prototype.filter));
 * @strict_only
 */

function callbackfn(val, idx, obj) {
  return val > 10;
}
var arr = [11, , 9, 12];
var newArr = arr.filter(callbackfn);
if (newArr.length !== 2) {
  $ERROR('#1: newArr.length === 2. Actual: ' + newArr.length);
}
"#;

fn bench_metadata(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata");
    group.throughput(Throughput::Bytes(SPUTNIK_FIXTURE.len() as u64));

    group.bench_function("parse", |b| b.iter(|| FixtureMetadata::parse(black_box(SPUTNIK_FIXTURE))));

    group.bench_function("descriptor", |b| {
        b.iter(|| TestDescriptor::from_source(0, "15.4/S15.4.4.20_A1_T1.js", black_box(SPUTNIK_FIXTURE)))
    });

    group.finish();
}

fn bench_prelude(c: &mut Criterion) {
    let mut group = c.benchmark_group("prelude");

    for helpers in [false, true] {
        let api = HarnessApi::new().with_helpers(helpers);
        group.bench_with_input(BenchmarkId::new("render", helpers), &api, |b, api| {
            b.iter(|| black_box(api.prelude()))
        });
    }

    group.finish();
}

fn records(n: usize) -> Vec<TestRecord> {
    (0..n)
        .map(|i| {
            let source = format!("/**\n * @id: T{};\n * @section: 15.{};\n */\n", i, i % 12);
            let descriptor = TestDescriptor::from_source(i, format!("T{}.js", i), source);
            let outcome = if i % 7 == 0 {
                Outcome::Timeout(Duration::from_secs(10))
            } else {
                Outcome::Pass
            };
            TestRecord::new(&descriptor, &outcome, Duration::from_millis(3))
        })
        .collect()
}

fn bench_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregation");

    for n in [1_000usize, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("record_4_threads", n), &n, |b, &n| {
            b.iter_batched(
                || records(n),
                |records| {
                    let aggregator = Arc::new(Aggregator::new("bench"));
                    let mut chunks: Vec<Vec<TestRecord>> = (0..4).map(|_| Vec::new()).collect();
                    for (i, record) in records.into_iter().enumerate() {
                        chunks[i % 4].push(record);
                    }
                    thread::scope(|scope| {
                        for chunk in chunks {
                            let aggregator = Arc::clone(&aggregator);
                            scope.spawn(move || {
                                for record in chunk {
                                    aggregator.record(record).unwrap();
                                }
                            });
                        }
                    });
                    black_box(aggregator.len())
                },
                criterion::BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_reporting(c: &mut Criterion) {
    let aggregator = Aggregator::new("bench");
    for record in records(5_000) {
        aggregator.record(record).unwrap();
    }
    let report = aggregator.finalize(RunStatus::Complete);

    let mut group = c.benchmark_group("reporting");
    for format in [OutputFormat::Summary, OutputFormat::Json, OutputFormat::Tap] {
        let reporter = reporter_for(format);
        group.bench_function(format.to_string(), |b| b.iter(|| reporter.render(black_box(&report)).unwrap()));
    }
    group.finish();
}

criterion_group!(benches, bench_metadata, bench_prelude, bench_aggregation, bench_reporting);
criterion_main!(benches);
