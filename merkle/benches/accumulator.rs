// Copyright (C) 2015-2021 Vaultos Systems Inc.
// This file is part of the vaultos library.

// The vaultos library is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// The vaultos library is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with the vaultos library. If not, see <https://www.gnu.org/licenses/>.

use criterion::{criterion_group, criterion_main, Criterion};
use rand::RngCore;
use vaultos_merkle::{reader_root, Accumulator, Blake2bHasher};

const SEGMENT_SIZE: usize = 64;

fn bench_sector_root(c: &mut Criterion) {
    let mut data = vec![0u8; 1 << 22];
    rand::thread_rng().fill_bytes(&mut data);

    c.bench_function("sector_root_4mib", |b| {
        b.iter(|| {
            let mut reader: &[u8] = &data;
            reader_root(Blake2bHasher, &mut reader, SEGMENT_SIZE)
                .unwrap()
                .unwrap()
        })
    });
}

fn bench_push(c: &mut Criterion) {
    let mut segment = [0u8; SEGMENT_SIZE];
    rand::thread_rng().fill_bytes(&mut segment);

    c.bench_function("push_4096_segments", |b| {
        b.iter(|| {
            let mut acc = Accumulator::default();
            for _ in 0..4096 {
                acc.push(&segment);
            }
            acc.root().unwrap()
        })
    });
}

criterion_group!(benches, bench_sector_root, bench_push);
criterion_main!(benches);
