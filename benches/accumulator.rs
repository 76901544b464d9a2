#[macro_use]
extern crate criterion;
use criterion::Criterion;

use rand::RngCore;
use readerwriter::{Decodable, Encodable};
use std::collections::HashMap;

use ledger::{
    short_hash, Hash160, HashIndex, OrderedAccumulator, ShortHashLimits, ShortHashList,
};

fn random_credits(n: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|_| {
            let mut bytes = vec![0u8; 40];
            rng.fill_bytes(&mut bytes);
            bytes
        })
        .collect()
}

fn accumulator_root_helper(n: usize, c: &mut Criterion) {
    let label = format!("Ordered accumulator root over {} credits", n);
    let credits = random_credits(n);
    c.bench_function(&label, move |b| {
        b.iter(|| {
            let mut acc = OrderedAccumulator::new(0);
            for credit in credits.iter() {
                acc.insert(credit.clone());
            }
            acc.root()
        })
    });
}

fn accumulator_branch_helper(n: usize, c: &mut Criterion) {
    let label = format!("Ordered accumulator branch among {} credits", n);
    let mut acc = OrderedAccumulator::new(0);
    for credit in random_credits(n) {
        acc.insert(credit);
    }
    acc.root();
    c.bench_function(&label, move |b| b.iter(|| acc.branch(n as u64 / 2)));
}

struct Index(HashMap<u32, Vec<Hash160>>);

impl HashIndex<Hash160> for Index {
    fn candidates(&self, short_hash: u32) -> Vec<Hash160> {
        self.0.get(&short_hash).cloned().unwrap_or_default()
    }

    fn known_solution(&self, _list_hash: &Hash160) -> Option<Vec<Hash160>> {
        None
    }
}

fn recovery_helper(n: usize, c: &mut Criterion) {
    let label = format!("Short hash recovery of {} messages", n);
    let ids: Vec<Hash160> = random_credits(n).iter().map(|b| Hash160::digest(b)).collect();
    let mut index = Index(HashMap::new());
    for id in ids.iter() {
        index.0.entry(short_hash(id)).or_insert_with(Vec::new).push(*id);
    }
    // Relayed lists carry only the short hashes.
    let encoded = ShortHashList::from_full_hashes(ids).encode_to_vec();
    let relayed = ShortHashList::<Hash160>::decode_from_slice(&encoded).unwrap();
    let limits = ShortHashLimits::default();
    c.bench_function(&label, move |b| {
        b.iter(|| {
            let mut list = relayed.clone();
            list.recover_full_hashes(&index, &limits).unwrap();
            list
        })
    });
}

fn accumulator_root(c: &mut Criterion) {
    accumulator_root_helper(100, c);
    accumulator_root_helper(1000, c);
}

fn accumulator_branch(c: &mut Criterion) {
    accumulator_branch_helper(1000, c);
}

fn recovery(c: &mut Criterion) {
    recovery_helper(100, c);
    recovery_helper(1000, c);
}

criterion_group! {
    name = accumulator;
    config = Criterion::default().sample_size(10);
    targets = accumulator_root, accumulator_branch, recovery,
}

criterion_main!(accumulator);
