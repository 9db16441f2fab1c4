//! Key generation and stride partitioning.

use std::collections::HashSet;

use kvbench::keygen::{fill_random_key, key, key_prefix, random_key, Stride, KEY_LEN, PREFIX_LEN};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn strides_never_overlap() {
    for workers in 1..=8 {
        let mut seen = HashSet::new();
        for w in 0..workers {
            for index in Stride::new(w, workers).take(500) {
                assert!(seen.insert(index), "index {index} visited twice with {workers} workers");
            }
        }
        assert_eq!(seen.len(), workers * 500);
    }
}

#[test]
fn suffix_is_unique_whatever_the_lead() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut suffixes = HashSet::new();
    for w in 0..4 {
        for index in Stride::new(w, 4).take(1_000) {
            let k = random_key(&mut rng, index);
            assert!((32..127).contains(&k[0]));
            assert!(suffixes.insert(k[1..].to_vec()));
        }
    }
}

#[test]
fn key_layout() {
    let k = key(0x0102_0304_0506_0708, b'!');
    assert_eq!(k, [b'!', 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(key_prefix(0x0102_0304_0506_0708, b'!', PREFIX_LEN), vec![b'!', 1, 2]);
}

#[test]
fn reset_returns_to_start() {
    let mut s = Stride::new(2, 5);
    s.advance();
    s.advance();
    assert_eq!(s.current(), 12);
    s.reset();
    assert_eq!(s.current(), 2);
}

#[test]
fn bulk_keys_have_printable_lead() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut buf = [0u8; KEY_LEN];
    for _ in 0..1_000 {
        fill_random_key(&mut rng, &mut buf);
        assert!((32..127).contains(&buf[0]));
    }
}
