/// Winnowing Fingerprints
///
/// Reduces a token stream to a compact set of landmark hashes:
/// 1. Build overlapping k-grams of `k` consecutive tokens
/// 2. Hash each k-gram (djb2 over the concatenated text)
/// 3. Slide a window of `window_size` hashes, select the minimum
///    (earliest position on ties)
/// 4. Emit the selection only when its position differs from the last one
///
/// Any shared run of at least `window_size + k - 1` tokens yields at least
/// one shared fingerprint, regardless of where it sits in either document.

use crate::normalize::tokenize;
use std::collections::HashSet;

pub const DEFAULT_WINDOW_SIZE: usize = 5;
pub const DEFAULT_KGRAM_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub hash: u32,
    /// Index of the k-gram's first token
    pub position: usize,
}

/// djb2: `h = h * 33 + c` from 5381, 32-bit wrapping, absolute value
pub fn djb2(text: &str) -> u32 {
    let mut hash: i32 = 5381;
    for c in text.chars() {
        hash = hash.wrapping_mul(33).wrapping_add(c as i32);
    }
    hash.unsigned_abs()
}

/// Winnow a token sequence.
///
/// With fewer k-grams than a full window the whole sequence counts as one
/// window, so any input with at least `k` tokens gets a fingerprint.
pub fn fingerprints(tokens: &[String], window_size: usize, k: usize) -> Vec<Fingerprint> {
    if k == 0 || window_size == 0 || tokens.len() < k {
        return Vec::new();
    }

    let hashes: Vec<Fingerprint> = tokens
        .windows(k)
        .enumerate()
        .map(|(position, kgram)| Fingerprint {
            hash: djb2(&kgram.concat()),
            position,
        })
        .collect();

    let window = window_size.min(hashes.len());
    let mut selected: Vec<Fingerprint> = Vec::new();

    for candidates in hashes.windows(window) {
        let min = candidates
            .iter()
            .fold(candidates[0], |best, current| {
                if current.hash < best.hash {
                    *current
                } else {
                    best
                }
            });

        if selected.last().map_or(true, |last| last.position != min.position) {
            selected.push(min);
        }
    }

    selected
}

/// Tokenize and winnow with the default window and k-gram sizes
pub fn fingerprint_text(text: &str) -> Vec<Fingerprint> {
    fingerprints(&tokenize(text), DEFAULT_WINDOW_SIZE, DEFAULT_KGRAM_SIZE)
}

/// Overlap of two fingerprint sets, |∩| / |∪| of their hashes, scaled to 0-100
pub fn fingerprint_similarity(a: &[Fingerprint], b: &[Fingerprint]) -> f64 {
    let set_a: HashSet<u32> = a.iter().map(|f| f.hash).collect();
    let set_b: HashSet<u32> = b.iter().map(|f| f.hash).collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    intersection as f64 / union as f64 * 100.0
}
