//! CTC greedy decoding

use ndarray::{ArrayView2, Axis};

use crate::phoneme::Phoneme;
use crate::table::PhonemeTable;

/// Best-path decode of `[T, classes]` scores
///
/// Takes the arg-max class per frame, collapses runs of the same class and
/// drops blanks. A blank between two equal classes keeps both.
pub fn greedy_decode(log_probs: ArrayView2<f32>, blank_id: usize) -> Vec<usize> {
    let best = log_probs.axis_iter(Axis(0)).map(|frame| {
        frame
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(best_id, best), (id, &v)| {
                if v > best {
                    (id, v)
                } else {
                    (best_id, best)
                }
            })
            .0
    });
    collapse(best, blank_id)
}

/// Collapse a frame-level ID path into a label sequence
pub fn collapse<I: IntoIterator<Item = usize>>(path: I, blank_id: usize) -> Vec<usize> {
    let mut decoded = Vec::new();
    let mut prev = None;
    for id in path {
        if id != blank_id && Some(id) != prev {
            decoded.push(id);
        }
        prev = Some(id);
    }
    decoded
}

/// Map decoded IDs to phonemes, dropping `<blank>`, `<sp>` and unknown IDs
pub fn ids_to_phonemes(ids: &[usize], table: &PhonemeTable) -> Vec<Phoneme> {
    ids.iter()
        .filter_map(|&id| table.symbol(id))
        .filter(|p| !p.is_sentinel())
        .cloned()
        .collect()
}
