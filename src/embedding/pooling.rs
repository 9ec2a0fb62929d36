//! Mean pooling and L2 normalization of per-token hidden states.

use ndarray::{Array1, ArrayView2};

/// Floor applied to the mask sum and to the vector norm before dividing.
pub const EPSILON: f32 = 1e-9;

/// Average the rows of `token_embeddings` (`[sequence_length, hidden_dim]`),
/// weighting each row by its attention mask value.
///
/// An all-zero mask yields the zero vector.
pub fn mean_pool(token_embeddings: ArrayView2<'_, f32>, attention_mask: &[i64]) -> Array1<f32> {
    debug_assert_eq!(token_embeddings.nrows(), attention_mask.len());

    let mut summed = Array1::<f32>::zeros(token_embeddings.ncols());
    let mut mask_sum = 0.0f32;
    for (row, &mask) in token_embeddings.outer_iter().zip(attention_mask) {
        let weight = mask as f32;
        summed.scaled_add(weight, &row);
        mask_sum += weight;
    }

    summed / mask_sum.max(EPSILON)
}

/// Scale `v` to unit Euclidean length. The zero vector stays zero.
pub fn l2_normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    v / norm.max(EPSILON)
}
