/// Allowed deviation from unit length for a stored embedding.
pub const NORM_TOLERANCE: f32 = 1e-3;

/// Euclidean length of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// In-place L2 normalization helper to keep allocations down during hot paths.
/// Returns `false` (leaving `v` untouched) when the vector has zero norm.
pub fn l2_normalize_in_place(v: &mut [f32]) -> bool {
    let norm_sq: f32 = v.iter().map(|x| x * x).sum();
    if norm_sq > 0.0 && norm_sq.is_finite() {
        let inv_norm = norm_sq.sqrt().recip();
        for x in v.iter_mut() {
            *x *= inv_norm;
        }
        true
    } else {
        false
    }
}

/// True when `v` already has unit length within [`NORM_TOLERANCE`].
pub fn is_unit_length(v: &[f32]) -> bool {
    (l2_norm(v) - 1.0).abs() <= NORM_TOLERANCE
}
