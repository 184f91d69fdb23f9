//! Small dense-vector helpers shared by the scorer.

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn norm(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity, 0.0 for zero vectors or mismatched dimensions
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let magnitude_a = norm(a);
    let magnitude_b = norm(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (magnitude_a * magnitude_b)
}

/// Weighted mean of vectors. Vectors whose dimension differs from the first
/// one are skipped; returns an empty vector when nothing contributes.
pub fn weighted_average<'a, I>(vectors: I) -> Vec<f32>
where
    I: IntoIterator<Item = (&'a [f32], f32)>,
{
    let mut sum: Vec<f32> = Vec::new();
    let mut total_weight = 0.0f32;

    for (vector, weight) in vectors {
        if vector.is_empty() || weight <= 0.0 {
            continue;
        }
        if sum.is_empty() {
            sum = vec![0.0; vector.len()];
        } else if sum.len() != vector.len() {
            tracing::debug!(
                expected = sum.len(),
                actual = vector.len(),
                "Skipping embedding with mismatched dimension"
            );
            continue;
        }

        for (acc, x) in sum.iter_mut().zip(vector) {
            *acc += x * weight;
        }
        total_weight += weight;
    }

    if total_weight > 0.0 {
        for acc in sum.iter_mut() {
            *acc /= total_weight;
        }
    }

    sum
}
