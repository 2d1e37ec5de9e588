use anyhow::Result;

/// Cosine similarity in [-1, 1]. Zero-magnitude vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        anyhow::bail!("Vector dimensions must match: {} != {}", a.len(), b.len());
    }
    if a.is_empty() {
        anyhow::bail!("Vectors cannot be empty");
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}
