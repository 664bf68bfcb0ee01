/// Hash float to [0,1), GLSL `hash11`. Deterministic across platforms, used
/// for spawn jitter.
pub fn hash11(p: f32) -> f32 {
    let mut p = (p * 0.1031).fract();
    p *= p + 33.33;
    p *= p + p;
    p.fract()
}

/// `hash11` remapped to [-1, 1).
#[inline]
pub fn signed_hash11(p: f32) -> f32 {
    hash11(p) * 2.0 - 1.0
}
