/// The comparison and reduction key of a stored value.
///
/// Every dataset value is strictly positive, so the result is always finite.
/// `libm` keeps the key bit-identical on both sides of the link regardless
/// of the platform's math library.
#[inline]
pub fn transform(x: f32) -> f32 {
    libm::logf(libm::sqrtf(x))
}
