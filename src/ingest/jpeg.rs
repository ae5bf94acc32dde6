/// Locate the first complete JPEG (SOI..=EOI) in `buffer`.
///
/// Returns the byte range `start..end` with `end` just past the EOI marker.
pub(crate) fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let tail = &buffer[start + 2..];
    let eoi = tail.windows(2).position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + eoi + 2))
}
