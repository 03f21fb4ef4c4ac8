//! Per-pixel colour conversions between the frame layouts.
//!
//! YUVA here is full-range BT.601, one `[y, u, v, a]` quadruple per pixel.
//! Alpha is carried through untouched in every direction.

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Straight ARGB → interleaved YUVA.
pub fn argb_to_yuva(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let (a, r, g, b) = (s[0] as i32, s[1] as i32, s[2] as i32, s[3] as i32);
        let y = (77 * r + 150 * g + 29 * b + 128) >> 8;
        let u = ((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128;
        let v = ((128 * r - 107 * g - 21 * b + 128) >> 8) + 128;
        d[0] = clamp_u8(y);
        d[1] = clamp_u8(u);
        d[2] = clamp_u8(v);
        d[3] = a as u8;
    }
}

/// Interleaved YUVA → RGBA.
pub fn yuva_to_rgba(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let y = s[0] as i32;
        let u = s[1] as i32 - 128;
        let v = s[2] as i32 - 128;
        d[0] = clamp_u8(y + ((359 * v + 128) >> 8));
        d[1] = clamp_u8(y - ((88 * u + 183 * v + 128) >> 8));
        d[2] = clamp_u8(y + ((454 * u + 128) >> 8));
        d[3] = s[3];
    }
}

/// Straight ARGB → RGBA.
pub fn argb_to_rgba(src: &[u8], dst: &mut [u8]) {
    debug_assert_eq!(src.len(), dst.len());
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[1];
        d[1] = s[2];
        d[2] = s[3];
        d[3] = s[0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: u8, b: u8) -> bool {
        (a as i32 - b as i32).abs() <= 2
    }

    #[test]
    fn test_grey_maps_to_neutral_chroma() {
        let mut yuva = [0u8; 4];
        argb_to_yuva(&[200, 90, 90, 90], &mut yuva);
        assert!(close(yuva[0], 90));
        assert!(close(yuva[1], 128));
        assert!(close(yuva[2], 128));
        assert_eq!(yuva[3], 200);
    }

    #[test]
    fn test_primaries_survive_yuva_round_trip() {
        for argb in [[255, 255, 0, 0], [255, 0, 255, 0], [255, 0, 0, 255], [128, 255, 255, 255]] {
            let mut yuva = [0u8; 4];
            let mut rgba = [0u8; 4];
            argb_to_yuva(&argb, &mut yuva);
            yuva_to_rgba(&yuva, &mut rgba);
            assert!(close(rgba[0], argb[1]), "{argb:?} -> {rgba:?}");
            assert!(close(rgba[1], argb[2]), "{argb:?} -> {rgba:?}");
            assert!(close(rgba[2], argb[3]), "{argb:?} -> {rgba:?}");
            assert_eq!(rgba[3], argb[0]);
        }
    }

    #[test]
    fn test_argb_to_rgba_moves_alpha_last() {
        let mut rgba = [0u8; 8];
        argb_to_rgba(&[1, 2, 3, 4, 5, 6, 7, 8], &mut rgba);
        assert_eq!(rgba, [2, 3, 4, 1, 6, 7, 8, 5]);
    }
}
