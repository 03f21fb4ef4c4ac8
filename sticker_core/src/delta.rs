//! XOR delta primitive shared by the container decoder and writer.

const WORD: usize = 8;

/// XOR `delta` into `frame` in place, one 8-byte word at a time.
///
/// Applying the same delta twice restores the original frame, which is what
/// lets the writer produce deltas with this very function.
///
/// Both slices must have the same length. Frame sizes are multiples of four,
/// so a 4-byte tail is handled bytewise.
pub fn xor_in_place(frame: &mut [u8], delta: &[u8]) {
    assert_eq!(frame.len(), delta.len(), "delta and frame sizes differ");

    let mut lhs = frame.chunks_exact_mut(WORD);
    let mut rhs = delta.chunks_exact(WORD);
    for (dst, src) in (&mut lhs).zip(&mut rhs) {
        let mut a = [0u8; WORD];
        let mut b = [0u8; WORD];
        a.copy_from_slice(dst);
        b.copy_from_slice(src);
        let word = u64::from_ne_bytes(a) ^ u64::from_ne_bytes(b);
        dst.copy_from_slice(&word.to_ne_bytes());
    }
    for (dst, src) in lhs.into_remainder().iter_mut().zip(rhs.remainder()) {
        *dst ^= *src;
    }
}

/// Compute the delta that turns `previous` into `next`.
pub fn xor_delta(previous: &[u8], next: &[u8]) -> Vec<u8> {
    let mut delta = next.to_vec();
    xor_in_place(&mut delta, previous);
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    }

    #[test]
    fn test_xor_against_zero_is_identity() {
        let delta = pattern(64, 7);
        let mut frame = vec![0u8; 64];
        xor_in_place(&mut frame, &delta);
        assert_eq!(frame, delta);
    }

    #[test]
    fn test_xor_applied_twice_restores_frame() {
        let original = pattern(40, 3);
        let delta = pattern(40, 200);
        let mut frame = original.clone();
        xor_in_place(&mut frame, &delta);
        assert_ne!(frame, original);
        xor_in_place(&mut frame, &delta);
        assert_eq!(frame, original);
    }

    #[test]
    fn test_xor_handles_word_tail() {
        // 1x1 pixel frame: 4 bytes, shorter than a word.
        let mut frame = vec![0x0F, 0xF0, 0xAA, 0x55];
        xor_in_place(&mut frame, &[0xFF; 4]);
        assert_eq!(frame, vec![0xF0, 0x0F, 0x55, 0xAA]);

        // 3 pixels: one full word plus a 4-byte tail.
        let mut frame = vec![0xFFu8; 12];
        xor_in_place(&mut frame, &[0xFF; 12]);
        assert_eq!(frame, vec![0u8; 12]);
    }

    #[test]
    fn test_xor_delta_reconstructs_next_frame() {
        let previous = pattern(32, 1);
        let next = pattern(32, 99);
        let delta = xor_delta(&previous, &next);
        let mut frame = previous.clone();
        xor_in_place(&mut frame, &delta);
        assert_eq!(frame, next);
    }
}
