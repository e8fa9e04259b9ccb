//! Software reference of the engine.

use itertools::iproduct;

use crate::wire::sign_extend;

/// Convolves a `height`×`width` image with a `size`×`size` kernel over a zero-padded border.
///
/// Both `coeffs` and `pixels` are row-major. The result at `(r, c)` is the sum of
/// `coeffs[i][j] * pixels[r - i + size / 2][c - j + size / 2]`, wrapped to `result_width` bits and
/// sign-extended.
pub fn convolve(
    size: usize, coeffs: &[i16], height: usize, width: usize, pixels: &[u8], result_width: u32,
) -> Vec<i32> {
    let half = size / 2;
    let mask = u32::MAX >> (u32::BITS - result_width);

    iproduct!(0..height, 0..width)
        .map(|(row, col)| {
            let acc = iproduct!(0..size, 0..size).fold(0i32, |acc, (i, j)| {
                let (Some(r), Some(c)) = ((row + half).checked_sub(i), (col + half).checked_sub(j)) else {
                    return acc;
                };
                if r >= height || c >= width {
                    return acc;
                }
                acc.wrapping_add(i32::from(coeffs[i * size + j]) * i32::from(pixels[r * width + c]))
            });
            sign_extend(acc as u32 & mask, result_width)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_the_kernel() {
        let mut coeffs = [0; 9];
        coeffs[0] = 2;
        assert_eq!(convolve(3, &coeffs, 2, 2, &[1; 4], 24), [2, 0, 0, 0]);
    }

    #[test]
    fn box_filter_counts_neighbors() {
        assert_eq!(convolve(3, &[1; 9], 3, 3, &[1; 9], 24), [4, 6, 4, 6, 9, 6, 4, 6, 4]);
    }

    #[test]
    fn wraps_to_result_width() {
        // 32767 * 255 = 0x7f7f01.
        assert_eq!(convolve(1, &[i16::MAX], 1, 1, &[255], 16), [0x7f01]);
        assert_eq!(convolve(1, &[i16::MAX], 1, 1, &[255], 8), [1]);
        assert_eq!(convolve(1, &[-1], 1, 1, &[1], 24), [-1]);
    }
}
