//! Job framing on the serial byte stream.
//!
//! Requests carry the kernel size, the coefficients, the image dimensions and the pixels; responses carry one
//! result sample per pixel, split into bytes least-significant first.

use std::iter;

use arrayvec::ArrayVec;
use convflow::*;
use convflow_std::Adapter;

/// Kernel size byte followed by the coefficients, row-major, each low byte first.
pub fn encode_kernel(size: u8, coeffs: &[i16]) -> Vec<u8> {
    iter::once(size).chain(coeffs.iter().flat_map(|coeff| coeff.to_le_bytes())).collect()
}

/// Image height then width, each low byte first.
pub fn encode_dims(height: u16, width: u16) -> ArrayVec<u8, 4> {
    height.to_le_bytes().into_iter().chain(width.to_le_bytes()).collect()
}

/// Whole request for one job.
pub fn encode_job(size: u8, coeffs: &[i16], height: u16, width: u16, pixels: &[u8]) -> Vec<u8> {
    let mut bytes = encode_kernel(size, coeffs);
    bytes.extend(encode_dims(height, width));
    bytes.extend_from_slice(pixels);
    bytes
}

/// Sign-extends the low `width` bits of `sample`.
pub fn sign_extend(sample: u32, width: u32) -> i32 {
    let shift = u32::BITS - width;
    ((sample << shift) as i32) >> shift
}

/// Reassembles `result_width`-bit samples from response bytes.
///
/// Trailing bytes that do not complete a sample are ignored.
pub fn decode_samples(bytes: &[u8], result_width: u32) -> Result<Vec<i32>, ConfigError> {
    let mut adapter = Adapter::<u8, u32>::new(8, result_width)?;
    let ready = Ready::new(true);
    let mut samples = Vec::with_capacity(bytes.len() / adapter.ratio() as usize);

    // One extra cycle flushes the word completed by the last byte.
    for byte in bytes.iter().copied().map(Valid::valid).chain(iter::once(Valid::invalid())) {
        let (word, _) = adapter.step(&byte, &ready);
        samples.extend(word.into_inner().map(|word| sign_extend(word, result_width)));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let bytes = encode_job(3, &[0x0102, -1, 0, 0, 1, 0, 0, 0, 0], 0x0201, 0x0403, &[9, 8]);
        assert_eq!(bytes.len(), 1 + 18 + 4 + 2);
        assert_eq!(&bytes[..5], &[3, 0x02, 0x01, 0xff, 0xff]);
        assert_eq!(&bytes[19..], &[0x01, 0x02, 0x03, 0x04, 9, 8]);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0xff_ffff, 24), -1);
        assert_eq!(sign_extend(0x7f_ffff, 24), 0x7f_ffff);
        assert_eq!(sign_extend(0x80_0000, 24), -0x80_0000);
        assert_eq!(sign_extend(0xffff_fffe, 32), -2);
    }

    #[test]
    fn decodes_samples_least_significant_first() {
        let bytes = [0xfd, 0xff, 0xff, 0x05, 0x00, 0x00, 0x42];
        assert_eq!(decode_samples(&bytes, 24).unwrap(), [-3, 5]);
        assert!(decode_samples(&bytes, 12).is_err());
    }
}
