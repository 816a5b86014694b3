//! Kernel decoder: decrypts the compressed kernel and its data section,
//! then decompresses the kernel via LZX.

use crate::crypto;
use crate::error::{XbiosError, XbiosResult};

/// Outcome of [`decrypt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    /// The compressed-kernel and kernel-data regions were freshly decrypted.
    Decrypted,
    /// The entity was already plaintext; `decrypt` did not touch the image.
    AlreadyPlaintext,
}

/// A decoded kernel entity. `img` is populated lazily by
/// [`decompress`]; it stays `None` if decompression has not run yet or failed.
pub struct Kernel {
    pub compressed_offset: usize,
    pub compressed_len: usize,
    pub data_offset: usize,
    pub data_len: usize,
    pub image_size: usize,
    pub img: Option<Vec<u8>>,
    /// Monotonic: cleared to `true` by [`decrypt`] and never set back.
    pub plaintext: bool,
}

impl Kernel {
    pub fn new(compressed_offset: usize, compressed_len: usize, data_offset: usize, data_len: usize) -> Kernel {
        Kernel {
            compressed_offset,
            compressed_len,
            data_offset,
            data_len,
            image_size: 0,
            img: None,
            plaintext: false,
        }
    }
}

/// Decrypt the compressed-kernel region and the kernel-data section in place,
/// each under its own key. Calling this twice on an already-plaintext entity
/// is guarded by the encryption-state flag; it reports
/// [`KernelStatus::AlreadyPlaintext`] rather than re-decrypting, the same way
/// `PreldrStatus`/`LoadStatus` report their own soft outcomes.
pub fn decrypt(
    image: &mut [u8],
    kernel: &mut Kernel,
    kernel_key: &[u8; 20],
    kernel_data_key: &[u8; 20],
) -> XbiosResult<KernelStatus> {
    if kernel.plaintext {
        return Ok(KernelStatus::AlreadyPlaintext);
    }

    let compressed = image
        .get_mut(kernel.compressed_offset..kernel.compressed_offset + kernel.compressed_len)
        .ok_or_else(|| XbiosError::Fatal("compressed kernel region out of bounds".into()))?;
    crypto::symmetric(compressed, kernel_key)?;

    let data = image
        .get_mut(kernel.data_offset..kernel.data_offset + kernel.data_len)
        .ok_or_else(|| XbiosError::Fatal("kernel data region out of bounds".into()))?;
    crypto::symmetric(data, kernel_data_key)?;

    kernel.plaintext = true;
    Ok(KernelStatus::Decrypted)
}

/// Re-encrypt a (now plaintext) kernel, the inverse of [`decrypt`]; used by
/// the builder's `enc_kernel` flag.
pub fn encrypt(
    image: &mut [u8],
    kernel: &mut Kernel,
    kernel_key: &[u8; 20],
    kernel_data_key: &[u8; 20],
) -> XbiosResult<()> {
    let compressed = image
        .get_mut(kernel.compressed_offset..kernel.compressed_offset + kernel.compressed_len)
        .ok_or_else(|| XbiosError::Fatal("compressed kernel region out of bounds".into()))?;
    crypto::symmetric(compressed, kernel_key)?;

    let data = image
        .get_mut(kernel.data_offset..kernel.data_offset + kernel.data_len)
        .ok_or_else(|| XbiosError::Fatal("kernel data region out of bounds".into()))?;
    crypto::symmetric(data, kernel_data_key)?;

    kernel.plaintext = false;
    Ok(())
}

/// Decompress the (plaintext) compressed-kernel region via LZX, recording the
/// uncompressed size. On failure `kernel.img` stays `None` and the caller
/// surfaces a soft `DecompressFailed` warning -- the decoder does not abort
/// the overall load for this.
pub fn decompress(image: &[u8], kernel: &mut Kernel, uncompressed_size: usize) -> XbiosResult<()> {
    if !kernel.plaintext {
        return Err(XbiosError::Fatal("cannot decompress a still-encrypted kernel".into()));
    }
    let compressed = image
        .get(kernel.compressed_offset..kernel.compressed_offset + kernel.compressed_len)
        .ok_or_else(|| XbiosError::Fatal("compressed kernel region out of bounds".into()))?;
    let plain = crypto::lzx_decompress(compressed, uncompressed_size)?;
    kernel.image_size = plain.len();
    kernel.img = Some(plain);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_is_idempotent_guard() {
        let mut image = vec![0u8; 64];
        let mut kernel = Kernel::new(0, 32, 32, 16);
        let kernel_key = [0x11u8; 20];
        let data_key = [0x22u8; 20];
        let first = decrypt(&mut image, &mut kernel, &kernel_key, &data_key).unwrap();
        assert_eq!(first, KernelStatus::Decrypted);
        assert!(kernel.plaintext);
        let second = decrypt(&mut image, &mut kernel, &kernel_key, &data_key).unwrap();
        assert_eq!(second, KernelStatus::AlreadyPlaintext);
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let mut image: Vec<u8> = (0..64u8).collect();
        let original = image.clone();
        let mut kernel = Kernel::new(0, 32, 32, 16);
        let kernel_key = [0xAAu8; 20];
        let data_key = [0xBBu8; 20];
        kernel.plaintext = true;
        encrypt(&mut image, &mut kernel, &kernel_key, &data_key).unwrap();
        assert_ne!(image, original);
        decrypt(&mut image, &mut kernel, &kernel_key, &data_key).unwrap();
        assert_eq!(image, original);
    }

    #[test]
    fn decompress_requires_plaintext() {
        let image = vec![0u8; 64];
        let mut kernel = Kernel::new(0, 32, 32, 16);
        assert!(decompress(&image, &mut kernel, 64).is_err());
    }
}
