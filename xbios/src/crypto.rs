//! Thin wrappers over the primitives layer: the symmetric stream cipher,
//! SHA-1, RSA public-key recovery, and LZX decompression. These are pure
//! functions over byte slices; the interesting composition lives in
//! `preldr`, `bldr`, `kernel`, and `builder`.

use rc4::{KeyInit, Rc4, StreamCipher};
use rsa::{BigUint, RsaPublicKey};
use sha1::{Digest, Sha1};

use crate::consts::{
    RSA_EXPONENT, RSA_KEY_HEADER_SIZE, RSA_KEY_MAGIC, RSA_KEY_MASK, RSA_MODULUS_SIZE,
};
use crate::error::{XbiosError, XbiosResult};

/// RC4-style symmetric stream cipher, applied in place. Self-inverse: calling
/// `symmetric` twice with the same key restores the original bytes.
pub fn symmetric(data: &mut [u8], key: &[u8]) -> XbiosResult<()> {
    let mut cipher = Rc4::new_from_slice(key)
        .map_err(|_| XbiosError::Fatal(format!("invalid RC4 key length {}", key.len())))?;
    cipher.apply_keystream(data);
    Ok(())
}

/// Same as [`symmetric`] but returns a new owned buffer, leaving `data` untouched.
pub fn symmetric_copy(data: &[u8], key: &[u8]) -> XbiosResult<Vec<u8>> {
    let mut buf = data.to_vec();
    symmetric(&mut buf, key)?;
    Ok(buf)
}

/// SHA-1 digest of `data`.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest);
    out
}

/// Derive the 20-byte bldr key from the secret boot key and the preldr
/// nonce: `bldr_key = SHA1(SHA1(sbk || nonce) || nonce)`.
///
/// The double-hash structure is the contract: both the ordering and the second
/// nonce re-mix are load-bearing, not incidental.
pub fn derive_bldr_key(secret_boot_key: &[u8], nonce: &[u8; 16]) -> [u8; 20] {
    let mut first_input = Vec::with_capacity(secret_boot_key.len() + nonce.len());
    first_input.extend_from_slice(secret_boot_key);
    first_input.extend_from_slice(nonce);
    let intermediate = sha1(&first_input);

    let mut second_input = Vec::with_capacity(intermediate.len() + nonce.len());
    second_input.extend_from_slice(&intermediate);
    second_input.extend_from_slice(nonce);
    sha1(&second_input)
}

/// Recover the preldr's embedded RSA public key from its on-disk blob:
/// a plaintext `{ magic, bits, exponent, reserved }` header followed by a
/// modulus obfuscated by XORing every byte with [`RSA_KEY_MASK`]. Validates
/// the header's `magic`, `bits == 2048`, and `exponent == 0x10001` before
/// trusting the unmasked modulus.
pub fn recover_public_key(blob: &[u8]) -> XbiosResult<RsaPublicKey> {
    use byteorder::{ByteOrder, LittleEndian};

    if blob.len() < RSA_KEY_HEADER_SIZE + RSA_MODULUS_SIZE {
        return Err(XbiosError::PreldrMalformed);
    }
    let magic = LittleEndian::read_u32(&blob[0..4]);
    let bits = LittleEndian::read_u32(&blob[4..8]);
    let exponent = LittleEndian::read_u32(&blob[8..12]);
    if magic != RSA_KEY_MAGIC || bits as usize != crate::consts::RSA_KEY_BITS || exponent != RSA_EXPONENT {
        return Err(XbiosError::PreldrMalformed);
    }

    let masked_modulus = &blob[RSA_KEY_HEADER_SIZE..RSA_KEY_HEADER_SIZE + RSA_MODULUS_SIZE];
    // CAPI key blobs store the modulus little-endian; reverse it into the
    // big-endian form `BigUint::from_bytes_be` expects.
    let mut modulus: Vec<u8> = masked_modulus.iter().map(|b| b ^ RSA_KEY_MASK).collect();
    modulus.reverse();

    let n = BigUint::from_bytes_be(&modulus);
    let e = BigUint::from(exponent);
    RsaPublicKey::new(n, e).map_err(|_| XbiosError::PreldrMalformed)
}

/// Run LZX decompression over a compressed region, producing `expected_size`
/// bytes of plaintext. Fails with [`XbiosError::DecompressFailed`] if the
/// stream is malformed.
pub fn lzx_decompress(compressed: &[u8], expected_size: usize) -> XbiosResult<Vec<u8>> {
    // Xbox BIOS kernels are compressed with a 32 KiB LZX window, the same
    // default the cabinet format uses.
    let mut decoder = lzxd::Lzxd::new(lzxd::WindowSize::KB32);
    let mut out = Vec::with_capacity(expected_size);
    let mut remaining = compressed;
    while out.len() < expected_size && !remaining.is_empty() {
        let chunk_len = remaining.len().min(0x8000);
        let (chunk, rest) = remaining.split_at(chunk_len);
        let decompressed = decoder
            .decompress_next(chunk)
            .map_err(|e| XbiosError::DecompressFailed(e.to_string()))?;
        out.extend_from_slice(decompressed);
        remaining = rest;
    }
    out.truncate(expected_size);
    if out.len() != expected_size {
        return Err(XbiosError::DecompressFailed(format!(
            "expected {expected_size} bytes, got {}",
            out.len()
        )));
    }
    Ok(out)
}
