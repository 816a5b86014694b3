//! Preldr decoder: detects the presence of a preldr block, derives the bldr
//! key, decrypts the 2BL, and reports a status.
//!
//! Locates nested regions by reading pointer fields out of the buffer,
//! validates every derived offset against the region's bounds before using
//! it, and reports progress with `log::debug!`.

use rsa::RsaPublicKey;

use crate::bytes::{read_array, read_u32};
use crate::consts::*;
use crate::crypto;
use crate::error::{PreldrStatus, XbiosResult};
use crate::layout::Layout;

/// The preldr's 128-byte parameter struct.
#[derive(Debug, Clone, Copy)]
pub struct PreldrParams {
    pub jmp_offset: u32,
    pub nonce: [u8; PRELDR_NONCE_SIZE],
}

impl PreldrParams {
    fn parse(buf: &[u8], params_offset: usize) -> XbiosResult<PreldrParams> {
        let jmp_offset = read_u32(buf, params_offset)?;
        let nonce = read_array::<PRELDR_NONCE_SIZE>(buf, params_offset + 4)?;
        Ok(PreldrParams { jmp_offset, nonce })
    }
}

/// A decoded preldr entity.
pub struct Preldr {
    pub code_offset: usize,
    pub code_len: usize,
    pub params: PreldrParams,
    pub pointer_block_offset: usize,
    pub function_block_offset: usize,
    pub public_key: RsaPublicKey,
    pub bldr_key: [u8; KEY_SIZE],
    pub status: PreldrStatus,
}

/// Detect, derive, and decrypt: the full preldr decode pipeline.
///
/// On `BldrDecrypted`/`Found`, `image[layout.bldr_offset..layout.bldr_offset +
/// BLDR_BLOCK_SIZE]` is left plaintext/ciphertext respectively. On
/// `NotFound`/`Error`, the image is not mutated.
pub fn decode_preldr(
    image: &mut [u8],
    layout: &Layout,
    secret_boot_key: &[u8],
) -> (PreldrStatus, Option<Preldr>) {
    match try_decode_preldr(image, layout, secret_boot_key) {
        Ok((status, preldr)) => (status, preldr),
        Err(e) => {
            log::warn!("preldr decode failed: {e}");
            (PreldrStatus::Error, None)
        }
    }
}

fn try_decode_preldr(
    image: &mut [u8],
    layout: &Layout,
    secret_boot_key: &[u8],
) -> XbiosResult<(PreldrStatus, Option<Preldr>)> {
    let params = PreldrParams::parse(image, layout.preldr_params_offset)?;
    log::debug!("preldr jmp_offset = {:#x}", params.jmp_offset);

    if params.jmp_offset == 0 {
        return Ok((PreldrStatus::NotFound, None));
    }

    let pointer_block_offset = layout.preldr_offset + params.jmp_offset as usize;
    let code_end = layout.preldr_offset + PRELDR_SIZE;
    if pointer_block_offset >= code_end {
        log::warn!("preldr pointer block {pointer_block_offset:#x} lies outside code region");
        return Ok((PreldrStatus::NotFound, None));
    }

    let function_block_offset =
        (pointer_block_offset + PRELDR_PTR_ALIGN) & !(PRELDR_PTR_ALIGN - 1);
    if function_block_offset >= code_end {
        log::warn!("preldr function block {function_block_offset:#x} lies outside code region");
        return Ok((PreldrStatus::Error, None));
    }

    let pubkey_offset = layout.preldr_offset + PRELDR_PUBKEY_OFFSET;
    let pubkey_blob = image
        .get(pubkey_offset..pubkey_offset + RSA_KEY_BLOB_SIZE)
        .ok_or_else(|| crate::error::XbiosError::PreldrMalformed)?;
    let public_key = crypto::recover_public_key(pubkey_blob)?;

    let bldr_key = crypto::derive_bldr_key(secret_boot_key, &params.nonce);

    // Decrypt the 2BL in place with the derived key.
    let bldr_region = image
        .get_mut(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
        .ok_or_else(|| crate::error::XbiosError::Fatal("2BL region out of bounds".into()))?;
    crypto::symmetric(bldr_region, &bldr_key)?;

    let signature = read_u32(image, layout.bldr_offset)?;
    let sig_matches = signature == BLDR_BOOT_PARAMS_SIGNATURE;

    // The ROM digest is a SHA-1 hash over the plaintext 2BL, embedded by the
    // builder's `fix2bldigest` flag (see `builder::fix_2bl_digest`). A preldr
    // is only the authority for this image when that digest re-chains against
    // the block it just decrypted. An all-zero digest region means none was
    // ever embedded, in which case the boot-params signature alone gates
    // authority, the same as before the digest region was introduced.
    let rom_digest = read_array::<KEY_SIZE>(image, layout.preldr_digest_offset)?;
    let digest_embedded = rom_digest != [0u8; KEY_SIZE];
    let digest_matches = if digest_embedded {
        let bldr_region = image
            .get(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
            .ok_or_else(|| crate::error::XbiosError::Fatal("2BL region out of bounds".into()))?;
        crypto::sha1(bldr_region) == rom_digest
    } else {
        true
    };

    let status = if sig_matches && digest_matches {
        PreldrStatus::BldrDecrypted
    } else {
        // Not the authority for this image: restore the 2BL to its prior state.
        let bldr_region = image
            .get_mut(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
            .ok_or_else(|| crate::error::XbiosError::Fatal("2BL region out of bounds".into()))?;
        crypto::symmetric(bldr_region, &bldr_key)?;
        PreldrStatus::Found
    };

    let preldr = Preldr {
        code_offset: layout.preldr_offset,
        code_len: PRELDR_SIZE,
        params,
        pointer_block_offset,
        function_block_offset,
        public_key,
        bldr_key,
        status,
    };

    Ok((status, Some(preldr)))
}
