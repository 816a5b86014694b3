//! Image builder: the inverse direction from the decoders.
//! Consumes independently supplied component buffers plus build flags, writes
//! them into a fresh image in canonical layout, re-computes digests and
//! signatures, and emits a load-ready buffer.

use crate::bldr::BootParams;
use crate::bytes::write_bytes;
use crate::consts::*;
use crate::crypto;
use crate::error::{XbiosError, XbiosResult};
use crate::layout::{replicate, Layout};
use crate::params::BuildParams;

/// Independently supplied component buffers, the inverse of what the
/// decoders expose.
#[derive(Debug, Clone, Default)]
pub struct Components {
    pub preldr: Option<Vec<u8>>,
    pub bldr_code: Vec<u8>,
    pub init_table: Vec<u8>,
    pub compressed_kernel: Vec<u8>,
    pub kernel_data: Vec<u8>,
    pub entry: Option<(u32, u32)>,
    pub kernel_key: [u8; KEY_SIZE],
    pub kernel_data_key: [u8; KEY_SIZE],
    pub bfm_key: Option<[u8; KEY_SIZE]>,
    pub bldr_key: Option<[u8; KEY_SIZE]>,
    pub kernel_offset: u32,
    pub loader_params: (u32, u32),
    /// Decompressed size of `compressed_kernel`, recorded in boot params as
    /// `krnl_size` so the loader knows the LZX decoder's target.
    /// `compressed_kernel.len()` itself is the on-disk compressed length,
    /// derived back out of `bldr_size` on decode (see
    /// `Bldr::compressed_kernel_len`).
    pub uncompressed_kernel_size: u32,
}

/// Assemble a fresh image from `components` under `flags`, sized `romsize`
/// bytes physically (tiled to the logical 1 MiB window on return if smaller).
///
/// Encryption order on build: layout, populate plaintext fields, patch boot
/// params, compute digests, encrypt kernel+data, encrypt 2BL, encrypt/embed
/// preldr artifacts. Reversing any pair invalidates the invariants tying the
/// layers together.
pub fn build(components: &Components, romsize: usize, flags: &BuildParams) -> XbiosResult<Vec<u8>> {
    let layout = Layout::resolve(romsize, None)?;
    let mut image = vec![0u8; romsize];

    write_bytes(&mut image, layout.init_tbl_offset, &components.init_table)?;

    if let Some(preldr) = &components.preldr {
        write_bytes(&mut image, layout.preldr_offset, preldr)?;
    }

    write_bytes(&mut image, layout.bldr_offset, &components.bldr_code)?;

    let kernel_offset = layout.bldr_offset + components.kernel_offset as usize;
    write_bytes(&mut image, kernel_offset, &components.compressed_kernel)?;
    let kernel_data_offset = kernel_offset + components.compressed_kernel.len();
    write_bytes(&mut image, kernel_data_offset, &components.kernel_data)?;

    write_keys(&mut image, &layout, components, flags)?;

    if let Some((entry_point, stack_top)) = components.entry {
        let entry_off = layout.bldr_offset + BLDR_ENTRY_OFFSET;
        crate::bytes::write_u32(&mut image, entry_off, entry_point)?;
        crate::bytes::write_u32(&mut image, entry_off + 4, stack_top)?;
    }
    let loader_off = layout.bldr_offset + BLDR_LOADER_PARAMS_OFFSET;
    crate::bytes::write_u32(&mut image, loader_off, components.loader_params.0)?;
    crate::bytes::write_u32(&mut image, loader_off + 4, components.loader_params.1)?;

    if !flags.nobootparams {
        write_boot_params(&mut image, &layout, components, flags, romsize)?;
    }

    if flags.fix2bldigest {
        fix_2bl_digest(&mut image, &layout)?;
    }

    if flags.enc_kernel {
        let compressed = image
            .get_mut(kernel_offset..kernel_offset + components.compressed_kernel.len())
            .ok_or_else(|| XbiosError::Fatal("compressed kernel region out of bounds".into()))?;
        crypto::symmetric(compressed, &components.kernel_key)?;

        let data = image
            .get_mut(kernel_data_offset..kernel_data_offset + components.kernel_data.len())
            .ok_or_else(|| XbiosError::Fatal("kernel data region out of bounds".into()))?;
        crypto::symmetric(data, &components.kernel_data_key)?;
    }

    if flags.enc_bldr {
        let key = components.bldr_key.ok_or(XbiosError::KeyMissing("bldr_key"))?;
        let region = image
            .get_mut(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
            .ok_or_else(|| XbiosError::Fatal("2BL region out of bounds".into()))?;
        crypto::symmetric(region, &key)?;
    }

    if romsize < LOGICAL_IMAGE_SIZE {
        image = replicate(&image, LOGICAL_IMAGE_SIZE)?;
    }

    Ok(image)
}

fn write_keys(
    image: &mut [u8],
    layout: &Layout,
    components: &Components,
    flags: &BuildParams,
) -> XbiosResult<()> {
    let keys_off = layout.bldr_offset + BLDR_KEYS_OFFSET;

    let kernel_key = if flags.zero_kernel_key { [0u8; KEY_SIZE] } else { components.kernel_key };
    write_bytes(image, keys_off, &kernel_key)?;
    write_bytes(image, keys_off + KEY_SIZE, &components.kernel_data_key)?;

    if flags.bfm {
        let bfm_key = components.bfm_key.ok_or(XbiosError::KeyMissing("bfm_key"))?;
        write_bytes(image, keys_off + 2 * KEY_SIZE, &bfm_key)?;
    }

    Ok(())
}

fn write_boot_params(
    image: &mut [u8],
    layout: &Layout,
    components: &Components,
    flags: &BuildParams,
    romsize: usize,
) -> XbiosResult<()> {
    let signature = if flags.hacksignature {
        crate::bytes::read_u32(image, layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET).unwrap_or(0)
    } else {
        BLDR_BOOT_PARAMS_SIGNATURE
    };

    let kernel_key_flags = if components.kernel_key != [0u8; KEY_SIZE] && flags.zero_kernel_key {
        KD_DELAY_FLAG
    } else {
        0
    };

    // bldr_size covers header/code + compressed kernel + kernel data, all
    // measured from the 2BL base (mirrors Bldr::compressed_kernel_len's
    // inverse formula on decode).
    let bldr_size = components.kernel_offset as usize
        + components.compressed_kernel.len()
        + components.kernel_data.len();

    let params = BootParams {
        signature,
        bldr_size: bldr_size as u32,
        krnl_size: components.uncompressed_kernel_size,
        krnl_data_size: components.kernel_data.len() as u32,
        romsize: romsize as u32,
        kernel_offset: components.kernel_offset,
        kernel_key_flags,
        reserved: 0,
    };

    crate::bytes::write_u32(image, layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET, params.signature)?;
    crate::bytes::write_u32(image, layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 4, params.bldr_size)?;
    crate::bytes::write_u32(image, layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 8, params.krnl_size)?;
    crate::bytes::write_u32(
        image,
        layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 12,
        params.krnl_data_size,
    )?;
    crate::bytes::write_u32(image, layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 16, params.romsize)?;
    crate::bytes::write_u32(
        image,
        layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 20,
        params.kernel_offset,
    )?;
    crate::bytes::write_u32(
        image,
        layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 24,
        params.kernel_key_flags,
    )?;
    crate::bytes::write_u32(image, layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 28, params.reserved)?;
    Ok(())
}

/// Recompute the SHA-1 digest of the 2BL region and embed it in the ROM
/// digest region at the top of the preldr block (`fix2bldigest`). Skipped
/// unless the flag is set, mirroring `hackinittbl` skipping the init-table
/// checksum fixup.
fn fix_2bl_digest(image: &mut [u8], layout: &Layout) -> XbiosResult<()> {
    let bldr_region = image
        .get(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
        .ok_or_else(|| XbiosError::Fatal("2BL region out of bounds".into()))?;
    let digest = crypto::sha1(bldr_region);
    write_bytes(image, layout.preldr_digest_offset, &digest)?;
    Ok(())
}
