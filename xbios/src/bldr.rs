//! 2BL decoder: validates the decrypted 2BL header/signature,
//! exposes the kernel and kernel-data keys and boot parameters, and drives
//! kernel decryption plus decompression.

use crate::bytes::{read_array, read_u32, write_u32};
use crate::consts::*;
use crate::crypto;
use crate::error::{LoadStatus, XbiosError, XbiosResult};
use crate::layout::Layout;

/// The 2BL's boot-params struct, 8 little-endian u32 fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootParams {
    pub signature: u32,
    pub bldr_size: u32,
    pub krnl_size: u32,
    pub krnl_data_size: u32,
    pub romsize: u32,
    pub kernel_offset: u32,
    pub kernel_key_flags: u32,
    pub reserved: u32,
}

impl BootParams {
    fn parse(buf: &[u8], offset: usize) -> XbiosResult<BootParams> {
        Ok(BootParams {
            signature: read_u32(buf, offset)?,
            bldr_size: read_u32(buf, offset + 4)?,
            krnl_size: read_u32(buf, offset + 8)?,
            krnl_data_size: read_u32(buf, offset + 12)?,
            romsize: read_u32(buf, offset + 16)?,
            kernel_offset: read_u32(buf, offset + 20)?,
            kernel_key_flags: read_u32(buf, offset + 24)?,
            reserved: read_u32(buf, offset + 28)?,
        })
    }

    fn write(&self, buf: &mut [u8], offset: usize) -> XbiosResult<()> {
        write_u32(buf, offset, self.signature)?;
        write_u32(buf, offset + 4, self.bldr_size)?;
        write_u32(buf, offset + 8, self.krnl_size)?;
        write_u32(buf, offset + 12, self.krnl_data_size)?;
        write_u32(buf, offset + 16, self.romsize)?;
        write_u32(buf, offset + 20, self.kernel_offset)?;
        write_u32(buf, offset + 24, self.kernel_key_flags)?;
        write_u32(buf, offset + 28, self.reserved)?;
        Ok(())
    }

    /// The kernel key is supplied externally when [`KD_DELAY_FLAG`] is set;
    /// the caller must then ignore the in-image key field.
    pub fn kernel_key_delayed(&self) -> bool {
        self.kernel_key_flags & KD_DELAY_FLAG != 0
    }
}

/// Entry descriptor: entry point and stack top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryDescriptor {
    pub entry_point: u32,
    pub stack_top: u32,
}

/// Keys struct embedded in the 2BL.
#[derive(Debug, Clone, Copy)]
pub struct BldrKeys {
    pub kernel_key: [u8; KEY_SIZE],
    pub kernel_data_key: [u8; KEY_SIZE],
    pub bfm_key: [u8; KEY_SIZE],
}

/// Loader params: load address and entry flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderParams {
    pub load_address: u32,
    pub entry_flags: u32,
}

/// A decoded 2BL entity.
pub struct Bldr {
    pub code_offset: usize,
    pub entry: EntryDescriptor,
    /// Boot-from-media key pointer, present only when the `bfm` build flag
    /// embedded one.
    pub bfm_key: Option<[u8; KEY_SIZE]>,
    pub keys: BldrKeys,
    pub boot_params: BootParams,
    pub loader_params: LoaderParams,
    pub compressed_kernel_offset: usize,
    /// On-disk length of the compressed kernel region: `bldr_size -
    /// kernel_offset - krnl_data_size`. `boot_params.krnl_size` itself is the
    /// *decompressed* image size used as the LZX decoder's target, not the
    /// compressed length.
    pub compressed_kernel_len: usize,
    /// True once the 2BL block has been decrypted to plaintext. Monotonic:
    /// the decoder never sets this back to false.
    pub plaintext: bool,
}

/// Decrypt (if needed) and structurally validate the 2BL.
///
/// If `already_plaintext` is true (the preldr decoder already decrypted this
/// block), `bldr_key` is not applied again. On [`LoadStatus::InvalidBldr`],
/// the returned `Bldr` is still populated so callers can inspect the
/// suspicious boot params.
///
/// `romsize` is the *physical* size of the buffer the caller loaded, before
/// any small-image replication to the logical window -- `boot_params.romsize`
/// is validated against this, not `layout.image_size` (which is always the
/// 1 MiB logical window regardless of the file's on-disk size).
pub fn decode_bldr(
    image: &mut [u8],
    layout: &Layout,
    bldr_key: Option<&[u8; KEY_SIZE]>,
    already_plaintext: bool,
    romsize: usize,
) -> XbiosResult<(LoadStatus, Bldr)> {
    let region = image
        .get_mut(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
        .ok_or_else(|| XbiosError::Fatal("2BL region out of bounds".into()))?;

    if !already_plaintext {
        let key = bldr_key.ok_or(XbiosError::KeyMissing("bldr_key"))?;
        crypto::symmetric(region, key)?;
    }

    let base = layout.bldr_offset;
    let boot_params = BootParams::parse(image, base + BLDR_BOOT_PARAMS_OFFSET)?;

    let entry_raw = image.get(base + BLDR_ENTRY_OFFSET..base + BLDR_ENTRY_OFFSET + BLDR_ENTRY_SIZE).ok_or_else(
        || XbiosError::Fatal("entry descriptor out of bounds".into()),
    )?;
    let entry = EntryDescriptor {
        entry_point: read_u32(entry_raw, 0)?,
        stack_top: read_u32(entry_raw, 4)?,
    };

    let keys_off = base + BLDR_KEYS_OFFSET;
    let kernel_key = read_array::<KEY_SIZE>(image, keys_off)?;
    let kernel_data_key = read_array::<KEY_SIZE>(image, keys_off + KEY_SIZE)?;
    let bfm_key_raw = read_array::<KEY_SIZE>(image, keys_off + 2 * KEY_SIZE)?;

    let loader_off = base + BLDR_LOADER_PARAMS_OFFSET;
    let loader_params = LoaderParams {
        load_address: read_u32(image, loader_off)?,
        entry_flags: read_u32(image, loader_off + 4)?,
    };

    let compressed_kernel_offset = base.wrapping_add(boot_params.kernel_offset as usize);

    // bldr_size covers header + compressed kernel + kernel data, all measured
    // from the 2BL base; the compressed kernel's on-disk length is whatever's
    // left over once the header prefix and kernel-data tail are subtracted.
    let compressed_kernel_len = (boot_params.bldr_size as usize)
        .saturating_sub(boot_params.kernel_offset as usize)
        .saturating_sub(boot_params.krnl_data_size as usize);

    let status = validate_boot_params(&boot_params, romsize);

    let bfm_key = if bfm_key_raw != [0u8; KEY_SIZE] { Some(bfm_key_raw) } else { None };

    let bldr = Bldr {
        code_offset: base,
        entry,
        bfm_key,
        keys: BldrKeys { kernel_key, kernel_data_key, bfm_key: bfm_key_raw },
        boot_params,
        loader_params,
        compressed_kernel_offset,
        compressed_kernel_len,
        plaintext: true,
    };

    Ok((status, bldr))
}

/// Reject malformed boot params without aborting the decode -- the result
/// is reported, not propagated as an `Err`, so the image stays inspectable.
/// `romsize` is the physical size of the image the boot params were read
/// from, not the logical (post-replication) window size.
pub fn validate_boot_params(params: &BootParams, romsize: usize) -> LoadStatus {
    if params.signature != BLDR_BOOT_PARAMS_SIGNATURE {
        return LoadStatus::InvalidBldr;
    }
    if params.bldr_size == 0 || params.krnl_data_size == 0 {
        return LoadStatus::InvalidBldr;
    }
    let sum = match params.bldr_size.checked_add(params.krnl_data_size) {
        Some(s) => s as usize,
        None => return LoadStatus::InvalidBldr,
    };
    if sum > BLDR_BLOCK_SIZE - BLDR_RESERVED_TAIL {
        return LoadStatus::InvalidBldr;
    }
    if !ALLOWED_IMAGE_SIZES.contains(&(params.romsize as usize)) {
        return LoadStatus::InvalidBldr;
    }
    if params.romsize as usize != romsize {
        return LoadStatus::InvalidBldr;
    }
    LoadStatus::Success
}

/// Re-encrypt the 2BL in place under `bldr_key`, clearing `plaintext`. Used
/// both by the preldr's `FOUND` restore path and by the builder's `enc_bldr`
/// flag.
pub fn encrypt_bldr(image: &mut [u8], layout: &Layout, bldr_key: &[u8; KEY_SIZE]) -> XbiosResult<()> {
    let region = image
        .get_mut(layout.bldr_offset..layout.bldr_offset + BLDR_BLOCK_SIZE)
        .ok_or_else(|| XbiosError::Fatal("2BL region out of bounds".into()))?;
    crypto::symmetric(region, bldr_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;

    fn signed_image() -> (Vec<u8>, Layout) {
        let layout = Layout::resolve_logical(None).unwrap();
        let mut image = vec![0u8; LOGICAL_IMAGE_SIZE];
        let mut params = BootParams {
            signature: BLDR_BOOT_PARAMS_SIGNATURE,
            bldr_size: 0x1000,
            krnl_size: 0x800,
            krnl_data_size: 0x400,
            romsize: LOGICAL_IMAGE_SIZE as u32,
            kernel_offset: BLDR_HEADER_SIZE as u32,
            kernel_key_flags: 0,
            reserved: 0,
        };
        params.write(&mut image, layout.bldr_offset).unwrap();
        (image, layout)
    }

    #[test]
    fn accepts_well_formed_boot_params() {
        let (mut image, layout) = signed_image();
        let (status, bldr) = decode_bldr(&mut image, &layout, None, true, LOGICAL_IMAGE_SIZE).unwrap();
        assert_eq!(status, LoadStatus::Success);
        assert_eq!(bldr.boot_params.signature, BLDR_BOOT_PARAMS_SIGNATURE);
    }

    #[test]
    fn rejects_bad_signature_but_stays_inspectable() {
        let (mut image, layout) = signed_image();
        write_u32(&mut image, layout.bldr_offset, 0xDEAD_BEEF).unwrap();
        let (status, bldr) = decode_bldr(&mut image, &layout, None, true, LOGICAL_IMAGE_SIZE).unwrap();
        assert_eq!(status, LoadStatus::InvalidBldr);
        assert_eq!(bldr.boot_params.signature, 0xDEAD_BEEF);
    }

    #[test]
    fn rejects_zero_sizes() {
        let (mut image, layout) = signed_image();
        write_u32(&mut image, layout.bldr_offset + 4, 0).unwrap();
        let (status, _) = decode_bldr(&mut image, &layout, None, true, LOGICAL_IMAGE_SIZE).unwrap();
        assert_eq!(status, LoadStatus::InvalidBldr);
    }

    #[test]
    fn rejects_oversized_sum() {
        let (mut image, layout) = signed_image();
        write_u32(&mut image, layout.bldr_offset + 4, BLDR_BLOCK_SIZE as u32).unwrap();
        let (status, _) = decode_bldr(&mut image, &layout, None, true, LOGICAL_IMAGE_SIZE).unwrap();
        assert_eq!(status, LoadStatus::InvalidBldr);
    }

    #[test]
    fn rejects_romsize_mismatched_against_physical_size() {
        let (mut image, layout) = signed_image();
        let (status, _) = decode_bldr(&mut image, &layout, None, true, IMAGE_SIZE_256K).unwrap();
        assert_eq!(status, LoadStatus::InvalidBldr);
    }

    #[test]
    fn accepts_physical_romsize_smaller_than_logical_window() {
        let layout = Layout::resolve_logical(None).unwrap();
        let mut image = vec![0u8; LOGICAL_IMAGE_SIZE];
        let params = BootParams {
            signature: BLDR_BOOT_PARAMS_SIGNATURE,
            bldr_size: 0x1000,
            krnl_size: 0x800,
            krnl_data_size: 0x400,
            romsize: IMAGE_SIZE_256K as u32,
            kernel_offset: BLDR_HEADER_SIZE as u32,
            kernel_key_flags: 0,
            reserved: 0,
        };
        params.write(&mut image, layout.bldr_offset).unwrap();
        let (status, _) = decode_bldr(&mut image, &layout, None, true, IMAGE_SIZE_256K).unwrap();
        assert_eq!(status, LoadStatus::Success);
    }

    #[test]
    fn requires_key_when_not_already_plaintext() {
        let (mut image, layout) = signed_image();
        let err = decode_bldr(&mut image, &layout, None, false, LOGICAL_IMAGE_SIZE).unwrap_err();
        assert_eq!(err, XbiosError::KeyMissing("bldr_key"));
    }

    #[test]
    fn kernel_key_delayed_flag() {
        let mut params = BootParams {
            signature: BLDR_BOOT_PARAMS_SIGNATURE,
            bldr_size: 1,
            krnl_size: 1,
            krnl_data_size: 1,
            romsize: 0,
            kernel_offset: 0,
            kernel_key_flags: KD_DELAY_FLAG,
            reserved: 0,
        };
        assert!(params.kernel_key_delayed());
        params.kernel_key_flags = 0;
        assert!(!params.kernel_key_delayed());
    }
}
