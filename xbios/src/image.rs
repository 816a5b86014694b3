//! The `Image` handle: created by `load` or `build`, mutated only by decoder
//! steps in a defined sequence, and destroyed by `unload` which zeroes
//! derived key material.
//!
//! Exposes offset+length views into a single owned byte buffer rather than
//! aliasing raw pointers into it.

use zeroize::Zeroize;

use crate::bldr::{self, Bldr};
use crate::builder::{self, Components};
use crate::consts::*;
use crate::error::{LoadStatus, PreldrStatus, XbiosError, XbiosResult};
use crate::kernel::{self, Kernel};
use crate::layout::Layout;
use crate::params::{BuildParams, LoadParams, MCPXVersion};
use crate::preldr::{self, Preldr};

/// Top-level decode outcome reported to callers as `bios_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiosStatus {
    Success,
    InvalidBldr,
    Failed,
}

/// An in-memory BIOS image: owned buffer plus whatever layers have been
/// decoded so far. The codec is single-threaded and synchronous; the buffer
/// is exclusively owned for the duration of `load`/`build`.
pub struct Image {
    buffer: Vec<u8>,
    layout: Layout,
    pub preldr: Option<Preldr>,
    pub bldr: Option<Bldr>,
    pub kernel: Option<Kernel>,
    bldr_key: Option<[u8; KEY_SIZE]>,
    kernel_key: Option<[u8; KEY_SIZE]>,
}

impl Image {
    /// Parse an existing image buffer, chaining layout resolution, preldr
    /// detection/decryption, 2BL structural validation, and (on a
    /// structurally valid 2BL) kernel decrypt plus LZX decompress.
    ///
    /// `InvalidSize` and other `Fatal` conditions abort and leave no `Image`;
    /// `PreldrNotFound`/`InvalidBldr`/`DecompressFailed` are soft and leave
    /// the returned handle usable.
    pub fn load(mut buffer: Vec<u8>, params: &LoadParams) -> XbiosResult<(BiosStatus, Image)> {
        if !ALLOWED_IMAGE_SIZES.contains(&buffer.len()) {
            return Err(XbiosError::InvalidSize(buffer.len()));
        }
        if buffer.len() < LOGICAL_IMAGE_SIZE {
            buffer = crate::layout::replicate(&buffer, LOGICAL_IMAGE_SIZE)?;
        }

        let layout = Layout::resolve_logical(None)?;
        let pre_decrypt_boot_params = buffer
            [layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET..layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET + 32]
            .to_vec();

        let expect_preldr = params.mcpx == MCPXVersion::V1_1;

        let (preldr_status, preldr) = if expect_preldr {
            match &params.bldr_key {
                // A caller-supplied bldr_key with v1.1 still lets us attempt
                // preldr detection; the secret boot key doubles as the MCPX
                // collaborator's blob in this model.
                Some(sbk) => preldr::decode_preldr(&mut buffer, &layout, sbk),
                None => (PreldrStatus::NotFound, None),
            }
        } else {
            (PreldrStatus::NotFound, None)
        };

        let already_plaintext = preldr_status == PreldrStatus::BldrDecrypted || !params.enc_bldr;
        let effective_bldr_key = preldr.as_ref().map(|p| p.bldr_key).or(params.bldr_key);

        let bldr_key_for_encrypt = effective_bldr_key;

        let (load_status, bldr, kernel_entity_seed) = if already_plaintext || effective_bldr_key.is_some() {
            match bldr::decode_bldr(
                &mut buffer,
                &layout,
                effective_bldr_key.as_ref(),
                already_plaintext,
                params.romsize,
            ) {
                Ok((status, bldr)) => {
                    let kernel_offset = bldr.compressed_kernel_offset;
                    let kernel_data_offset = kernel_offset + bldr.compressed_kernel_len;
                    let kernel_entity = Kernel::new(
                        kernel_offset,
                        bldr.compressed_kernel_len,
                        kernel_data_offset,
                        bldr.boot_params.krnl_data_size as usize,
                    );
                    (status, Some(bldr), Some(kernel_entity))
                }
                Err(e) => {
                    log::error!("2BL decode failed: {e}");
                    (LoadStatus::Failed, None, None)
                }
            }
        } else {
            log::warn!("no bldr_key available and no preldr decrypted the 2BL");
            (LoadStatus::Failed, None, None)
        };

        let mut kernel = kernel_entity_seed;
        if load_status == LoadStatus::Success {
            if let (Some(bldr_ref), Some(kernel_mut)) = (bldr.as_ref(), kernel.as_mut()) {
                let kernel_key = if bldr_ref.boot_params.kernel_key_delayed() {
                    params.kernel_key.ok_or(XbiosError::KeyMissing("kernel_key"))?
                } else {
                    bldr_ref.keys.kernel_key
                };
                if !params.enc_kernel {
                    kernel_mut.plaintext = true;
                } else {
                    match kernel::decrypt(&mut buffer, kernel_mut, &kernel_key, &bldr_ref.keys.kernel_data_key) {
                        Ok(kernel::KernelStatus::AlreadyPlaintext) => {
                            log::debug!("kernel already plaintext, skipping decrypt");
                        }
                        Ok(kernel::KernelStatus::Decrypted) => {}
                        Err(e) => log::warn!("kernel decrypt failed: {e}"),
                    }
                }
                if kernel_mut.plaintext {
                    let uncompressed_size = bldr_ref.boot_params.krnl_size as usize;
                    if let Err(e) = kernel::decompress(&buffer, kernel_mut, uncompressed_size) {
                        log::warn!("{e}");
                    }
                }
            }
        }

        if params.restore_boot_params {
            let off = layout.bldr_offset + BLDR_BOOT_PARAMS_OFFSET;
            buffer[off..off + 32].copy_from_slice(&pre_decrypt_boot_params);
        }

        let bios_status = match (preldr_status, load_status) {
            (PreldrStatus::Error, _) => BiosStatus::Failed,
            (_, LoadStatus::Success) => BiosStatus::Success,
            (_, LoadStatus::InvalidBldr) => BiosStatus::InvalidBldr,
            (_, LoadStatus::Failed) => BiosStatus::Failed,
        };

        let image = Image {
            buffer,
            layout,
            preldr,
            bldr,
            kernel,
            bldr_key: bldr_key_for_encrypt,
            kernel_key: params.kernel_key,
        };

        Ok((bios_status, image))
    }

    /// Synthesize a fresh image from independent components.
    pub fn build(components: &Components, romsize: usize, flags: &BuildParams) -> XbiosResult<Image> {
        let buffer = builder::build(components, romsize, flags)?;
        let layout = Layout::resolve_logical(None)?;
        Ok(Image {
            buffer,
            layout,
            preldr: None,
            bldr: None,
            kernel: None,
            bldr_key: components.bldr_key,
            kernel_key: Some(components.kernel_key),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Zero all derived key material and the owned buffer. Consumes `self`;
    /// also runs again (harmlessly, against already-zeroed state) via `Drop`
    /// once the consumed value goes out of scope.
    pub fn unload(mut self) {
        self.scrub();
    }

    /// Zero every piece of derived key material and the owned buffer. Called
    /// from both `unload` and `Drop::drop` so every exit path -- explicit
    /// unload, an early `?` return after a partial `load`, or a plain scope
    /// exit -- scrubs the same state.
    fn scrub(&mut self) {
        if let Some(mut key) = self.bldr_key.take() {
            key.zeroize();
        }
        if let Some(mut key) = self.kernel_key.take() {
            key.zeroize();
        }
        if let Some(preldr) = self.preldr.as_mut() {
            preldr.bldr_key.zeroize();
        }
        if let Some(bldr) = self.bldr.as_mut() {
            bldr.keys.kernel_key.zeroize();
            bldr.keys.kernel_data_key.zeroize();
            bldr.keys.bfm_key.zeroize();
        }
        self.buffer.zeroize();
    }
}

impl Drop for Image {
    /// Runs on every exit path, including an early `?` return after a
    /// partial `load` that never reaches an explicit `unload()` call.
    fn drop(&mut self) {
        self.scrub();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_bad_size() {
        let buf = vec![0u8; 300 * 1024];
        let err = Image::load(buf, &LoadParams::default()).unwrap_err();
        assert_eq!(err, XbiosError::InvalidSize(300 * 1024));
    }

    #[test]
    fn load_without_any_key_fails_soft() {
        let buf = vec![0u8; IMAGE_SIZE_1M];
        let params = LoadParams { mcpx: MCPXVersion::V1_0, romsize: IMAGE_SIZE_1M, ..Default::default() };
        let (status, _image) = Image::load(buf, &params).unwrap();
        assert_eq!(status, BiosStatus::Failed);
    }

    #[test]
    fn unload_zeroizes_keys() {
        let components = crate::builder::Components {
            bldr_code: vec![0xAA; 0x100],
            init_table: vec![0xBB; 0x40],
            compressed_kernel: vec![0xCC; 0x200],
            kernel_data: vec![0xDD; 0x80],
            kernel_key: [0x11u8; KEY_SIZE],
            kernel_data_key: [0x22u8; KEY_SIZE],
            bldr_key: Some([0x33u8; KEY_SIZE]),
            kernel_offset: BLDR_HEADER_SIZE as u32,
            loader_params: (0, 0),
            ..Default::default()
        };
        let image = Image::build(&components, IMAGE_SIZE_1M, &BuildParams::default()).unwrap();
        assert_eq!(image.kernel_key, Some([0x11u8; KEY_SIZE]));
        image.unload();
    }
}
