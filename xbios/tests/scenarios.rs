//! Integration tests exercising end-to-end load/build scenarios via the
//! public `xbios` API rather than module-internal helpers.

use xbios::builder::Components;
use xbios::image::{BiosStatus, Image};
use xbios::params::{BuildParams, LoadParams, MCPXVersion};
use xbios::{IMAGE_SIZE_1M, IMAGE_SIZE_256K, KEY_SIZE};

fn sample_components(kernel_offset: u32) -> Components {
    Components {
        preldr: None,
        bldr_code: vec![0x10; 0x400],
        init_table: vec![0x20; 0x100],
        compressed_kernel: vec![0x30; 0x300],
        kernel_data: vec![0x40; 0x100],
        entry: Some((0x1000_0000, 0x2000_0000)),
        kernel_key: [0xAAu8; KEY_SIZE],
        kernel_data_key: [0xBBu8; KEY_SIZE],
        bfm_key: None,
        bldr_key: Some([0xCCu8; KEY_SIZE]),
        kernel_offset,
        loader_params: (0x9000_0000, 1),
        uncompressed_kernel_size: 0x1000,
    }
}

/// A buffer whose length isn't one of the allowed sizes is rejected before
/// any decode work happens.
#[test]
fn size_mismatch_is_rejected() {
    let buf = vec![0u8; 300 * 1024];
    let err = Image::load(buf, &LoadParams::default()).unwrap_err();
    assert_eq!(err, xbios::XbiosError::InvalidSize(300 * 1024));
}

/// Legacy image, no preldr, 2BL decrypted directly with the caller-supplied
/// bldr_key under MCPX v1.0.
#[test]
fn legacy_image_decrypts_2bl_directly() {
    let kernel_offset = xbios::BLDR_HEADER_SIZE as u32;
    let components = sample_components(kernel_offset);
    let bldr_key = components.bldr_key.unwrap();

    let flags = BuildParams { enc_bldr: true, fix2bldigest: true, ..Default::default() };
    let image = Image::build(&components, IMAGE_SIZE_1M, &flags).unwrap();
    let built_bytes = image.as_bytes().to_vec();
    image.unload();

    let load_params = LoadParams {
        romsize: IMAGE_SIZE_1M,
        bldr_key: Some(bldr_key),
        kernel_key: None,
        mcpx: MCPXVersion::V1_0,
        enc_bldr: true,
        enc_kernel: false,
        restore_boot_params: false,
    };

    let (status, loaded) = Image::load(built_bytes, &load_params).unwrap();
    assert_eq!(status, BiosStatus::Success);
    assert!(loaded.preldr.is_none());
    let bldr = loaded.bldr.as_ref().expect("2BL should have decoded");
    assert_eq!(bldr.boot_params.signature, xbios::BLDR_BOOT_PARAMS_SIGNATURE);
    let expected_bldr_size =
        kernel_offset as usize + components.compressed_kernel.len() + components.kernel_data.len();
    assert_eq!(bldr.boot_params.bldr_size as usize, expected_bldr_size);
    assert_eq!(bldr.compressed_kernel_len, components.compressed_kernel.len());
    assert_eq!(bldr.boot_params.krnl_data_size as usize, components.kernel_data.len());
    assert_eq!(bldr.entry.entry_point, 0x1000_0000);
    assert_eq!(bldr.keys.kernel_key, components.kernel_key);
    loaded.unload();
}

/// A single flipped byte in the boot-params signature is reported as
/// `InvalidBldr` but the image remains inspectable -- `boot_params` is still
/// populated with the (suspicious) values.
#[test]
fn corrupted_signature_is_soft_failure() {
    let kernel_offset = xbios::BLDR_HEADER_SIZE as u32;
    let components = sample_components(kernel_offset);
    let bldr_key = components.bldr_key.unwrap();

    let flags = BuildParams::default();
    let image = Image::build(&components, IMAGE_SIZE_1M, &flags).unwrap();
    let mut built_bytes = image.as_bytes().to_vec();
    image.unload();

    let layout = xbios::Layout::resolve_logical(None).unwrap();
    built_bytes[layout.bldr_offset] ^= 0xFF;

    let load_params = LoadParams {
        romsize: IMAGE_SIZE_1M,
        bldr_key: Some(bldr_key),
        kernel_key: None,
        mcpx: MCPXVersion::V1_0,
        enc_bldr: false,
        enc_kernel: false,
        restore_boot_params: false,
    };

    let (status, loaded) = Image::load(built_bytes, &load_params).unwrap();
    assert_eq!(status, BiosStatus::InvalidBldr);
    let bldr = loaded.bldr.as_ref().expect("boot params should still be readable");
    assert_ne!(bldr.boot_params.signature, xbios::BLDR_BOOT_PARAMS_SIGNATURE);
    loaded.unload();
}

/// An image whose compressed-kernel bytes don't form a valid LZX stream
/// decrypts cleanly (the cipher has no notion of "valid plaintext") but
/// decompression fails softly, leaving `kernel.img` unset while the overall
/// load still reports success.
#[test]
fn garbage_compressed_kernel_fails_decompress_softly() {
    let kernel_offset = xbios::BLDR_HEADER_SIZE as u32;
    let components = sample_components(kernel_offset);
    let bldr_key = components.bldr_key.unwrap();

    let flags = BuildParams::default();
    let image = Image::build(&components, IMAGE_SIZE_1M, &flags).unwrap();
    let built_bytes = image.as_bytes().to_vec();
    image.unload();

    let load_params = LoadParams {
        romsize: IMAGE_SIZE_1M,
        bldr_key: Some(bldr_key),
        kernel_key: None,
        mcpx: MCPXVersion::V1_0,
        enc_bldr: false,
        enc_kernel: false,
        restore_boot_params: false,
    };

    let (status, loaded) = Image::load(built_bytes, &load_params).unwrap();
    assert_eq!(status, BiosStatus::Success);
    let kernel = loaded.kernel.as_ref().expect("kernel entity should exist");
    assert!(kernel.plaintext, "decrypt should still have run");
    assert!(kernel.img.is_none(), "garbage LZX input should not decompress");
    loaded.unload();
}

/// A 256K physical image must round-trip through `load` just as cleanly as a
/// 1M one: boot params carry the *physical* romsize (256K), and the loader
/// must validate against that, not the logical 1M window the buffer gets
/// replicated to.
#[test]
fn small_physical_romsize_round_trips_through_load() {
    let kernel_offset = xbios::BLDR_HEADER_SIZE as u32;
    let components = sample_components(kernel_offset);
    let bldr_key = components.bldr_key.unwrap();

    let flags = BuildParams::default();
    let image = Image::build(&components, IMAGE_SIZE_256K, &flags).unwrap();
    let built_bytes = image.as_bytes().to_vec();
    assert_eq!(built_bytes.len(), xbios::LOGICAL_IMAGE_SIZE);
    image.unload();

    let load_params = LoadParams {
        romsize: IMAGE_SIZE_256K,
        bldr_key: Some(bldr_key),
        kernel_key: None,
        mcpx: MCPXVersion::V1_0,
        enc_bldr: false,
        enc_kernel: false,
        restore_boot_params: false,
    };

    let (status, loaded) = Image::load(built_bytes, &load_params).unwrap();
    assert_eq!(status, BiosStatus::Success);
    let bldr = loaded.bldr.as_ref().expect("2BL should have decoded");
    assert_eq!(bldr.boot_params.romsize as usize, IMAGE_SIZE_256K);
    loaded.unload();
}

/// Replicating an already-replicated buffer is a no-op, exercised here
/// against real `build()` output rather than a synthetic slice.
#[test]
fn replication_on_small_romsize_is_idempotent() {
    let kernel_offset = xbios::BLDR_HEADER_SIZE as u32;
    let components = sample_components(kernel_offset);
    let flags = BuildParams::default();

    let small = Image::build(&components, xbios::IMAGE_SIZE_256K, &flags).unwrap();
    let once = small.as_bytes().to_vec();
    small.unload();

    let twice = xbios::replicate(&once, xbios::LOGICAL_IMAGE_SIZE).unwrap();
    assert_eq!(once, twice);
}
