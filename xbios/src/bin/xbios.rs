//! CLI front end for the `xbios` layered image codec: `inspect`, `extract`,
//! and `build` subcommands over the library in `xbios/src/lib.rs`.
//!
//! Mirrors the multi-subcommand `clap::Parser`/`clap::Subcommand` shape and
//! `anyhow::Context`-wrapped library calls used by
//! `apps/vault/tools/vaultbackup-rs/src/main.rs`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use xbios::builder::Components;
use xbios::image::{BiosStatus, Image};
use xbios::params::{BuildParams, LoadParams, MCPXVersion};
use xbios::KEY_SIZE;

#[derive(Debug, Parser)]
#[clap(name = "xbios")]
#[clap(about = "Inspect, decrypt, verify, and reconstruct Xbox (original) BIOS ROM images.", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load an image and print a human-readable status report without
    /// persisting anything.
    #[clap(arg_required_else_help = true)]
    Inspect(InspectArgs),

    /// Load an image and write each decoded component to its own file.
    #[clap(arg_required_else_help = true)]
    Extract(ExtractArgs),

    /// Assemble a fresh image from independent component files.
    #[clap(arg_required_else_help = true)]
    Build(BuildArgs),
}

#[derive(Debug, Parser)]
struct LoadArgs {
    /// Path to the BIOS image to load (256K/512K/1M).
    #[clap(long)]
    input: PathBuf,

    /// MCPX ROM version supplying the secret boot key: v1.0 (no preldr) or v1.1.
    #[clap(long, value_enum, default_value = "v1-1")]
    mcpx: MCPXArg,

    /// Secret boot key (MCPX blob), as a hex string. Required when `--mcpx v1.1`.
    #[clap(long)]
    secret_boot_key: Option<String>,

    /// Explicit 2BL key, as a hex string. Used when no preldr decrypts the 2BL.
    #[clap(long)]
    bldr_key: Option<String>,

    /// Explicit kernel key, as a hex string. Used when the boot params' delay
    /// flag indicates an externally supplied key.
    #[clap(long)]
    kernel_key: Option<String>,

    /// Restore the boot-params region to its pre-decrypt bytes after loading.
    #[clap(long)]
    restore_boot_params: bool,

    /// The 2BL is already plaintext on disk (e.g. re-inspecting a prior
    /// `extract` dump); skip decrypting it again.
    #[clap(long)]
    bldr_already_plaintext: bool,

    /// The kernel is already plaintext on disk; skip decrypting it again.
    #[clap(long)]
    kernel_already_plaintext: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum MCPXArg {
    #[clap(name = "v1.0")]
    V10,
    #[clap(name = "v1.1")]
    V11,
}

impl From<MCPXArg> for MCPXVersion {
    fn from(v: MCPXArg) -> MCPXVersion {
        match v {
            MCPXArg::V10 => MCPXVersion::V1_0,
            MCPXArg::V11 => MCPXVersion::V1_1,
        }
    }
}

#[derive(Debug, Parser)]
struct InspectArgs {
    #[clap(flatten)]
    load: LoadArgs,
}

#[derive(Debug, Parser)]
struct ExtractArgs {
    #[clap(flatten)]
    load: LoadArgs,

    /// Directory to write extracted components into (created if missing).
    #[clap(long)]
    out_dir: PathBuf,
}

#[derive(Debug, Parser)]
struct BuildArgs {
    #[clap(long)]
    bldr_code: PathBuf,
    #[clap(long)]
    init_table: PathBuf,
    #[clap(long)]
    compressed_kernel: PathBuf,
    #[clap(long)]
    kernel_data: PathBuf,
    #[clap(long)]
    preldr: Option<PathBuf>,

    #[clap(long)]
    kernel_key: String,
    #[clap(long)]
    kernel_data_key: String,
    #[clap(long)]
    bldr_key: Option<String>,
    #[clap(long)]
    bfm_key: Option<String>,

    #[clap(long, default_value_t = 0x2000)]
    kernel_offset: u32,

    /// Decompressed size of the kernel, recorded in boot params for the
    /// loader's LZX decoder target.
    #[clap(long)]
    uncompressed_kernel_size: u32,

    #[clap(long, value_parser = parse_romsize, default_value = "1M")]
    romsize: usize,

    #[clap(long)]
    out: PathBuf,

    #[clap(long)]
    bfm: bool,
    #[clap(long)]
    hackinittbl: bool,
    #[clap(long)]
    hacksignature: bool,
    #[clap(long)]
    nobootparams: bool,
    #[clap(long)]
    zero_kernel_key: bool,
    #[clap(long)]
    fix2bldigest: bool,
    #[clap(long)]
    enc_bldr: bool,
    #[clap(long)]
    enc_kernel: bool,
}

fn parse_romsize(s: &str) -> Result<usize, String> {
    match s {
        "256K" => Ok(256 * 1024),
        "512K" => Ok(512 * 1024),
        "1M" => Ok(1024 * 1024),
        _ => Err(format!("unrecognized romsize {s}, expected 256K/512K/1M")),
    }
}

fn parse_key(hex: &str, field: &'static str) -> Result<[u8; KEY_SIZE]> {
    let bytes = hex::decode(hex).with_context(|| format!("{field} is not valid hex"))?;
    let arr: [u8; KEY_SIZE] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("{field} must decode to {KEY_SIZE} bytes, got {}", v.len()))?;
    Ok(arr)
}

fn load_image(args: &LoadArgs) -> Result<(BiosStatus, Image)> {
    let buffer = fs::read(&args.input).with_context(|| format!("reading {}", args.input.display()))?;

    let mcpx: MCPXVersion = args.mcpx.into();
    let bldr_key = args.bldr_key.as_deref().map(|h| parse_key(h, "--bldr-key")).transpose()?;
    let kernel_key = args.kernel_key.as_deref().map(|h| parse_key(h, "--kernel-key")).transpose()?;
    let secret_boot_key =
        args.secret_boot_key.as_deref().map(|h| parse_key(h, "--secret-boot-key")).transpose()?;

    // `LoadParams::bldr_key` is overloaded: under v1.1 it is the secret boot
    // key the preldr derives its own bldr_key from; under v1.0 (no preldr
    // expected) it is the bldr_key itself (see xbios/src/image.rs's load path).
    let effective_bldr_key = match mcpx {
        MCPXVersion::V1_1 => secret_boot_key,
        MCPXVersion::V1_0 => bldr_key,
    };

    let params = LoadParams {
        romsize: buffer.len(),
        bldr_key: effective_bldr_key,
        kernel_key,
        mcpx,
        enc_bldr: !args.bldr_already_plaintext,
        enc_kernel: !args.kernel_already_plaintext,
        restore_boot_params: args.restore_boot_params,
    };

    Image::load(buffer, &params).context("loading image")
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Inspect(args) => run_inspect(&args)?,
        Commands::Extract(args) => run_extract(&args)?,
        Commands::Build(args) => run_build(&args)?,
    };

    std::process::exit(exit_code);
}

fn run_inspect(args: &InspectArgs) -> Result<i32> {
    let (status, image) = load_image(&args.load)?;

    println!("bios_status: {status:?}");
    if let Some(preldr) = &image.preldr {
        println!("preldr.status: {:?}", preldr.status);
        println!("preldr.bldr_key: {}", hex::encode(preldr.bldr_key));
    } else {
        println!("preldr: not present");
    }
    if let Some(bldr) = &image.bldr {
        println!("bldr.boot_params: {:?}", bldr.boot_params);
        println!("bldr.entry: {:?}", bldr.entry);
        println!("bldr.plaintext: {}", bldr.plaintext);
    } else {
        println!("bldr: not decoded");
    }
    if let Some(kernel) = &image.kernel {
        match &kernel.img {
            Some(img) => println!("kernel.img: {} bytes decompressed", img.len()),
            None => println!("kernel.img: not decompressed"),
        }
    }

    image.unload();

    Ok(match status {
        BiosStatus::Success => 0,
        BiosStatus::InvalidBldr => 2,
        BiosStatus::Failed => 1,
    })
}

fn run_extract(args: &ExtractArgs) -> Result<i32> {
    let (status, image) = load_image(&args.load)?;
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let layout = *image.layout();
    let bytes = image.as_bytes();

    fs::write(args.out_dir.join("init_table.bin"), &bytes[layout.init_tbl_offset..layout.bldr_offset])?;

    if let Some(bldr) = &image.bldr {
        let bldr_end = layout.bldr_offset + xbios::BLDR_BLOCK_SIZE;
        fs::write(args.out_dir.join("bldr.bin"), &bytes[layout.bldr_offset..bldr_end])?;

        if let Some(kernel) = &image.kernel {
            if let Some(img) = &kernel.img {
                fs::write(args.out_dir.join("kernel.img"), img)?;
            } else {
                log::warn!("kernel not decompressed; skipping kernel.img");
            }
            let data_end = kernel.data_offset + kernel.data_len;
            fs::write(args.out_dir.join("kernel_data.bin"), &bytes[kernel.data_offset..data_end])?;
        }
        let _ = bldr;
    }

    let exit_code = match status {
        BiosStatus::Success => 0,
        BiosStatus::InvalidBldr => 2,
        BiosStatus::Failed => 1,
    };
    image.unload();
    Ok(exit_code)
}

fn run_build(args: &BuildArgs) -> Result<i32> {
    let bldr_code = fs::read(&args.bldr_code).with_context(|| format!("reading {}", args.bldr_code.display()))?;
    let init_table =
        fs::read(&args.init_table).with_context(|| format!("reading {}", args.init_table.display()))?;
    let compressed_kernel = fs::read(&args.compressed_kernel)
        .with_context(|| format!("reading {}", args.compressed_kernel.display()))?;
    let kernel_data =
        fs::read(&args.kernel_data).with_context(|| format!("reading {}", args.kernel_data.display()))?;
    let preldr = args
        .preldr
        .as_ref()
        .map(|p| fs::read(p).with_context(|| format!("reading {}", p.display())))
        .transpose()?;

    let components = Components {
        preldr,
        bldr_code,
        init_table,
        compressed_kernel,
        kernel_data,
        entry: None,
        kernel_key: parse_key(&args.kernel_key, "--kernel-key")?,
        kernel_data_key: parse_key(&args.kernel_data_key, "--kernel-data-key")?,
        bfm_key: args.bfm_key.as_deref().map(|h| parse_key(h, "--bfm-key")).transpose()?,
        bldr_key: args.bldr_key.as_deref().map(|h| parse_key(h, "--bldr-key")).transpose()?,
        kernel_offset: args.kernel_offset,
        loader_params: (0, 0),
        uncompressed_kernel_size: args.uncompressed_kernel_size,
    };

    let flags = BuildParams {
        bfm: args.bfm,
        hackinittbl: args.hackinittbl,
        hacksignature: args.hacksignature,
        nobootparams: args.nobootparams,
        zero_kernel_key: args.zero_kernel_key,
        fix2bldigest: args.fix2bldigest,
        enc_bldr: args.enc_bldr,
        enc_kernel: args.enc_kernel,
    };

    let image = Image::build(&components, args.romsize, &flags).context("building image")?;
    fs::write(&args.out, image.as_bytes()).with_context(|| format!("writing {}", args.out.display()))?;
    log::info!("wrote {}", args.out.display());

    Ok(0)
}
