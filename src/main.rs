use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::Level;
use zzpack::block::{decode_frame, encode_frame, FrameHeader, FORMAT_VERSION_0};
use zzpack::codec::{CodecOptions, ZlibCodec};
use zzpack::image::try_decode_image;
use zzpack::io_stream::{Endian, InputStream, StreamReader, StreamWriter};

#[derive(Parser)]
#[command(name = "zzpack", about = "Zlib framed-block and image blob tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// JSON file with codec options (level, max_output_size)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Compression level 0-9 (overrides the config file)
    #[arg(short, long, global = true)]
    level: Option<u32>,
    /// Largest decompressed size accepted, in bytes (overrides the config file)
    #[arg(long, global = true)]
    max_output: Option<usize>,
    /// Read and write frame headers in big-endian byte order
    #[arg(long, global = true)]
    big_endian: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file into a single framed block
    Pack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Decode a framed block back into the original file
    Unpack {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Show the frame header of a packed file
    Inspect {
        input: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decode a raw zlib image blob into plane files
    Image {
        input: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// The blob carries a transform plane after the color plane
        #[arg(long)]
        double_layer: bool,
        /// Output prefix; writes <prefix>.image.bin and <prefix>.transform.bin
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct InspectReport {
    raw_size:        u32,
    compressed_size: u32,
    format_version:  u16,
    reserved:        u16,
    supported:       bool,
    payload_bytes:   usize,
    payload_crc32:   u32,
    ratio:           f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let max_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(max_level).init();

    let codec  = ZlibCodec::new(load_options(&cli)?);
    let endian = if cli.big_endian { Endian::Big } else { Endian::Little };

    match cli.command {

        // ── Pack ─────────────────────────────────────────────────────────────
        Commands::Pack { input, output } => {
            let data = std::fs::read(&input)?;
            let mut out = StreamWriter::with_endian(BufWriter::new(File::create(&output)?), endian);
            encode_frame(&codec, &data, &mut out)?;
            finish(out)?;
            tracing::info!("packed {} ({} bytes)", input.display(), data.len());
            println!("Created: {}", output.display());
        }

        // ── Unpack ───────────────────────────────────────────────────────────
        Commands::Unpack { input, output } => {
            let mut src = StreamReader::with_endian(BufReader::new(File::open(&input)?), endian);
            let mut out = StreamWriter::with_endian(BufWriter::new(File::create(&output)?), endian);
            decode_frame(&codec, &mut src, &mut out)?;
            finish(out)?;
            println!("Unpacked to: {}", output.display());
        }

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { input, json } => {
            let mut src = StreamReader::with_endian(BufReader::new(File::open(&input)?), endian);
            let header = FrameHeader::read(&mut src);
            if src.fail() {
                return Err(format!("{}: too short for a frame header", input.display()).into());
            }
            let payload = src.get_raw(header.compressed_size as usize);
            let report = InspectReport {
                raw_size:        header.raw_size,
                compressed_size: header.compressed_size,
                format_version:  header.format_version,
                reserved:        header.reserved,
                supported:       header.format_version == FORMAT_VERSION_0 && header.compressed_size != 0,
                payload_bytes:   payload.len(),
                payload_crc32:   crc32fast::hash(&payload),
                ratio:           if header.raw_size == 0 {
                    0.0
                } else {
                    header.compressed_size as f64 / header.raw_size as f64
                },
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("── Framed block ─────────────────────────────────────────");
                println!("  Path             {}", input.display());
                println!("  Raw size         {} B", report.raw_size);
                println!("  Compressed size  {} B", report.compressed_size);
                println!("  Ratio            {:.3}", report.ratio);
                println!("  Format version   {}{}", report.format_version,
                    if report.supported { "" } else { " (unsupported)" });
                println!("  Reserved         {:#06x}", report.reserved);
                println!("  Payload present  {} B", report.payload_bytes);
                println!("  Payload CRC32    {:08x}", report.payload_crc32);
            }
        }

        // ── Image ────────────────────────────────────────────────────────────
        Commands::Image { input, width, height, double_layer, output } => {
            let blob = std::fs::read(&input)?;
            let img = try_decode_image(&codec, width, height, &blob, double_layer)?;

            let image_path = with_suffix(&output, "image.bin");
            std::fs::write(&image_path, img.image())?;
            println!("  wrote  {}", image_path.display());
            if let Some(transform) = img.transform() {
                let transform_path = with_suffix(&output, "transform.bin");
                std::fs::write(&transform_path, transform)?;
                println!("  wrote  {}", transform_path.display());
            }
            println!("Decoded {}x{} image", img.width(), img.height());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn load_options(cli: &Cli) -> Result<CodecOptions, Box<dyn std::error::Error>> {
    let mut opts = match &cli.config {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None       => CodecOptions::default(),
    };
    if let Some(level) = cli.level {
        opts.level = level;
    }
    if let Some(max) = cli.max_output {
        opts.max_output_size = max;
    }
    Ok(opts)
}

fn finish<W: std::io::Write>(mut out: StreamWriter<W>) -> Result<(), Box<dyn std::error::Error>> {
    out.flush();
    match out.error() {
        Some(e) => Err(format!("write failed: {e}").into()),
        None    => Ok(()),
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
