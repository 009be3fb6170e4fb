//! Command-line interface for the DICOM conversion tool.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use crate::attributes::AttributeExtractor;
use crate::config::{MethodId, ServiceConfig};
use crate::dicom::{utils, ParsedContainer};
use crate::pipeline::ConversionPipeline;
use crate::service::{ConversionService, ConvertRequest, ServiceResponse};
use crate::CompressedPayload;

/// DICOM Conversion Tool
///
/// Converts compressed DICOM payloads into PNG images with
/// diagnostic attributes.
#[derive(Parser, Debug)]
#[command(name = "medimg-convert")]
#[command(version)]
#[command(about = "Convert compressed DICOM payloads to PNG")]
#[command(long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a compressed payload file to PNG
    Convert {
        /// Payload file (compressed text)
        #[arg(short, long)]
        input: PathBuf,

        /// Compression method identifier
        #[arg(short, long, default_value = "lz")]
        compression: String,

        /// Decompressed text is base64 of the DICOM bytes
        #[arg(short, long)]
        encoded: bool,

        /// Write the PNG here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run one JSON request through the authenticated service
    Handle {
        /// Request body file (JSON)
        #[arg(short, long)]
        request: PathBuf,

        /// Authorization value (`Bearer <token>` or bare token)
        #[arg(short, long)]
        token: Option<String>,

        /// Service configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show information about a DICOM file
    Info {
        /// Input DICOM file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compress a DICOM file into a payload
    Pack {
        /// Input DICOM file path
        #[arg(short, long)]
        input: PathBuf,

        /// Compression method
        #[arg(short, long, value_enum, default_value = "lz")]
        compression: MethodArg,

        /// Skip base64 wrapping and send the bytes as a binary string
        #[arg(long)]
        raw: bool,

        /// Output payload path
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Compression method argument.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum MethodArg {
    /// No compression
    None,
    /// LZ-string, base64 alphabet
    Lz,
    /// LZ-string, URI-safe alphabet
    LzUri,
}

impl From<MethodArg> for MethodId {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::None => MethodId::None,
            MethodArg::Lz => MethodId::Lz,
            MethodArg::LzUri => MethodId::LzUri,
        }
    }
}

/// Run the CLI application.
pub fn run(cli: Cli) -> Result<()> {
    // Initialize logging
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .init();
    } else if !cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .init();
    }

    match cli.command {
        Commands::Convert {
            input,
            compression,
            encoded,
            output,
        } => run_convert(&input, compression, encoded, output.as_deref(), cli.quiet),
        Commands::Handle {
            request,
            token,
            config,
        } => run_handle(&request, token.as_deref(), config.as_deref()),
        Commands::Info { input } => run_info(&input, cli.quiet),
        Commands::Pack {
            input,
            compression,
            raw,
            output,
        } => run_pack(&input, compression.into(), !raw, &output),
    }
}

/// Run convert command.
fn run_convert(
    input: &Path,
    compression: String,
    encoded: bool,
    output: Option<&Path>,
    quiet: bool,
) -> Result<()> {
    let data = fs::read_to_string(input)
        .with_context(|| format!("failed to read payload {}", input.display()))?;
    let payload = CompressedPayload::new(data.trim(), compression, encoded);

    let rendered = ConversionPipeline::default().render(&payload)?;

    if let Some(output) = output {
        fs::write(output, &rendered.image)
            .with_context(|| format!("failed to write {}", output.display()))?;
        log::info!("Wrote {}", output.display());
    }

    if !quiet {
        println!("{}", serde_json::to_string_pretty(&rendered.attributes)?);
    }

    Ok(())
}

/// Run handle command.
fn run_handle(request: &Path, token: Option<&str>, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?.apply_env();
    let response = handle_request_file(request, token, &config)?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.is_success() {
        bail!("request failed with status {}", response.status);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ServiceConfig::default()),
    }
}

fn handle_request_file(
    request: &Path,
    token: Option<&str>,
    config: &ServiceConfig,
) -> Result<ServiceResponse> {
    let body = fs::read_to_string(request)
        .with_context(|| format!("failed to read request {}", request.display()))?;
    let request: ConvertRequest =
        serde_json::from_str(&body).context("request body is not a valid conversion request")?;

    Ok(ConversionService::new(config).handle(token, &request))
}

/// Run info command.
fn run_info(input: &Path, quiet: bool) -> Result<()> {
    let bytes =
        fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let container = ParsedContainer::from_bytes(&bytes)?;
    let metadata = container.metadata();

    if quiet {
        return Ok(());
    }

    println!("DICOM File Information");
    println!("======================");
    println!("File: {}", input.display());
    println!();

    println!("Image Properties:");
    match (metadata.columns, metadata.rows) {
        (Some(w), Some(h)) => println!("  Dimensions: {}x{}", w, h),
        _ => println!("  Dimensions: unknown"),
    }
    if let Some(bits) = metadata.bits_stored {
        println!("  Bits Stored: {}", bits);
    }
    if let Some(bits) = metadata.bits_allocated {
        println!("  Bits Allocated: {}", bits);
    }
    println!("  Samples/Pixel: {}", metadata.samples_per_pixel);
    if let Some(ref photometric) = metadata.photometric_interpretation {
        println!("  Photometric: {}", photometric);
    }
    println!("  Frames: {}", metadata.number_of_frames);
    println!(
        "  Signed: {}",
        if metadata.pixel_representation == 1 {
            "Yes"
        } else {
            "No"
        }
    );
    println!();

    println!("Transfer Syntax:");
    println!("  UID: {}", metadata.transfer_syntax);
    println!(
        "  Name: {}",
        utils::transfer_syntax_name(&metadata.transfer_syntax)
    );
    println!();

    println!(
        "Modality: {}",
        metadata.modality.as_deref().unwrap_or("unknown")
    );

    match AttributeExtractor::new().extract(&container) {
        Ok(attributes) => {
            println!();
            println!("Attributes:");
            println!("{}", serde_json::to_string_pretty(&attributes)?);
        }
        Err(e) => println!("Attributes unavailable: {}", e),
    }

    Ok(())
}

/// Run pack command.
fn run_pack(input: &Path, method: MethodId, base64_wrap: bool, output: &Path) -> Result<()> {
    let bytes =
        fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let payload = CompressedPayload::pack(&bytes, method, base64_wrap);

    fs::write(output, &payload.raw_data)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!(
        "Packed {} bytes into {} chars ({}, encoded: {})",
        bytes.len(),
        payload.raw_data.len(),
        method,
        base64_wrap
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dicom::testing::{mono16, to_part10};

    fn write_fixture(dir: &Path) -> PathBuf {
        let samples: Vec<u16> = (0..20).map(|i| i * 10).collect();
        let path = dir.join("image.dcm");
        fs::write(&path, to_part10(mono16(4, 5, &samples))).unwrap();
        path
    }

    #[test]
    fn test_cli_parses_convert() {
        let cli = Cli::try_parse_from([
            "medimg-convert",
            "convert",
            "-i",
            "payload.txt",
            "-c",
            "lz-uri",
            "--encoded",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Convert { ref compression, encoded: true, output: None, .. } if compression == "lz-uri"
        ));
    }

    #[test]
    fn test_pack_then_convert() {
        let dir = tempfile::tempdir().unwrap();
        let dicom = write_fixture(dir.path());
        let payload = dir.path().join("payload.txt");
        let png = dir.path().join("out.png");

        run_pack(&dicom, MethodId::Lz, true, &payload).unwrap();
        run_convert(&payload, "lz".into(), true, Some(&png), true).unwrap();

        let image = image::open(&png).unwrap();
        assert_eq!((image.width(), image.height()), (5, 4));
    }

    #[test]
    fn test_handle_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let dicom = fs::read(write_fixture(dir.path())).unwrap();
        let payload = CompressedPayload::pack(&dicom, MethodId::LzUri, true);

        let request = dir.path().join("request.json");
        fs::write(
            &request,
            serde_json::json!({
                "compression": payload.method,
                "image": payload.raw_data,
                "encoded": true,
            })
            .to_string(),
        )
        .unwrap();

        let config_path = dir.path().join("service.toml");
        fs::write(&config_path, "access_token = \"secret\"\n").unwrap();
        let config = load_config(Some(&config_path)).unwrap();
        assert_eq!(config.token(), Some("secret"));

        let response = handle_request_file(&request, Some("Bearer secret"), &config).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body["attributes"]["image_size"], serde_json::json!([5, 4]));

        let response = handle_request_file(&request, Some("Bearer wrong"), &config).unwrap();
        assert_eq!(response.status, 403);

        let overridden = config.with_token_override(Some("rotated".into()));
        let response = handle_request_file(&request, Some("Bearer secret"), &overridden).unwrap();
        assert_eq!(response.status, 403);
        let response = handle_request_file(&request, Some("Bearer rotated"), &overridden).unwrap();
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_raw_pack_then_convert() {
        let dir = tempfile::tempdir().unwrap();
        let dicom = write_fixture(dir.path());
        let payload = dir.path().join("payload.txt");

        run_pack(&dicom, MethodId::Lz, false, &payload).unwrap();
        run_convert(&payload, "lz".into(), false, None, true).unwrap();
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
        assert!(load_config(None).unwrap().token().is_none());
    }

    #[test]
    fn test_info_and_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let dicom = write_fixture(dir.path());
        assert!(run_info(&dicom, true).is_ok());
        assert!(run_info(&dir.path().join("absent.dcm"), true).is_err());
    }
}
