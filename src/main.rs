//! kbinxml CLI - convert kbin binary XML to XML text and back.
//!
//! The input format is detected from the first bytes of the file. kbin input
//! is written to stdout as UTF-8 XML; anything else is parsed as XML and
//! written to stdout as kbin.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use kbin_xml::{is_binary_xml, DecodeOptions, EncodeOptions, KbinDocument, Node, TextEncoding};

/// Exit status a shell reports for a process killed by SIGPIPE.
const BROKEN_PIPE_EXIT: i32 = 141;

/// kbinxml - convert kbin to XML, or XML to kbin
#[derive(Parser)]
#[command(name = "kbinxml")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input file, kbin or XML
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Decode malformed strings as UTF-8 and prefix illegal node names with '_'
    #[arg(long)]
    convert_illegal: bool,

    /// Text encoding of kbin output
    #[arg(short, long, env = "KBIN_ENCODING", default_value = "shift_jis")]
    encoding: TextEncoding,

    /// Store names as raw bytes instead of packing them
    #[arg(short, long, env = "KBIN_UNCOMPRESSED", value_parser = FalseyValueParser::new())]
    uncompressed: bool,

    /// Print the estimated in-game memory size to stderr
    #[arg(long)]
    mem_size: bool,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let data = fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;

    let output = if is_binary_xml(&data) {
        kbin_to_xml(&cli, &data)?
    } else {
        xml_to_kbin(&cli, &data)?
    };

    let mut stdout = io::stdout().lock();
    match stdout.write_all(&output).and_then(|()| stdout.flush()) {
        Ok(()) => Ok(()),
        // e.g. piped into `head`
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => process::exit(BROKEN_PIPE_EXIT),
        Err(e) => Err(e).context("Failed to write output"),
    }
}

fn kbin_to_xml(cli: &Cli, data: &[u8]) -> Result<Vec<u8>> {
    let options = if cli.convert_illegal {
        DecodeOptions::convert_illegal()
    } else {
        DecodeOptions::default()
    };

    let doc = KbinDocument::from_binary(data, &options).context("Failed to decode kbin")?;
    debug!(encoding = %doc.encoding, compressed = doc.compressed, "decoded kbin");
    report_mem_size(cli, &doc)?;

    let xml = doc.to_xml_string().context("Failed to convert to XML")?;
    Ok(xml.into_bytes())
}

fn xml_to_kbin(cli: &Cli, data: &[u8]) -> Result<Vec<u8>> {
    let root = Node::from_xml_bytes(data).context("Failed to parse XML")?;
    let options = EncodeOptions::new()
        .encoding(cli.encoding)
        .compressed(!cli.uncompressed);

    let doc = KbinDocument::with_options(root, &options);
    report_mem_size(cli, &doc)?;

    doc.to_binary().context("Failed to encode kbin")
}

fn report_mem_size(cli: &Cli, doc: &KbinDocument) -> Result<()> {
    if cli.mem_size {
        let size = doc.mem_size().context("Failed to estimate memory size")?;
        eprintln!("{}", size);
    }
    Ok(())
}
