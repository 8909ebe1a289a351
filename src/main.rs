use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fastq_demux::{
    filter_paired, filter_single, DemuxConfig, Demultiplexer, FilterConfig, QualityEncoding,
    R2Barcodes,
};
use log::info;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Report progress while processing
    #[arg(short = 'v', long, global = true, default_value_t = false)]
    verbose: bool,

    /// Write a per-read decision log into the output directory
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// Reads between progress messages
    #[arg(long, global = true, default_value_t = 100_000)]
    progress_interval: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Split reads into per-sample files by leading barcode
    Demux {
        /// Input FASTQ/FASTA file (R1 when paired)
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Reverse reads for paired-end input
        #[arg(long)]
        r2: Option<PathBuf>,

        /// Mapping file (.csv or .txt) with SampleID and BarcodeSequence columns
        #[arg(short = 'm', long)]
        mapping: PathBuf,

        /// Output directory
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Allowed barcode edits (0 or 1)
        #[arg(long, default_value_t = 0)]
        mismatch: usize,

        /// Which barcodes to look for at the start of R2
        #[arg(long, value_enum, default_value_t = R2Mode::Same)]
        r2_barcodes: R2Mode,

        /// Accept pairs whose mate ids differ
        #[arg(long, default_value_t = false)]
        lenient_pairing: bool,

        /// Gzip the output files
        #[arg(short = 'z', long, default_value_t = false)]
        compress: bool,
    },
    /// Keep reads whose expected error count is at most maxEE
    Filter {
        /// Input FASTQ file (R1 when paired)
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Reverse reads for paired-end input
        #[arg(long)]
        r2: Option<PathBuf>,

        /// Output directory
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Maximum expected errors per read
        #[arg(long, default_value_t = 1.0)]
        max_ee: f64,

        /// Quality encoding; detected from the input when omitted
        #[arg(long, value_enum)]
        encoding: Option<EncodingArg>,

        /// Reads inspected for encoding detection (0 = whole file)
        #[arg(long, default_value_t = 10_000)]
        detect_reads: usize,

        /// Accept pairs whose mate ids differ
        #[arg(long, default_value_t = false)]
        lenient_pairing: bool,

        /// Gzip the output files
        #[arg(short = 'z', long, default_value_t = false)]
        compress: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum R2Mode {
    None,
    Same,
    ReverseComplement,
}

impl From<R2Mode> for R2Barcodes {
    fn from(mode: R2Mode) -> Self {
        match mode {
            R2Mode::None => R2Barcodes::None,
            R2Mode::Same => R2Barcodes::Same,
            R2Mode::ReverseComplement => R2Barcodes::ReverseComplement,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EncodingArg {
    Phred33,
    Phred64,
}

impl From<EncodingArg> for QualityEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Phred33 => QualityEncoding::Phred33,
            EncodingArg::Phred64 => QualityEncoding::Phred64,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let start = Instant::now();

    match cli.command {
        Commands::Demux {
            input,
            r2,
            mapping,
            output,
            mismatch,
            r2_barcodes,
            lenient_pairing,
            compress,
        } => {
            let config = DemuxConfig::new()
                .mismatch(mismatch)
                .r2_barcodes(r2_barcodes.into())
                .strict_pairing(!lenient_pairing)
                .compress(compress)
                .verbose(cli.verbose)
                .debug(cli.debug)
                .progress_interval(cli.progress_interval);

            let demux = Demultiplexer::from_mapping_file(&mapping, config)
                .with_context(|| format!("Failed to load barcodes from {}", mapping.display()))?;

            match r2 {
                Some(r2) => {
                    info!("Demultiplexing pairs {} + {}", input.display(), r2.display());
                    let stats = demux
                        .demultiplex_paired(&input, &r2, &output)
                        .context("Paired-end demultiplexing failed")?;
                    stats.print_summary();
                }
                None => {
                    info!("Demultiplexing {}", input.display());
                    let stats = demux
                        .demultiplex_single(&input, &output)
                        .context("Demultiplexing failed")?;
                    stats.print_summary();
                }
            }
        }
        Commands::Filter {
            input,
            r2,
            output,
            max_ee,
            encoding,
            detect_reads,
            lenient_pairing,
            compress,
        } => {
            let config = FilterConfig::new()
                .max_ee(max_ee)
                .quality_encoding(encoding.map(QualityEncoding::from))
                .encoding_sample_size(detect_reads)
                .strict_pairing(!lenient_pairing)
                .compress(compress)
                .verbose(cli.verbose)
                .debug(cli.debug)
                .progress_interval(cli.progress_interval);

            match r2 {
                Some(r2) => {
                    let stats = filter_paired(&input, &r2, &output, &config)
                        .context("Paired-end filtering failed")?;
                    stats.print_summary();
                }
                None => {
                    let stats = filter_single(&input, &output, &config).context("Filtering failed")?;
                    stats.print_summary();
                }
            }
        }
    }

    let elapsed = start.elapsed();
    println!("\nProcessing time: {:.3} seconds", elapsed.as_secs_f64());

    Ok(())
}
