// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod ocr;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Adaptive OCR CLI
#[derive(Parser, Debug)]
#[command(name = "adaptive-ocr-cli")]
#[command(version)]
#[command(about = "Run adaptive OCR on document photos from the command line", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full pipeline and print the result as JSON
    Scan(ocr::ScanArgs),

    /// Print image metrics and the preprocessing strategy (no models needed)
    Analyze(ocr::AnalyzeArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Scan(args) => ocr::scan(args).await,
        Commands::Analyze(args) => ocr::analyze(args).await,
    }
}
