// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! envelope-client - talk to an envelope gateway, or open its objects offline.
//!
//! Usage:
//!   envelope-client upload -u URL -f FILE [-H 'Name: value']...
//!   envelope-client decrypt --object FILE.obj
//!   envelope-client decrypt --metadata META.json [--body BODY] < BODY

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use envelope_gateway::{
    client::{self, ClientError, DecryptKeys},
    config::master_key_source,
    crypto::{KeySource, Passphrase, RecipientSecret},
    storage::read_object_file,
};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "envelope-client")]
#[command(version, about = "Upload to an envelope gateway or decrypt its objects offline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and print response headers
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file as a multipart form
    Upload {
        /// Gateway URL, including the object path
        #[arg(short, long)]
        url: String,

        /// File to upload
        #[arg(short, long)]
        file: PathBuf,

        /// Request header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Decrypt an object copied out of a blob store
    Decrypt {
        /// Filesystem-backend object file (.obj)
        #[arg(long, conflicts_with_all = ["metadata", "body"])]
        object: Option<PathBuf>,

        /// Metadata bag as JSON, flat or a Cloud Storage object resource
        #[arg(long, required_unless_present = "object")]
        metadata: Option<PathBuf>,

        /// Stored body; read from stdin when omitted
        #[arg(long)]
        body: Option<PathBuf>,

        /// Master key file; defaults to MASTER_KEY or MASTER_KEY_FILE
        #[arg(long)]
        master_key_file: Option<PathBuf>,

        /// Recipient private key (PEM) for pubkey objects
        #[arg(long)]
        private_key: Option<PathBuf>,

        /// Passphrase for symmetric objects
        #[arg(long)]
        passphrase: Option<String>,

        /// Write plaintext here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let result = match cli.command {
        Commands::Upload { url, file, headers } => upload(url, file, headers, cli.verbose).await,
        Commands::Decrypt {
            object,
            metadata,
            body,
            master_key_file,
            private_key,
            passphrase,
            out,
        } => decrypt(
            object,
            metadata,
            body,
            master_key_file,
            private_key,
            passphrase,
            out,
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "envelope-client failed");
            ExitCode::FAILURE
        }
    }
}

async fn upload(
    url: String,
    file: PathBuf,
    headers: Vec<String>,
    verbose: bool,
) -> Result<ExitCode, ClientError> {
    let headers = client::header_map(headers.iter().map(String::as_str))?;
    let outcome = client::upload_file(&reqwest::Client::new(), &url, &file, headers).await?;

    println!("{}", outcome.status);
    if verbose {
        for (name, value) in &outcome.headers {
            println!("{name}: {}", String::from_utf8_lossy(value.as_bytes()));
        }
    }
    println!("{}", outcome.body);

    Ok(if outcome.status.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn decrypt(
    object: Option<PathBuf>,
    metadata: Option<PathBuf>,
    body: Option<PathBuf>,
    master_key_file: Option<PathBuf>,
    private_key: Option<PathBuf>,
    passphrase: Option<String>,
    out: Option<PathBuf>,
) -> Result<ExitCode, ClientError> {
    let (metadata, body) = match (object, metadata) {
        (Some(path), _) => {
            let object = read_object_file(&path)?;
            (object.metadata, object.body)
        }
        (None, Some(path)) => {
            let text = String::from_utf8_lossy(&client::read(&path)?).into_owned();
            let body = match body {
                Some(body) => client::read(&body)?,
                None => read_stdin()?,
            };
            (client::parse_metadata(&text)?, body)
        }
        // Rejected by clap before we get here.
        (None, None) => return Ok(ExitCode::FAILURE),
    };

    let master_key = match master_key_file {
        Some(path) => KeySource::File(path),
        None => master_key_source(|name| std::env::var(name).ok())?,
    };
    let keys = DecryptKeys {
        master_key,
        recipient: private_key
            .as_deref()
            .map(RecipientSecret::load)
            .transpose()?,
        passphrase: passphrase.and_then(Passphrase::new),
    };

    let plaintext = client::decrypt_stored(&metadata, body, keys)?;
    write_output(out, &plaintext)?;
    Ok(ExitCode::SUCCESS)
}

fn read_stdin() -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    io::stdin()
        .read_to_end(&mut body)
        .map_err(|source| ClientError::Read {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
    Ok(body)
}

fn write_output(out: Option<PathBuf>, plaintext: &[u8]) -> Result<(), ClientError> {
    let written = match &out {
        Some(path) => std::fs::write(path, plaintext),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(plaintext).and_then(|()| stdout.flush())
        }
    };
    written.map_err(|source| ClientError::Write {
        path: out.unwrap_or_else(|| PathBuf::from("<stdout>")),
        source,
    })
}
