//! `upload-iso` command - stream a local ISO into the ISO pool.

use std::fs::File;

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::{
    eyre::{eyre, Context as _},
    Result,
};

use super::CliContext;
use crate::upload;

/// Options for uploading an ISO image.
#[derive(Debug, Parser)]
pub struct UploadIsoOpts {
    /// Local ISO file to upload
    pub file: Utf8PathBuf,

    /// Volume name to store it under (defaults to the file name)
    #[clap(long)]
    pub name: Option<String>,
}

/// Execute the upload-iso command.
pub fn run(ctx: &CliContext, opts: UploadIsoOpts) -> Result<()> {
    let name = match &opts.name {
        Some(name) => name.clone(),
        None => opts
            .file
            .file_name()
            .ok_or_else(|| eyre!("{} has no file name", opts.file))?
            .to_string(),
    };

    let file = File::open(&opts.file).with_context(|| format!("Opening {}", opts.file))?;
    let size = file.metadata()?.len();

    let conn = ctx.connect()?;
    let volume = upload::upload(&conn, &name, size, file)?;
    println!("Uploaded {} ({} bytes) to {}", name, size, volume.path);
    Ok(())
}
