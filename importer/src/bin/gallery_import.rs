#![deny(warnings)]

use {
    anyhow::{anyhow, Result},
    gallery_importer::{Layout, Options},
    std::{env, path::PathBuf},
    structopt::StructOpt,
    tracing::error,
};

#[derive(StructOpt, Debug)]
#[structopt(name = "gallery-import", about = "Photo gallery import tool")]
enum Command {
    /// Import new photos from a directory into the gallery
    Import {
        #[structopt(flatten)]
        options: Options,

        /// Directory containing JPEG and HEIC files to import (not searched recursively)
        #[structopt(parse(from_os_str))]
        source_directory: PathBuf,
    },

    /// Check the gallery manifest and the files it refers to for consistency
    Verify {
        /// Gallery root directory
        #[structopt(long, default_value = ".", parse(from_os_str))]
        root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }

    pretty_env_logger::init_timed();

    match Command::from_args() {
        Command::Import {
            options,
            source_directory,
        } => {
            let summary = options.importer()?.import(&source_directory).await?;

            println!("{}", summary);
        }

        Command::Verify { root } => {
            let violations = gallery_importer::verify(&Layout::new(&root)).await?;

            for violation in &violations {
                error!("{}", violation);
            }

            if !violations.is_empty() {
                return Err(anyhow!("found {} violation(s)", violations.len()));
            }

            println!("manifest is consistent");
        }
    }

    Ok(())
}
