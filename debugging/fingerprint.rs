//! Print the idempotency fingerprint for a request body.
//! Reads the body from the file given as the first argument, or stdin.

use anyhow::{Context, Result};
use std::io::Read;
use webhook_normalizer::idempotency::{canonicalize, Fingerprint};

fn main() -> Result<()> {
    let body = match std::env::args().nth(1) {
        Some(path) => std::fs::read(&path).with_context(|| format!("Failed to read {}", path))?,
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read body from stdin")?;
            buf
        }
    };

    println!("{}", Fingerprint::of(&body));
    println!("{}", String::from_utf8_lossy(&canonicalize(&body)));
    Ok(())
}
