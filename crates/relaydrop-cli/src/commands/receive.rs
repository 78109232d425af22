//! Receive command implementation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use relaydrop_core::bundle;
use relaydrop_core::payload::{format_size, sanitize_file_name};
use relaydrop_core::qr;
use relaydrop_core::reassembly::CompletionPolicy;
use relaydrop_core::session::{CancelSource, ReceiveOutcome, ReceiverSession};

use super::{with_hint, ReceiveArgs};
use crate::ui;

/// Run the receive command.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let config = super::load_config();

    // Validate before touching the network.
    let code = qr::parse_code_or_link(args.code.trim()).map_err(with_hint)?;

    let policy = if args.strict {
        CompletionPolicy::Strict
    } else {
        config.transfer.completion
    };
    let output_dir = args
        .output
        .clone()
        .or_else(|| config.receive.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let link = super::connect_relay(args.relay, &config).await?;
    let mut session = ReceiverSession::new(link, policy);
    session.join(code.as_str()).await.map_err(with_hint)?;

    println!();
    println!("  Joined room {}. Waiting for the sender... (Ctrl-C to cancel)", code);
    println!();

    let handle = session.handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = handle.cancel().await {
                tracing::warn!("Failed to cancel: {}", e);
            }
        }
    });
    let progress = tokio::spawn(ui::display_progress(session.subscribe(), "Receiving"));

    let result = session.run().await;

    ctrl_c.abort();
    progress.abort();
    eprintln!();

    match result.map_err(with_hint)? {
        ReceiveOutcome::Delivered(payload) => {
            if !payload.is_whole() {
                eprintln!(
                    "  Warning: {} chunk(s) never arrived; the file is incomplete.",
                    payload.missing_count
                );
            }

            let path = save_payload(&output_dir, &payload.name, &payload.bytes).await?;
            println!(
                "  Saved {} ({})",
                path.display(),
                format_size(payload.bytes.len() as u64)
            );

            if payload.name.ends_with(".zip") {
                if let Ok(entries) = bundle::archive_entries(&payload.bytes) {
                    for entry in entries {
                        println!("    {}", entry);
                    }
                }
            }
            Ok(())
        }
        ReceiveOutcome::Incomplete {
            name,
            missing_count,
            ..
        } => bail!(
            "{} arrived with {} missing chunk(s) and was discarded.",
            name,
            missing_count
        ),
        ReceiveOutcome::Canceled(CancelSource::Local) => bail!("Transfer canceled."),
        ReceiveOutcome::Canceled(CancelSource::Peer) => bail!("The sender canceled the transfer."),
    }
}

/// Write `bytes` into `dir` under the sanitized `name`, never overwriting.
async fn save_payload(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let path = unique_path(dir, &sanitize_file_name(name));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    (2..)
        .map(|n| dir.join(format!("{stem} ({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_path() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(unique_path(dir.path(), "a.txt"), dir.path().join("a.txt"));

        std::fs::write(dir.path().join("a.txt"), b"1").unwrap();
        assert_eq!(unique_path(dir.path(), "a.txt"), dir.path().join("a (2).txt"));

        std::fs::write(dir.path().join("a (2).txt"), b"2").unwrap();
        assert_eq!(unique_path(dir.path(), "a.txt"), dir.path().join("a (3).txt"));
    }

    #[tokio::test]
    async fn test_save_payload_sanitizes_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_payload(dir.path(), "../../etc/passwd", b"x").await.unwrap();
        assert_eq!(path, dir.path().join("passwd"));
        assert_eq!(std::fs::read(path).unwrap(), b"x");
    }
}
