//! Send command implementation.

use anyhow::{bail, Result};

use relaydrop_core::payload::{format_size, NamedBlob};
use relaydrop_core::qr;
use relaydrop_core::session::{CancelSource, SendOutcome, SenderSession};

use super::{with_hint, SendArgs};
use crate::ui::{self, CodeBox};

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let config = super::load_config();

    let mut files = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        files.push(NamedBlob::from_path(path).await.map_err(with_hint)?);
    }
    let total_size: u64 = files.iter().map(|f| f.size).sum();

    if !args.quiet {
        println!();
        println!("RelayDrop v{}", relaydrop_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Sending {} file(s) ({})", files.len(), format_size(total_size));
        for file in &files {
            println!("    {}", file.name);
        }
        println!();
    }

    let link = super::connect_relay(args.relay, &config).await?;
    let mut session = SenderSession::new(link, files);
    let code = session.start().await.map_err(with_hint)?;

    if args.quiet {
        println!("{}", code);
    } else {
        let share_link = qr::share_link(&config.share.base_url, &code);
        CodeBox::new(code.as_str()).with_link(&share_link).display();
        println!();
        if !args.no_qr {
            match qr::generate_ascii(&share_link) {
                Ok(qr) => println!("{}", qr),
                Err(e) => tracing::warn!("Could not render QR code: {}", e),
            }
        }
        if let Some(payload) = session.payload() {
            println!("  Payload: {} ({})", payload.name(), format_size(payload.byte_length()));
        }
        println!("  Waiting for the receiver... (Ctrl-C to cancel)");
        println!();
    }

    let handle = session.handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if let Err(e) = handle.cancel().await {
                tracing::warn!("Failed to cancel: {}", e);
            }
        }
    });

    let progress = (!args.quiet).then(|| tokio::spawn(ui::display_progress(session.subscribe(), "Sending")));

    let result = session.run().await;

    ctrl_c.abort();
    if let Some(progress) = progress {
        progress.abort();
        eprintln!();
    }

    match result.map_err(with_hint)? {
        SendOutcome::Completed {
            payload_name,
            chunks,
        } => {
            if !args.quiet {
                println!("  Sent {} in {} chunk(s).", payload_name, chunks);
            }
            Ok(())
        }
        SendOutcome::Canceled(CancelSource::Local) => bail!("Transfer canceled."),
        SendOutcome::Canceled(CancelSource::Peer) => bail!("The receiver canceled the transfer."),
    }
}
