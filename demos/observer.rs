//! A passive scanner under advertising-report flood.
//!
//! The demo holds every delivered report to starve the discardable pool on
//! purpose, so the lossy drop path is visible in the final counters.
//!
//! Run with: cargo run --example observer

use tokio::io::AsyncWriteExt;

use h4_tokio::{H4Config, H4Host, RxEvent, StreamTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (near, far) = tokio::io::duplex(4096);

    let flood = tokio::spawn(async move {
        let mut link = far;
        for seq in 0..64u8 {
            link.write_all(&[0x04, 0x3e, 0x03, 0x02, 0x01, seq])
                .await
                .unwrap();
        }
        // A generic event marks the end of the flood.
        link.write_all(&[0x04, 0x05, 0x04, 0x00, 0x10, 0x00, 0x13])
            .await
            .unwrap();
    });

    let config = H4Config::observer().discardable_buffers(4, 64);
    let mut host = H4Host::open(StreamTransport::from_stream(near), config)?;

    let mut kept = Vec::new();
    loop {
        match host.recv().await.expect("link closed") {
            RxEvent::Packet(pkt) if pkt.buf[0] == 0x3e => kept.push(pkt),
            RxEvent::Packet(_) => break,
            RxEvent::Fatal(err) => {
                eprintln!("link failed: {err}");
                break;
            }
        }
    }

    let stats = host.stats();
    println!(
        "kept {} advertising reports, dropped {} under pressure",
        kept.len(),
        stats.events_discarded
    );
    flood.await?;
    Ok(())
}
