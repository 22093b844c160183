//! A host talking to a scripted controller over an in-memory link.
//!
//! Run with: cargo run --example loopback

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use h4_tokio::metrics::{format_metrics, global_metrics};
use h4_tokio::{H4Config, H4Host, RxEvent, StreamTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (near, far) = tokio::io::duplex(1024);

    let controller = tokio::spawn(async move {
        let mut link = far;

        // Expect HCI_Reset from the host.
        let mut cmd = [0u8; 4];
        link.read_exact(&mut cmd).await.unwrap();
        assert_eq!(cmd[..3], [0x01, 0x03, 0x0c]);

        // Complete it, then produce some traffic.
        link.write_all(&[0x04, 0x0e, 0x04, 0x01, 0x03, 0x0c, 0x00])
            .await
            .unwrap();
        for rssi in [0xc8u8, 0xbe] {
            link.write_all(&[0x04, 0x3e, 0x02, 0x02, rssi]).await.unwrap();
        }
        link.write_all(&[0x02, 0x10, 0x00, 0x03, 0x00, 0x68, 0x69, 0x21])
            .await
            .unwrap();
    });

    let mut host = H4Host::open(StreamTransport::from_stream(near), H4Config::central())?;
    host.send_command(0x0c03, &[]).await?; // HCI_Reset

    for _ in 0..4 {
        match host.recv().await.expect("link closed") {
            RxEvent::Packet(pkt) => println!("{:?} packet: {:02x?}", pkt.kind, &pkt.buf[..]),
            RxEvent::Fatal(err) => {
                eprintln!("link failed: {err}");
                break;
            }
        }
    }

    controller.await?;
    println!("{}", format_metrics(&global_metrics().snapshot()));
    Ok(())
}
