//! The receive task: parse, allocate, assemble, deliver
//!
//! One task owns the parser and runs the whole inbound path, so exactly one
//! transport read is outstanding at any time and packets reach the upper
//! layer in arrival order. The task suspends in exactly two places: waiting
//! for stream bytes and waiting for a pool release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use crate::alloc::{AllocResult, HostPools};
use crate::common::{constants, Classification, H4Stats, PacketKind};
use crate::error::H4Error;
use crate::metrics::global_metrics;
use crate::parser::{ParseStep, Parser, MAX_PREFIX};
use crate::pool::PacketBuf;
use crate::transport::Transport;

/// A fully assembled inbound packet.
///
/// `buf` holds the HCI packet proper (header plus parameters); the H4 type
/// byte travels as `kind`. Dropping the packet releases its buffer back to
/// the pool it came from.
#[derive(Debug)]
pub struct H4Packet {
    pub kind: PacketKind,
    pub buf: PacketBuf,
}

/// What the receive path delivers to the upper layer.
#[derive(Debug)]
pub enum RxEvent {
    /// A packet, in stream order.
    Packet(H4Packet),
    /// Parsing cannot continue. Delivered once; the receive task has halted
    /// and only [`H4Host::restart`](super::H4Host::restart) brings it back.
    Fatal(H4Error),
}

/// Counters shared between the receive task and the host handle.
#[derive(Debug, Default)]
pub(crate) struct SharedStats {
    pub packets_delivered: AtomicU64,
    pub events_discarded: AtomicU64,
    pub alloc_deferred: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl SharedStats {
    pub fn snapshot(&self) -> H4Stats {
        H4Stats {
            packets_delivered: self.packets_delivered.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            alloc_deferred: self.alloc_deferred.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Run the receive loop until the upper layer goes away or a fatal error
/// halts parsing.
pub(crate) async fn run_rx_loop<T: Transport>(
    transport: Arc<T>,
    pools: Arc<HostPools>,
    stats: Arc<SharedStats>,
    events: mpsc::Sender<RxEvent>,
    iso_enabled: bool,
) {
    let mut parser = Parser::new(iso_enabled);

    loop {
        let step = async {
            let classification =
                read_until_classified(transport.as_ref(), &mut parser, &stats).await?;
            assemble(
                transport.as_ref(),
                &pools,
                &stats,
                &events,
                &mut parser,
                classification,
            )
            .await
        }
        .await;

        match step {
            Ok(()) => {}
            Err(H4Error::Closed) => {
                trace!("upper layer gone, receive task stopping");
                return;
            }
            Err(err) => {
                error!(error = %err, "receive path halted");
                global_metrics().fatal_error();
                let _ = events.send(RxEvent::Fatal(err)).await;
                return;
            }
        }
    }
}

/// Pull prefix bytes until the parser has a full classification.
async fn read_until_classified<T: Transport + ?Sized>(
    transport: &T,
    parser: &mut Parser,
    stats: &SharedStats,
) -> Result<Classification, H4Error> {
    loop {
        let need = {
            let mut nothing: &[u8] = &[];
            match parser.feed(&mut nothing) {
                ParseStep::NeedMore(n) => n,
                ParseStep::Classified(c) => return Ok(c),
                ParseStep::Fatal(err) => return Err(err),
            }
        };

        let mut chunk = [0u8; MAX_PREFIX];
        let dst = &mut chunk[..need];
        transport.read_into(dst).await?;
        stats.bytes_received.fetch_add(need as u64, Ordering::Relaxed);

        let mut fed: &[u8] = dst;
        match parser.feed(&mut fed) {
            ParseStep::NeedMore(_) => {}
            ParseStep::Classified(c) => return Ok(c),
            ParseStep::Fatal(err) => return Err(err),
        }
    }
}

/// Pick a destination buffer, stream the packet tail into it, and deliver.
async fn assemble<T: Transport + ?Sized>(
    transport: &T,
    pools: &HostPools,
    stats: &SharedStats,
    events: &mpsc::Sender<RxEvent>,
    parser: &mut Parser,
    classification: Classification,
) -> Result<(), H4Error> {
    loop {
        match pools.allocate(&classification.class)? {
            AllocResult::Granted(mut buf) => {
                // The prefix was peeked, not consumed: copy it over minus
                // the type byte, which travels as the packet kind.
                buf.extend_from_slice(&parser.prefix()[constants::H4_HDR_SIZE..]);

                let rest = classification.remaining();
                if rest > 0 {
                    transport.read_into(buf.tail_mut(rest)).await?;
                    stats.bytes_received.fetch_add(rest as u64, Ordering::Relaxed);
                }

                stats.packets_delivered.fetch_add(1, Ordering::Relaxed);
                global_metrics().packet_delivered(classification.total_len);
                trace!(
                    kind = ?classification.kind,
                    len = buf.len(),
                    "packet assembled"
                );

                let packet = H4Packet {
                    kind: classification.kind,
                    buf,
                };
                if events.send(RxEvent::Packet(packet)).await.is_err() {
                    return Err(H4Error::Closed);
                }

                parser.reset();
                return Ok(());
            }

            AllocResult::Deferred(token) => {
                stats.alloc_deferred.fetch_add(1, Ordering::Relaxed);
                global_metrics().alloc_deferred();
                debug!(class = ?classification.class, "pool empty, waiting for a release");
                token.released().await;
            }

            AllocResult::Dropped => {
                // The stream has to stay framed, so the body is read and
                // thrown away.
                drain(transport, stats, classification.remaining()).await?;

                stats.events_discarded.fetch_add(1, Ordering::Relaxed);
                global_metrics().event_discarded(classification.total_len);
                debug!(total_len = classification.total_len, "discardable event dropped");

                parser.reset();
                return Ok(());
            }
        }
    }
}

/// Read and discard `remaining` bytes to keep the stream framed.
async fn drain<T: Transport + ?Sized>(
    transport: &T,
    stats: &SharedStats,
    mut remaining: usize,
) -> Result<(), H4Error> {
    let mut sink = [0u8; 64];
    while remaining > 0 {
        let n = remaining.min(sink.len());
        transport.read_into(&mut sink[..n]).await?;
        stats.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        remaining -= n;
    }
    Ok(())
}
