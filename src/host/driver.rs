//! The H4 host handle: lifecycle, delivery queue, and TX framing

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, trace};

use crate::alloc::HostPools;
use crate::common::{constants, H4Stats, PacketKind};
use crate::config::H4Config;
use crate::error::{H4Error, Result};
use crate::host::rx::{run_rx_loop, RxEvent, SharedStats};
use crate::metrics::global_metrics;
use crate::pool::PacketBuf;
use crate::transport::Transport;

/// An H4 host endpoint over one transport.
///
/// Owns the buffer pools and the background receive task. Inbound packets
/// arrive through [`H4Host::recv`] in stream order; the send methods frame
/// outbound packets and hold the write channel until the transport confirms
/// completion, so at most one write is ever outstanding.
pub struct H4Host<T: Transport> {
    transport: Arc<T>,
    pools: Arc<HostPools>,
    stats: Arc<SharedStats>,
    config: H4Config,
    events: mpsc::Receiver<RxEvent>,
    rx_task: Option<tokio::task::JoinHandle<()>>,
    write_gate: Mutex<()>,
}

impl<T: Transport> H4Host<T> {
    /// Validate the configuration, build the pools, and start the receive
    /// task. Must be called from within a tokio runtime.
    pub fn open(transport: T, config: H4Config) -> Result<Self> {
        config.validate()?;

        let transport = Arc::new(transport);
        let pools = Arc::new(HostPools::new(&config));
        let stats = Arc::new(SharedStats::default());
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_depth);

        let rx_task = tokio::spawn(run_rx_loop(
            Arc::clone(&transport),
            Arc::clone(&pools),
            Arc::clone(&stats),
            event_tx,
            config.iso_enabled,
        ));

        info!(
            evt_bufs = config.evt_buf_count,
            acl_bufs = config.acl_buf_count,
            discardable_bufs = config.discardable_buf_count,
            iso = config.iso_enabled,
            "H4 host opened"
        );

        Ok(Self {
            transport,
            pools,
            stats,
            config,
            events: event_rx,
            rx_task: Some(rx_task),
            write_gate: Mutex::new(()),
        })
    }

    /// Receive the next inbound event, in stream order. `None` after
    /// [`H4Host::close`] once the queue has drained.
    pub async fn recv(&mut self) -> Option<RxEvent> {
        self.events.recv().await
    }

    /// Send an HCI command.
    ///
    /// The response buffer is reserved before the command goes on the wire,
    /// so the matching Command Complete / Command Status can always be
    /// received without touching the event pool.
    pub async fn send_command(&self, opcode: u16, params: &[u8]) -> Result<()> {
        if params.len() > u8::MAX as usize {
            return Err(H4Error::config("command parameters exceed 255 bytes"));
        }

        self.pools
            .command_slot()
            .deposit(PacketBuf::detached(self.config.evt_buf_size));

        let mut frame =
            BytesMut::with_capacity(constants::H4_HDR_SIZE + constants::CMD_HDR_SIZE + params.len());
        frame.put_u8(constants::H4_CMD);
        frame.put_u16_le(opcode);
        frame.put_u8(params.len() as u8);
        frame.extend_from_slice(params);

        self.write(&frame).await?;
        global_metrics().command_sent();
        trace!(opcode, param_len = params.len(), "command sent");
        Ok(())
    }

    /// Send an ACL data packet to the controller.
    pub async fn send_acl(&self, handle: u16, payload: &[u8]) -> Result<()> {
        if payload.len() > u16::MAX as usize {
            return Err(H4Error::config("ACL payload exceeds 65535 bytes"));
        }

        let mut frame =
            BytesMut::with_capacity(constants::H4_HDR_SIZE + constants::ACL_HDR_SIZE + payload.len());
        frame.put_u8(constants::H4_ACL);
        frame.put_u16_le(handle);
        frame.put_u16_le(payload.len() as u16);
        frame.extend_from_slice(payload);

        self.write(&frame).await?;
        trace!(handle, len = payload.len(), "ACL data sent");
        Ok(())
    }

    /// Send a pre-framed HCI packet, prefixing only the H4 type byte.
    pub async fn send_packet(&self, kind: PacketKind, packet: &[u8]) -> Result<()> {
        let mut frame = BytesMut::with_capacity(constants::H4_HDR_SIZE + packet.len());
        frame.put_u8(kind.as_wire());
        frame.extend_from_slice(packet);

        self.write(&frame).await
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        // One write in flight at a time; the transport confirms completion
        // before the gate reopens.
        let _gate = self.write_gate.lock().await;
        self.transport.write_from(frame).await?;

        self.stats
            .bytes_sent
            .fetch_add(frame.len() as u64, Ordering::Relaxed);
        global_metrics().bytes_written(frame.len());
        Ok(())
    }

    /// Snapshot of this host's counters.
    pub fn stats(&self) -> H4Stats {
        self.stats.snapshot()
    }

    /// The pool set backing this host, for inspection.
    pub fn pools(&self) -> &HostPools {
        &self.pools
    }

    /// Restart the receive path after a fatal error.
    ///
    /// Spawns a fresh parser on the existing transport. No attempt is made
    /// to find a frame boundary in the byte stream; the caller is expected
    /// to have reset the controller first.
    pub fn restart(&mut self) {
        if let Some(task) = self.rx_task.take() {
            task.abort();
        }

        let (event_tx, event_rx) = mpsc::channel(self.config.event_queue_depth);
        self.events = event_rx;
        self.rx_task = Some(tokio::spawn(run_rx_loop(
            Arc::clone(&self.transport),
            Arc::clone(&self.pools),
            Arc::clone(&self.stats),
            event_tx,
            self.config.iso_enabled,
        )));

        info!("H4 receive path restarted");
    }

    /// Stop the receive task. Queued events remain readable via
    /// [`H4Host::recv`] until drained.
    pub fn close(&mut self) {
        if let Some(task) = self.rx_task.take() {
            task.abort();
            trace!("H4 host closed");
        }
    }
}

impl<T: Transport> Drop for H4Host<T> {
    fn drop(&mut self) {
        self.close();
    }
}
