//! IO task for the uBeacon UART protocol.
//!
//! One tokio task owns the transport exclusively. It writes request frames,
//! reads and splits inbound lines, routes event frames to the event decoder,
//! matches responses to pending requests through the [`Correlator`], and
//! fires request timeouts and the ready settle delay.
//!
//! The task also keeps the [`DeviceData`] snapshot: responses to the identity
//! opcodes update it, and the version gate reads it before anything is sent.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use ubeacon_core::codec::version_greater_than_or_equal;
use ubeacon_core::error::{Error, Result};
use ubeacon_core::events::{BeaconEvent, EventBus};
use ubeacon_core::transport::Transport;
use ubeacon_core::types::{DeviceData, Response};

use crate::commands::{self as cmd, CommandDescriptor};
use crate::correlator::{Correlator, Fired};
use crate::decode::decode_response;
use crate::events::{DecodedEvent, decode_event};
use crate::protocol::{self, CommandType, DecodeResult, Frame};

/// Default response window for a request.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default delay between the device's ready frame and the ready event.
pub const DEFAULT_READY_SETTLE: Duration = Duration::from_millis(200);

/// How long a single idle read waits before the loop re-checks its channels.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Extra slack on top of the command timeout before the caller gives up on
/// the IO task itself.
const REPLY_MARGIN: Duration = Duration::from_millis(500);

/// Maximum inbound buffer size before reset to prevent unbounded growth.
/// Device lines are well under 100 bytes.
const MAX_BUF: usize = 8192;

/// Configuration for the IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Response window for a single request.
    pub command_timeout: Duration,
    /// Delay before a ready frame is published as [`BeaconEvent::Ready`].
    pub ready_settle: Duration,
    /// Log frames sent and received at `debug` instead of `trace`.
    pub log_traffic: bool,
    /// Log every raw inbound line at `debug`, including discarded preamble.
    pub log_raw_input: bool,
}

impl Default for IoConfig {
    fn default() -> Self {
        IoConfig {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            ready_settle: DEFAULT_READY_SETTLE,
            log_traffic: false,
            log_raw_input: false,
        }
    }
}

/// A request sent from the controller to the IO task.
pub enum Request {
    /// A get or set round trip (or a fire-and-forget action).
    Command {
        descriptor: &'static CommandDescriptor,
        kind: CommandType,
        /// Payload appended after the opcode, already in wire form.
        payload: Option<String>,
        reply: oneshot::Sender<Result<Response>>,
    },
    /// Snapshot of the identity learned so far.
    DeviceData { reply: oneshot::Sender<DeviceData> },
    /// Discard pending input on the transport and in the line buffer.
    FlushInput { reply: oneshot::Sender<Result<()>> },
    /// Graceful shutdown; returns the transport for recovery.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Handle to the IO task. Stored inside the controller.
pub struct BeaconIo {
    pub cmd_tx: mpsc::Sender<Request>,
    /// Cancellation token for abrupt shutdown.
    pub cancel: CancellationToken,
    pub task: JoinHandle<()>,
    command_timeout: Duration,
}

impl BeaconIo {
    /// Send one command and wait for its outcome.
    ///
    /// A request evicted by a newer one on the same opcode resolves with
    /// [`Error::Superseded`].
    pub async fn command(
        &self,
        descriptor: &'static CommandDescriptor,
        kind: CommandType,
        payload: Option<String>,
    ) -> Result<Response> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Command {
                descriptor,
                kind,
                payload,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        let opcode = descriptor.opcode;
        match tokio::time::timeout(self.command_timeout + REPLY_MARGIN, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) if self.cmd_tx.is_closed() => Err(Error::NotConnected),
            Ok(Err(_)) => Err(Error::Superseded { opcode }),
            Err(_) => Err(Error::ResponseTimeout { opcode }),
        }
    }

    /// Identity learned from responses so far.
    pub async fn device_data(&self) -> Result<DeviceData> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::DeviceData { reply: reply_tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)
    }

    /// Drop any unread input.
    pub async fn flush_input(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::FlushInput { reply: reply_tx })
            .await
            .map_err(|_| Error::NotConnected)?;
        reply_rx.await.map_err(|_| Error::NotConnected)?
    }

    /// Shut down the IO task and recover the transport.
    ///
    /// Requests still pending fail with [`Error::NotConnected`].
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Request::Shutdown { reply: reply_tx }).await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

/// Spawn the IO task. Returns the handle for sending commands.
pub fn spawn_io_task(transport: Box<dyn Transport>, config: IoConfig, events: EventBus) -> BeaconIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();
    let command_timeout = config.command_timeout;

    let task = tokio::spawn(io_loop(transport, config, events, cmd_rx, cancel.clone()));

    BeaconIo {
        cmd_tx,
        cancel,
        task,
        command_timeout,
    }
}

/// State owned by the IO loop besides the transport.
struct IoState {
    config: IoConfig,
    events: EventBus,
    correlator: Correlator,
    device: DeviceData,
    inbound: Vec<u8>,
}

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Requests from the controller
/// 3. Fired timers
/// 4. Inbound data
async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    events: EventBus,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut state = IoState {
        correlator: Correlator::new(config.command_timeout),
        config,
        events,
        device: DeviceData::default(),
        inbound: Vec::new(),
    };
    let mut read_buf = [0u8; 256];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("uBeacon IO task cancelled");
                break;
            }

            req = cmd_rx.recv() => {
                match req {
                    Some(Request::Shutdown { reply }) => {
                        debug!("IO task shutdown requested");
                        state.correlator.fail_all(|| Error::NotConnected);
                        let _ = reply.send(transport);
                        return;
                    }
                    Some(req) => handle_request(req, &mut *transport, &mut state).await,
                    None => {
                        debug!("request channel closed, exiting IO task");
                        break;
                    }
                }
            }

            Some(fired) = state.correlator.next_fired(), if state.correlator.has_timers() => {
                if let Fired::Ready(ready) = fired {
                    state.events.publish(BeaconEvent::Ready(ready));
                }
            }

            read = transport.receive(&mut read_buf, IDLE_POLL) => {
                match read {
                    Ok(n) if n > 0 => {
                        state.inbound.extend_from_slice(&read_buf[..n]);
                        if state.inbound.len() > MAX_BUF {
                            warn!(len = state.inbound.len(), "inbound buffer overflow, resetting");
                            state.inbound.clear();
                        } else {
                            process_inbound(&mut state);
                        }
                    }
                    Ok(_) | Err(Error::Timeout) => {}
                    Err(e) => {
                        warn!(error = %e, "transport receive failed");
                        tokio::time::sleep(IDLE_POLL).await;
                    }
                }
            }
        }
    }

    state.correlator.fail_all(|| Error::NotConnected);
}

/// Dispatch a single request.
async fn handle_request(req: Request, transport: &mut dyn Transport, state: &mut IoState) {
    match req {
        Request::Command {
            descriptor,
            kind,
            payload,
            reply,
        } => execute_command(transport, state, descriptor, kind, payload, reply).await,
        Request::DeviceData { reply } => {
            let _ = reply.send(state.device.clone());
        }
        Request::FlushInput { reply } => {
            state.inbound.clear();
            let _ = reply.send(transport.clear_input().await);
        }
        Request::Shutdown { .. } => unreachable!("Shutdown handled in io_loop"),
    }
}

/// Reject a command the device's protocol version does not implement.
fn version_gate(descriptor: &'static CommandDescriptor, device: &DeviceData) -> Result<()> {
    let Some(required) = descriptor.min_version else {
        return Ok(());
    };
    let actual = device.uart_protocol_version.as_deref();
    if version_greater_than_or_equal(actual, Some(required)) {
        Ok(())
    } else {
        Err(Error::VersionUnsupported {
            command: descriptor.name,
            required,
            actual: actual.map(str::to_string),
        })
    }
}

fn log_traffic(config: &IoConfig, direction: &'static str, frame: &str) {
    let frame = frame.trim_end();
    if config.log_traffic {
        debug!(direction, frame, "uart traffic");
    } else {
        trace!(direction, frame, "uart traffic");
    }
}

/// Gate, frame, register and write one command.
async fn execute_command(
    transport: &mut dyn Transport,
    state: &mut IoState,
    descriptor: &'static CommandDescriptor,
    kind: CommandType,
    payload: Option<String>,
    reply: oneshot::Sender<Result<Response>>,
) {
    if let Err(e) = version_gate(descriptor, &state.device) {
        debug!(command = descriptor.name, error = %e, "command rejected");
        let _ = reply.send(Err(e));
        return;
    }

    let opcode = descriptor.opcode;
    let frame = protocol::encode_command(kind, opcode, payload.as_deref().map(str::as_bytes));
    log_traffic(&state.config, "tx", &String::from_utf8_lossy(&frame));

    if !descriptor.expects_response() {
        let result = transport.send(&frame).await.map(|()| Response::None);
        let _ = reply.send(result);
        return;
    }

    let superseded = state.correlator.register(
        opcode,
        frame.clone(),
        Box::new(move |result| {
            let _ = reply.send(result);
        }),
    );
    if superseded {
        debug!(
            command = descriptor.name,
            "replacing request already pending on this opcode"
        );
    }

    if let Err(e) = transport.send(&frame).await {
        warn!(command = descriptor.name, error = %e, "write failed");
        state.correlator.resolve(opcode, Err(e));
    }
}

/// Decode every complete line in the inbound buffer.
///
/// Incomplete data is left in the buffer for the next read.
fn process_inbound(state: &mut IoState) {
    loop {
        match protocol::decode_line(&state.inbound) {
            DecodeResult::Frame {
                frame,
                line,
                consumed,
            } => {
                state.inbound.drain(..consumed);
                if state.config.log_raw_input {
                    debug!(line = %line, "raw input");
                }
                log_traffic(&state.config, "rx", &line);
                dispatch_frame(state, frame);
            }
            DecodeResult::Discarded { line, consumed } => {
                state.inbound.drain(..consumed);
                if state.config.log_raw_input {
                    debug!(line = %line, "raw input without frame, discarding");
                } else {
                    trace!(line = %line, "discarding line without frame");
                }
            }
            DecodeResult::Incomplete => break,
        }
    }
}

/// Route one device frame to the event decoder or the correlator.
fn dispatch_frame(state: &mut IoState, frame: Frame) {
    let Frame { opcode, payload } = frame;

    if cmd::is_event_opcode(opcode) {
        match decode_event(opcode, &payload) {
            DecodedEvent::Publish(event) => {
                state.events.publish(event);
            }
            DecodedEvent::Ready(ready) => {
                state.correlator.schedule_ready(ready, state.config.ready_settle);
            }
            DecodedEvent::MeshAck(ack) => {
                state
                    .correlator
                    .resolve(cmd::MESH_MESSAGE.opcode, Ok(Response::MeshAck(ack)));
                state.events.publish(ack.into());
            }
            DecodedEvent::Ignored => {}
        }
        return;
    }

    let result = decode_response(opcode, &payload);
    match &result {
        Ok(value) => capture_device_data(&mut state.device, opcode, value),
        Err(e) => {
            state.events.publish(BeaconEvent::Error {
                message: format!("response 0x{opcode:02x}: {e}"),
            });
        }
    }

    if !state.correlator.resolve(opcode, result) {
        debug!(
            opcode = format_args!("0x{opcode:02x}"),
            payload = %payload,
            "dropping unsolicited response"
        );
    }
}

/// Record identity responses for the version gate.
fn capture_device_data(device: &mut DeviceData, opcode: u8, value: &Response) {
    let Response::Text(text) = value else {
        return;
    };
    let field = match opcode {
        op if op == cmd::PROTOCOL_VERSION.opcode => &mut device.uart_protocol_version,
        op if op == cmd::FIRMWARE_VERSION.opcode => &mut device.firmware_version,
        op if op == cmd::HARDWARE_MODEL.opcode => &mut device.hardware_model,
        op if op == cmd::HARDWARE_VERSION.opcode => &mut device.hardware_version,
        _ => return,
    };
    *field = Some(text.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ubeacon_core::events::EventKind;
    use ubeacon_test_harness::MockTransport;

    fn test_config() -> IoConfig {
        IoConfig {
            command_timeout: Duration::from_millis(500),
            ..IoConfig::default()
        }
    }

    fn spawn(mock: MockTransport) -> (BeaconIo, EventBus) {
        let events = EventBus::new();
        let io = spawn_io_task(Box::new(mock), test_config(), events.clone());
        (io, events)
    }

    #[test]
    fn io_config_defaults() {
        let config = IoConfig::default();
        assert_eq!(config.command_timeout, Duration::from_millis(5000));
        assert_eq!(config.ready_settle, Duration::from_millis(200));
        assert!(!config.log_traffic);
        assert!(!config.log_raw_input);
    }

    #[test]
    fn version_gate_rules() {
        let mut device = DeviceData::default();
        assert!(version_gate(&cmd::LED, &device).is_ok());
        assert!(matches!(
            version_gate(&cmd::EDDYSTONE_URL, &device),
            Err(Error::VersionUnsupported { actual: None, .. })
        ));

        device.uart_protocol_version = Some("0.2.0".into());
        assert!(version_gate(&cmd::TEMPERATURE, &device).is_ok());
        assert!(matches!(
            version_gate(&cmd::MESH_STATS, &device),
            Err(Error::VersionUnsupported { required: "0.2.1", .. })
        ));

        device.uart_protocol_version = Some("0.2.2".into());
        assert!(version_gate(&cmd::BLE_SCAN, &device).is_ok());
    }

    #[test]
    fn device_data_capture() {
        let mut device = DeviceData::default();
        capture_device_data(&mut device, b'0', &Response::Text("0.2.1".into()));
        capture_device_data(&mut device, b'2', &Response::Text("UBCP2".into()));
        capture_device_data(&mut device, b'4', &Response::Text("aabbccddeeff".into()));
        assert_eq!(device.uart_protocol_version.as_deref(), Some("0.2.1"));
        assert_eq!(device.hardware_model.as_deref(), Some("UBCP2"));
        assert!(device.firmware_version.is_none());
    }

    #[tokio::test]
    async fn io_not_connected_after_channel_closed() {
        let (cmd_tx, rx) = mpsc::channel(32);
        drop(rx);
        let io = BeaconIo {
            cmd_tx,
            cancel: CancellationToken::new(),
            task: tokio::spawn(async {}),
            command_timeout: Duration::from_millis(100),
        };
        let result = io.command(&cmd::LED, CommandType::Get, None).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn basic_get_command() {
        let mock = MockTransport::new();
        mock.handle().expect(b"g:1\r\n", b"r:12.2.0\r\n");
        let (io, _) = spawn(mock);

        let value = io
            .command(&cmd::FIRMWARE_VERSION, CommandType::Get, None)
            .await
            .unwrap();
        assert_eq!(value, Response::Text("2.2.0".into()));
        assert_eq!(
            io.device_data().await.unwrap().firmware_version.as_deref(),
            Some("2.2.0")
        );
    }

    #[tokio::test]
    async fn set_command_with_payload() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.expect(b"s:h01\r\n", b"r:h01\r\n");
        let (io, _) = spawn(mock);

        let value = io
            .command(&cmd::LED, CommandType::Set, Some("01".into()))
            .await
            .unwrap();
        assert_eq!(value, Response::U8(1));
        assert_eq!(handle.sent_data(), vec![b"s:h01\r\n".to_vec()]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out() {
        let mock = MockTransport::new();
        mock.handle().expect_silent(b"g:h\r\n");
        let (io, _) = spawn(mock);

        let start = tokio::time::Instant::now();
        let result = io.command(&cmd::LED, CommandType::Get, None).await;
        assert!(matches!(result, Err(Error::ResponseTimeout { opcode: b'h' })));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert!(start.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn version_gate_sends_nothing() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (io, _) = spawn(mock);

        let result = io
            .command(&cmd::EDDYSTONE_URL, CommandType::Get, None)
            .await;
        assert!(matches!(result, Err(Error::VersionUnsupported { .. })));
        assert!(handle.sent_data().is_empty());
    }

    #[tokio::test]
    async fn write_failure_resolves_caller() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.fail_sends(true);
        let (io, _) = spawn(mock);

        let result = io.command(&cmd::LED, CommandType::Get, None).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn fire_and_forget_completes_after_write() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.expect_silent(b"s:c01\r\n");
        let (io, _) = spawn(mock);

        let value = io
            .command(&cmd::COMMAND, CommandType::Set, Some("01".into()))
            .await
            .unwrap();
        assert_eq!(value, Response::None);
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn event_interleaved_with_response() {
        let mock = MockTransport::new();
        mock.handle()
            .expect(b"g:h\r\n", b"r:$0101\r\nboot\x00r:h00\r\n");
        let (io, events) = spawn(mock);
        let mut sub = events.subscribe_to(&[EventKind::Button]);

        let value = io.command(&cmd::LED, CommandType::Get, None).await.unwrap();
        assert_eq!(value, Response::U8(0));
        assert_eq!(
            sub.recv().await,
            Some(BeaconEvent::Button {
                pressed: true,
                event_type: 1
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ready_event_is_delayed() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (_io, events) = spawn(mock);
        let mut sub = events.subscribe_to(&[EventKind::Ready]);

        let start = tokio::time::Instant::now();
        handle.inject(b"r:!01\r\n");
        assert_eq!(sub.recv().await, Some(BeaconEvent::Ready(true)));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn unsolicited_decode_failure_is_published() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (_io, events) = spawn(mock);
        let mut sub = events.subscribe_to(&[EventKind::Error]);

        handle.inject(b"r:hzz\r\n");
        match sub.recv().await {
            Some(BeaconEvent::Error { message }) => assert!(message.contains("0x68")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn flush_clears_transport_input() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        let (io, _) = spawn(mock);

        io.flush_input().await.unwrap();
        assert_eq!(handle.input_clears(), 1);
    }

    #[tokio::test]
    async fn shutdown_recovers_transport() {
        let mock = MockTransport::new();
        let (io, _) = spawn(mock);

        let transport = io.shutdown().await.unwrap();
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn inbound_overflow_resets_buffer() {
        let mock = MockTransport::new();
        let handle = mock.handle();
        handle.inject(&vec![b'x'; MAX_BUF + 100]);
        handle.expect(b"g:h\r\n", b"r:h01\r\n");
        let (io, _) = spawn(mock);

        while handle.pending_input() > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let value = io.command(&cmd::LED, CommandType::Get, None).await.unwrap();
        assert_eq!(value, Response::U8(1));
    }
}
