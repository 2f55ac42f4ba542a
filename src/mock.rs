//! In-process mock thermostat.
//!
//! Listens on loopback TCP and answers like a real device:
//! - reads of sensors, control, scheduling, identification, IAQ availability
//!   and status get a response frame
//! - unmodeled reads get a NACK
//! - WRITE CONTROL/1 and WRITE SCHEDULING/4 are applied and answered with COS
//! - `sync` (WRITE STATUS/2) is answered with one read carrying every COS frame
//!
//! Replies use the device's unsolicited sequence numbering (`sequence + 127`).
//! Received frames are recorded so tests can assert on what the client wrote.
//!
//! # Example
//!
//! ```ignore
//! use aprilaire_client::{mock::MockThermostat, Client};
//!
//! let mock = MockThermostat::start().await?;
//! let client = Client::builder().host("127.0.0.1").port(mock.port()).build();
//! client.start_listen();
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::codec::{decode_frame, encode_temperature, Attribute, AttributeValue};
use crate::error::Result;
use crate::protocol::{
    build_frame, Action, Frame, FrameBuffer, FunctionalDomain, SEQUENCE_MODULUS,
    UNSOLICITED_SEQUENCE_OFFSET,
};
use crate::transport::ThermostatListener;

/// MAC address reported by the mock.
pub const MOCK_MAC_ADDRESS: [u8; 6] = [1, 2, 3, 4, 5, 6];

/// Hardware revision, firmware, protocol, model and gainspan bytes of IDENTIFICATION/1.
const IDENTIFICATION: [u8; 7] = [66, 10, 2, 15, 1, 14, 3];

/// Thermostat modes and installed IAQ equipment (CONTROL/7).
const IAQ_AVAILABLE: [u8; 5] = [6, 1, 1, 1, 1];

const IAQ_STATUS: [u8; 4] = [2, 2, 2, 2];

/// Settings the mock lets the client change.
#[derive(Debug, Clone, PartialEq)]
pub struct MockSettings {
    pub mode: u8,
    pub fan_mode: u8,
    pub heat_setpoint: f32,
    pub cool_setpoint: f32,
    pub hold: u8,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            mode: 5,
            fan_mode: 2,
            heat_setpoint: 20.0,
            cool_setpoint: 25.0,
            hold: 0,
        }
    }
}

#[derive(Debug)]
struct MockInner {
    settings: Mutex<MockSettings>,
    received: Mutex<Vec<Frame>>,
    connections: AtomicUsize,
    muted: AtomicBool,
    sequence: AtomicU8,
    kill: broadcast::Sender<()>,
}

/// A fake thermostat served on a local TCP port.
#[derive(Debug)]
pub struct MockThermostat {
    addr: SocketAddr,
    inner: Arc<MockInner>,
    task: JoinHandle<()>,
}

impl MockThermostat {
    /// Start on an OS-assigned loopback port.
    pub async fn start() -> Result<Self> {
        Self::bind("127.0.0.1:0").await
    }

    /// Start on a specific address.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = ThermostatListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (kill, _) = broadcast::channel(1);
        let inner = Arc::new(MockInner {
            settings: Mutex::new(MockSettings::default()),
            received: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            muted: AtomicBool::new(false),
            sequence: AtomicU8::new(1),
            kill,
        });

        let task = tokio::spawn(accept_loop(listener, inner.clone()));
        info!(%addr, "Mock thermostat listening");

        Ok(Self { addr, inner, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every frame received so far, across all connections.
    pub fn received(&self) -> Vec<Frame> {
        self.inner.received().clone()
    }

    /// Forget recorded frames.
    pub fn clear_received(&self) {
        self.inner.received().clear();
    }

    /// Connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::Acquire)
    }

    /// Stop answering (frames are still recorded).
    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::Release);
    }

    /// Close every live connection. New connections are still accepted.
    pub fn disconnect_all(&self) {
        let _ = self.inner.kill.send(());
    }

    pub fn settings(&self) -> MockSettings {
        self.inner.settings().clone()
    }

    /// Run until the accept loop stops.
    pub async fn serve_forever(mut self) {
        let _ = (&mut self.task).await;
    }
}

impl Drop for MockThermostat {
    fn drop(&mut self) {
        self.task.abort();
        let _ = self.inner.kill.send(());
    }
}

async fn accept_loop(listener: ThermostatListener, inner: Arc<MockInner>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                inner.connections.fetch_add(1, Ordering::AcqRel);
                info!(%peer, "Mock connection made");
                tokio::spawn(serve(stream, inner.clone()));
            }
            Err(e) => {
                warn!(error = %e, "Mock accept failed");
                return;
            }
        }
    }
}

async fn serve(stream: TcpStream, inner: Arc<MockInner>) {
    let (mut reader, mut writer) = stream.into_split();
    let mut kill = inner.kill.subscribe();
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let read = tokio::select! {
            _ = kill.recv() => break,
            read = reader.read(&mut buf) => read,
        };
        let n = match read {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        for frame in frames.push(&buf[..n]) {
            inner.received().push(frame.clone());
            if inner.muted.load(Ordering::Acquire) {
                continue;
            }

            let reply = inner.respond(&frame);
            if !reply.is_empty() {
                debug!(len = reply.len(), "Mock sending reply");
                if writer.write_all(&reply).await.is_err() {
                    return;
                }
            }
        }
    }

    info!("Mock connection lost");
}

impl MockInner {
    fn settings(&self) -> MutexGuard<'_, MockSettings> {
        self.settings.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn received(&self) -> MutexGuard<'_, Vec<Frame>> {
        self.received.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sequence number for the next unsolicited reply group.
    fn next_sequence(&self) -> u8 {
        let current = match self
            .sequence
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some((s + 1) % SEQUENCE_MODULUS)
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        current + UNSOLICITED_SEQUENCE_OFFSET
    }

    fn respond(&self, frame: &Frame) -> Vec<u8> {
        let mut out = Vec::new();
        let (Some(action), Some(domain), Some(attribute)) =
            (frame.action(), frame.functional_domain(), frame.attribute())
        else {
            return out;
        };

        match action {
            Action::ReadRequest => self.respond_to_read(domain, attribute, &mut out),
            Action::Write => self.apply_write(frame, domain, attribute, &mut out),
            _ => {}
        }
        out
    }

    fn respond_to_read(&self, domain: FunctionalDomain, attribute: u8, out: &mut Vec<u8>) {
        let seq = self.next_sequence();
        let settings = self.settings().clone();
        use FunctionalDomain as D;

        match (domain, attribute) {
            (D::Sensors, 2) => push(out, seq, Action::ReadResponse, domain, attribute, &sensors()),
            (D::Control, 1) => {
                push(out, seq, Action::ReadResponse, domain, attribute, &control(&settings))
            }
            (D::Control, 7) => push(out, seq, Action::ReadResponse, domain, attribute, &IAQ_AVAILABLE),
            (D::Scheduling, 4) => push(out, seq, Action::Cos, domain, attribute, &hold(&settings)),
            (D::Identification, 1) => {
                push(out, seq, Action::ReadResponse, domain, attribute, &IDENTIFICATION)
            }
            (D::Identification, 2) => {
                push(out, seq, Action::ReadResponse, domain, attribute, &MOCK_MAC_ADDRESS)
            }
            (D::Status, 6) => push(out, seq, Action::ReadResponse, domain, attribute, &status(&settings)),
            (D::Status, 7) => push(out, seq, Action::ReadResponse, domain, attribute, &IAQ_STATUS),
            _ => push(out, seq, Action::Nack, domain, attribute, &[]),
        }
    }

    fn apply_write(&self, frame: &Frame, domain: FunctionalDomain, attribute: u8, out: &mut Vec<u8>) {
        use FunctionalDomain as D;

        match (domain, attribute) {
            (D::Control, 1) => {
                let settings = {
                    let mut settings = self.settings();
                    if let Some(record) = decode_frame(frame) {
                        apply_control(&mut settings, &record.values);
                    }
                    settings.clone()
                };
                let seq = self.next_sequence();
                push(out, seq, Action::Cos, D::Control, 1, &control(&settings));
                push(out, seq, Action::Cos, D::Status, 6, &status(&settings));
                let seq = self.next_sequence();
                push(out, seq, Action::Cos, D::Scheduling, 4, &hold(&settings));
            }
            (D::Scheduling, 4) => {
                let settings = {
                    let mut settings = self.settings();
                    if let Some(hold) = frame.data().first() {
                        settings.hold = *hold;
                    }
                    settings.clone()
                };
                let seq = self.next_sequence();
                push(out, seq, Action::Cos, D::Scheduling, 4, &hold(&settings));
            }
            (D::Status, 2) => self.sync_burst(out),
            _ => {}
        }
    }

    /// Every COS frame the device pushes on sync, coalesced into one write.
    fn sync_burst(&self, out: &mut Vec<u8>) {
        use FunctionalDomain as D;
        let settings = self.settings().clone();

        let seq = self.next_sequence();
        push(out, seq, Action::ReadResponse, D::Identification, 2, &MOCK_MAC_ADDRESS);

        let seq = self.next_sequence();
        let mut setup = [0u8; 44];
        setup[26] = 1;
        push(out, seq, Action::Cos, D::Control, 1, &control(&settings));
        push(out, seq, Action::Cos, D::Sensors, 2, &sensors());
        push(out, seq, Action::Cos, D::Status, 2, &[1]);
        push(out, seq, Action::Cos, D::Status, 7, &IAQ_STATUS);
        push(out, seq, Action::Cos, D::Control, 7, &IAQ_AVAILABLE);
        push(out, seq, Action::Cos, D::Setup, 1, &setup);
        push(out, seq, Action::Cos, D::Scheduling, 4, &hold(&settings));
        push(out, seq, Action::Cos, D::Identification, 1, &IDENTIFICATION);
        push(out, seq, Action::Cos, D::Status, 6, &status(&settings));
    }
}

fn apply_control(
    settings: &mut MockSettings,
    values: &std::collections::BTreeMap<Attribute, AttributeValue>,
) {
    if let Some(mode) = values.get(&Attribute::Mode).and_then(AttributeValue::as_integer) {
        settings.mode = mode;
        settings.hold = 0;
    }
    if let Some(fan_mode) = values.get(&Attribute::FanMode).and_then(AttributeValue::as_integer) {
        settings.fan_mode = fan_mode;
    }
    if let Some(heat) = values
        .get(&Attribute::HeatSetpoint)
        .and_then(AttributeValue::as_temperature)
    {
        settings.heat_setpoint = heat;
        settings.hold = 1;
    }
    if let Some(cool) = values
        .get(&Attribute::CoolSetpoint)
        .and_then(AttributeValue::as_temperature)
    {
        settings.cool_setpoint = cool;
        settings.hold = 1;
    }
}

fn push(
    out: &mut Vec<u8>,
    sequence: u8,
    action: Action,
    domain: FunctionalDomain,
    attribute: u8,
    data: &[u8],
) {
    if let Ok(frame) = build_frame(sequence, action, domain, attribute, data) {
        out.extend_from_slice(&frame);
    }
}

fn temperature(value: f32) -> u8 {
    encode_temperature(value).unwrap_or(0)
}

fn sensors() -> [u8; 8] {
    [0, temperature(22.0), 0, temperature(10.0), 0, 50, 0, 40]
}

fn control(settings: &MockSettings) -> [u8; 4] {
    [
        settings.mode,
        settings.fan_mode,
        temperature(settings.heat_setpoint),
        temperature(settings.cool_setpoint),
    ]
}

fn hold(settings: &MockSettings) -> [u8; 10] {
    let mut data = [0u8; 10];
    data[0] = settings.hold;
    data
}

fn status(settings: &MockSettings) -> [u8; 4] {
    let heating = match settings.mode {
        2 => 2,
        4 => 7,
        _ => 0,
    };
    let cooling = match settings.mode {
        3 | 5 => 2,
        _ => 0,
    };
    let fan = u8::from(matches!(settings.fan_mode, 1 | 2));
    [heating, cooling, 0, fan]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::command::Command;
    use std::time::Duration;

    async fn exchange(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
        stream.write_all(request).await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn test_answers_reads() {
        let mock = MockThermostat::start().await.unwrap();
        let mut stream = TcpStream::connect(mock.local_addr()).await.unwrap();

        let reply = exchange(&mut stream, &Command::ReadMacAddress.encode(1).unwrap()).await;
        let record = decode(&reply).remove(0);
        assert_eq!(
            record.get(Attribute::MacAddress),
            Some(&AttributeValue::MacAddress("1:2:3:4:5:6".to_string()))
        );
        // First reply uses sequence 1 + 127
        assert_eq!(record.sequence, 128);

        let reply = exchange(&mut stream, &Command::ReadControl.encode(2).unwrap()).await;
        let record = decode(&reply).remove(0);
        assert_eq!(record.get(Attribute::Mode), Some(&AttributeValue::Integer(5)));
        assert_eq!(record.sequence, 129);

        assert_eq!(mock.received().len(), 2);
        assert_eq!(mock.connection_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_read_is_nacked() {
        let mock = MockThermostat::start().await.unwrap();
        let mut stream = TcpStream::connect(mock.local_addr()).await.unwrap();

        let request = build_frame(1, Action::ReadRequest, FunctionalDomain::Weather, 1, &[]).unwrap();
        let reply = exchange(&mut stream, &request).await;
        let (frame, _) = Frame::parse(&reply).unwrap();
        assert_eq!(frame.action(), Some(Action::Nack));
    }

    #[tokio::test]
    async fn test_write_control_is_applied() {
        let mock = MockThermostat::start().await.unwrap();
        let mut stream = TcpStream::connect(mock.local_addr()).await.unwrap();

        let request = Command::UpdateSetpoint {
            cool: 26.0,
            heat: 19.5,
        }
        .encode(1)
        .unwrap();
        let reply = exchange(&mut stream, &request).await;
        let records = decode(&reply);

        assert_eq!(records[0].get(Attribute::HeatSetpoint), Some(&AttributeValue::Temperature(19.5)));
        assert_eq!(records[0].get(Attribute::Mode), Some(&AttributeValue::Integer(5)));

        let settings = mock.settings();
        assert_eq!(settings.cool_setpoint, 26.0);
        assert_eq!(settings.hold, 1);
    }

    #[tokio::test]
    async fn test_sync_burst_is_coalesced() {
        let mock = MockThermostat::start().await.unwrap();
        let mut stream = TcpStream::connect(mock.local_addr()).await.unwrap();

        stream.write_all(&Command::Sync.encode(1).unwrap()).await.unwrap();

        let mut received = Vec::new();
        let mut buf = vec![0u8; 4096];
        while decode(&received).len() < 10 {
            let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        let records = decode(&received);
        assert_eq!(records.len(), 10);
        assert!(records.iter().skip(1).all(|r| r.event.action == Action::Cos));
    }

    #[tokio::test]
    async fn test_muted_and_disconnect() {
        let mock = MockThermostat::start().await.unwrap();
        let mut stream = TcpStream::connect(mock.local_addr()).await.unwrap();
        mock.set_muted(true);

        stream.write_all(&Command::ReadControl.encode(1).unwrap()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(mock.received().len(), 1);

        mock.disconnect_all();
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
