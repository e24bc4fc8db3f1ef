//! Serial link state machine.
//!
//! Reception is split between two contexts sharing one [`LinkShared`] behind a
//! `critical_section` mutex:
//!
//! - **Interrupt side**: [`LinkShared::on_byte`] matches the start marker, stores
//!   bytes and flags a complete frame once a genuine end marker arrives.
//!   [`LinkShared::on_tx_complete`] and [`LinkShared::on_error`] report transport
//!   events. None of these parse, checksum or log.
//! - **Task side**: [`Link::poll`] copies a ready frame out, parses and dispatches it,
//!   and starts writing the reply through a [`Transport`].
//!
//! ```text
//! Idle --AA 55--> Receiving --55 AA--> (ready) --poll--> Processing --> Transmitting --tx complete--> Idle
//! ```
//!
//! Exactly one frame is in flight. Bytes arriving while a frame waits, is processed or
//! is answered are dropped.
//!
//! The `link-isr` feature adds free functions and macros driving a global
//! [`SharedLink`] from interrupt handlers; `delay-loop` adds a blocking poll loop.

use core::cell::RefCell;

use critical_section::Mutex;
use thiserror::Error;

use crate::command::{CommandDispatcher, ErrorCode, Reply};
use crate::consts::{
    END_MARK_1, END_MARK_2, HEADER_LEN, MAX_FRAME_LEN, MAX_PACKET_LEN, RX_BUFFER_LEN, START_MARK_1,
    START_MARK_2, STUFF_BYTE,
};
use crate::device::{Actuator, Clock, Sensor};
use crate::error::Error;
use crate::framing::is_marker_byte;
use crate::packet::{self, PacketType};

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "link-isr")]
mod isr;
#[cfg(feature = "link-isr")]
pub use isr::*;

#[cfg(feature = "link-isr")]
mod macros;

/// Link state as seen by both contexts.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum LinkState {
    /// Waiting for a start marker.
    #[default]
    Idle,
    /// Inside a frame, or holding a complete frame not yet picked up.
    Receiving,
    /// The task is handling a frame.
    Processing,
    /// A reply is being written.
    Transmitting,
}

/// Communication counters. They only grow until [`LinkShared::reset_stats`].
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub struct CommStats {
    /// Complete frames picked up for processing
    pub frames_received: u32,
    /// Replies whose transmission completed
    pub frames_sent: u32,
    /// Frames failing the CRC check
    pub crc_errors: u32,
    /// Frames failing framing, length or version checks
    pub format_errors: u32,
    /// Valid frames that could not be dispatched
    pub dispatch_errors: u32,
    /// Transport error notifications and rejected writes
    pub transport_errors: u32,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
enum RxPhase {
    Hunting,
    StartHalf,
    Body,
}

/// Interrupt-side frame accumulator.
///
/// Stores a frame including both markers. End detection follows the stuffing rules:
/// a marker byte followed by `0x00` is data, `55 AA` ends the frame, and an unescaped
/// `AA 55` starts over with a new frame. Overflowing the buffer discards the partial
/// frame.
#[derive(Debug)]
pub struct RxAccumulator<const N: usize> {
    buf: [u8; N],
    len: usize,
    phase: RxPhase,
    pending_marker: Option<u8>,
    ready: bool,
}

impl<const N: usize> Default for RxAccumulator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RxAccumulator<N> {
    /// Creates an empty accumulator.
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            phase: RxPhase::Hunting,
            pending_marker: None,
            ready: false,
        }
    }

    /// Feeds one received byte.
    ///
    /// # Returns
    /// `true` if this byte completed a frame.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.ready {
            return false;
        }
        match self.phase {
            RxPhase::Hunting => {
                if byte == START_MARK_1 {
                    self.restart();
                }
            }
            RxPhase::StartHalf => {
                if byte == START_MARK_2 {
                    self.buf[1] = byte;
                    self.len = 2;
                    self.phase = RxPhase::Body;
                } else if byte != START_MARK_1 {
                    self.reset();
                }
            }
            RxPhase::Body => {
                if self.len == N {
                    self.reset();
                    return false;
                }
                self.buf[self.len] = byte;
                self.len += 1;

                match self.pending_marker.take() {
                    Some(_) if byte == STUFF_BYTE => {}
                    Some(END_MARK_1) if byte == END_MARK_2 => {
                        self.ready = true;
                        return true;
                    }
                    Some(START_MARK_1) if byte == START_MARK_2 => {
                        self.buf[0] = START_MARK_1;
                        self.buf[1] = START_MARK_2;
                        self.len = 2;
                    }
                    _ if is_marker_byte(byte) => self.pending_marker = Some(byte),
                    _ => {}
                }
            }
        }
        false
    }

    fn restart(&mut self) {
        self.buf[0] = START_MARK_1;
        self.len = 1;
        self.phase = RxPhase::StartHalf;
        self.pending_marker = None;
    }

    /// Discards any partial or ready frame.
    pub fn reset(&mut self) {
        self.len = 0;
        self.phase = RxPhase::Hunting;
        self.pending_marker = None;
        self.ready = false;
    }

    /// Whether a complete frame is waiting.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether no frame is in progress.
    pub fn is_idle(&self) -> bool {
        !self.ready && self.phase == RxPhase::Hunting
    }

    /// The complete frame, markers included.
    pub fn frame(&self) -> Option<&[u8]> {
        self.ready.then(|| &self.buf[..self.len])
    }
}

/// State shared between the interrupt handlers and [`Link::poll`].
#[derive(Debug)]
pub struct LinkShared {
    rx: RxAccumulator<RX_BUFFER_LEN>,
    state: LinkState,
    stats: CommStats,
}

impl Default for LinkShared {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkShared {
    /// Creates an idle link with zeroed counters.
    pub const fn new() -> Self {
        Self {
            rx: RxAccumulator::new(),
            state: LinkState::Idle,
            stats: CommStats {
                frames_received: 0,
                frames_sent: 0,
                crc_errors: 0,
                format_errors: 0,
                dispatch_errors: 0,
                transport_errors: 0,
            },
        }
    }

    /// A byte was received. Call from the receive interrupt.
    pub fn on_byte(&mut self, byte: u8) {
        if !matches!(self.state, LinkState::Idle | LinkState::Receiving) {
            return;
        }
        self.rx.push(byte);
        self.state = if self.rx.is_idle() {
            LinkState::Idle
        } else {
            LinkState::Receiving
        };
    }

    /// A reply finished transmitting. Call from the transmit-complete interrupt.
    pub fn on_tx_complete(&mut self) {
        self.stats.frames_sent = self.stats.frames_sent.wrapping_add(1);
        if self.state == LinkState::Transmitting {
            self.state = LinkState::Idle;
        }
    }

    /// The transport reported an error. Call from the error interrupt.
    ///
    /// Any partial or ready frame is discarded. A frame already being processed is
    /// not affected.
    pub fn on_error(&mut self) {
        self.stats.transport_errors = self.stats.transport_errors.wrapping_add(1);
        self.rx.reset();
        if self.state != LinkState::Processing {
            self.state = LinkState::Idle;
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CommStats {
        self.stats
    }

    /// Zeroes every counter.
    pub fn reset_stats(&mut self) {
        self.stats = CommStats::default();
    }

    /// Copies a ready frame into `out`, re-arms reception and enters Processing.
    fn take_frame(&mut self, out: &mut [u8]) -> Option<usize> {
        let frame = self.rx.frame()?;
        let len = frame.len().min(out.len());
        out[..len].copy_from_slice(&frame[..len]);
        self.rx.reset();
        self.state = LinkState::Processing;
        self.stats.frames_received = self.stats.frames_received.wrapping_add(1);
        Some(len)
    }

    fn record(&mut self, fault: Fault) {
        let counter = match fault {
            Fault::Crc => &mut self.stats.crc_errors,
            Fault::Format => &mut self.stats.format_errors,
            Fault::Dispatch => &mut self.stats.dispatch_errors,
            Fault::Transport => &mut self.stats.transport_errors,
        };
        *counter = counter.wrapping_add(1);
    }
}

/// The link state as stored in a `static`.
pub type SharedLink = Mutex<RefCell<LinkShared>>;

/// Byte sink used to send reply frames.
pub trait Transport {
    /// Error reported by a rejected write.
    type Error;

    /// Starts sending `frame`.
    ///
    /// The frame slice is only valid for the duration of the call; implementations
    /// that send asynchronously copy it first. Completion is reported through
    /// [`LinkShared::on_tx_complete`].
    ///
    /// # Returns
    /// - `Ok(())`: Transmission started
    /// - `Err(nb::Error::WouldBlock)`: The transport is busy, try again later
    /// - `Err(nb::Error::Other(_))`: The write was rejected
    fn start_write(&mut self, frame: &[u8]) -> nb::Result<(), Self::Error>;
}

/// Failure of a [`Link::poll`] cycle.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError<E> {
    /// The transport rejected the reply.
    #[error("transport error: {0:?}")]
    Transport(E),
    /// The reply could not be built.
    #[error("reply not built: {0}")]
    Packet(Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Crc,
    Format,
    Dispatch,
    Transport,
}

/// Task-side half of the link: owns the dispatcher, the transport and the frame
/// buffers.
#[derive(Debug)]
pub struct Link<T, S, C, A> {
    transport: T,
    dispatcher: CommandDispatcher<S, C, A>,
    frame: [u8; RX_BUFFER_LEN],
    scratch: [u8; MAX_PACKET_LEN],
    tx_buf: [u8; MAX_FRAME_LEN],
    pending: Option<Reply>,
}

impl<T, S, C, A> Link<T, S, C, A>
where
    T: Transport,
    S: Sensor,
    C: Clock,
    A: Actuator,
{
    /// Creates a link.
    pub fn new(transport: T, dispatcher: CommandDispatcher<S, C, A>) -> Self {
        Self {
            transport,
            dispatcher,
            frame: [0; RX_BUFFER_LEN],
            scratch: [0; MAX_PACKET_LEN],
            tx_buf: [0; MAX_FRAME_LEN],
            pending: None,
        }
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &CommandDispatcher<S, C, A> {
        &self.dispatcher
    }

    /// The dispatcher, mutably.
    pub fn dispatcher_mut(&mut self) -> &mut CommandDispatcher<S, C, A> {
        &mut self.dispatcher
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Runs one scheduling cycle.
    ///
    /// If a reply is waiting for a busy transport, retries it. Otherwise picks up a
    /// ready frame, answers it and starts the write.
    ///
    /// # Returns
    /// - `Ok(Reply)`: A reply started transmitting
    /// - `Err(nb::Error::WouldBlock)`: No frame was ready, or the transport is busy
    /// - `Err(nb::Error::Other(_))`: The reply was dropped and the link is idle again
    pub fn poll(&mut self, shared: &SharedLink) -> nb::Result<Reply, LinkError<T::Error>> {
        if let Some(reply) = self.pending.take() {
            return self.transmit(shared, reply);
        }

        let taken = critical_section::with(|cs| shared.borrow(cs).borrow_mut().take_frame(&mut self.frame));
        let Some(len) = taken else {
            return Err(nb::Error::WouldBlock);
        };

        let (fault, reply) = answer(
            &mut self.dispatcher,
            &self.frame[..len],
            &mut self.scratch,
            &mut self.tx_buf,
        );

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                warn!("reply not built: {:?}", err);
                critical_section::with(|cs| {
                    let mut link = shared.borrow(cs).borrow_mut();
                    if let Some(fault) = fault {
                        link.record(fault);
                    }
                    link.state = LinkState::Idle;
                });
                return Err(nb::Error::Other(LinkError::Packet(err)));
            }
        };

        critical_section::with(|cs| {
            let mut link = shared.borrow(cs).borrow_mut();
            if let Some(fault) = fault {
                link.record(fault);
            }
            link.state = LinkState::Transmitting;
        });
        self.transmit(shared, reply)
    }

    fn transmit(&mut self, shared: &SharedLink, reply: Reply) -> nb::Result<Reply, LinkError<T::Error>> {
        match self.transport.start_write(&self.tx_buf[..reply.len]) {
            Ok(()) => {
                trace!("sent {} byte reply {}", reply.len, reply.packet_id);
                Ok(reply)
            }
            Err(nb::Error::WouldBlock) => {
                self.pending = Some(reply);
                Err(nb::Error::WouldBlock)
            }
            Err(nb::Error::Other(err)) => {
                warn!("transport rejected reply {}", reply.packet_id);
                critical_section::with(|cs| {
                    let mut link = shared.borrow(cs).borrow_mut();
                    link.record(Fault::Transport);
                    link.state = LinkState::Idle;
                });
                Err(nb::Error::Other(LinkError::Transport(err)))
            }
        }
    }

    /// Advances timed actuator outputs. Call with the time since the previous call.
    pub fn service(&mut self, elapsed_ms: u32) {
        self.dispatcher.node_mut().actuator.service(elapsed_ms);
    }

    /// Counter snapshot.
    pub fn stats(&self, shared: &SharedLink) -> CommStats {
        critical_section::with(|cs| shared.borrow(cs).borrow().stats())
    }

    /// Zeroes every counter.
    pub fn reset_stats(&self, shared: &SharedLink) {
        critical_section::with(|cs| shared.borrow(cs).borrow_mut().reset_stats());
    }
}

/// Parses `frame` and builds the reply into `out`, classifying any failure.
fn answer<S, C, A>(
    dispatcher: &mut CommandDispatcher<S, C, A>,
    frame: &[u8],
    scratch: &mut [u8],
    out: &mut [u8],
) -> (Option<Fault>, crate::Result<Reply>)
where
    S: Sensor,
    C: Clock,
    A: Actuator,
{
    match packet::parse(frame, scratch) {
        Ok(packet) if packet.header.packet_type == PacketType::HostRequest => {
            let reply = dispatcher.process(packet.payload, packet.header.packet_id, out);
            let fault = match reply {
                Ok(Reply {
                    packet_type: PacketType::SlaveError,
                    ..
                }) => Some(Fault::Dispatch),
                _ => None,
            };
            (fault, reply)
        }
        Ok(packet) => {
            debug!("unexpected packet type {:?}", packet.header.packet_type);
            let code = ErrorCode::UnexpectedResponse;
            let reply = dispatcher.build_error(packet.header.packet_id, code, code.description(), out);
            (Some(Fault::Dispatch), reply)
        }
        Err(err) => {
            debug!("frame rejected: {:?}", err);
            let fault = match err {
                Error::CrcMismatch { .. } => Fault::Crc,
                _ => Fault::Format,
            };
            let mut head = [0u8; 2 * HEADER_LEN];
            let response_id = packet::recover_packet_id(frame, &mut head).unwrap_or(0);
            let code = ErrorCode::Corrupt;
            (Some(fault), dispatcher.build_error(response_id, code, code.description(), out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tests::{FakeActuator, FakeClock, FakeSensor, dispatcher};
    use crate::consts::{TAG_DATA, TAG_ERROR_CODE, TAG_INSTRUCTION, TAG_STATUS};
    use crate::framing::stuff;
    use crate::tlv::{self, TlvWriter};

    fn feed<const N: usize>(rx: &mut RxAccumulator<N>, bytes: &[u8]) -> bool {
        bytes.iter().fold(false, |done, &b| rx.push(b) || done)
    }

    #[test]
    fn test_rx_accumulates_frame() {
        let mut rx = RxAccumulator::<32>::new();
        assert!(feed(&mut rx, &[0x00, 0x13, 0xAA, 0x55, 0x01, 0x02, 0x55, 0xAA]));
        assert_eq!(rx.frame(), Some(&[0xAA, 0x55, 0x01, 0x02, 0x55, 0xAA][..]));
    }

    #[test]
    fn test_rx_stuffed_bytes_do_not_end_frame() {
        let mut rx = RxAccumulator::<32>::new();
        let mut body = [0u8; 8];
        let len = stuff(&[0x55, 0xAA], &mut body).unwrap();
        assert!(!feed(&mut rx, &[0xAA, 0x55]));
        assert!(!feed(&mut rx, &body[..len]));
        assert!(!rx.is_ready());
        assert!(feed(&mut rx, &[0x55, 0xAA]));
        assert_eq!(rx.frame().map(|f| f.len()), Some(2 + len + 2));
    }

    #[test]
    fn test_rx_false_start_resets() {
        let mut rx = RxAccumulator::<32>::new();
        feed(&mut rx, &[0xAA, 0x01]);
        assert!(rx.is_idle());
        feed(&mut rx, &[0xAA, 0xAA, 0x55]);
        assert!(!rx.is_idle());
    }

    #[test]
    fn test_rx_resyncs_on_start_marker() {
        let mut rx = RxAccumulator::<32>::new();
        assert!(feed(&mut rx, &[0xAA, 0x55, 0x01, 0xAA, 0x55, 0x02, 0x55, 0xAA]));
        assert_eq!(rx.frame(), Some(&[0xAA, 0x55, 0x02, 0x55, 0xAA][..]));
    }

    #[test]
    fn test_rx_overflow_discards() {
        let mut rx = RxAccumulator::<8>::new();
        feed(&mut rx, &[0xAA, 0x55, 1, 2, 3, 4, 5, 6, 7]);
        assert!(rx.is_idle());
        assert!(feed(&mut rx, &[0xAA, 0x55, 1, 0x55, 0xAA]));
    }

    #[test]
    fn test_rx_ignores_bytes_while_ready() {
        let mut rx = RxAccumulator::<32>::new();
        feed(&mut rx, &[0xAA, 0x55, 0x01, 0x55, 0xAA]);
        assert!(!feed(&mut rx, &[0xAA, 0x55, 0x02, 0x55, 0xAA]));
        assert_eq!(rx.frame(), Some(&[0xAA, 0x55, 0x01, 0x55, 0xAA][..]));
    }

    #[test]
    fn test_shared_state_transitions() {
        let mut link = LinkShared::new();
        assert_eq!(link.state(), LinkState::Idle);
        link.on_byte(0xAA);
        assert_eq!(link.state(), LinkState::Receiving);
        for b in [0x55, 0x01, 0x55, 0xAA] {
            link.on_byte(b);
        }
        let mut out = [0u8; 16];
        assert_eq!(link.take_frame(&mut out), Some(5));
        assert_eq!(link.state(), LinkState::Processing);
        assert_eq!(link.stats().frames_received, 1);

        // dropped while processing
        link.on_byte(0xAA);
        assert!(link.rx.is_idle());

        link.state = LinkState::Transmitting;
        link.on_tx_complete();
        assert_eq!(link.state(), LinkState::Idle);
        assert_eq!(link.stats().frames_sent, 1);
    }

    #[test]
    fn test_shared_error_discards_partial_frame() {
        let mut link = LinkShared::new();
        for b in [0xAA, 0x55, 0x01] {
            link.on_byte(b);
        }
        link.on_error();
        assert_eq!(link.state(), LinkState::Idle);
        assert!(link.rx.is_idle());
        assert_eq!(link.stats().transport_errors, 1);

        link.reset_stats();
        assert_eq!(link.stats(), CommStats::default());
    }

    /// Transport recording every frame it is asked to send.
    #[derive(Debug, Default)]
    struct MockTransport {
        sent: Vec<Vec<u8>>,
        busy: usize,
        fail: bool,
    }

    impl Transport for MockTransport {
        type Error = &'static str;

        fn start_write(&mut self, frame: &[u8]) -> nb::Result<(), &'static str> {
            if self.fail {
                return Err(nb::Error::Other("uart fault"));
            }
            if self.busy > 0 {
                self.busy -= 1;
                return Err(nb::Error::WouldBlock);
            }
            self.sent.push(frame.to_vec());
            Ok(())
        }
    }

    type TestLink = Link<MockTransport, FakeSensor, FakeClock, FakeActuator>;

    fn new_link() -> (TestLink, SharedLink) {
        (
            Link::new(MockTransport::default(), dispatcher()),
            Mutex::new(RefCell::new(LinkShared::new())),
        )
    }

    fn receive(shared: &SharedLink, bytes: &[u8]) {
        critical_section::with(|cs| {
            let mut link = shared.borrow(cs).borrow_mut();
            for &b in bytes {
                link.on_byte(b);
            }
        });
    }

    fn request_frame(kind: PacketType, name: &str) -> Vec<u8> {
        let mut payload = [0u8; 64];
        let mut w = TlvWriter::new(&mut payload);
        w.str(TAG_INSTRUCTION, name).unwrap();
        w.raw(TAG_DATA, &[]).unwrap();
        let plen = w.finish();
        let mut frame = vec![0u8; MAX_FRAME_LEN];
        let flen = packet::build(kind, 9, 0, &payload[..plen], &mut frame).unwrap();
        frame.truncate(flen);
        frame
    }

    fn sent_payload(frame: &[u8]) -> (PacketType, u16, Vec<u8>) {
        let mut scratch = vec![0u8; MAX_PACKET_LEN];
        let packet = packet::parse(frame, &mut scratch).unwrap();
        (
            packet.header.packet_type,
            packet.header.response_id,
            packet.payload.to_vec(),
        )
    }

    #[test]
    fn test_poll_without_frame_would_block() {
        let (mut link, shared) = new_link();
        assert_eq!(link.poll(&shared), Err(nb::Error::WouldBlock));
        assert!(link.transport_mut().sent.is_empty());
    }

    #[test]
    fn test_poll_answers_request() {
        let (mut link, shared) = new_link();
        receive(&shared, &request_frame(PacketType::HostRequest, "ping"));

        let reply = link.poll(&shared).unwrap();
        assert_eq!(reply.packet_type, PacketType::SlaveResponse);
        critical_section::with(|cs| {
            assert_eq!(shared.borrow(cs).borrow().state(), LinkState::Transmitting);
        });

        let (kind, rid, payload) = sent_payload(&link.transport_mut().sent[0]);
        assert_eq!(kind, PacketType::SlaveResponse);
        assert_eq!(rid, 9);
        assert_eq!(tlv::decode_u8(&payload, TAG_STATUS), Ok(0));

        critical_section::with(|cs| shared.borrow(cs).borrow_mut().on_tx_complete());
        let stats = link.stats(&shared);
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.frames_sent, 1);
    }

    #[test]
    fn test_poll_reports_crc_failure() {
        let (mut link, shared) = new_link();
        let mut frame = request_frame(PacketType::HostRequest, "ping");
        // flip a bit in the packet id
        frame[4] ^= 0x02;
        receive(&shared, &frame);

        let reply = link.poll(&shared).unwrap();
        assert_eq!(reply.packet_type, PacketType::SlaveError);
        let (_, rid, payload) = sent_payload(&link.transport_mut().sent[0]);
        assert_eq!(rid, 9 ^ 0x02);
        assert_eq!(tlv::decode_u8(&payload, TAG_ERROR_CODE), Ok(ErrorCode::Corrupt as u8));
        assert_eq!(link.stats(&shared).crc_errors, 1);
    }

    #[test]
    fn test_poll_reports_format_failure() {
        let (mut link, shared) = new_link();
        let mut frame = request_frame(PacketType::HostRequest, "ping");
        frame[2] = 0x03;
        receive(&shared, &frame);

        link.poll(&shared).unwrap();
        let stats = link.stats(&shared);
        assert_eq!(stats.format_errors, 1);
        assert_eq!(stats.crc_errors, 0);
    }

    #[test]
    fn test_poll_rejects_non_request() {
        let (mut link, shared) = new_link();
        receive(&shared, &request_frame(PacketType::HostResponse, "ping"));

        let reply = link.poll(&shared).unwrap();
        assert_eq!(reply.packet_type, PacketType::SlaveError);
        let (_, _, payload) = sent_payload(&link.transport_mut().sent[0]);
        assert_eq!(
            tlv::decode_u8(&payload, TAG_ERROR_CODE),
            Ok(ErrorCode::UnexpectedResponse as u8)
        );
        assert_eq!(link.stats(&shared).dispatch_errors, 1);
    }

    #[test]
    fn test_poll_retries_busy_transport() {
        let (mut link, shared) = new_link();
        link.transport_mut().busy = 1;
        receive(&shared, &request_frame(PacketType::HostRequest, "ping"));

        assert_eq!(link.poll(&shared), Err(nb::Error::WouldBlock));
        // incoming bytes are dropped while the reply is pending
        receive(&shared, &request_frame(PacketType::HostRequest, "ping"));
        assert!(link.poll(&shared).is_ok());
        assert_eq!(link.transport_mut().sent.len(), 1);
        assert_eq!(link.stats(&shared).frames_received, 1);
    }

    #[test]
    fn test_poll_transport_failure_returns_to_idle() {
        let (mut link, shared) = new_link();
        link.transport_mut().fail = true;
        receive(&shared, &request_frame(PacketType::HostRequest, "ping"));

        assert_eq!(
            link.poll(&shared),
            Err(nb::Error::Other(LinkError::Transport("uart fault")))
        );
        critical_section::with(|cs| {
            let link = shared.borrow(cs).borrow();
            assert_eq!(link.state(), LinkState::Idle);
            assert_eq!(link.stats().transport_errors, 1);
        });
    }
}
