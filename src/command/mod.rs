//! Instruction dispatch and response building.
//!
//! A host request payload carries the instruction name in an `IN` record and its
//! arguments, if any, nested in a `DA` record. [`CommandDispatcher::process`] looks
//! the instruction up, runs its [`Handler`] against the [`Node`] and builds the
//! response frame:
//!
//! ```text
//! IN (instruction name) · ST (status) · DA (handler output, only when non-empty and Ok)
//! ```
//!
//! Requests that cannot be dispatched at all are answered with an error packet built
//! by [`CommandDispatcher::build_error`].

pub mod handlers;

use thiserror::Error;

use crate::consts::{
    ALARM_CHANNELS, ALARM_DEFAULT_HIGH, ALARM_DEFAULT_LOW, BEEP_DURATION_MS, MAX_PAYLOAD_LEN,
    SLAVE_PACKET_ID_START, TAG_DATA, TAG_ERROR_CODE, TAG_ERROR_DESC, TAG_INSTRUCTION, TAG_STATUS,
};
use crate::device::{Actuator, Clock, Sensor};
use crate::error::{Error, Result};
use crate::history::TemperatureLog;
use crate::packet::{self, PacketType};
use crate::tlv::{self, RECORD_HEADER_LEN, TlvWriter};

/// The closed set of instructions a node understands.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `ping`
    Ping,
    /// `temp`
    GetTemp,
    /// `gdat`
    GetDate,
    /// `gtim`
    GetTime,
    /// `sdat`
    SetDate,
    /// `stim`
    SetTime,
    /// `galm`
    GetAlarms,
    /// `salm`
    SetAlarms,
    /// `glog`
    GetLog,
    /// `sled`
    SetLed,
    /// `rled`
    ResetLed,
    /// `sbzr`
    SetBuzzer,
    /// `rbzr`
    ResetBuzzer,
}

impl Instruction {
    /// Every instruction, in wire-name order of the command table.
    pub const ALL: [Instruction; 13] = [
        Instruction::Ping,
        Instruction::GetTemp,
        Instruction::GetDate,
        Instruction::GetTime,
        Instruction::SetDate,
        Instruction::SetTime,
        Instruction::GetAlarms,
        Instruction::SetAlarms,
        Instruction::GetLog,
        Instruction::SetLed,
        Instruction::ResetLed,
        Instruction::SetBuzzer,
        Instruction::ResetBuzzer,
    ];

    /// Looks an instruction up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.name() == name)
    }

    /// The wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Ping => "ping",
            Instruction::GetTemp => "temp",
            Instruction::GetDate => "gdat",
            Instruction::GetTime => "gtim",
            Instruction::SetDate => "sdat",
            Instruction::SetTime => "stim",
            Instruction::GetAlarms => "galm",
            Instruction::SetAlarms => "salm",
            Instruction::GetLog => "glog",
            Instruction::SetLed => "sled",
            Instruction::ResetLed => "rled",
            Instruction::SetBuzzer => "sbzr",
            Instruction::ResetBuzzer => "rbzr",
        }
    }

    /// Runs the handler bound to this instruction.
    pub fn run<S, C, A>(
        &self,
        node: &mut Node<S, C, A>,
        request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> core::result::Result<(), HandlerError>
    where
        S: Sensor,
        C: Clock,
        A: Actuator,
    {
        use handlers::*;
        match self {
            Instruction::Ping => Ping.handle(node, request, response),
            Instruction::GetTemp => GetTemp.handle(node, request, response),
            Instruction::GetDate => GetDate.handle(node, request, response),
            Instruction::GetTime => GetTime.handle(node, request, response),
            Instruction::SetDate => SetDate.handle(node, request, response),
            Instruction::SetTime => SetTime.handle(node, request, response),
            Instruction::GetAlarms => GetAlarms.handle(node, request, response),
            Instruction::SetAlarms => SetAlarms.handle(node, request, response),
            Instruction::GetLog => GetLog.handle(node, request, response),
            Instruction::SetLed => SetLed.handle(node, request, response),
            Instruction::ResetLed => ResetLed.handle(node, request, response),
            Instruction::SetBuzzer => SetBuzzer.handle(node, request, response),
            Instruction::ResetBuzzer => ResetBuzzer.handle(node, request, response),
        }
    }
}

/// Status carried in the `ST` record of every response.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Success
    Ok = 0x00,
    /// A request field is missing or out of range
    InvalidParam = 0x01,
    /// The clock has not been initialised
    NotInitialized = 0x02,
    /// The temperature probe is absent or failed
    SensorError = 0x03,
    /// Persistent storage failed
    StorageError = 0x04,
    /// Anything else
    InternalError = 0xFF,
}

impl From<Status> for u8 {
    fn from(status: Status) -> Self {
        status as u8
    }
}

/// Code carried in the `EC` record of an error packet.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    /// The request frame failed validation
    Corrupt = 0x01,
    /// The request was not a host request
    UnexpectedResponse = 0x02,
    /// The instruction is missing or unknown
    Unknown = 0xFF,
}

impl ErrorCode {
    /// Default `ED` text.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::Corrupt => "Packet corrupted",
            ErrorCode::UnexpectedResponse => "Unexpected packet type",
            ErrorCode::Unknown => "Unknown instruction",
        }
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

/// Application level failure of a handler, reported as a non-Ok [`Status`].
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerError {
    /// A request field is missing, malformed or out of range.
    #[error("invalid parameter")]
    InvalidParam,
    /// The clock is not initialised or cannot be read.
    #[error("clock not initialized")]
    NotInitialized,
    /// The sensor is not ready or the reading failed.
    #[error("sensor error")]
    SensorError,
    /// Storage failure.
    #[error("storage error")]
    StorageError,
    /// Encoding the response failed.
    #[error("internal error: {0}")]
    Internal(Error),
}

impl From<Error> for HandlerError {
    fn from(err: Error) -> Self {
        HandlerError::Internal(err)
    }
}

impl From<HandlerError> for Status {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::InvalidParam => Status::InvalidParam,
            HandlerError::NotInitialized => Status::NotInitialized,
            HandlerError::SensorError => Status::SensorError,
            HandlerError::StorageError => Status::StorageError,
            HandlerError::Internal(_) => Status::InternalError,
        }
    }
}

/// Thresholds of one alarm channel, in degrees Celsius.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmConfig {
    /// Channel id: 0 drives the buzzer, 1 the indicator LED
    pub id: u8,
    /// Lower threshold
    pub low: f32,
    /// Upper threshold
    pub high: f32,
}

impl AlarmConfig {
    /// Whether `temperature` lies outside `[low, high]`.
    pub fn is_triggered(&self, temperature: f32) -> bool {
        temperature < self.low || temperature > self.high
    }
}

/// The alarm channels of a node, indexed by id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alarms([AlarmConfig; ALARM_CHANNELS]);

impl Default for Alarms {
    fn default() -> Self {
        Self(core::array::from_fn(|id| AlarmConfig {
            id: id as u8,
            low: ALARM_DEFAULT_LOW,
            high: ALARM_DEFAULT_HIGH,
        }))
    }
}

impl Alarms {
    /// Configuration of channel `id`.
    pub fn get(&self, id: u8) -> Option<&AlarmConfig> {
        self.0.get(id as usize)
    }

    /// Replaces the configuration of `config.id`. Unknown ids are ignored.
    pub fn set(&mut self, config: AlarmConfig) -> bool {
        match self.0.get_mut(config.id as usize) {
            Some(slot) => {
                *slot = config;
                true
            }
            None => false,
        }
    }

    /// All channels in id order.
    pub fn iter(&self) -> impl Iterator<Item = &AlarmConfig> {
        self.0.iter()
    }
}

/// Everything a handler operates on: the device capabilities plus alarm and log state.
#[derive(Debug)]
pub struct Node<S, C, A> {
    /// Temperature probe
    pub sensor: S,
    /// Real-time clock
    pub clock: C,
    /// LED and buzzer
    pub actuator: A,
    /// Alarm thresholds
    pub alarms: Alarms,
    /// Temperature history
    pub log: TemperatureLog,
}

impl<S, C, A> Node<S, C, A>
where
    S: Sensor,
    C: Clock,
    A: Actuator,
{
    /// Creates a node with default alarms and an empty log.
    pub fn new(sensor: S, clock: C, actuator: A) -> Self {
        Self {
            sensor,
            clock,
            actuator,
            alarms: Alarms::default(),
            log: TemperatureLog::new(),
        }
    }

    /// Drives the outputs of every channel whose thresholds `temperature` violates.
    pub fn evaluate_alarms(&mut self, temperature: f32) {
        for alarm in self.alarms.iter() {
            if !alarm.is_triggered(temperature) {
                continue;
            }
            debug!("alarm {} triggered", alarm.id);
            match alarm.id {
                0 => self.actuator.beep(BEEP_DURATION_MS),
                1 => self.actuator.led_on(),
                _ => {}
            }
        }
    }
}

/// Implemented by the handler of each [`Instruction`].
///
/// `request` is the value of the request's `DA` record (empty if absent). Output
/// records are appended to `response`, inside the response's `DA` record.
pub trait Handler {
    /// Executes the instruction.
    fn handle<S, C, A>(
        &self,
        node: &mut Node<S, C, A>,
        request: &[u8],
        response: &mut TlvWriter<'_>,
    ) -> core::result::Result<(), HandlerError>
    where
        S: Sensor,
        C: Clock,
        A: Actuator;
}

/// A built frame ready for transmission.
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    /// Packet kind
    pub packet_type: PacketType,
    /// Id assigned to the packet
    pub packet_id: u16,
    /// Frame length in the output buffer
    pub len: usize,
}

/// Owns the node and turns request payloads into response frames.
#[derive(Debug)]
pub struct CommandDispatcher<S, C, A> {
    node: Node<S, C, A>,
    next_packet_id: u16,
    payload: [u8; MAX_PAYLOAD_LEN],
}

impl<S, C, A> CommandDispatcher<S, C, A>
where
    S: Sensor,
    C: Clock,
    A: Actuator,
{
    /// Creates a dispatcher around `node`.
    pub fn new(node: Node<S, C, A>) -> Self {
        Self {
            node,
            next_packet_id: SLAVE_PACKET_ID_START,
            payload: [0; MAX_PAYLOAD_LEN],
        }
    }

    /// The node.
    pub fn node(&self) -> &Node<S, C, A> {
        &self.node
    }

    /// The node, mutably.
    pub fn node_mut(&mut self) -> &mut Node<S, C, A> {
        &mut self.node
    }

    /// Id the next node originated packet will carry.
    pub fn next_packet_id(&self) -> u16 {
        self.next_packet_id
    }

    fn take_packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        id
    }

    /// Executes a host request payload and builds the response frame into `out`.
    ///
    /// # Arguments
    /// - `&[u8]` : The request payload
    /// - `u16` : The request's packet id, echoed as the response id
    /// - `&mut [u8]` : The output buffer
    ///
    /// # Returns
    /// - `Ok(Reply)` with [`PacketType::SlaveResponse`] when a handler ran, whatever
    ///   its status
    /// - `Ok(Reply)` with [`PacketType::SlaveError`] when the instruction is missing or
    ///   unknown ([`ErrorCode::Unknown`]) or the `DA` record is malformed
    ///   ([`ErrorCode::Corrupt`])
    /// - `Err(_)` only if `out` cannot hold the frame
    pub fn process(&mut self, request: &[u8], response_id: u16, out: &mut [u8]) -> Result<Reply> {
        let instruction = match tlv::decode_str(request, TAG_INSTRUCTION) {
            Ok(name) => Instruction::from_name(name),
            Err(_) => None,
        };
        let Some(instruction) = instruction else {
            warn!("request {} has no known instruction", response_id);
            return self.build_error(response_id, ErrorCode::Unknown, ErrorCode::Unknown.description(), out);
        };

        let data = match tlv::decode_raw(request, TAG_DATA) {
            Ok(data) => data,
            Err(Error::NotFound) => &[][..],
            Err(err) => {
                warn!("request {} has malformed data: {:?}", response_id, err);
                return self.build_error(response_id, ErrorCode::Corrupt, ErrorCode::Corrupt.description(), out);
            }
        };

        let len = {
            let mut writer = TlvWriter::new(&mut self.payload);
            writer.str(TAG_INSTRUCTION, instruction.name())?;
            let status_slot = writer.reserve_u8(TAG_STATUS)?;
            let data_start = writer.position();
            let mark = writer.begin(TAG_DATA)?;

            let status = match instruction.run(&mut self.node, data, &mut writer) {
                Ok(()) => {
                    writer.end(mark)?;
                    if writer.position() == data_start + RECORD_HEADER_LEN {
                        writer.truncate(data_start);
                    }
                    Status::Ok
                }
                Err(err) => {
                    writer.truncate(data_start);
                    err.into()
                }
            };
            debug!("{} -> status {}", instruction.name(), status as u8);
            writer.fill_u8(status_slot, status.into());
            writer.finish()
        };

        let packet_id = self.take_packet_id();
        let len = packet::build(PacketType::SlaveResponse, packet_id, response_id, &self.payload[..len], out)?;
        Ok(Reply {
            packet_type: PacketType::SlaveResponse,
            packet_id,
            len,
        })
    }

    /// Builds a [`PacketType::SlaveError`] frame carrying `code` and `description`.
    pub fn build_error(
        &mut self,
        response_id: u16,
        code: ErrorCode,
        description: &str,
        out: &mut [u8],
    ) -> Result<Reply> {
        let len = {
            let mut writer = TlvWriter::new(&mut self.payload);
            writer.u8(TAG_ERROR_CODE, code.into())?;
            writer.str(TAG_ERROR_DESC, description)?;
            writer.finish()
        };
        let packet_id = self.take_packet_id();
        let len = packet::build(PacketType::SlaveError, packet_id, response_id, &self.payload[..len], out)?;
        Ok(Reply {
            packet_type: PacketType::SlaveError,
            packet_id,
            len,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::consts::{MAX_FRAME_LEN, MAX_PACKET_LEN, TAG_TEMPERATURE};
    use crate::device::{RtcDate, RtcTime};

    /// Sensor returning a fixed reading.
    #[derive(Debug, Default)]
    pub(crate) struct FakeSensor {
        pub ready: bool,
        pub value: f32,
        pub fail: bool,
    }

    impl Sensor for FakeSensor {
        type Error = ();

        fn is_ready(&mut self) -> bool {
            self.ready
        }

        fn read(&mut self) -> core::result::Result<f32, ()> {
            if self.fail { Err(()) } else { Ok(self.value) }
        }
    }

    /// Clock holding its date and time in memory.
    #[derive(Debug, Default)]
    pub(crate) struct FakeClock {
        pub initialized: bool,
        pub date: RtcDate,
        pub time: RtcTime,
        pub reject_writes: bool,
    }

    impl Clock for FakeClock {
        type Error = ();

        fn is_initialized(&self) -> bool {
            self.initialized
        }

        fn date(&mut self) -> core::result::Result<RtcDate, ()> {
            Ok(self.date)
        }

        fn set_date(&mut self, date: RtcDate) -> core::result::Result<(), ()> {
            if self.reject_writes {
                return Err(());
            }
            self.date = date;
            Ok(())
        }

        fn time(&mut self) -> core::result::Result<RtcTime, ()> {
            Ok(self.time)
        }

        fn set_time(&mut self, time: RtcTime) -> core::result::Result<(), ()> {
            if self.reject_writes {
                return Err(());
            }
            self.time = time;
            Ok(())
        }
    }

    /// Actuator recording the last requested state.
    #[derive(Debug, Default)]
    pub(crate) struct FakeActuator {
        pub led: bool,
        pub buzzer: bool,
        pub last_beep_ms: Option<u32>,
    }

    impl Actuator for FakeActuator {
        fn led_on(&mut self) {
            self.led = true;
        }
        fn led_off(&mut self) {
            self.led = false;
        }
        fn led_state(&self) -> bool {
            self.led
        }
        fn buzzer_on(&mut self) {
            self.buzzer = true;
        }
        fn buzzer_off(&mut self) {
            self.buzzer = false;
        }
        fn beep(&mut self, duration_ms: u32) {
            self.buzzer = true;
            self.last_beep_ms = Some(duration_ms);
        }
        fn buzzer_state(&self) -> bool {
            self.buzzer
        }
    }

    pub(crate) type TestDispatcher = CommandDispatcher<FakeSensor, FakeClock, FakeActuator>;

    pub(crate) fn dispatcher() -> TestDispatcher {
        let sensor = FakeSensor {
            ready: true,
            value: 21.5,
            fail: false,
        };
        let clock = FakeClock {
            initialized: true,
            date: RtcDate { year: 24, month: 3, day: 1, weekday: 5 },
            time: RtcTime { hour: 12, minute: 0, second: 0 },
            reject_writes: false,
        };
        CommandDispatcher::new(Node::new(sensor, clock, FakeActuator::default()))
    }

    /// Builds a request payload with `IN` and, if given, a `DA` record.
    pub(crate) fn request(buf: &mut [u8], name: &str, data: Option<&[u8]>) -> usize {
        let mut w = TlvWriter::new(buf);
        w.str(TAG_INSTRUCTION, name).unwrap();
        if let Some(data) = data {
            w.raw(TAG_DATA, data).unwrap();
        }
        w.finish()
    }

    /// Runs one instruction and returns the parsed response payload.
    pub(crate) fn call(dispatcher: &mut TestDispatcher, name: &str, data: Option<&[u8]>) -> (Reply, Vec<u8>) {
        let mut req = [0u8; 256];
        let len = request(&mut req, name, data);
        let mut frame = vec![0u8; MAX_FRAME_LEN];
        let reply = dispatcher.process(&req[..len], 0x0042, &mut frame).unwrap();
        let mut scratch = vec![0u8; MAX_PACKET_LEN];
        let packet = packet::parse(&frame[..reply.len], &mut scratch).unwrap();
        assert_eq!(packet.header.packet_type, reply.packet_type);
        assert_eq!(packet.header.response_id, 0x0042);
        (reply, packet.payload.to_vec())
    }

    #[test]
    fn test_instruction_names_round_trip() {
        for instruction in Instruction::ALL {
            assert_eq!(Instruction::from_name(instruction.name()), Some(instruction));
        }
        assert_eq!(Instruction::from_name("xxxx"), None);
        assert_eq!(Instruction::from_name("PING"), None);
    }

    #[test]
    fn test_ping_has_no_data() {
        let mut d = dispatcher();
        let (reply, payload) = call(&mut d, "ping", Some(&[]));
        assert_eq!(reply.packet_type, PacketType::SlaveResponse);
        assert_eq!(tlv::decode_str(&payload, TAG_INSTRUCTION), Ok("ping"));
        assert_eq!(tlv::decode_u8(&payload, TAG_STATUS), Ok(Status::Ok as u8));
        assert_eq!(tlv::decode_raw(&payload, TAG_DATA), Err(Error::NotFound));
    }

    #[test]
    fn test_unknown_instruction_is_slave_error() {
        let mut d = dispatcher();
        let (reply, payload) = call(&mut d, "xxxx", None);
        assert_eq!(reply.packet_type, PacketType::SlaveError);
        assert_eq!(tlv::decode_u8(&payload, TAG_ERROR_CODE), Ok(ErrorCode::Unknown as u8));
        assert_eq!(tlv::decode_str(&payload, TAG_ERROR_DESC), Ok("Unknown instruction"));
    }

    #[test]
    fn test_missing_instruction_is_slave_error() {
        let mut d = dispatcher();
        let mut frame = vec![0u8; MAX_FRAME_LEN];
        let reply = d.process(&[], 1, &mut frame).unwrap();
        assert_eq!(reply.packet_type, PacketType::SlaveError);
    }

    #[test]
    fn test_malformed_data_is_corrupt() {
        let mut d = dispatcher();
        let mut req = [0u8; 32];
        let mut len = request(&mut req, "ping", None);
        // DA header declaring more bytes than follow
        req[len..len + 5].copy_from_slice(&[b'D', b'A', 0x10, 0x00, 0x01]);
        len += 5;
        let mut frame = vec![0u8; MAX_FRAME_LEN];
        let reply = d.process(&req[..len], 1, &mut frame).unwrap();
        assert_eq!(reply.packet_type, PacketType::SlaveError);

        let mut scratch = vec![0u8; MAX_PACKET_LEN];
        let packet = packet::parse(&frame[..reply.len], &mut scratch).unwrap();
        assert_eq!(tlv::decode_u8(packet.payload, TAG_ERROR_CODE), Ok(ErrorCode::Corrupt as u8));
    }

    #[test]
    fn test_packet_ids_count_up_from_slave_range() {
        let mut d = dispatcher();
        let (first, _) = call(&mut d, "ping", None);
        let (second, _) = call(&mut d, "xxxx", None);
        assert_eq!(first.packet_id, SLAVE_PACKET_ID_START);
        assert_eq!(second.packet_id, SLAVE_PACKET_ID_START + 1);
        assert_eq!(d.next_packet_id(), SLAVE_PACKET_ID_START + 2);
    }

    #[test]
    fn test_failed_handler_has_status_and_no_data() {
        let mut d = dispatcher();
        d.node_mut().sensor.ready = false;
        let (reply, payload) = call(&mut d, "temp", None);
        assert_eq!(reply.packet_type, PacketType::SlaveResponse);
        assert_eq!(tlv::decode_u8(&payload, TAG_STATUS), Ok(Status::SensorError as u8));
        assert_eq!(tlv::decode_raw(&payload, TAG_DATA), Err(Error::NotFound));
        assert!(d.node().log.is_empty());
    }

    #[test]
    fn test_data_is_nested() {
        let mut d = dispatcher();
        let (_, payload) = call(&mut d, "temp", None);
        let data = tlv::decode_raw(&payload, TAG_DATA).unwrap();
        assert_eq!(tlv::decode_f32(data, TAG_TEMPERATURE), Ok(21.5));
    }

    #[test]
    fn test_alarm_channels_drive_outputs() {
        let mut d = dispatcher();
        d.node_mut().evaluate_alarms(100.0);
        assert_eq!(d.node().actuator.last_beep_ms, Some(BEEP_DURATION_MS));
        assert!(d.node().actuator.led);

        let mut d = dispatcher();
        d.node_mut().evaluate_alarms(20.0);
        assert_eq!(d.node().actuator.last_beep_ms, None);
        assert!(!d.node().actuator.led);
    }

    #[test]
    fn test_handler_error_to_status() {
        assert_eq!(Status::from(HandlerError::InvalidParam), Status::InvalidParam);
        assert_eq!(
            Status::from(HandlerError::from(Error::BufferTooSmall)),
            Status::InternalError
        );
        assert_eq!(u8::from(Status::InternalError), 0xFF);
    }
}
