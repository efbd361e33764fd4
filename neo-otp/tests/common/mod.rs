//! Common test utilities for neo-otp integration tests
//!
//! [`FakeToken`] is an in-memory OTP token reachable through the
//! `Enumerator` / `Endpoint` / `CtapChannel` traits. It records every call,
//! counts opened handles and concurrent calls, and can be told to fail.

#![allow(dead_code)]

use neo_otp::{BackendConfig, CtapChannel, Endpoint, Enumerator, OtpBackend, TransportKind};
use neo_otp_ctap::{MapBuilder, Value, WireMap};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub const CMD_CREATE: u8 = 0xB1;
pub const CMD_GENERATE: u8 = 0xB2;
pub const CMD_DELETE: u8 = 0xB3;
pub const CMD_ENUMERATE: u8 = 0xB4;

/// One-shot fault applied to the next wire call
#[derive(Debug, Clone)]
pub enum Fault {
    /// Token answers normally
    Pass,
    /// Transport level failure
    Io,
    /// Token answers with this status byte
    Status(u8),
    /// Token answers after this delay
    Delay(Duration),
    /// Token answers OK followed by bytes that are not CBOR
    Garbage,
}

/// A generator as the fake token stores it
#[derive(Debug, Clone)]
pub struct Stored {
    pub label: String,
    pub otp_type: u64,
    pub alg: u64,
    pub digits: u64,
    pub counter: u64,
    pub period: Option<u64>,
    pub secret: Vec<u8>,
}

#[derive(Debug, Default)]
struct TokenState {
    generators: Vec<Stored>,
    capacity: usize,
    absent: bool,
    no_otp: bool,
    enumeration_fails: bool,
    delay: Duration,
    faults: VecDeque<Fault>,
    failing_page: Option<u64>,
    failing_labels: Vec<(String, u8)>,

    calls: Vec<(u8, WireMap)>,
    enumerations: usize,
    opens: usize,
    closes: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// In-memory OTP token
#[derive(Clone, Default)]
pub struct FakeToken {
    state: Arc<Mutex<TokenState>>,
}

impl FakeToken {
    pub fn new() -> Self {
        let token = Self::default();
        token.state.lock().unwrap().capacity = 200;
        token
    }

    /// A token preloaded with `count` TOTP generators named `user{i}:issuer`
    pub fn with_generators(count: usize) -> Self {
        let token = Self::new();
        for i in 0..count {
            token.insert(Stored {
                label: format!("user{:03}:issuer", i),
                otp_type: 2,
                alg: 4,
                digits: 6,
                counter: 0,
                period: Some(30),
                secret: vec![i as u8; 20],
            });
        }
        token
    }

    pub fn insert(&self, generator: Stored) {
        self.state.lock().unwrap().generators.push(generator);
    }

    pub fn enumerator(&self) -> Box<dyn Enumerator> {
        Box::new(FakeEnumerator {
            token: self.clone(),
        })
    }

    /// Backend talking only to this token, with short timeouts
    pub fn backend(&self, page_size: u32) -> OtpBackend {
        OtpBackend::with_enumerators(vec![self.enumerator()], test_config(page_size))
    }

    pub fn set_present(&self, present: bool) {
        self.state.lock().unwrap().absent = !present;
    }

    pub fn set_otp_support(&self, supported: bool) {
        self.state.lock().unwrap().no_otp = !supported;
    }

    pub fn set_enumeration_fails(&self, fails: bool) {
        self.state.lock().unwrap().enumeration_fails = fails;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.state.lock().unwrap().capacity = capacity;
    }

    /// Reject the Enumerate page that starts at `index`
    pub fn fail_page_at(&self, index: Option<u64>) {
        self.state.lock().unwrap().failing_page = index;
    }

    /// Answer every Generate for `label` with `status`
    pub fn fail_generate_for(&self, label: &str, status: u8) {
        let mut state = self.state.lock().unwrap();
        state.failing_labels.push((label.to_string(), status));
    }

    pub fn push_fault(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push_back(fault);
    }

    pub fn labels(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.generators.iter().map(|g| g.label.clone()).collect()
    }

    pub fn stored(&self, label: &str) -> Option<Stored> {
        let state = self.state.lock().unwrap();
        state.generators.iter().find(|g| g.label == label).cloned()
    }

    pub fn calls(&self) -> Vec<(u8, WireMap)> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Requests of one command, in order
    pub fn requests(&self, cmd: u8) -> Vec<WireMap> {
        self.calls()
            .into_iter()
            .filter(|(c, _)| *c == cmd)
            .map(|(_, req)| req)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn enumerations(&self) -> usize {
        self.state.lock().unwrap().enumerations
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn open_handles(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.opens - state.closes
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

pub fn test_config(page_size: u32) -> BackendConfig {
    BackendConfig::builder()
        .command_timeout(Duration::from_millis(500))
        .discovery_attempts(1)
        .discovery_backoff(Duration::ZERO)
        .page_size(page_size)
        .poll_interval(Duration::from_millis(20))
        .refresh_interval(Duration::from_millis(20))
        .refresh_wait_timeout(Duration::from_secs(2))
        .build()
}

/// Poll `condition` for up to two seconds
///
/// Wire threads release their channel handle right after replying, so handle
/// counts settle slightly after the call returns.
pub fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct FakeEnumerator {
    token: FakeToken,
}

impl Enumerator for FakeEnumerator {
    fn kind(&self) -> TransportKind {
        TransportKind::Hid
    }

    fn enumerate(&self) -> neo_otp_transport::Result<Vec<Box<dyn Endpoint>>> {
        let mut state = self.token.state.lock().unwrap();
        state.enumerations += 1;
        if state.enumeration_fails {
            return Err(neo_otp_transport::Error::IoError("bus error".into()));
        }
        if state.absent {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(FakeEndpoint {
            token: self.token.clone(),
        })])
    }
}

struct FakeEndpoint {
    token: FakeToken,
}

impl Endpoint for FakeEndpoint {
    fn describe(&self) -> String {
        "fake token".to_string()
    }

    fn open(self: Box<Self>) -> neo_otp_transport::Result<Box<dyn CtapChannel>> {
        self.token.state.lock().unwrap().opens += 1;
        Ok(Box::new(FakeChannel { token: self.token }))
    }
}

struct FakeChannel {
    token: FakeToken,
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        if let Ok(mut state) = self.token.state.lock() {
            state.closes += 1;
        }
    }
}

impl CtapChannel for FakeChannel {
    fn send_cbor(&mut self, cmd: u8, data: &[u8]) -> neo_otp_transport::Result<Vec<u8>> {
        let (fault, delay) = {
            let mut state = self.token.state.lock().unwrap();
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            let request = WireMap::from_bytes(data).unwrap_or_default();
            state.calls.push((cmd, request));
            (state.faults.pop_front(), state.delay)
        };

        let extra = match &fault {
            Some(Fault::Delay(d)) => *d,
            _ => Duration::ZERO,
        };
        thread::sleep(delay + extra);

        let mut state = self.token.state.lock().unwrap();
        state.in_flight -= 1;

        if state.absent {
            return Err(neo_otp_transport::Error::DeviceNotFound);
        }

        match fault {
            Some(Fault::Io) => return Err(neo_otp_transport::Error::IoError("pipe broken".into())),
            Some(Fault::Status(code)) => return Ok(vec![code]),
            Some(Fault::Garbage) => return Ok(vec![0x00, 0xFF, 0x00]),
            _ => {}
        }

        if state.no_otp {
            return Ok(vec![0x01]);
        }

        let request = WireMap::from_bytes(data).unwrap_or_default();
        Ok(match handle(&mut state, cmd, &request) {
            Ok(body) => {
                let mut reply = vec![0x00];
                reply.extend(body);
                reply
            }
            Err(status) => vec![status],
        })
    }
}

fn record(generator: &Stored) -> Value {
    let mut builder = MapBuilder::new()
        .insert_text(1, &generator.label)
        .insert_uint(2, generator.otp_type)
        .insert_uint(3, generator.alg)
        .insert_uint(4, generator.digits);
    if generator.otp_type == 1 {
        builder = builder.insert_bytes(5, &generator.counter.to_be_bytes());
    }
    if let Some(period) = generator.period {
        builder = builder.insert_uint(6, period);
    }
    builder.build_value()
}

fn handle(state: &mut TokenState, cmd: u8, request: &WireMap) -> Result<Vec<u8>, u8> {
    match cmd {
        CMD_ENUMERATE => {
            let total = state.generators.len() as u64;
            let index = request.get_u64_opt(1).map_err(|_| 0xF3u8)?.unwrap_or(0);
            let count = request.get_u64_opt(2).map_err(|_| 0xF3u8)?;

            if count == Some(0) {
                return Ok(MapBuilder::new().insert_uint(1, total).build().unwrap());
            }
            if state.failing_page == Some(index) {
                return Err(0xF3);
            }

            let start = (index as usize).min(state.generators.len());
            let end = match count {
                Some(count) => (start + count as usize).min(state.generators.len()),
                None => state.generators.len(),
            };
            let records = state.generators[start..end].iter().map(record).collect();

            Ok(MapBuilder::new()
                .insert_uint(1, total)
                .insert_value(2, Value::Array(records))
                .build()
                .unwrap())
        }
        CMD_CREATE => {
            let label = request.get_text(1).map_err(|_| 0xF3u8)?;
            if state.generators.iter().any(|g| g.label == label) {
                return Err(0xF4);
            }
            if state.generators.len() >= state.capacity {
                return Err(0xF6);
            }
            let key = request.get_map(3).map_err(|_| 0xF3u8)?;
            let counter = request
                .get_bytes_opt(5)
                .map_err(|_| 0xF3u8)?
                .map(|b| b.iter().fold(0u64, |acc, &x| (acc << 8) | u64::from(x)))
                .unwrap_or(0);
            state.generators.push(Stored {
                label,
                otp_type: request.get_u64(2).map_err(|_| 0xF3u8)?,
                alg: key.get_u64(3).map_err(|_| 0xF3u8)?,
                digits: request.get_u64(4).map_err(|_| 0xF3u8)?,
                counter,
                period: request.get_u64_opt(6).map_err(|_| 0xF3u8)?,
                secret: key.get_bytes(-1).map_err(|_| 0xF3u8)?,
            });
            Ok(Vec::new())
        }
        CMD_DELETE => {
            let label = request.get_text(1).map_err(|_| 0xF3u8)?;
            let before = state.generators.len();
            state.generators.retain(|g| g.label != label);
            if state.generators.len() == before {
                return Err(0xF5);
            }
            Ok(Vec::new())
        }
        CMD_GENERATE => {
            let label = request.get_text(1).map_err(|_| 0xF3u8)?;
            if let Some((_, status)) = state.failing_labels.iter().find(|(l, _)| *l == label) {
                return Err(*status);
            }
            let generator = state
                .generators
                .iter_mut()
                .find(|g| g.label == label)
                .ok_or(0xF5u8)?;

            let moving = if generator.otp_type == 1 {
                generator.counter += 1;
                generator.counter
            } else {
                let step = request.get_bytes(2).map_err(|_| 0xF3u8)?;
                step.iter().fold(0u64, |acc, &x| (acc << 8) | u64::from(x))
            };

            let code = format!("{:06}", moving % 1_000_000);
            Ok(MapBuilder::new().insert_text(1, &code).build().unwrap())
        }
        _ => Err(0x01),
    }
}
