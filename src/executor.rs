//! The wire executor.
//!
//! The executor owns the GPIO port and is the only code that touches it. It
//! consumes [`Request`]s from an inbound queue and publishes one response per
//! request on an outbound queue, driving SWCLK continuously the whole time:
//! some targets drop ACK state if the clock stops, so the idle loop keeps
//! toggling between queue polls instead of blocking on the queue.
//!
//! Host bits are placed on SWDIO on the falling edge of SWCLK; target bits
//! are sampled right after the rising edge. Timing comes from half-cycle
//! sleeps on a dedicated OS thread, which keeps controller-side work (and
//! its logging) from stretching clock cycles. Debug logging inside the
//! executor still costs jitter; leave it off when timing matters.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use eh1::delay::DelayNs;

use crate::bits;
use crate::ftdaye::FtdiError;
use crate::gpio::GpioPort;
use crate::swd::{self, Action, Request, SwdError};

/// Half-cycle sleeper.
struct Delay;
impl DelayNs for Delay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }
}

/// Raw bits returned for one request: empty for sequences and writes, the
/// 33 sampled bits (32 data + target parity) for reads.
pub type Response = Vec<bool>;

/// Pin assignment and clock rate of the bit-banged port.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// SWCLK pin mask.
    pub swclk: u8,
    /// SWDIO pin mask.
    pub swdio: u8,
    /// Half of the SWCLK cycle time.
    pub half_cycle: Duration,
}

impl Default for ExecutorConfig {
    /// The FT2232 wiring the original rig used: SWCLK on AD0, SWDIO on AD1,
    /// roughly a 500 Hz clock.
    fn default() -> Self {
        Self {
            swclk: 0x01,
            swdio: 0x02,
            half_cycle: Duration::from_millis(1),
        }
    }
}

/// Bit-banging engine. Owns the port exclusively for its lifetime.
pub struct Executor<P> {
    port: P,
    /// Shadow of the output latch; pins are toggled here and the whole byte
    /// is written out.
    state: u8,
    swclk: u8,
    swdio: u8,
    half_cycle_ns: u32,
    delay: Delay,
}

impl<P: GpioPort> Executor<P> {
    /// Take ownership of the port: both SWD pins driven low as outputs.
    pub fn new(mut port: P, config: ExecutorConfig) -> Result<Self, SwdError> {
        let state = 0x00;
        port.set_direction(config.swclk | config.swdio, config.swclk | config.swdio)?;
        port.write_port(state)?;
        Ok(Self {
            port,
            state,
            swclk: config.swclk,
            swdio: config.swdio,
            half_cycle_ns: u32::try_from(config.half_cycle.as_nanos()).unwrap_or(u32::MAX),
            delay: Delay,
        })
    }

    /// Service requests until the inbound queue disconnects.
    ///
    /// Every request produces exactly one queue entry, in order. Protocol
    /// and backend failures during an operation are published as `Err` and
    /// the executor returns to its idle clocking loop; only a backend
    /// failure while idle (the port is gone) stops the thread.
    pub fn run(mut self, requests: Receiver<Request>, responses: Sender<Result<Response, SwdError>>) {
        log::info!("Bit banger clock and monitor started");
        loop {
            match requests.try_recv() {
                Ok(request) => {
                    if responses.send(self.exec(&request)).is_err() {
                        // Controller stopped listening.
                        break;
                    }
                }
                Err(TryRecvError::Empty) => {
                    // Nothing pending; the target still wants a live clock.
                    if let Err(error) = self.clock_cycle() {
                        log::error!("Gpio backend failed while idle: {error}");
                        break;
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
        log::debug!("Executor stopping");
    }

    fn exec(&mut self, request: &Request) -> Result<Response, SwdError> {
        // Inter-operation trailer: 8 clocks with SWDIO driven low, giving
        // the DAP time to finish internal updates.
        const TRAILER: [bool; 8] = [false; 8];

        self.write_bits(request.cmd())?;
        match request.action() {
            Action::Sequence => Ok(Vec::new()),
            Action::Write(data) => {
                // Turnaround so the target can drive SWDIO for the ACK,
                // then again so we can drive the payload.
                self.clock_cycle()?;
                self.check_ack()?;
                self.clock_cycle()?;
                self.write_bits(data)?;
                self.write_bits(&TRAILER)?;
                Ok(Vec::new())
            }
            Action::Read => {
                self.clock_cycle()?;
                self.check_ack()?;
                let data = self.read_bits(33)?;
                // The 34th bit is the turnaround back to the host, not data.
                self.read_bits(1)?;
                self.write_bits(&TRAILER)?;
                Ok(data)
            }
        }
    }

    fn check_ack(&mut self) -> Result<(), SwdError> {
        let ack = self.read_bits(3)?;
        match bits::from_bits(&ack) as u8 {
            swd::ACK_OK => Ok(()),
            swd::ACK_WAIT => Err(SwdError::AckWait),
            swd::ACK_FAULT => Err(SwdError::AckFault),
            other => Err(SwdError::UnknownAck(other)),
        }
    }

    /// Clock bits out, host to target.
    fn write_bits(&mut self, data: &[bool]) -> Result<(), SwdError> {
        log::debug!("Writing {} bits", data.len());
        self.port.set_direction(self.swdio, self.swdio)?;

        for &bit in data {
            self.state |= self.swclk;
            self.port.write_port(self.state)?;
            self.delay.delay_ns(self.half_cycle_ns);

            // The data bit goes out on the falling edge.
            if bit {
                self.state |= self.swdio;
            } else {
                self.state &= !self.swdio;
            }
            self.state &= !self.swclk;
            self.port.write_port(self.state)?;
            self.delay.delay_ns(self.half_cycle_ns);
        }
        Ok(())
    }

    /// Clock bits in, target to host. The target drives SWDIO on the rising
    /// edge, so each bit is sampled right after it.
    fn read_bits(&mut self, count: usize) -> Result<Vec<bool>, SwdError> {
        self.port.set_direction(self.swdio, 0x00)?;

        let mut result = Vec::with_capacity(count);
        for _ in 0..count {
            self.state |= self.swclk;
            self.port.write_port(self.state)?;
            result.push(self.port.read_port()? & self.swdio == self.swdio);
            self.delay.delay_ns(self.half_cycle_ns);

            self.state &= !self.swclk;
            self.port.write_port(self.state)?;
            self.delay.delay_ns(self.half_cycle_ns);
        }
        log::debug!("Read {} bits", result.len());
        Ok(result)
    }

    /// One clock cycle with no bit driven: turnarounds and idle keep-alive.
    fn clock_cycle(&mut self) -> Result<(), SwdError> {
        self.state |= self.swclk;
        self.port.write_port(self.state)?;
        self.delay.delay_ns(self.half_cycle_ns);

        self.state &= !self.swclk;
        self.port.write_port(self.state)?;
        self.delay.delay_ns(self.half_cycle_ns);
        Ok(())
    }
}

/// Controller-side handle to a spawned executor.
///
/// Requests go down an unbounded FIFO queue to the executor thread; every
/// request produces exactly one response, so [`SwdHost::transfer`] is a
/// strict send-then-receive and responses can never interleave. Dropping
/// the handle closes the queue, which stops and joins the executor.
pub struct SwdHost {
    requests: Option<Sender<Request>>,
    responses: Receiver<Result<Response, SwdError>>,
    thread: Option<JoinHandle<()>>,
}

impl SwdHost {
    /// Spawn an executor for `port` on its own named OS thread.
    pub fn spawn<P>(port: P, config: ExecutorConfig) -> Result<Self, SwdError>
    where
        P: GpioPort + Send + 'static,
    {
        let executor = Executor::new(port, config)?;
        let (req_tx, req_rx) = mpsc::channel();
        let (res_tx, res_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("swd-executor".into())
            .spawn(move || executor.run(req_rx, res_tx))
            .map_err(FtdiError::from)?;
        Ok(Self {
            requests: Some(req_tx),
            responses: res_rx,
            thread: Some(thread),
        })
    }

    /// Enqueue one request and block for its response.
    pub fn transfer(&self, request: Request) -> Result<Response, SwdError> {
        let Some(requests) = &self.requests else {
            return Err(SwdError::Disconnected);
        };
        requests.send(request).map_err(|_| SwdError::Disconnected)?;
        self.responses.recv().map_err(|_| SwdError::Disconnected)?
    }

    /// Transfer a read request and return the data word after checking the
    /// target-supplied parity bit. Parity is the controller's job; the
    /// executor hands back the raw 33 bits.
    pub fn read_word(&self, request: Request) -> Result<u32, SwdError> {
        let mut response = self.transfer(request)?;
        let Some(parity) = response.pop() else {
            return Err(SwdError::InvalidArgument("response carries no data word"));
        };
        if response.len() != 32 {
            return Err(SwdError::InvalidArgument("response is not a 33-bit read"));
        }
        if !bits::check_parity(parity, &response) {
            return Err(SwdError::ParityError);
        }
        Ok(bits::from_bits(&response))
    }
}

impl Drop for SwdHost {
    fn drop(&mut self) {
        // Closing the request queue is the stop signal.
        drop(self.requests.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::parity;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const SWCLK: u8 = 0x01;
    const SWDIO: u8 = 0x02;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        /// `(mask, value)` of a direction change.
        Direction(u8, u8),
        /// A byte latched onto the port.
        Write(u8),
        /// One `read_port` sample.
        Sample,
    }

    #[derive(Default)]
    struct PortState {
        events: Vec<Event>,
        /// SWDIO levels replayed on successive samples; low once exhausted.
        levels: VecDeque<bool>,
    }

    /// Scripted port standing in for the bridge. Clones share state so a
    /// test can keep inspecting after the executor takes ownership.
    #[derive(Default, Clone)]
    struct MockPort(Arc<Mutex<PortState>>);

    impl MockPort {
        fn with_levels(levels: &[bool]) -> Self {
            let port = MockPort::default();
            port.0.lock().unwrap().levels = levels.iter().copied().collect();
            port
        }

        fn state(&self) -> std::sync::MutexGuard<'_, PortState> {
            self.0.lock().unwrap()
        }
    }

    impl PortState {
        fn writes(&self) -> Vec<u8> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Write(value) => Some(*value),
                    _ => None,
                })
                .collect()
        }

        fn directions(&self) -> Vec<(u8, u8)> {
            self.events
                .iter()
                .filter_map(|event| match event {
                    Event::Direction(mask, value) => Some((*mask, *value)),
                    _ => None,
                })
                .collect()
        }

        /// SWDIO levels present on falling clock edges while the host was
        /// driving the line, i.e. the bits actually transmitted. Turnaround
        /// cycles clocked in output mode show up as (stale) driven bits;
        /// cycles clocked in input mode do not.
        fn driven_bits(&self) -> Vec<bool> {
            let mut driven = Vec::new();
            let mut output = false;
            let mut clk = false;
            for &event in &self.events {
                match event {
                    Event::Direction(mask, value) => {
                        if mask & SWDIO != 0 {
                            output = value & SWDIO != 0;
                        }
                    }
                    Event::Write(write) => {
                        let high = write & SWCLK != 0;
                        if clk && !high && output {
                            driven.push(write & SWDIO != 0);
                        }
                        clk = high;
                    }
                    Event::Sample => {}
                }
            }
            driven
        }
    }

    impl GpioPort for MockPort {
        fn set_direction(&mut self, mask: u8, value: u8) -> Result<(), FtdiError> {
            self.0.lock().unwrap().events.push(Event::Direction(mask, value));
            Ok(())
        }

        fn write_port(&mut self, value: u8) -> Result<(), FtdiError> {
            self.0.lock().unwrap().events.push(Event::Write(value));
            Ok(())
        }

        fn read_port(&mut self) -> Result<u8, FtdiError> {
            let mut state = self.0.lock().unwrap();
            state.events.push(Event::Sample);
            let level = state.levels.pop_front().unwrap_or(false);
            Ok(if level { SWDIO } else { 0 })
        }
    }

    fn test_config() -> ExecutorConfig {
        ExecutorConfig {
            swclk: SWCLK,
            swdio: SWDIO,
            half_cycle: Duration::ZERO,
        }
    }

    /// Config for tests that leave the executor thread idling: a non-zero
    /// half-cycle keeps the idle loop from spinning flat out against the
    /// event recorder.
    fn host_config() -> ExecutorConfig {
        ExecutorConfig {
            half_cycle: Duration::from_micros(5),
            ..test_config()
        }
    }

    /// ACK OK, then `word` with its parity bit, then the turnaround level.
    fn read_levels(word: u32, parity_ok: bool, turnaround: bool) -> Vec<bool> {
        let mut levels = vec![true, false, false];
        let data = crate::bits::to_bits_lsb(word, 32);
        let parity = parity(&data) ^ !parity_ok;
        levels.extend(data);
        levels.push(parity);
        levels.push(turnaround);
        levels
    }

    #[test]
    fn sequence_drives_bits_on_falling_edges() {
        let port = MockPort::default();
        let mut executor = Executor::new(port.clone(), test_config()).unwrap();

        let resync = swd::resync();
        let response = executor.exec(&resync).unwrap();
        assert!(response.is_empty());

        let state = port.state();
        // Initial latch write plus two writes per transmitted bit.
        assert_eq!(state.writes().len(), 1 + 2 * resync.cmd().len());
        assert_eq!(state.driven_bits(), resync.cmd());
        // SWDIO never turned around to input and nothing was sampled.
        assert!(state.directions().iter().all(|&(_, value)| value != 0));
        assert!(!state.events.contains(&Event::Sample));
    }

    #[test]
    fn read_samples_word_and_discards_turnaround() {
        let word = 0x2BA0_1477;
        let port = MockPort::with_levels(&read_levels(word, true, true));
        let mut executor = Executor::new(port.clone(), test_config()).unwrap();

        let response = executor.exec(&swd::idr().unwrap()).unwrap();
        assert_eq!(response.len(), 33);
        assert_eq!(crate::bits::from_bits(&response[..32]), word);
        assert_eq!(response[32], parity(&response[..32]));

        let state = port.state();
        // All scripted levels consumed: 3 ACK + 33 data + 1 turnaround.
        assert!(state.levels.is_empty());
        // Header out, one stale turnaround bit, then the eight-zero trailer.
        let sent = state.driven_bits();
        assert_eq!(sent.len(), 8 + 1 + 8);
        assert_eq!(&sent[..8], swd::idr().unwrap().cmd());
        assert!(sent[9..].iter().all(|&bit| !bit));
        // Direction: setup, header out, ACK in, data in, turnaround bit in,
        // trailer out.
        assert_eq!(
            state.directions(),
            vec![
                (SWCLK | SWDIO, SWCLK | SWDIO),
                (SWDIO, SWDIO),
                (SWDIO, 0),
                (SWDIO, 0),
                (SWDIO, 0),
                (SWDIO, SWDIO),
            ]
        );
    }

    #[test]
    fn write_clocks_payload_after_second_turnaround() {
        let port = MockPort::with_levels(&[true, false, false]);
        let mut executor = Executor::new(port.clone(), test_config()).unwrap();

        let tar = swd::tar(0x2000_0000).unwrap();
        let response = executor.exec(&tar).unwrap();
        assert!(response.is_empty());

        let Action::Write(payload) = tar.action() else {
            panic!("tar must carry a payload");
        };
        let state = port.state();
        // Header, stale first-turnaround bit, the 33 payload bits (the
        // second turnaround is clocked in input mode), then the trailer.
        let sent = state.driven_bits();
        assert_eq!(sent.len(), 8 + 1 + 33 + 8);
        assert_eq!(&sent[..8], tar.cmd());
        assert_eq!(&sent[9..42], &payload[..]);
        assert!(sent[42..].iter().all(|&bit| !bit));
    }

    #[test]
    fn bad_acks_are_reported() {
        let cases = [
            (vec![false, true, false], SwdError::AckWait),
            (vec![false, false, true], SwdError::AckFault),
            (vec![true, true, true], SwdError::UnknownAck(0b111)),
        ];
        for (levels, expected) in cases {
            let port = MockPort::with_levels(&levels);
            let mut executor = Executor::new(port, test_config()).unwrap();
            let error = executor.exec(&swd::idr().unwrap()).unwrap_err();
            assert_eq!(error.to_string(), expected.to_string());
        }
    }

    #[test]
    fn idle_executor_keeps_clock_running() {
        let port = MockPort::default();
        let config = ExecutorConfig {
            half_cycle: Duration::from_micros(50),
            ..test_config()
        };
        let host = SwdHost::spawn(port.clone(), config).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        {
            let state = port.state();
            // No request was queued, yet the clock line toggled.
            let writes = state.writes();
            assert!(writes.iter().any(|&write| write & SWCLK != 0));
            assert!(writes[1..].iter().any(|&write| write & SWCLK == 0));
        }
        drop(host);
    }

    #[test]
    fn responses_follow_request_order() {
        let mut levels = read_levels(0x1111_1111, true, false);
        levels.extend(read_levels(0x2222_2222, true, false));
        let port = MockPort::with_levels(&levels);
        let executor = Executor::new(port, host_config()).unwrap();

        let (req_tx, req_rx) = mpsc::channel();
        let (res_tx, res_rx) = mpsc::channel();
        let thread = std::thread::spawn(move || executor.run(req_rx, res_tx));

        // Both requests queued before the first response is taken.
        req_tx.send(swd::idr().unwrap()).unwrap();
        req_tx.send(swd::rdbuff().unwrap()).unwrap();
        let first = res_rx.recv().unwrap().unwrap();
        let second = res_rx.recv().unwrap().unwrap();
        assert_eq!(crate::bits::from_bits(&first[..32]), 0x1111_1111);
        assert_eq!(crate::bits::from_bits(&second[..32]), 0x2222_2222);

        drop(req_tx);
        thread.join().unwrap();
    }

    #[test]
    fn host_survives_protocol_errors() {
        // WAIT ACK for the first transfer, nothing scripted for the second.
        let port = MockPort::with_levels(&[false, true, false]);
        let host = SwdHost::spawn(port, host_config()).unwrap();

        let error = host.transfer(swd::idr().unwrap()).unwrap_err();
        assert!(matches!(error, SwdError::AckWait));

        // The executor published the error and kept running; an exhausted
        // level script reads as ACK 0b000.
        let error = host.transfer(swd::idr().unwrap()).unwrap_err();
        assert!(matches!(error, SwdError::UnknownAck(0)));
    }

    #[test]
    fn read_word_checks_parity() {
        let word = 0x1BA0_1477;
        let port = MockPort::with_levels(&read_levels(word, true, false));
        let host = SwdHost::spawn(port, host_config()).unwrap();
        assert_eq!(host.read_word(swd::idr().unwrap()).unwrap(), word);

        let port = MockPort::with_levels(&read_levels(word, false, false));
        let host = SwdHost::spawn(port, host_config()).unwrap();
        let error = host.read_word(swd::idr().unwrap()).unwrap_err();
        assert!(matches!(error, SwdError::ParityError));
    }
}
