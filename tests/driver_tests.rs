//! Integration tests for the Ili9341 device session.
//!
//! Bring-up and orientation run against the simulated controller, whose
//! command history shows exactly what went over the bus. Bring-up timing
//! uses a bus and delay logging into one trace. Register reads use a mock
//! transport that records the framing it was asked for.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_graphics::prelude::*;
use embedded_hal::delay::DelayNs;

use ili9341_displaylist::display_list::{DisplayList, Request};
use ili9341_displaylist::ili9341::driver::{UnsupportedOrientation, INIT_TABLE};
use ili9341_displaylist::sim::Simulator;
use ili9341_displaylist::{
    Bus, BusTransport, Cmd, ColorOrder, Config, DisplayError, Ili9341, Orientation, Transport,
};

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

fn make_device(config: Config) -> Ili9341<BusTransport<Simulator>, NoDelay> {
    Ili9341::new(
        BusTransport::new(Simulator::new()),
        NoDelay,
        config,
    )
}

/// One step of bring-up, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Command(u8),
    Delay(u64),
}

type Trace = Rc<RefCell<Vec<Step>>>;

/// Bus logging commands into a trace shared with [`TraceDelay`]
struct TraceBus {
    trace: Trace,
}

impl Bus for TraceBus {
    fn command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.trace.borrow_mut().push(Step::Command(cmd));
        Ok(())
    }

    fn data(&mut self, _data: &[u8]) -> Result<(), DisplayError> {
        Ok(())
    }

    fn read(&mut self, _cmd: u8, _dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError> {
        buf.fill(0);
        Ok(())
    }
}

/// Delay logging into the same trace as [`TraceBus`]
struct TraceDelay {
    trace: Trace,
}

impl DelayNs for TraceDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.trace.borrow_mut().push(Step::Delay(u64::from(ns)));
    }
}

/// Captured register read: (command, dummy byte, length).
type ReadRecord = (u8, bool, usize);

/// Mock transport answering every register read with fixed bytes.
#[derive(Clone, Default)]
struct RegisterTransport {
    reads: Rc<RefCell<Vec<ReadRecord>>>,
}

impl Transport for RegisterTransport {
    fn submit(&mut self, request: Request) -> Result<(), DisplayError> {
        assert!(request.complete().is_ok());
        Ok(())
    }

    fn execute(&mut self, list: &mut DisplayList) -> Result<(), DisplayError> {
        list.reset();
        Ok(())
    }

    fn read(&mut self, cmd: u8, dummy: bool, buf: &mut [u8]) -> Result<(), DisplayError> {
        self.reads.borrow_mut().push((cmd, dummy, buf.len()));
        let value = [0x12, 0x34, 0x56, 0x78];
        buf.copy_from_slice(&value[..buf.len()]);
        Ok(())
    }

    fn hardware_reset(&mut self, _delay: &mut impl DelayNs) -> Result<(), DisplayError> {
        Ok(())
    }
}

// ============================================================================
// initialize
// ============================================================================

mod initialize_tests {
    use super::*;

    #[test]
    fn replays_table_then_display_on() {
        let mut tft = make_device(Config::default());
        tft.initialize().unwrap();

        let sim = tft.transport().bus();
        assert_eq!(sim.resets(), 1);
        assert!(sim.is_awake());
        assert!(sim.is_display_on());

        let history = sim.history();
        assert_eq!(history.len(), INIT_TABLE.len() + 2);
        for ((cmd, params), (sent, sent_params)) in INIT_TABLE.iter().zip(history) {
            assert_eq!(cmd, sent);
            assert_eq!(*params, &sent_params[..]);
        }
        assert_eq!(history[INIT_TABLE.len()], (Cmd::DISPON, vec![]));
        assert_eq!(history[INIT_TABLE.len() + 1], (Cmd::MADCTL, vec![0x48]));
    }

    #[test]
    fn waits_for_sleep_out_before_display_on() {
        let trace = Trace::default();
        let mut tft = Ili9341::new(
            BusTransport::new(TraceBus {
                trace: trace.clone(),
            }),
            TraceDelay {
                trace: trace.clone(),
            },
            Config::default(),
        );
        tft.initialize().unwrap();

        let steps = trace.borrow();
        let position = |cmd| steps.iter().position(|step| *step == Step::Command(cmd));
        let sleep_out = position(Cmd::SLPOUT).expect("exit sleep sent");
        let display_on = position(Cmd::DISPON).expect("display on sent");
        assert!(sleep_out < display_on);

        let between = &steps[sleep_out + 1..display_on];
        assert!(!between.is_empty());
        let mut waited = 0;
        for step in between {
            match step {
                Step::Delay(ns) => waited += ns,
                Step::Command(cmd) => panic!("command 0x{cmd:02X} sent during the settle delay"),
            }
        }
        assert!(waited >= 120_000_000);
    }

    #[test]
    fn applies_configured_orientation() {
        let mut tft = make_device(Config {
            orientation: Orientation::Deg270,
            ..Config::default()
        });
        tft.initialize().unwrap();

        assert_eq!(tft.orientation(), Orientation::Deg270);
        assert_eq!(tft.size(), Size::new(320, 240));
        assert_eq!(tft.transport().bus().madctl(), 0xE8);
    }
}

// ============================================================================
// orientation
// ============================================================================

mod orientation_tests {
    use super::*;

    #[test]
    fn landscape_swaps_size_and_sets_madctl() {
        let mut tft = make_device(Config::default());
        tft.initialize().unwrap();

        tft.set_orientation(Orientation::Deg90).unwrap();
        assert_eq!(tft.size(), Size::new(320, 240));
        assert_eq!(tft.read_madctl().unwrap(), 0x28);
        assert_eq!(tft.window().screen(), Size::new(320, 240));
        assert!(tft.window().is_empty());

        tft.set_orientation(Orientation::Deg180).unwrap();
        assert_eq!(tft.size(), Size::new(240, 320));
        assert_eq!(tft.read_madctl().unwrap(), 0x88);
    }

    #[test]
    fn rgb_panels_clear_bgr_bit() {
        let mut tft = make_device(Config {
            color_order: ColorOrder::Rgb,
            ..Config::default()
        });
        tft.initialize().unwrap();
        assert_eq!(tft.read_madctl().unwrap(), 0x40);
    }

    #[test]
    fn unsupported_angle_is_rejected() {
        assert_eq!(
            Orientation::try_from(45u16),
            Err(UnsupportedOrientation(45))
        );
        assert_eq!(Orientation::try_from(90u16), Ok(Orientation::Deg90));
    }
}

// ============================================================================
// register reads
// ============================================================================

mod register_tests {
    use super::*;

    #[test]
    fn short_reads_have_no_dummy_byte() {
        let transport = RegisterTransport::default();
        let mut tft = Ili9341::new(transport.clone(), NoDelay, Config::default());

        assert_eq!(tft.read_register(Cmd::RDMODE, 1).unwrap(), 0x12);
        assert_eq!(tft.read_register(Cmd::RDMODE, 2).unwrap(), 0x1234);
        assert_eq!(
            *transport.reads.borrow(),
            vec![(Cmd::RDMODE, false, 1), (Cmd::RDMODE, false, 2)]
        );
    }

    #[test]
    fn long_reads_are_msb_first_after_dummy() {
        let transport = RegisterTransport::default();
        let mut tft = Ili9341::new(transport.clone(), NoDelay, Config::default());

        assert_eq!(tft.read_register(Cmd::RDDST, 4).unwrap(), 0x1234_5678);
        assert_eq!(tft.read_nv_mem_status().unwrap(), 0x1234);
        assert_eq!(
            *transport.reads.borrow(),
            vec![(Cmd::RDDST, true, 4), (Cmd::NVMEMST, true, 3)]
        );
    }

    #[test]
    fn oversized_read_is_refused() {
        let transport = RegisterTransport::default();
        let mut tft = Ili9341::new(transport.clone(), NoDelay, Config::default());
        assert!(matches!(
            tft.read_register(Cmd::RDDST, 5),
            Err(DisplayError::OutOfBoundsError)
        ));
        assert!(transport.reads.borrow().is_empty());
    }

    #[test]
    fn simulated_controller_reports_state() {
        let mut tft = make_device(Config::default());
        tft.initialize().unwrap();

        assert_eq!(tft.read_display_id().unwrap(), 0x009341);
        assert_eq!(tft.read_pixel_format().unwrap(), 0x55);
        assert_eq!(tft.read_power_mode().unwrap(), 0x9C);
        assert_eq!(tft.read_self_diag().unwrap(), 0xC0);
        assert_eq!(tft.read_display_status().unwrap() >> 24, 0x80 | (0x48 >> 1));
    }
}
