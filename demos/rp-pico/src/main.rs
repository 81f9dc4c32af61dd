//! Loopback demo for a Raspberry Pi Pico wired to an MCP2515 board with an
//! 8 MHz crystal: SCK on GP2, MOSI on GP3, MISO on GP4, CS on GP5.

#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_probe as _;
use rp_pico as bsp;

use embedded_hal::can::{ExtendedId, Frame, Id};
use mcp2515_can::{
    CanClock, CanFrame, CanSpeed, Error, OpMode, Settings, SpiTransport, MCP2515,
};

use defmt::{panic, *};
use fugit::RateExtU32;

use bsp::{
    entry,
    hal::{
        clocks::{init_clocks_and_plls, Clock},
        gpio::FunctionSpi,
        pac,
        sio::Sio,
        watchdog::Watchdog,
        Spi,
    },
};

#[entry]
fn main() -> ! {
    info!("Program start");

    let mut pac = pac::Peripherals::take().unwrap();
    let core = pac::CorePeripherals::take().unwrap();
    let mut watchdog = Watchdog::new(pac.WATCHDOG);
    let sio = Sio::new(pac.SIO);

    // External high-speed crystal on the pico board is 12Mhz
    let external_xtal_freq_hz = 12_000_000u32;
    let clocks = init_clocks_and_plls(
        external_xtal_freq_hz,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let sys_hz = clocks.system_clock.freq().to_Hz();
    let delay = cortex_m::delay::Delay::new(core.SYST, sys_hz);

    let pins = bsp::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let _spi_sclk = pins.gpio2.into_mode::<FunctionSpi>();
    let _spi_mosi = pins.gpio3.into_mode::<FunctionSpi>();
    let _spi_miso = pins.gpio4.into_mode::<FunctionSpi>();
    let spi_cs = pins.gpio5.into_push_pull_output();

    let spi = Spi::<_, _, 8>::new(pac.SPI0).init(
        &mut pac.RESETS,
        clocks.peripheral_clock.freq(),
        1_000_000.Hz(),
        &embedded_hal::spi::MODE_0,
    );

    let transport = SpiTransport::new(spi, spi_cs).unwrap();
    let mut can = MCP2515::new(transport, delay);
    can.init(Settings {
        can_speed: CanSpeed::Kbps100,
        clock: CanClock::MHz8,
        clkout: None,
    })
    .unwrap();
    // init leaves the chip in configuration mode.
    can.set_mode(OpMode::Loopback).unwrap();

    let frame = CanFrame::new(
        Id::Extended(ExtendedId::MAX),
        &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
    )
    .unwrap();

    loop {
        match can.send(&frame) {
            Ok(buf) => info!("Sent message via {:?}", buf),
            Err(Error::AllBuffersBusy) => info!("All Tx buffers busy"),
            Err(_) => panic!("Failed to send"),
        }

        // Loopback mode hands every sent frame straight back.
        match can.receive() {
            Ok(frame) => info!("Received frame {:?}", frame),
            Err(Error::NoMessage) => info!("No message to read!"),
            Err(_) => panic!("Failed to receive"),
        }

        cortex_m::asm::delay(sys_hz / 2);
    }
}
