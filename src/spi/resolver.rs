//! Translation of a requested clock rate, chip select, mode and word width into the values
//! programmed into the `CLK` and `CS` registers.

use super::{registers::Control, Config, Error, ModeFlags};

/// Largest divider the 16 bit `CDIV` field can express; it is written as 0.
pub const MAX_CLOCK_DIVIDER: u32 = 65536;

/// Register values for one peer (or one overriding transfer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerConfig {
    /// Base control word, without `TA` or interrupt enables.
    pub cs: u32,
    /// Clock divider, a power of two; 0 means [`MAX_CLOCK_DIVIDER`].
    pub cdiv: u16,
}

impl PeerConfig {
    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.cs)
    }

    /// Whether transfers run in 9 bit LoSSI mode.
    pub fn lossi(&self) -> bool {
        self.control().contains(Control::LEN)
    }

    /// The SPI clock this configuration actually produces.
    pub fn effective_hz(&self, bus_hz: u32) -> u32 {
        let divider = match self.cdiv {
            0 => MAX_CLOCK_DIVIDER,
            cdiv => u32::from(cdiv),
        };
        bus_hz / divider
    }
}

/// Clock divider for `hz` given the core clock `bus_hz`.
///
/// The hardware only honours powers of two, so the divider is rounded up and the resulting
/// clock never exceeds the request.
pub fn clock_divider(bus_hz: u32, hz: u32) -> Result<u16, Error> {
    if hz >= bus_hz {
        // bus_hz / 2 is as fast as we can go.
        return Ok(2);
    }
    if hz == 0 {
        return Ok(0);
    }

    let cdiv = bus_hz
        .div_ceil(hz)
        .checked_next_power_of_two()
        .ok_or(Error::Range)?;
    match cdiv {
        cdiv if cdiv > MAX_CLOCK_DIVIDER => Err(Error::Range),
        MAX_CLOCK_DIVIDER => Ok(0),
        // 1 would be truncated to 0, which means 65536.
        1 => Ok(2),
        cdiv => Ok(cdiv as u16),
    }
}

impl Config {
    /// Compute the register values for a peer. Touches no hardware.
    pub fn resolve(
        &self,
        hz: u32,
        chip_select: u8,
        mode: ModeFlags,
        bits_per_word: u8,
    ) -> Result<PeerConfig, Error> {
        let cdiv = clock_divider(self.bus_hz, hz).inspect_err(|_| {
            debug!(
                "setup: {} Hz too slow, min {} Hz",
                hz,
                self.bus_hz / MAX_CLOCK_DIVIDER
            )
        })?;

        let mut cs = match bits_per_word {
            8 => Control::empty(),
            // Reading in LoSSI mode is a special case, see the BCM2835 manual section 10.6.
            9 => Control::LEN,
            _ => {
                debug!("setup: invalid bits_per_word {} (must be 8 or 9)", bits_per_word);
                return Err(Error::Parameter);
            }
        };

        if mode.contains(ModeFlags::CPOL) {
            cs |= Control::CPOL;
        }
        if mode.contains(ModeFlags::CPHA) {
            cs |= Control::CPHA;
        }

        if mode.contains(ModeFlags::NO_CS) {
            // Address the unused fourth line so that no physical chip select toggles.
            cs |= Control::CS_10 | Control::CS_01;
        } else {
            if chip_select >= self.num_chip_select.min(3) {
                debug!(
                    "setup: invalid chip select {} ({} defined)",
                    chip_select,
                    self.num_chip_select
                );
                return Err(Error::Parameter);
            }
            if mode.contains(ModeFlags::CS_HIGH) {
                cs |= Control::CSPOL | Control::cspol(chip_select);
            }
            cs |= Control::from_bits_retain(u32::from(chip_select));
        }

        Ok(PeerConfig { cs: cs.bits(), cdiv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUS_HZ: u32 = 250_000_000;

    fn config() -> Config {
        Config {
            bus_hz: BUS_HZ,
            num_chip_select: 3,
        }
    }

    #[test]
    fn one_megahertz_on_a_250_megahertz_bus() {
        // ceil(250e6 / 1e6) = 250, rounded up to 256.
        assert_eq!(clock_divider(BUS_HZ, 1_000_000), Ok(256));
    }

    #[test]
    fn at_or_above_bus_clock_uses_the_fastest_divider() {
        assert_eq!(clock_divider(BUS_HZ, BUS_HZ), Ok(2));
        assert_eq!(clock_divider(BUS_HZ, u32::MAX), Ok(2));
    }

    #[test]
    fn zero_hz_is_the_slowest_divider() {
        assert_eq!(clock_divider(BUS_HZ, 0), Ok(0));
    }

    #[test]
    fn divider_limits() {
        // Exactly bus / 65536 saturates to the "0 = 65536" encoding.
        assert_eq!(clock_divider(65536 * 1000, 1000), Ok(0));
        // One more step would need 131072.
        assert_eq!(clock_divider(BUS_HZ, BUS_HZ / 65536 - 1), Err(Error::Range));
        assert_eq!(clock_divider(u32::MAX, 1), Err(Error::Range));
    }

    #[test]
    fn divider_is_a_power_of_two_and_never_too_fast() {
        let mut hz = 3_815;
        while hz < BUS_HZ {
            let cdiv = clock_divider(BUS_HZ, hz).unwrap();
            let divider = if cdiv == 0 { MAX_CLOCK_DIVIDER } else { u32::from(cdiv) };
            assert!(divider.is_power_of_two(), "{hz} Hz -> {divider}");
            assert!(divider >= 2);
            assert!(BUS_HZ / divider <= hz, "{hz} Hz -> {divider}");
            hz = hz * 3 / 2 + 7;
        }
    }

    #[test]
    fn word_width() {
        let config = config();
        for bits in [0, 1, 7, 10, 16, 32] {
            assert_eq!(
                config.resolve(1_000_000, 0, ModeFlags::empty(), bits),
                Err(Error::Parameter)
            );
        }
        let eight = config.resolve(1_000_000, 0, ModeFlags::empty(), 8).unwrap();
        assert!(!eight.lossi());
        let nine = config.resolve(1_000_000, 0, ModeFlags::empty(), 9).unwrap();
        assert!(nine.lossi());
    }

    #[test]
    fn chip_select_bits() {
        let config = config();
        for chip_select in 0..3 {
            let peer = config
                .resolve(1_000_000, chip_select, ModeFlags::empty(), 8)
                .unwrap();
            assert_eq!(peer.cs & 0b11, u32::from(chip_select));
            assert_eq!(peer.cdiv, 256);
        }
        assert_eq!(
            config.resolve(1_000_000, 3, ModeFlags::empty(), 8),
            Err(Error::Parameter)
        );
    }

    #[test]
    fn mode_bits() {
        let config = config();
        let peer = config
            .resolve(1_000_000, 2, ModeFlags::CPOL | ModeFlags::CPHA | ModeFlags::CS_HIGH, 8)
            .unwrap();
        assert_eq!(
            peer.control(),
            Control::CPOL | Control::CPHA | Control::CSPOL | Control::CSPOL2 | Control::CS_10
        );
    }

    #[test]
    fn no_chip_select_addresses_the_unused_line() {
        let config = config();
        // The index is ignored, even an out of range one.
        let peer = config
            .resolve(1_000_000, 7, ModeFlags::NO_CS | ModeFlags::CS_HIGH, 8)
            .unwrap();
        assert_eq!(peer.control(), Control::CS_10 | Control::CS_01);
    }

    #[test]
    fn effective_rate() {
        let peer = PeerConfig { cs: 0, cdiv: 256 };
        assert_eq!(peer.effective_hz(BUS_HZ), 976_562);
        let slowest = PeerConfig { cs: 0, cdiv: 0 };
        assert_eq!(slowest.effective_hz(BUS_HZ), 3_814);
    }
}
