use bitflags::bitflags;
use embedded_hal::spi::{Mode, Phase, Polarity};

bitflags! {
    /// Per-peer mode bits understood by the controller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeFlags: u8 {
        /// Clock idles high.
        const CPOL = 1 << 0;
        /// Data is sampled on the second clock edge.
        const CPHA = 1 << 1;
        /// Chip select is active high.
        const CS_HIGH = 1 << 2;
        /// Do not drive any chip select line.
        const NO_CS = 1 << 3;
    }
}

impl From<Mode> for ModeFlags {
    fn from(mode: Mode) -> Self {
        let mut flags = ModeFlags::empty();
        if mode.polarity == Polarity::IdleHigh {
            flags |= ModeFlags::CPOL;
        }
        if mode.phase == Phase::CaptureOnSecondTransition {
            flags |= ModeFlags::CPHA;
        }
        flags
    }
}
