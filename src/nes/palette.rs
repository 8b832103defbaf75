use anyhow::{Result, bail};

/// Number of colors the video chip can produce.
const COLOR_COUNT: usize = 64;

/// Canonical 2C02 master palette.
const NES_PALETTE: [[u8; 3]; COLOR_COUNT] = [
    [0x54, 0x54, 0x54],
    [0x00, 0x1E, 0x74],
    [0x08, 0x10, 0x90],
    [0x30, 0x00, 0x88],
    [0x44, 0x00, 0x64],
    [0x5C, 0x00, 0x30],
    [0x54, 0x04, 0x00],
    [0x3C, 0x18, 0x00],
    [0x20, 0x2A, 0x00],
    [0x08, 0x3A, 0x00],
    [0x00, 0x40, 0x00],
    [0x00, 0x3C, 0x00],
    [0x00, 0x30, 0x2C],
    [0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00],
    [0x98, 0x96, 0x98],
    [0x08, 0x4C, 0xC4],
    [0x30, 0x32, 0xEC],
    [0x5C, 0x1E, 0xE4],
    [0x88, 0x14, 0xB0],
    [0xA0, 0x14, 0x64],
    [0x98, 0x22, 0x20],
    [0x78, 0x3C, 0x00],
    [0x54, 0x5A, 0x00],
    [0x28, 0x72, 0x00],
    [0x08, 0x7C, 0x00],
    [0x00, 0x76, 0x28],
    [0x00, 0x66, 0x78],
    [0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00],
    [0xEC, 0xEE, 0xEC],
    [0x3C, 0x7E, 0xEC],
    [0x5C, 0x5C, 0xEC],
    [0x88, 0x44, 0xEC],
    [0xB0, 0x2C, 0xEC],
    [0xE0, 0x28, 0xB0],
    [0xD8, 0x3C, 0x50],
    [0xC4, 0x54, 0x00],
    [0xAC, 0x70, 0x00],
    [0x80, 0x88, 0x00],
    [0x40, 0x9C, 0x30],
    [0x20, 0xA4, 0x58],
    [0x20, 0x9A, 0x88],
    [0x40, 0x40, 0x40],
    [0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00],
    [0xEC, 0xEE, 0xEC],
    [0xA8, 0xBC, 0xEC],
    [0xBC, 0xAC, 0xEC],
    [0xD4, 0xA0, 0xEC],
    [0xEC, 0x94, 0xEC],
    [0xEC, 0x90, 0xD4],
    [0xEC, 0x9C, 0xB4],
    [0xE4, 0xB0, 0x90],
    [0xDC, 0xC8, 0x78],
    [0xD4, 0xDC, 0x78],
    [0xB8, 0xEC, 0x98],
    [0xA8, 0xEC, 0xBC],
    [0xA0, 0xE4, 0xE4],
    [0xA0, 0xA0, 0xA0],
    [0x00, 0x00, 0x00],
    [0x00, 0x00, 0x00],
];

/// Master color table mapping 6-bit palette-RAM entries to RGB.
///
/// Every cartridge shares one of these; the default is the canonical NTSC
/// table, and [`SystemPalette::from_bytes`] accepts the raw 192-byte R,G,B
/// dump format so a frontend can substitute its own.
#[derive(Debug, Clone)]
pub struct SystemPalette {
    colors: [[u8; 3]; COLOR_COUNT],
}

impl SystemPalette {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < COLOR_COUNT * 3 {
            bail!(
                "palette dump too short: expected {} bytes, got {}",
                COLOR_COUNT * 3,
                data.len()
            );
        }

        let mut colors = [[0u8; 3]; COLOR_COUNT];
        for (index, color) in colors.iter_mut().enumerate() {
            color.copy_from_slice(&data[index * 3..index * 3 + 3]);
        }
        Ok(Self { colors })
    }

    pub fn color(&self, index: u8) -> [u8; 3] {
        self.colors[(index & 0x3F) as usize]
    }
}

impl Default for SystemPalette {
    fn default() -> Self {
        Self {
            colors: NES_PALETTE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_reads_rgb_triplets() {
        let mut dump = vec![0u8; 192];
        dump[3] = 0x11;
        dump[4] = 0x22;
        dump[5] = 0x33;
        let palette = SystemPalette::from_bytes(&dump).unwrap();
        assert_eq!(palette.color(1), [0x11, 0x22, 0x33]);
    }

    #[test]
    fn short_dump_is_rejected() {
        assert!(SystemPalette::from_bytes(&[0u8; 100]).is_err());
    }

    #[test]
    fn color_index_wraps_at_64() {
        let palette = SystemPalette::default();
        assert_eq!(palette.color(0x41), palette.color(0x01));
    }
}
