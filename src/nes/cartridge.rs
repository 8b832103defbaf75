use anyhow::{Result, bail};

use super::mapper::Mirroring;

pub const PRG_BANK_SIZE: usize = 0x4000;
pub const CHR_BANK_SIZE: usize = 0x2000;

/// Header facts an external loader has already parsed out of a cartridge
/// image: declared bank counts plus the two flag bytes carrying the mapper
/// id nibbles, the mirroring bit, and the trainer bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomHeader {
    pub prg_banks: u8,
    pub chr_banks: u8,
    pub flags6: u8,
    pub flags7: u8,
}

impl RomHeader {
    pub fn mapper_id(&self) -> u8 {
        (self.flags6 >> 4) | ((self.flags7 & 0x0F) << 4)
    }

    pub fn mirroring(&self) -> Mirroring {
        if self.flags6 & 0x01 == 0 {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        }
    }

    pub fn has_trainer(&self) -> bool {
        self.flags6 & 0x04 != 0
    }
}

/// Immutable cartridge store: program and graphics bytes plus the facts
/// derived from the header. Address masks come from the declared bank
/// counts; the mapper applies them on every access.
#[derive(Debug, Clone)]
pub struct Cartridge {
    pub(crate) prg_rom: Vec<u8>,
    pub(crate) chr_rom: Vec<u8>,
    pub(crate) chr_is_ram: bool,
    pub(crate) mirroring: Mirroring,
    pub(crate) prg_mask: usize,
    pub(crate) chr_mask: usize,
    pub(crate) mapper_id: u8,
}

impl Cartridge {
    /// Builds the store from a parsed header and the raw PRG/CHR payloads.
    ///
    /// A cartridge that declares zero CHR banks carries writable graphics
    /// RAM instead of ROM; `chr_rom` must then be empty.
    pub fn from_parts(header: RomHeader, prg_rom: Vec<u8>, chr_rom: Vec<u8>) -> Result<Self> {
        if header.prg_banks == 0 {
            bail!("invalid cartridge header: zero PRG banks declared");
        }
        if prg_rom.len() != header.prg_banks as usize * PRG_BANK_SIZE {
            bail!(
                "PRG payload is {} bytes but the header declares {} bank(s) ({} bytes)",
                prg_rom.len(),
                header.prg_banks,
                header.prg_banks as usize * PRG_BANK_SIZE
            );
        }
        if chr_rom.len() != header.chr_banks as usize * CHR_BANK_SIZE {
            bail!(
                "CHR payload is {} bytes but the header declares {} bank(s) ({} bytes)",
                chr_rom.len(),
                header.chr_banks,
                header.chr_banks as usize * CHR_BANK_SIZE
            );
        }

        let chr_is_ram = header.chr_banks == 0;
        let chr_mask = if chr_is_ram {
            CHR_BANK_SIZE - 1
        } else {
            header.chr_banks as usize * CHR_BANK_SIZE - 1
        };

        log::debug!(
            "cartridge: mapper {}, {:?} mirroring, {} PRG bank(s), {} CHR bank(s){}",
            header.mapper_id(),
            header.mirroring(),
            header.prg_banks,
            header.chr_banks,
            if chr_is_ram { " (CHR RAM)" } else { "" }
        );

        Ok(Self {
            prg_rom,
            chr_rom,
            chr_is_ram,
            mirroring: header.mirroring(),
            prg_mask: header.prg_banks as usize * PRG_BANK_SIZE - 1,
            chr_mask,
            mapper_id: header.mapper_id(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prg_banks: u8, chr_banks: u8, flags6: u8, flags7: u8) -> RomHeader {
        RomHeader {
            prg_banks,
            chr_banks,
            flags6,
            flags7,
        }
    }

    #[test]
    fn mapper_id_combines_flag_nibbles() {
        assert_eq!(header(1, 1, 0x20, 0x00).mapper_id(), 2);
        assert_eq!(header(1, 1, 0x10, 0x01).mapper_id(), 0x11);
        assert_eq!(header(1, 1, 0x00, 0xF0).mapper_id(), 0);
    }

    #[test]
    fn mirroring_follows_flags6_bit_0() {
        assert_eq!(header(1, 1, 0x00, 0).mirroring(), Mirroring::Horizontal);
        assert_eq!(header(1, 1, 0x01, 0).mirroring(), Mirroring::Vertical);
    }

    #[test]
    fn payload_sizes_must_match_declared_banks() {
        let err = Cartridge::from_parts(header(2, 0, 0, 0), vec![0; PRG_BANK_SIZE], Vec::new());
        assert!(err.is_err());

        let err = Cartridge::from_parts(
            header(1, 1, 0, 0),
            vec![0; PRG_BANK_SIZE],
            vec![0; CHR_BANK_SIZE - 1],
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_prg_banks_is_rejected() {
        assert!(Cartridge::from_parts(header(0, 0, 0, 0), Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn zero_chr_banks_selects_chr_ram() {
        let cart =
            Cartridge::from_parts(header(1, 0, 0, 0), vec![0; PRG_BANK_SIZE], Vec::new()).unwrap();
        assert!(cart.chr_is_ram);
        assert_eq!(cart.chr_mask, CHR_BANK_SIZE - 1);
    }
}
