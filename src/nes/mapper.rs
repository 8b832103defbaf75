use anyhow::{Result, bail};

use super::cartridge::{CHR_BANK_SIZE, Cartridge, PRG_BANK_SIZE};

/// Nametable mirroring arrangement declared by the cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
}

/// Bank-mapping behavior, one variant per supported mapper circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    /// NROM (id 0): PRG addresses mask straight into the ROM array.
    Fixed,
    /// UxROM (id 2): the low 16 KB window follows the bank register, the
    /// high window stays pinned to the last bank.
    Switchable,
}

/// Translates processor-visible addresses into cartridge-store indices.
///
/// The only mutable state is the selected-bank register (ignored by the
/// fixed variant) and the CHR RAM a ROM-less cartridge writes its graphics
/// into.
pub struct Mapper {
    kind: MapperKind,
    selected_bank: u8,
    chr_ram: Vec<u8>,
}

impl Mapper {
    /// Selects the variant for a header-declared mapper id. Unknown ids are
    /// a load-time error; no machine is constructed around them.
    pub fn create(mapper_id: u8) -> Result<Self> {
        let kind = match mapper_id {
            0 => MapperKind::Fixed,
            2 => MapperKind::Switchable,
            id => bail!("unsupported mapper id {id}"),
        };
        log::debug!("mapper {mapper_id}: {kind:?}");
        Ok(Self {
            kind,
            selected_bank: 0,
            chr_ram: vec![0; CHR_BANK_SIZE],
        })
    }

    pub fn kind(&self) -> MapperKind {
        self.kind
    }

    pub fn selected_bank(&self) -> u8 {
        self.selected_bank
    }

    fn total_banks(&self) -> usize {
        match self.kind {
            MapperKind::Fixed => 2,
            MapperKind::Switchable => 8,
        }
    }

    /// Reads program memory. `addr` is the offset into the 32 KB cartridge
    /// window (CPU address minus 0x8000).
    pub fn read_prg(&self, cart: &Cartridge, addr: u16) -> u8 {
        let addr = addr as usize;
        match self.kind {
            MapperKind::Fixed => cart.prg_rom[addr & cart.prg_mask],
            MapperKind::Switchable => {
                if addr < PRG_BANK_SIZE {
                    let offset = addr + PRG_BANK_SIZE * self.selected_bank as usize;
                    cart.prg_rom[offset & cart.prg_mask]
                } else {
                    let offset = addr - PRG_BANK_SIZE + PRG_BANK_SIZE * (self.total_banks() - 1);
                    cart.prg_rom[offset & cart.prg_mask]
                }
            }
        }
    }

    /// A CPU write anywhere in the cartridge window updates the bank
    /// register. The fixed variant stores the value but never consults it.
    pub fn write_bank_select(&mut self, value: u8) {
        self.selected_bank = value & 0x07;
    }

    pub fn read_chr(&self, cart: &Cartridge, addr: u16) -> u8 {
        if cart.chr_is_ram {
            self.chr_ram[addr as usize & (CHR_BANK_SIZE - 1)]
        } else {
            cart.chr_rom[addr as usize & cart.chr_mask]
        }
    }

    pub fn write_chr(&mut self, cart: &Cartridge, addr: u16, value: u8) {
        if cart.chr_is_ram {
            self.chr_ram[addr as usize & (CHR_BANK_SIZE - 1)] = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::RomHeader;

    fn patterned_banks(total_size: usize, bank_size: usize) -> Vec<u8> {
        let mut data = vec![0u8; total_size];
        for (bank, chunk) in data.chunks_mut(bank_size).enumerate() {
            chunk.fill((bank as u8).wrapping_add(1));
        }
        data
    }

    fn make_cart(mapper_id: u8, prg_banks: u8, chr_banks: u8) -> Cartridge {
        let header = RomHeader {
            prg_banks,
            chr_banks,
            flags6: (mapper_id & 0x0F) << 4,
            flags7: mapper_id & 0xF0,
        };
        Cartridge::from_parts(
            header,
            patterned_banks(prg_banks as usize * PRG_BANK_SIZE, PRG_BANK_SIZE),
            patterned_banks(chr_banks as usize * CHR_BANK_SIZE, CHR_BANK_SIZE),
        )
        .unwrap()
    }

    #[test]
    fn fixed_mapper_masks_prg_addresses() {
        let cart = make_cart(0, 1, 1);
        let mapper = Mapper::create(cart.mapper_id).unwrap();

        // A single 16 KB bank appears in both halves of the window.
        assert_eq!(mapper.read_prg(&cart, 0x0000), 1);
        assert_eq!(mapper.read_prg(&cart, 0x4000), 1);

        let cart = make_cart(0, 2, 1);
        let mapper = Mapper::create(cart.mapper_id).unwrap();
        assert_eq!(mapper.read_prg(&cart, 0x0000), 1);
        assert_eq!(mapper.read_prg(&cart, 0x4000), 2);
    }

    #[test]
    fn switchable_mapper_keeps_last_bank_fixed() {
        let cart = make_cart(2, 8, 0);
        let mut mapper = Mapper::create(cart.mapper_id).unwrap();

        assert_eq!(mapper.read_prg(&cart, 0x0000), 1);
        assert_eq!(mapper.read_prg(&cart, 0x4000), 8);

        mapper.write_bank_select(3);
        assert_eq!(mapper.read_prg(&cart, 0x0000), 4);
        assert_eq!(mapper.read_prg(&cart, 0x4000), 8);
    }

    #[test]
    fn bank_register_masks_to_three_bits() {
        let cart = make_cart(2, 8, 0);
        let mut mapper = Mapper::create(cart.mapper_id).unwrap();

        mapper.write_bank_select(0x0A);
        assert_eq!(mapper.selected_bank(), 2);
    }

    #[test]
    fn unknown_mapper_id_is_rejected() {
        assert!(Mapper::create(1).is_err());
        assert!(Mapper::create(0xFF).is_err());
    }

    #[test]
    fn chr_ram_round_trips_when_cartridge_has_no_chr_rom() {
        let cart = make_cart(0, 1, 0);
        let mut mapper = Mapper::create(cart.mapper_id).unwrap();

        mapper.write_chr(&cart, 0x0123, 0xAB);
        assert_eq!(mapper.read_chr(&cart, 0x0123), 0xAB);
    }

    #[test]
    fn chr_rom_ignores_writes() {
        let cart = make_cart(0, 1, 1);
        let mut mapper = Mapper::create(cart.mapper_id).unwrap();

        let before = mapper.read_chr(&cart, 0x0010);
        mapper.write_chr(&cart, 0x0010, 0xCD);
        assert_eq!(mapper.read_chr(&cart, 0x0010), before);
    }
}
